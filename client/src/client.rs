use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::select;
use tokio::sync::broadcast::{self, Receiver as BReceiver, Sender as BSender};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use protocol::{Packet, TcpReceiver, TcpSender, MAX_NAME_LEN, MAX_PAYLOAD};

use crate::error::ClientError;

/// Receives every packet the server pushes after a successful login.
///
/// Calls happen one at a time on the receive task, never concurrently.
#[async_trait]
pub trait PacketHandler: Send + 'static {
    async fn handle(&mut self, packet: Packet);
}

// forward packets to whoever holds the other end of the channel
#[async_trait]
impl PacketHandler for mpsc::Sender<Packet> {
    async fn handle(&mut self, packet: Packet) {
        if self.send(packet).await.is_err() {
            debug!("packet handler channel closed, dropping packet");
        }
    }
}

// State shared between the caller and the background receive task
struct Connection {
    // taken on close, so the write half is released once in-flight sends finish
    sender: Mutex<Option<TcpSender>>,
    connected: AtomicBool,
    shutdown_tx: BSender<()>,
}

impl Connection {
    async fn sender(&self) -> Result<TcpSender, ClientError> {
        self.sender.lock().await.clone().ok_or(ClientError::NotConnected)
    }

    // Only the first caller shuts the socket down, later calls are no-ops
    async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(sender) = self.sender.lock().await.take() {
            if let Err(e) = sender.shutdown().await {
                debug!("Couldn't shutdown socket (already shut down by server likely): {}", e);
            }
        }
        let _ = self.shutdown_tx.send(());
        info!("Disconnected from server");
    }
}

pub struct Client {
    conn: Arc<Connection>,
    receiver: Option<TcpReceiver>,
    name: Option<String>,
    receive_task: Option<JoinHandle<()>>,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Client, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            error!("Unable to connect to server");
            e
        })?;
        info!("Connected to server {:?}", stream.peer_addr()?);
        Ok(Client::new(stream))
    }

    pub fn new(stream: TcpStream) -> Self {
        let (receiver, sender) = protocol::split(stream);
        let (shutdown_tx, _) = broadcast::channel(1);

        Client {
            conn: Arc::new(Connection {
                sender: Mutex::new(Some(sender)),
                connected: AtomicBool::new(true),
                shutdown_tx,
            }),
            receiver: Some(receiver),
            name: None,
            receive_task: None,
        }
    }

    /// Name assigned by the server, once logged in.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.connected.load(Ordering::SeqCst)
    }

    /// Longest message the server can relay under this client's name, which
    /// goes out prefixed with its length byte. Assumes the longest allowed
    /// name before login.
    pub fn max_message_len(&self) -> usize {
        let name_len = self.name.as_ref().map_or(MAX_NAME_LEN, String::len);
        MAX_PAYLOAD.saturating_sub(1 + name_len)
    }

    /// Claims `name` (or any free name when `None`) and, on success, starts
    /// delivering server packets to `handler` in the background.
    ///
    /// A rejected login leaves the connection open so it can be retried.
    /// Anything other than a login response as the reply closes it.
    pub async fn login<H: PacketHandler>(&mut self, name: Option<&str>, handler: H) -> Result<String, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let receiver = self.receiver.as_mut().ok_or(ClientError::AlreadyLoggedIn)?;

        self.conn.sender().await?.send(Packet::Login { name: name.map(str::to_owned) }).await?;

        let next = receiver.next().await;
        let reply = match next {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                self.close().await;
                return Err(ClientError::ConnectionClosed);
            }
            Err(e) => {
                self.close().await;
                return Err(e.into());
            }
        };

        match reply {
            Packet::LoginResponse { success: true, message: assigned } => {
                info!("Logged in as {:?}", assigned);
                self.name = Some(assigned.clone());

                if let Some(receiver) = self.receiver.take() {
                    let shutdown_rx = self.conn.shutdown_tx.subscribe();
                    let conn = Arc::clone(&self.conn);
                    self.receive_task = Some(tokio::spawn(receive_packets(conn, receiver, shutdown_rx, handler)));
                }
                Ok(assigned)
            }
            Packet::LoginResponse { success: false, message } => Err(ClientError::LoginRejected(message)),
            other => {
                error!("Protocol violation, expected login response but got {}", other);
                self.close().await;
                Err(ClientError::UnexpectedPacket(other))
            }
        }
    }

    pub async fn send(&self, packets: Vec<Packet>) -> Result<(), ClientError> {
        Ok(self.conn.sender().await?.send_batch(packets).await?)
    }

    /// Shuts down the connection and releases both socket halves, whether or
    /// not the client ever logged in.
    ///
    /// Safe to call any number of times, also while the receive task is
    /// noticing end of stream on its own.
    pub async fn close(&mut self) {
        self.conn.close().await;
        drop(self.receiver.take());
        self.closed().await;
    }

    /// Waits until the receive task has stopped, e.g. after the server went away.
    /// Returns right away if no receive task was ever started. Cancel safe.
    pub async fn closed(&mut self) {
        if let Some(task) = self.receive_task.as_mut() {
            if let Err(e) = task.await {
                error!("receive task failed: {}", e);
            }
            self.receive_task = None;
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // wake the receive task so it releases the socket
        let _ = self.conn.shutdown_tx.send(());
    }
}

// Loop delivering server packets to the handler until either side closes
async fn receive_packets<H: PacketHandler>(
    conn: Arc<Connection>,
    mut receiver: TcpReceiver,
    mut shutdown_rx: BReceiver<()>,
    mut handler: H,
) {
    loop {
        select! {
            value = receiver.next() => match value {
                Ok(Some(packet)) => {
                    debug!("Received from server: {}", packet);
                    handler.handle(packet).await;
                }
                Ok(None) => {
                    info!("Received end-of-stream from server. Will disconnect.");
                    break;
                }
                Err(e) => {
                    error!("Receiving from server failed: {}", e);
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                debug!("receive task received shutdown, returning!");
                break;
            }
        }
    }

    conn.close().await;
}
