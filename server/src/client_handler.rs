use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use protocol::{Packet, ProtocolError, TcpReceiver, TcpSender, UserStatus, MAX_NAME_LEN};

use crate::registry::{ClientId, Registry};

const NAME_TAKEN: &str = "Name taken.";
const NAME_TOO_LONG: &str = "Name too long.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    LoggedIn { name: String },
}

// whether the read loop keeps going after a packet
enum Flow {
    Continue,
    Disconnect,
}

// Handles server communication from client
// Essentially this models a client actor on the server side
pub struct ClientHandler {
    client_id: ClientId,
    receiver: TcpReceiver,
    sender: TcpSender,
    clients: Registry,
    state: SessionState,
}

impl ClientHandler {
    /// Registers a freshly accepted connection, unauthenticated and nameless.
    pub async fn register(stream: TcpStream, clients: Registry) -> Self {
        let (receiver, sender) = protocol::split(stream);
        let client_id = clients.register(sender.clone()).await;
        info!("Client was assigned id {}", client_id);

        ClientHandler {
            client_id,
            receiver,
            sender,
            clients,
            state: SessionState::Unauthenticated,
        }
    }

    // Spawn tokio task to handle server socket reads from the client
    pub fn spawn(h: ClientHandler) -> JoinHandle<()> {
        tokio::spawn(async move { h.handle_read().await })
    }

    // Loop to handle ongoing client packets to server
    pub async fn handle_read(mut self) {
        let id = self.client_id;

        loop {
            debug!("[{}] Waiting for packet from client...", id);

            match self.receiver.next().await {
                Ok(Some(packet)) => {
                    info!("[{}] Received packet from client: {}", id, packet);
                    match self.handle_packet(packet).await {
                        Ok(Flow::Continue) => continue,
                        Ok(Flow::Disconnect) => break,
                        Err(e) if e.is_transport() => {
                            info!("[{}] Connection error while replying: {}", id, e);
                            break;
                        }
                        Err(e) => {
                            error!("[{}] Protocol error: {}", id, e);
                            break;
                        }
                    }
                }
                Ok(None) => {
                    info!("[{}] Received end-of-stream from client.", id);
                    break;
                }
                Err(e) if e.is_transport() => {
                    info!("[{}] Connection error: {}", id, e);
                    break;
                }
                Err(e) => {
                    error!("[{}] Protocol error: {}", id, e);
                    break;
                }
            }
        }

        self.process_disconnect().await;
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<Flow, ProtocolError> {
        let id = self.client_id;

        match packet {
            Packet::Ping => {}
            Packet::Login { name } => self.login(name.as_deref()).await?,
            Packet::SubmitMessage { message } => match &self.state {
                SessionState::LoggedIn { name } => {
                    let packet = Packet::UserWroteMessage { name: name.clone(), message };
                    self.clients.broadcast_to_logged_in(packet).await?;
                    debug!("[{}] Broadcast complete.", id);
                }
                SessionState::Unauthenticated => {
                    warn!("[{}] Client tries to send message before logging in! Will disconnect client.", id);
                    return Ok(Flow::Disconnect);
                }
            },
            Packet::SubmitUserStatus { status } => match &self.state {
                SessionState::LoggedIn { name } => {
                    let packet = Packet::UserStatusWasUpdated { name: name.clone(), status: status.into() };
                    self.clients.broadcast_to_logged_in(packet).await?;
                }
                SessionState::Unauthenticated => {
                    warn!("[{}] Client submits status before logging in! Will disconnect client.", id);
                    return Ok(Flow::Disconnect);
                }
            },
            p @ (Packet::LoginResponse { .. }
            | Packet::UserWroteMessage { .. }
            | Packet::UserStatusWasUpdated { .. }) => {
                warn!("[{}] Client sent server-only packet {}! Will disconnect client.", id, p);
                return Ok(Flow::Disconnect);
            }
        }

        Ok(Flow::Continue)
    }

    async fn login(&mut self, requested: Option<&str>) -> Result<(), ProtocolError> {
        let id = self.client_id;

        match self.clients.claim_name(id, requested).await {
            Some(name) => {
                info!("[{}] Logged in as {}", id, name);
                let reply = Packet::LoginResponse { success: true, message: name.clone() };
                self.clients.send_to(id, reply).await?;
                self.clients.mark_logged_in(id).await;
                self.state = SessionState::LoggedIn { name: name.clone() };

                let joined = Packet::UserStatusWasUpdated { name, status: UserStatus::LoggedIn };
                self.clients.broadcast_to_logged_in(joined).await?;
            }
            None => {
                let message = match requested {
                    Some(name) if name.len() > MAX_NAME_LEN => {
                        info!("[{}] Requested name is {} bytes, over the limit", id, name.len());
                        NAME_TOO_LONG
                    }
                    _ => {
                        info!("[{}] Requested name {:?} is not available", id, requested);
                        NAME_TAKEN
                    }
                };
                let reply = Packet::LoginResponse { success: false, message: message.to_owned() };
                self.clients.send_to(id, reply).await?;
            }
        }

        Ok(())
    }

    // process client disconnection event
    async fn process_disconnect(self) {
        let id = self.client_id;

        if let Err(e) = self.sender.shutdown().await {
            debug!("[{}] Couldn't shutdown client socket: {}", id, e);
        }
        drop(self.receiver);
        drop(self.sender);

        let removed = self.clients.remove(id).await;
        info!("[{}] Disconnected client", id);

        if let Some(handle) = removed.filter(|h| h.logged_in) {
            let name = handle.name.unwrap_or_default();
            let left = Packet::UserStatusWasUpdated { name, status: UserStatus::LoggedOut };
            if let Err(e) = self.clients.broadcast_to_logged_in(left).await {
                error!("[{}] Unable to broadcast logout: {}", id, e);
            }
        }
    }
}
