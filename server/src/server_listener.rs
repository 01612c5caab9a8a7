use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

use crate::client_handler::ClientHandler;
use crate::registry::Registry;

// Accepts connections and hands each one to its own ClientHandler task.
// The registry lives exactly as long as this listener's run.
pub struct ServerListener {
    listener: TcpListener,
    clients: Registry,
}

impl ServerListener {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {:?}", listener.local_addr()?);

        Ok(ServerListener { listener, clients: Registry::new() })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Registry {
        self.clients.clone()
    }

    pub async fn run(self) -> io::Result<()> {
        loop {
            info!("Waiting for client to connect...");
            let (tcp_socket, addr) = self.listener.accept().await.map_err(|e| {
                error!("Server abnormally exiting: {}", e);
                e
            })?;

            info!("Server received new client connection {:?}", &addr);

            let handler = ClientHandler::register(tcp_socket, self.clients.clone()).await;
            ClientHandler::spawn(handler);
        }
    }

    // Spawn tokio task running the accept loop
    pub fn spawn(self) -> tokio::task::JoinHandle<io::Result<()>> {
        tokio::spawn(self.run())
    }
}
