use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use protocol::{Packet, ProtocolError, TcpSender, MAX_NAME_LEN};

// handed out in order to clients that log in without asking for a name
pub const GENERIC_NAMES: [&str; 3] = ["Alice", "Bob", "Charlie"];

pub type ClientId = u64;

const COUNTER_SEED: ClientId = 1;

// Server side record of one connection
#[derive(Debug)]
pub struct ClientHandle {
    pub name: Option<String>,
    pub logged_in: bool,
    sender: TcpSender,
}

struct Clients {
    by_id: BTreeMap<ClientId, ClientHandle>,
    next_id: ClientId,
}

impl Clients {
    fn is_name_free(&self, name: &str) -> bool {
        !self.by_id.values().any(|c| c.name.as_deref() == Some(name))
    }
}

/// Table of live connections, shared by every session of one server run.
///
/// Each call holds the single lock for its whole duration, including the
/// socket writes of `send_to` and `broadcast_to_logged_in`. A stalled client
/// therefore stalls registry access for everyone; there is no timeout.
#[derive(Clone)]
pub struct Registry {
    clients: Arc<Mutex<Clients>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            clients: Arc::new(Mutex::new(Clients { by_id: BTreeMap::new(), next_id: COUNTER_SEED })),
        }
    }

    pub async fn register(&self, sender: TcpSender) -> ClientId {
        let mut clients = self.clients.lock().await;
        let id = clients.next_id;
        clients.next_id += 1;
        clients.by_id.insert(id, ClientHandle { name: None, logged_in: false, sender });
        id
    }

    /// Claims `requested` if nobody holds it, or the first free generic name
    /// when nothing was requested. `None` means the claim failed, which
    /// includes names longer than `MAX_NAME_LEN` bytes.
    pub async fn claim_name(&self, id: ClientId, requested: Option<&str>) -> Option<String> {
        let mut clients = self.clients.lock().await;

        let name = match requested.filter(|n| !n.is_empty()) {
            Some(name) if name.len() > MAX_NAME_LEN => None,
            Some(name) => Some(name).filter(|n| clients.is_name_free(n)),
            None => GENERIC_NAMES.iter().copied().find(|n| clients.is_name_free(n)),
        }?
        .to_owned();

        let handle = clients.by_id.get_mut(&id)?;
        handle.name = Some(name.clone());
        Some(name)
    }

    pub async fn mark_logged_in(&self, id: ClientId) {
        if let Some(handle) = self.clients.lock().await.by_id.get_mut(&id) {
            handle.logged_in = true;
        }
    }

    pub async fn is_logged_in(&self, id: ClientId) -> bool {
        self.clients.lock().await.by_id.get(&id).map_or(false, |c| c.logged_in)
    }

    pub async fn send_to(&self, id: ClientId, packet: Packet) -> Result<(), ProtocolError> {
        let clients = self.clients.lock().await;
        match clients.by_id.get(&id) {
            Some(handle) => handle.sender.send(packet).await,
            None => {
                debug!("[{}] not registered, dropping {}", id, packet);
                Ok(())
            }
        }
    }

    /// Sends `packet` to every logged in client, in id order.
    ///
    /// Fails only if the packet cannot be encoded. A write failure to one
    /// recipient is logged and skipped, its own session will tear it down.
    pub async fn broadcast_to_logged_in(&self, packet: Packet) -> Result<(), ProtocolError> {
        packet.encode_payload()?;

        let clients = self.clients.lock().await;
        for (id, handle) in clients.by_id.iter().filter(|(_, c)| c.logged_in) {
            if let Err(e) = handle.sender.send(packet.clone()).await {
                warn!("[{}] unable to deliver {}: {}", id, packet, e);
            }
        }
        Ok(())
    }

    /// Removes the handle and returns it, so the caller sees whether it was logged in.
    pub async fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        self.clients.lock().await.by_id.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.by_id.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
