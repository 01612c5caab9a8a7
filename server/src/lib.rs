pub mod client_handler;
pub mod registry;
pub mod server_listener;

pub use client_handler::{ClientHandler, SessionState};
pub use registry::{ClientHandle, ClientId, Registry, GENERIC_NAMES};
pub use server_listener::ServerListener;
