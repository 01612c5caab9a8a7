use thiserror::Error;

use protocol::{Packet, ProtocolError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot send packet, client has disconnected")]
    NotConnected,

    #[error("already logged in")]
    AlreadyLoggedIn,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("expected a login response, got {0}")]
    UnexpectedPacket(Packet),

    #[error("server closed the connection")]
    ConnectionClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Protocol(ProtocolError::Io(e))
    }
}
