use thiserror::Error;

// Everything that can go wrong between raw bytes and a typed packet.
// All variants are fatal to the connection that produced them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload of {len} bytes does not fit in a frame (max 255)")]
    PayloadTooLarge { len: usize },

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("buffered {buffered} bytes (capacity {capacity}) without a complete frame")]
    FrameOverflow { buffered: usize, capacity: usize },

    #[error("malformed payload for packet type {opcode}: {reason}")]
    MalformedPayload { opcode: u8, reason: &'static str },

    #[error("invalid user status {0}")]
    InvalidStatus(u8),

    #[error("invalid utf8 in payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    // Transport failures are ordinary disconnects, everything else is the peer misbehaving
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}
