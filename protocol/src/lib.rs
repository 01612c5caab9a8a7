//! Length prefixed binary packets for the chat channel.
//!
//! Every frame on the wire is `[payload length: u8][opcode: u8][payload]`.
//! [`frame`] cuts frames out of a byte buffer without knowing what they mean,
//! [`packet`] turns them into typed [`Packet`]s and back, and [`channel`] wraps
//! a stream so callers only ever see whole packets.

pub mod channel;
pub mod codec;
pub mod error;
pub mod frame;
pub mod packet;

pub use channel::{split, PacketReceiver, PacketSender, TcpReceiver, TcpSender};
pub use codec::{PacketCodec, MAX_BUFFERED};
pub use error::ProtocolError;
pub use frame::{extract_frame, OpaquePacket};
pub use packet::{Packet, TypingStatus, UserStatus, MAX_NAME_LEN, MAX_PAYLOAD};

/// Where the server listens and clients connect unless told otherwise.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5100";
