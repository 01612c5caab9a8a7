use bytes::{Buf, Bytes, BytesMut};

// frame consists of [ LENGTH | TYPE | PAYLOAD ]
const HEADER_LEN: usize = 2;

/// A frame pulled off the wire whose payload has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaquePacket {
    pub opcode: u8,
    pub payload: Bytes,
}

/// Removes one complete frame from the front of `src`.
///
/// Returns `None` and leaves `src` untouched when the frame is not complete
/// yet. The opcode is not looked at here.
pub fn extract_frame(src: &mut BytesMut) -> Option<OpaquePacket> {
    let payload_len = *src.first()? as usize;

    if src.len() < HEADER_LEN + payload_len {
        return None;
    }

    let mut frame = src.split_to(HEADER_LEN + payload_len);
    frame.advance(1);
    let opcode = frame.get_u8();

    Some(OpaquePacket { opcode, payload: frame.freeze() })
}
