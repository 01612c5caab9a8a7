use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error};

use crate::error::ProtocolError;
use crate::frame::extract_frame;
use crate::packet::Packet;

/// No frame is larger than 257 bytes, so a buffer this full without a
/// complete frame means the peer is broken.
pub const MAX_BUFFERED: usize = 1000;

#[derive(Debug)]
pub struct PacketCodec {
    capacity: usize,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFERED)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PacketCodec { capacity }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

// convert bytes to Packet
impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match extract_frame(src) {
            Some(frame) => {
                debug!("extracted frame {:?}", frame);
                Packet::decode(frame.opcode, &frame.payload)
                    .map(Some)
                    .map_err(|e| {
                        error!("Failed to parse frame {:?}", frame);
                        e
                    })
            }
            None if src.len() > self.capacity => Err(ProtocolError::FrameOverflow {
                buffered: src.len(),
                capacity: self.capacity,
            }),
            None => Ok(None),
        }
    }

    // A zero length read is the peer closing its write side, any trailing
    // partial frame is dropped along with it
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let packet = self.decode(src)?;
        if packet.is_none() && !src.is_empty() {
            debug!("discarding {} bytes of partial frame at end of stream", src.len());
            src.clear();
        }
        Ok(packet)
    }
}

// Take Packet and convert it to bytes
impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_to(dst)
    }
}
