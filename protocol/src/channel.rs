//! Packet level wrappers around the two halves of a byte stream.
//!
//! [`PacketSender`] is cheap to clone and serializes writers on its own lock,
//! so a direct reply racing a broadcast never interleaves on the wire.
//! [`PacketReceiver`] buffers incoming bytes and hands out one packet at a time.

use std::io::ErrorKind;
use std::sync::Arc;

use futures::SinkExt; // provides feed/flush/close on top of FramedWrite
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{tcp, TcpStream};
use tokio::sync::Mutex;
use tokio_stream::StreamExt; // provides next on top of FramedRead
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::codec::{PacketCodec, MAX_BUFFERED};
use crate::error::ProtocolError;
use crate::packet::Packet;

const READ_CHUNK: usize = 64;

pub type TcpSender = PacketSender<tcp::OwnedWriteHalf>;
pub type TcpReceiver = PacketReceiver<tcp::OwnedReadHalf>;

#[derive(Debug)]
pub struct PacketSender<W> {
    fw: Arc<Mutex<FramedWrite<W, PacketCodec>>>,
}

impl<W> Clone for PacketSender<W> {
    fn clone(&self) -> Self {
        PacketSender { fw: Arc::clone(&self.fw) }
    }
}

impl<W: AsyncWrite + Unpin> PacketSender<W> {
    pub fn new(write: W) -> Self {
        PacketSender { fw: Arc::new(Mutex::new(FramedWrite::new(write, PacketCodec::new()))) }
    }

    pub async fn send(&self, packet: Packet) -> Result<(), ProtocolError> {
        self.send_batch(vec![packet]).await
    }

    /// Writes all packets as one contiguous run of bytes.
    ///
    /// Every packet is checked before anything is written, so an oversized
    /// packet fails the whole batch without putting a partial batch on the wire.
    pub async fn send_batch(&self, packets: Vec<Packet>) -> Result<(), ProtocolError> {
        for p in &packets {
            p.encode_payload()?;
        }

        let mut fw = self.fw.lock().await;
        for p in packets {
            fw.feed(p).await?;
        }
        fw.flush().await
    }

    /// Shuts down the write side. A socket the peer already tore down is not an error.
    pub async fn shutdown(&self) -> Result<(), ProtocolError> {
        let mut fw = self.fw.lock().await;
        match fw.close().await {
            Err(ProtocolError::Io(e)) if is_already_closed(e.kind()) => {
                debug!("Couldn't shutdown socket, peer already closed it: {}", e);
                Ok(())
            }
            other => other,
        }
    }
}

fn is_already_closed(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::NotConnected | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset)
}

#[derive(Debug)]
pub struct PacketReceiver<R> {
    fr: FramedRead<R, PacketCodec>,
}

impl<R: AsyncRead + Unpin> PacketReceiver<R> {
    pub fn new(read: R) -> Self {
        Self::with_capacity(read, MAX_BUFFERED)
    }

    /// `capacity` bounds how many bytes may pile up without forming a frame.
    pub fn with_capacity(read: R, capacity: usize) -> Self {
        PacketReceiver {
            fr: FramedRead::with_capacity(read, PacketCodec::with_capacity(capacity), READ_CHUNK),
        }
    }

    /// Waits for the next packet. `Ok(None)` means the peer closed the stream.
    pub async fn next(&mut self) -> Result<Option<Packet>, ProtocolError> {
        self.fr.next().await.transpose()
    }
}

/// Splits a connected stream into its packet level halves.
pub fn split(stream: TcpStream) -> (TcpReceiver, TcpSender) {
    let (read, write) = stream.into_split();
    (PacketReceiver::new(read), PacketSender::new(write))
}
