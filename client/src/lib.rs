//! Client side of the chat channel: connect, log in, then send packets while
//! a background task hands everything the server pushes to a [`PacketHandler`].

pub mod client;
pub mod error;

pub use client::{Client, PacketHandler};
pub use error::ClientError;
