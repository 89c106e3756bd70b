//! Byte transports for the DNP3 link stack
//!
//! This crate provides the `ByteStream`/`Transport` traits and the TCP and
//! serial implementations used below the link layer.

pub mod serial;
pub mod stream;
pub mod tcp;

pub use serial::{SerialSettings, SerialTransport};
pub use stream::{ByteStream, Transport};
pub use tcp::{TcpSettings, TcpTransport};
