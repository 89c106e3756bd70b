//! Byte stream traits for the physical layer

use async_trait::async_trait;
use dnp3_core::{LinkError, LinkResult};

/// Byte-oriented access to an open physical channel
///
/// The link layer sees the physical medium as an ordered byte stream;
/// framing and addressing happen above this trait.
#[async_trait]
pub trait ByteStream: Send {
    /// Read available bytes into `buf`
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if the peer closed the channel
    async fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize>;

    /// Write bytes to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> LinkResult<usize>;

    /// Write all bytes to the stream
    async fn write_all(&mut self, buf: &[u8]) -> LinkResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> LinkResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> LinkResult<()>;
}

/// A physical channel that can be opened
#[async_trait]
pub trait Transport: ByteStream {
    /// Open the physical layer connection
    async fn open(&mut self) -> LinkResult<()>;
}
