//! TCP transport implementation

use crate::stream::{ByteStream, Transport};
use async_trait::async_trait;
use dnp3_core::{LinkError, LinkResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP transport settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub connect_timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings with a 30 second connect timeout
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Create TCP settings with an explicit connect timeout
    pub fn with_connect_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout: Some(timeout),
        }
    }
}

/// TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    /// Create a new, unopened TCP transport
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create a TCP transport from an address string
    pub fn from_address(address: &str) -> LinkResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| LinkError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }

    /// Create a TCP transport from an already-connected stream (server side)
    pub fn from_connected_stream(stream: TcpStream) -> Self {
        let address = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        Self {
            stream: Some(stream),
            settings: TcpSettings {
                address,
                connect_timeout: None,
            },
            closed: false,
        }
    }

    fn stream_mut(&mut self) -> LinkResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "TCP stream not connected",
            ))
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> LinkResult<()> {
        if !self.closed {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let stream = if let Some(timeout) = self.settings.connect_timeout {
            tokio::time::timeout(timeout, TcpStream::connect(self.settings.address))
                .await
                .map_err(|_| LinkError::Timeout)??
        } else {
            TcpStream::connect(self.settings.address).await?
        };

        self.stream = Some(stream);
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl ByteStream for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize> {
        let stream = self.stream_mut()?;
        match stream.read(buf).await {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e.into())
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> LinkResult<usize> {
        let stream = self.stream_mut()?;
        Ok(stream.write(buf).await?)
    }

    async fn flush(&mut self) -> LinkResult<()> {
        let stream = self.stream_mut()?;
        Ok(stream.flush().await?)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> LinkResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
