//! Serial port transport implementation

use crate::stream::{ByteStream, Transport};
use async_trait::async_trait;
use dnp3_core::{LinkError, LinkResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial port transport settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// Create serial settings with 8N1 framing and no flow control
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
        }
    }
}

/// Serial port transport
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<SerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    /// Create a new, unopened serial transport
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create a serial transport with port name and baud rate
    pub fn new_simple(port_name: String, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    fn stream_mut(&mut self) -> LinkResult<&mut SerialStream> {
        self.stream.as_mut().ok_or_else(|| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Serial port not open",
            ))
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> LinkResult<()> {
        if !self.closed {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Serial port has already been opened",
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = builder.open_native_async().map_err(|e| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open serial port: {}", e),
            ))
        })?;

        self.stream = Some(stream);
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl ByteStream for SerialTransport {
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
            let _ = stream.flush().await;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_settings() {
        let settings = SerialSettings::new("/dev/ttyUSB0".to_string(), 9600);
        assert_eq!(settings.port_name, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.parity, tokio_serial::Parity::None);
    }
}
