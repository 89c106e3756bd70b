//! Single-channel driver binding one transport to one link session
//!
//! The driver plays the router role: it owns the byte channel, feeds
//! parsed frames into the session, writes queued frames out, reports
//! transmit completions back, and delivers timer expirations. All
//! session events are serialized through its loop.

use crate::decoder::FrameDecoder;
use crate::interface::{LinkListener, LinkTx, PayloadSegments, UpperLayer};
use crate::session::LinkLayer;
use bytes::{Bytes, BytesMut};
use dnp3_core::{LinkConfig, LinkError, LinkResult};
use dnp3_transport::Transport;
use log::{error, warn};
use std::time::Instant;
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 2048;

enum ChannelCommand {
    Send(Bytes),
}

/// Handle for submitting payloads to a running [`LinkChannel`]
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl LinkHandle {
    /// Queue a payload for transmission
    ///
    /// The payload is chunked into link-sized segments; the outcome is
    /// reported through the upper layer's `on_send_result`.
    pub fn send(&self, payload: Bytes) -> LinkResult<()> {
        self.commands
            .send(ChannelCommand::Send(payload))
            .map_err(|_| LinkError::ChannelClosed)
    }
}

/// Queues formatted frames for the driver loop to write
struct QueuedLinkTx {
    frames: mpsc::UnboundedSender<Vec<u8>>,
}

impl LinkTx for QueuedLinkTx {
    fn begin_transmit(&mut self, frame: &[u8]) {
        // the receiver lives in the same channel struct as the session,
        // so this only fails during teardown
        let _ = self.frames.send(frame.to_vec());
    }
}

enum Event {
    Outbound(Vec<u8>),
    Command(Option<ChannelCommand>),
    Inbound(LinkResult<usize>),
    ResponseTimeout(u64),
    KeepAliveTimeout(u64),
}

/// A transport bound to one link session
pub struct LinkChannel<T: Transport> {
    transport: T,
    link: LinkLayer,
    decoder: FrameDecoder,
    rx_buffer: BytesMut,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    commands_open: bool,
}

impl<T: Transport> LinkChannel<T> {
    /// Create a channel and the handle used to feed it payloads
    pub fn new(
        transport: T,
        config: LinkConfig,
        upper: Box<dyn UpperLayer>,
        listener: Box<dyn LinkListener>,
    ) -> (Self, LinkHandle) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let link = LinkLayer::new(
            config,
            Box::new(QueuedLinkTx { frames: frame_tx }),
            upper,
            listener,
        );
        let channel = Self {
            transport,
            link,
            decoder: FrameDecoder::new(),
            rx_buffer: BytesMut::new(),
            outbound: frame_rx,
            commands: command_rx,
            commands_open: true,
        };
        let handle = LinkHandle {
            commands: command_tx,
        };
        (channel, handle)
    }

    /// Run the channel until the transport closes or fails
    pub async fn run(mut self) -> LinkResult<()> {
        self.transport.open().await?;
        self.link.on_lower_layer_up(Instant::now());

        let mut read_buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match self.next_event(&mut read_buf).await {
                Event::Outbound(frame) => {
                    let ok = self.write_frame(&frame).await;
                    self.link.on_transmit_result(ok, Instant::now());
                }
                Event::Command(Some(ChannelCommand::Send(payload))) => {
                    self.link.send(Box::new(PayloadSegments::new(payload)));
                }
                Event::Command(None) => {
                    self.commands_open = false;
                }
                Event::Inbound(Ok(0)) => {
                    warn!("Transport closed by peer");
                    break;
                }
                Event::Inbound(Ok(n)) => {
                    self.rx_buffer.extend_from_slice(&read_buf[..n]);
                    let now = Instant::now();
                    while let Some((header, data)) = self.decoder.decode(&mut self.rx_buffer) {
                        self.link.on_frame(header, &data, now);
                    }
                }
                Event::Inbound(Err(e)) => {
                    error!("Transport error: {}", e);
                    break;
                }
                Event::ResponseTimeout(generation) => {
                    self.link.on_response_timeout(generation);
                }
                Event::KeepAliveTimeout(generation) => {
                    self.link
                        .on_keep_alive_timeout(Instant::now(), generation);
                }
            }
            self.link.process_send_results();
        }

        self.link.on_lower_layer_down();
        self.link.process_send_results();
        let _ = self.transport.close().await;
        Ok(())
    }

    async fn next_event(&mut self, read_buf: &mut [u8]) -> Event {
        let response = self.link.response_deadline();
        let keep_alive = self.link.keep_alive_deadline();

        tokio::select! {
            biased;
            frame = self.outbound.recv() => match frame {
                Some(frame) => Event::Outbound(frame),
                // the session owns the sender, so this cannot happen
                // while it is alive
                None => Event::Inbound(Ok(0)),
            },
            command = self.commands.recv(), if self.commands_open => Event::Command(command),
            _ = sleep_until_deadline(response), if response.is_some() => {
                Event::ResponseTimeout(response.map(|(_, generation)| generation).unwrap_or(0))
            }
            _ = sleep_until_deadline(keep_alive), if keep_alive.is_some() => {
                Event::KeepAliveTimeout(keep_alive.map(|(_, generation)| generation).unwrap_or(0))
            }
            result = self.transport.read(read_buf) => Event::Inbound(result),
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> bool {
        match self.transport.write_all(frame).await {
            Ok(()) => self.transport.flush().await.is_ok(),
            Err(e) => {
                warn!("Frame transmission failed: {}", e);
                false
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<(Instant, u64)>) {
    match deadline {
        Some((at, _)) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{self, MAX_FRAME_SIZE};
    use crate::function::LinkFunction;
    use crate::interface::LinkStatus;
    use async_trait::async_trait;
    use dnp3_transport::ByteStream;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    struct PipeTransport {
        stream: DuplexStream,
        closed: bool,
    }

    #[async_trait]
    impl Transport for PipeTransport {
        async fn open(&mut self) -> LinkResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ByteStream for PipeTransport {
        async fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize> {
            Ok(self.stream.read(buf).await?)
        }

        async fn write(&mut self, buf: &[u8]) -> LinkResult<usize> {
            Ok(self.stream.write(buf).await?)
        }

        async fn flush(&mut self) -> LinkResult<()> {
            Ok(self.stream.flush().await?)
        }

        fn is_closed(&self) -> bool {
            self.closed
        }

        async fn close(&mut self) -> LinkResult<()> {
            self.closed = true;
            let _ = self.stream.shutdown().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Shared {
        up: bool,
        down: bool,
        received: Vec<Vec<u8>>,
        send_results: Vec<bool>,
        status: Vec<LinkStatus>,
    }

    struct RecordingUpper(Arc<Mutex<Shared>>);

    impl UpperLayer for RecordingUpper {
        fn on_lower_layer_up(&mut self) {
            self.0.lock().unwrap().up = true;
        }
        fn on_lower_layer_down(&mut self) {
            self.0.lock().unwrap().down = true;
        }
        fn on_receive(&mut self, data: &[u8]) {
            self.0.lock().unwrap().received.push(data.to_vec());
        }
        fn on_send_result(&mut self, success: bool) {
            self.0.lock().unwrap().send_results.push(success);
        }
    }

    struct RecordingListener(Arc<Mutex<Shared>>);

    impl LinkListener for RecordingListener {
        fn on_state_change(&mut self, status: LinkStatus) {
            self.0.lock().unwrap().status.push(status);
        }
    }

    fn master_config(use_confirms: bool) -> LinkConfig {
        LinkConfig {
            is_master: true,
            local_addr: 1,
            remote_addr: 1024,
            use_confirms,
            num_retry: 2,
            response_timeout: Duration::from_secs(1),
            keep_alive_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_channel_answers_link_status_request() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (channel, _handle) = LinkChannel::new(
            PipeTransport {
                stream: local,
                closed: false,
            },
            master_config(true),
            Box::new(RecordingUpper(shared.clone())),
            Box::new(RecordingListener(shared.clone())),
        );
        let runner = tokio::spawn(channel.run());

        // the outstation at 1024 interrogates the link
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = frame::format_request_link_status(&mut buffer, false, 1, 1024);
        remote.write_all(&buffer[..len]).await.unwrap();

        let mut response = [0u8; 10];
        tokio::time::timeout(Duration::from_secs(5), remote.read_exact(&mut response))
            .await
            .unwrap()
            .unwrap();
        let (fields, _) = frame::parse_frame(&response).unwrap();
        assert_eq!(fields.func, LinkFunction::SecLinkStatus);
        assert!(fields.is_from_master);
        assert_eq!(fields.dest, 1024);
        assert_eq!(fields.src, 1);

        // closing the peer side shuts the channel down cleanly
        drop(remote);
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let shared = shared.lock().unwrap();
        assert!(shared.up);
        assert!(shared.down);
    }

    #[tokio::test]
    async fn test_channel_sends_unconfirmed_payload() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (channel, handle) = LinkChannel::new(
            PipeTransport {
                stream: local,
                closed: false,
            },
            master_config(false),
            Box::new(RecordingUpper(shared.clone())),
            Box::new(RecordingListener(shared.clone())),
        );
        let runner = tokio::spawn(channel.run());

        handle.send(Bytes::from_static(b"hello")).unwrap();

        // header plus one 5-byte block with its CRC
        let mut response = [0u8; 17];
        tokio::time::timeout(Duration::from_secs(5), remote.read_exact(&mut response))
            .await
            .unwrap()
            .unwrap();
        let (fields, data) = frame::parse_frame(&response).unwrap();
        assert_eq!(fields.func, LinkFunction::PriUnconfirmedUserData);
        assert_eq!(data, b"hello".to_vec());

        // the send result is posted once the frame is on the wire
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if shared.lock().unwrap().send_results == vec![true] {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "send result not posted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(remote);
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
