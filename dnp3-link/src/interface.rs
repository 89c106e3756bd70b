//! Interfaces between the link layer and its collaborators

use crate::frame::MAX_USER_DATA;
use bytes::Bytes;

/// Reported reset state of the link, as seen by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The peer has not acknowledged a RESET_LINK_STATES, or the reset
    /// was invalidated by a NACK or a final confirmed-data timeout
    Unreset,
    /// The reset handshake completed and confirmed data may flow
    Reset,
}

/// Observer of link status and keep-alive lifecycle events
pub trait LinkListener: Send {
    fn on_state_change(&mut self, _status: LinkStatus) {}
    fn on_keep_alive_initiated(&mut self) {}
    fn on_keep_alive_success(&mut self) {}
    fn on_keep_alive_failure(&mut self) {}
}

/// Up-call interface to the transport-function layer
pub trait UpperLayer: Send {
    fn on_lower_layer_up(&mut self);
    fn on_lower_layer_down(&mut self);
    /// One reassembly unit of received user data
    fn on_receive(&mut self, data: &[u8]);
    /// Outcome of a previously accepted `send`; always delivered from the
    /// executor, never from inside the `send` call itself
    fn on_send_result(&mut self, success: bool);
}

/// Sink for formatted frames headed to the wire
///
/// The implementation must copy or transmit the bytes before returning;
/// the buffer is owned by the link layer and reused.
pub trait LinkTx: Send {
    fn begin_transmit(&mut self, frame: &[u8]);
}

/// A sequence of transport segments, each sized to fit one link frame
pub trait TransportSegment: Send {
    /// The current segment
    fn segment(&self) -> &[u8];
    /// Move to the next segment
    ///
    /// # Returns
    /// `true` iff another segment is pending
    fn advance(&mut self) -> bool;
}

/// Stock [`TransportSegment`] chunking an owned payload into
/// 250-byte segments
#[derive(Debug)]
pub struct PayloadSegments {
    payload: Bytes,
    offset: usize,
}

impl PayloadSegments {
    pub fn new(payload: Bytes) -> Self {
        Self { payload, offset: 0 }
    }
}

impl TransportSegment for PayloadSegments {
    fn segment(&self) -> &[u8] {
        let end = (self.offset + MAX_USER_DATA).min(self.payload.len());
        &self.payload[self.offset..end]
    }

    fn advance(&mut self) -> bool {
        self.offset = (self.offset + MAX_USER_DATA).min(self.payload.len());
        self.offset < self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_one_empty_segment() {
        let mut segments = PayloadSegments::new(Bytes::new());
        assert!(segments.segment().is_empty());
        assert!(!segments.advance());
    }

    #[test]
    fn test_small_payload_is_one_segment() {
        let mut segments = PayloadSegments::new(Bytes::from_static(b"abc"));
        assert_eq!(segments.segment(), b"abc");
        assert!(!segments.advance());
    }

    #[test]
    fn test_large_payload_chunks_at_250() {
        let payload: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
        let mut segments = PayloadSegments::new(Bytes::from(payload.clone()));
        assert_eq!(segments.segment(), &payload[..250]);
        assert!(segments.advance());
        assert_eq!(segments.segment(), &payload[250..500]);
        assert!(segments.advance());
        assert_eq!(segments.segment(), &payload[500..]);
        assert!(!segments.advance());
    }
}
