//! Link session statistics

/// Counters for one link session
///
/// Updated by the session as frames move through it; queried via
/// [`crate::LinkLayer::statistics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStatistics {
    /// Frames handed to the router for transmission
    pub frames_sent: u64,
    /// Validated frames accepted from the peer
    pub frames_received: u64,
    /// Frames dropped by header validation (role bit or address mismatch)
    pub bad_frames: u64,
    /// Primary frames retransmitted after a response timeout
    pub retransmissions: u64,
    /// Response timer expirations
    pub response_timeouts: u64,
}

impl LinkStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
