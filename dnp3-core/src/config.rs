//! Link session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single link layer session
///
/// Immutable after construction. The address pair and the role bit are
/// checked against every inbound frame header; frames that do not match
/// are dropped before they reach either state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Role of this side of the link, encoded in the DIR bit of every
    /// outgoing control byte
    pub is_master: bool,
    /// Link address of this station
    pub local_addr: u16,
    /// Link address of the peer station
    pub remote_addr: u16,
    /// Send user data as CONFIRMED_USER_DATA (with the reset handshake
    /// and per-segment ACKs) instead of UNCONFIRMED_USER_DATA
    pub use_confirms: bool,
    /// Retry budget per logical operation; 0 disables retry
    pub num_retry: u32,
    /// How long to wait for the peer's reply after a primary frame
    pub response_timeout: Duration,
    /// Idle interval before a REQUEST_LINK_STATUS probe is issued
    pub keep_alive_timeout: Duration,
}

impl LinkConfig {
    /// Create a configuration with the default address pair for the role
    ///
    /// Masters default to local address 1 talking to 1024; outstations
    /// the reverse.
    pub fn new(is_master: bool, use_confirms: bool) -> Self {
        Self {
            is_master,
            local_addr: if is_master { 1 } else { 1024 },
            remote_addr: if is_master { 1024 } else { 1 },
            use_confirms,
            num_retry: 0,
            response_timeout: Duration::from_secs(1),
            keep_alive_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_defaults() {
        let config = LinkConfig::new(true, false);
        assert_eq!(config.local_addr, 1);
        assert_eq!(config.remote_addr, 1024);
        assert_eq!(config.num_retry, 0);
        assert_eq!(config.response_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_outstation_defaults() {
        let config = LinkConfig::new(false, true);
        assert_eq!(config.local_addr, 1024);
        assert_eq!(config.remote_addr, 1);
        assert!(config.use_confirms);
    }
}
