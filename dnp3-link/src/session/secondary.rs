//! Secondary link state machine
//!
//! Responds to peer-initiated primary frames: link reset, link status
//! interrogation, and confirmed data reception with FCB validation.
//! Unconfirmed user data never reaches this machine; the facade hands it
//! straight up.

use crate::session::link_layer::LinkLayer;
use log::warn;

/// States of the secondary (responding) side
///
/// A confirmed-data FCB is accepted iff it equals `next_read_fcb`;
/// matching data is delivered up and the expectation toggles, a
/// mismatch is ACKed as a duplicate but not re-delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SecState {
    NotReset,
    Reset,
}

impl LinkLayer {
    pub(crate) fn sec_on_reset_link_states(&mut self) {
        // a reset discards any previous FCB expectation
        self.next_read_fcb = true;
        self.queue_ack();
        self.sec_state = SecState::Reset;
    }

    pub(crate) fn sec_on_request_link_status(&mut self) {
        self.queue_link_status();
    }

    pub(crate) fn sec_on_test_link_states(&mut self, fcb: bool) {
        match self.sec_state {
            SecState::NotReset => {
                warn!("Test link states received while the link is not reset");
                self.queue_nack();
            }
            SecState::Reset => {
                if fcb == self.next_read_fcb {
                    self.next_read_fcb = !self.next_read_fcb;
                    self.queue_ack();
                } else {
                    self.queue_nack();
                }
            }
        }
    }

    pub(crate) fn sec_on_confirmed_user_data(&mut self, fcb: bool, data: &[u8]) {
        match self.sec_state {
            SecState::NotReset => {
                warn!("Confirmed user data received while the link is not reset");
                self.queue_nack();
            }
            SecState::Reset => {
                self.queue_ack();
                if fcb == self.next_read_fcb {
                    self.next_read_fcb = !self.next_read_fcb;
                    self.push_data_up(data);
                } else {
                    warn!("Confirmed user data with a repeated FCB, dropping duplicate");
                }
            }
        }
    }

    pub(crate) fn sec_on_transmit_result(&mut self, _success: bool) {
        // responses are fire-and-forget; nothing to advance
    }
}
