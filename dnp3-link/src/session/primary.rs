//! Primary link state machine
//!
//! Governs sends initiated on this side: the reset handshake, confirmed
//! data with retries, unconfirmed data, and the keep-alive probe.
//!
//! ```text
//! Idle --try_send_unconfirmed--> SendUnconfirmedTransmitWait --.
//!   ^                                  (per segment)           |
//!   '----------------------------------------------------------'
//!
//! Idle --try_send_confirmed--> LinkResetTransmitWait -> ResetLinkWait
//!   (when not remote-reset)                                  | ACK
//!                              ConfUserDataTransmitWait <----'
//!   (when remote-reset) ------------^        |
//!                                            v
//!                                       ConfDataWait --ACK--> Idle
//!
//! Idle --try_send_request_link_status--> RequestLinkStatusTransmitWait
//!                                          -> RequestLinkStatusWait -> Idle
//! ```

use crate::interface::LinkStatus;
use crate::session::link_layer::LinkLayer;
use log::{error, warn};
use std::time::Instant;

/// States of the primary (initiating) side
///
/// `*TransmitWait` states wait for the arbiter's completion callback;
/// `*Wait` states wait for the peer's reply under the response timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PriState {
    Idle,
    SendUnconfirmedTransmitWait,
    LinkResetTransmitWait,
    ResetLinkWait,
    ConfUserDataTransmitWait,
    ConfDataWait,
    RequestLinkStatusTransmitWait,
    RequestLinkStatusWait,
}

impl LinkLayer {
    pub(crate) fn pri_try_send_unconfirmed(&mut self) {
        let next = match self.pri_state {
            PriState::Idle => match self.format_primary_unconfirmed() {
                Some(length) => {
                    self.queue_transmit(length, true);
                    PriState::SendUnconfirmedTransmitWait
                }
                None => PriState::Idle,
            },
            other => other,
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_try_send_confirmed(&mut self) {
        let next = match self.pri_state {
            PriState::Idle => {
                self.reset_retry();
                if self.is_remote_reset {
                    let fcb = self.next_write_fcb;
                    match self.format_primary_confirmed(fcb) {
                        Some(length) => {
                            self.queue_transmit(length, true);
                            PriState::ConfUserDataTransmitWait
                        }
                        None => PriState::Idle,
                    }
                } else {
                    self.queue_reset_links();
                    PriState::LinkResetTransmitWait
                }
            }
            other => other,
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_try_send_request_link_status(&mut self) {
        let next = match self.pri_state {
            PriState::Idle => {
                self.keep_alive_pending = false;
                self.queue_request_link_status();
                self.listener.on_keep_alive_initiated();
                PriState::RequestLinkStatusTransmitWait
            }
            other => other,
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_on_transmit_result(&mut self, success: bool, now: Instant) {
        let next = match self.pri_state {
            PriState::SendUnconfirmedTransmitWait => {
                let more = self.segments.as_mut().map(|s| s.advance()).unwrap_or(false);
                if more {
                    if let Some(length) = self.format_primary_unconfirmed() {
                        self.queue_transmit(length, true);
                    }
                    PriState::SendUnconfirmedTransmitWait
                } else {
                    self.complete_send_operation(success);
                    PriState::Idle
                }
            }
            PriState::LinkResetTransmitWait => {
                if success {
                    // now waiting for an ACK
                    self.start_response_timer(now);
                    PriState::ResetLinkWait
                } else {
                    self.complete_send_operation(false);
                    PriState::Idle
                }
            }
            PriState::ConfUserDataTransmitWait => {
                if success {
                    self.start_response_timer(now);
                    PriState::ConfDataWait
                } else {
                    self.complete_send_operation(false);
                    PriState::Idle
                }
            }
            PriState::RequestLinkStatusTransmitWait => {
                if success {
                    // now waiting for a LINK_STATUS
                    self.start_response_timer(now);
                    PriState::RequestLinkStatusWait
                } else {
                    self.fail_keep_alive(false);
                    PriState::Idle
                }
            }
            other => {
                error!("Invalid transmit result for primary state: {:?}", other);
                other
            }
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_on_ack(&mut self, _rx_buff_full: bool) {
        let next = match self.pri_state {
            PriState::ResetLinkWait => {
                self.is_remote_reset = true;
                self.next_write_fcb = false;
                self.cancel_response_timer();
                let fcb = self.next_write_fcb;
                if let Some(length) = self.format_primary_confirmed(fcb) {
                    self.queue_transmit(length, true);
                }
                self.listener.on_state_change(LinkStatus::Reset);
                PriState::ConfUserDataTransmitWait
            }
            PriState::ConfDataWait => {
                self.next_write_fcb = !self.next_write_fcb;
                self.cancel_response_timer();
                let more = self.segments.as_mut().map(|s| s.advance()).unwrap_or(false);
                if more {
                    let fcb = self.next_write_fcb;
                    if let Some(length) = self.format_primary_confirmed(fcb) {
                        self.queue_transmit(length, true);
                    }
                    PriState::ConfUserDataTransmitWait
                } else {
                    self.complete_send_operation(true);
                    PriState::Idle
                }
            }
            other => {
                warn!("Unexpected ACK in primary state: {:?}", other);
                other
            }
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_on_nack(&mut self, rx_buff_full: bool) {
        let next = match self.pri_state {
            PriState::ConfDataWait => {
                self.is_remote_reset = false;
                self.listener.on_state_change(LinkStatus::Unreset);
                self.cancel_response_timer();
                if rx_buff_full {
                    self.complete_send_operation(false);
                    PriState::Idle
                } else {
                    // the peer lost its reset state; run the handshake again
                    self.reset_retry();
                    self.queue_reset_links();
                    PriState::LinkResetTransmitWait
                }
            }
            PriState::RequestLinkStatusWait => {
                self.cancel_response_timer();
                self.fail_keep_alive(false);
                PriState::Idle
            }
            other => {
                warn!("Unexpected NACK in primary state: {:?}", other);
                other
            }
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_on_link_status(&mut self, _rx_buff_full: bool) {
        let next = match self.pri_state {
            PriState::RequestLinkStatusWait => {
                self.cancel_response_timer();
                self.complete_keep_alive();
                PriState::Idle
            }
            other => {
                warn!("Unexpected LINK_STATUS in primary state: {:?}", other);
                other
            }
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_on_not_supported(&mut self, _rx_buff_full: bool) {
        let next = match self.pri_state {
            PriState::RequestLinkStatusWait => {
                self.cancel_response_timer();
                self.fail_keep_alive(false);
                PriState::Idle
            }
            other => {
                warn!("Unexpected NOT_SUPPORTED in primary state: {:?}", other);
                other
            }
        };
        self.pri_state = next;
    }

    pub(crate) fn pri_on_timeout(&mut self) {
        let next = match self.pri_state {
            PriState::ResetLinkWait => {
                if self.retry() {
                    warn!(
                        "Link reset timeout, retrying with {} attempts remaining",
                        self.retries_remaining()
                    );
                    self.queue_reset_links();
                    PriState::LinkResetTransmitWait
                } else {
                    warn!("Link reset final timeout, no retries remain");
                    self.complete_send_operation(false);
                    PriState::Idle
                }
            }
            PriState::ConfDataWait => {
                if self.retry() {
                    warn!(
                        "Confirmed data timeout, retrying with {} attempts remaining",
                        self.retries_remaining()
                    );
                    // identical payload, same FCB
                    let fcb = self.next_write_fcb;
                    if let Some(length) = self.format_primary_confirmed(fcb) {
                        self.queue_transmit(length, true);
                    }
                    PriState::ConfUserDataTransmitWait
                } else {
                    warn!("Confirmed data final timeout, no retries remain");
                    self.listener.on_state_change(LinkStatus::Unreset);
                    self.complete_send_operation(false);
                    PriState::Idle
                }
            }
            PriState::RequestLinkStatusWait => {
                warn!("Link status request response timeout");
                self.fail_keep_alive(true);
                PriState::Idle
            }
            other => {
                error!("Invalid timeout for primary state: {:?}", other);
                other
            }
        };
        self.pri_state = next;
    }
}
