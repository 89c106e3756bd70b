//! Link session facade
//!
//! Binds the frame formatter, the transmit arbiter and the two state
//! machines together. All events (inbound frames, transmit completions,
//! timer expirations, upper-layer sends) are serialized through one
//! executor, so each handler runs to completion without locking.

use crate::frame::{self, LinkHeaderFields, MAX_FRAME_SIZE};
use crate::function::LinkFunction;
use crate::interface::{LinkListener, LinkStatus, LinkTx, TransportSegment, UpperLayer};
use crate::session::primary::PriState;
use crate::session::secondary::SecState;
use crate::session::timer::DeadlineTimer;
use crate::statistics::LinkStatistics;
use dnp3_core::LinkConfig;
use log::{error, warn};
use std::collections::VecDeque;
use std::time::Instant;

/// Which state machine owns the wire right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxMode {
    Idle,
    Primary,
    Secondary,
}

/// The link layer session
///
/// One instance per logical link. Event entry points must be invoked
/// from a single executor; completed send results are queued and
/// delivered by [`LinkLayer::process_send_results`] after the entry
/// point returns, never from inside it.
pub struct LinkLayer {
    pub(crate) config: LinkConfig,
    online: bool,
    pub(crate) pri_state: PriState,
    pub(crate) sec_state: SecState,
    pub(crate) next_read_fcb: bool,
    pub(crate) next_write_fcb: bool,
    pub(crate) is_remote_reset: bool,
    num_retry_remaining: u32,
    pub(crate) segments: Option<Box<dyn TransportSegment>>,
    tx_mode: TxMode,
    pri_tx_buffer: [u8; MAX_FRAME_SIZE],
    sec_tx_buffer: [u8; MAX_FRAME_SIZE],
    pending_pri_tx: Option<usize>,
    pending_sec_tx: Option<usize>,
    last_message_ts: Instant,
    pub(crate) keep_alive_pending: bool,
    response_timer: DeadlineTimer,
    keep_alive_timer: DeadlineTimer,
    statistics: LinkStatistics,
    router: Box<dyn LinkTx>,
    upper: Box<dyn UpperLayer>,
    pub(crate) listener: Box<dyn LinkListener>,
    posted_send_results: VecDeque<bool>,
}

impl LinkLayer {
    pub fn new(
        config: LinkConfig,
        router: Box<dyn LinkTx>,
        upper: Box<dyn UpperLayer>,
        listener: Box<dyn LinkListener>,
    ) -> Self {
        Self {
            config,
            online: false,
            pri_state: PriState::Idle,
            sec_state: SecState::NotReset,
            next_read_fcb: false,
            next_write_fcb: false,
            is_remote_reset: false,
            num_retry_remaining: 0,
            segments: None,
            tx_mode: TxMode::Idle,
            pri_tx_buffer: [0; MAX_FRAME_SIZE],
            sec_tx_buffer: [0; MAX_FRAME_SIZE],
            pending_pri_tx: None,
            pending_sec_tx: None,
            last_message_ts: Instant::now(),
            keep_alive_pending: false,
            response_timer: DeadlineTimer::new(),
            keep_alive_timer: DeadlineTimer::new(),
            statistics: LinkStatistics::new(),
            router,
            upper,
            listener,
            posted_send_results: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn statistics(&self) -> &LinkStatistics {
        &self.statistics
    }

    pub fn clear_statistics(&mut self) {
        self.statistics.clear();
    }

    // ---------------------------------------------------------------
    // online lifecycle
    // ---------------------------------------------------------------

    /// Bring the session online once the lower layer is up
    pub fn on_lower_layer_up(&mut self, now: Instant) -> bool {
        if self.online {
            error!("Layer is already online");
            return false;
        }

        self.online = true;
        // no reason to probe until we have actually been idle that long
        self.last_message_ts = now;
        self.keep_alive_timer
            .start(now + self.config.keep_alive_timeout);

        self.listener.on_state_change(LinkStatus::Unreset);
        self.upper.on_lower_layer_up();
        true
    }

    /// Take the session offline, dropping all transient state
    pub fn on_lower_layer_down(&mut self) -> bool {
        if !self.online {
            error!("Layer is not online");
            return false;
        }

        self.online = false;
        self.keep_alive_pending = false;
        self.is_remote_reset = false;
        self.segments = None;
        self.tx_mode = TxMode::Idle;
        self.pending_pri_tx = None;
        self.pending_sec_tx = None;

        self.response_timer.cancel();
        self.keep_alive_timer.cancel();

        self.pri_state = PriState::Idle;
        self.sec_state = SecState::NotReset;

        self.listener.on_state_change(LinkStatus::Unreset);
        self.upper.on_lower_layer_down();
        true
    }

    // ---------------------------------------------------------------
    // upper layer entry points
    // ---------------------------------------------------------------

    /// Accept a send operation from the upper layer
    ///
    /// # Returns
    /// `false` if the layer is offline or a send is already in flight
    pub fn send(&mut self, segments: Box<dyn TransportSegment>) -> bool {
        if !self.online {
            error!("Layer is not online");
            return false;
        }
        if self.segments.is_some() {
            error!("Already transmitting a segment");
            return false;
        }

        self.segments = Some(segments);
        self.try_start_transmission();
        true
    }

    /// Deliver queued send results to the upper layer
    ///
    /// Invoked by the executor after each event entry point returns.
    pub fn process_send_results(&mut self) {
        while let Some(success) = self.posted_send_results.pop_front() {
            self.upper.on_send_result(success);
        }
    }

    // ---------------------------------------------------------------
    // inbound frames
    // ---------------------------------------------------------------

    /// Dispatch one validated inbound frame into the state machines
    pub fn on_frame(&mut self, header: LinkHeaderFields, userdata: &[u8], now: Instant) -> bool {
        if !self.online {
            error!("Layer is not online");
            return false;
        }

        if !self.validate(header.is_from_master, header.src, header.dest) {
            self.statistics.bad_frames += 1;
            return false;
        }

        self.statistics.frames_received += 1;
        self.last_message_ts = now;

        match header.func {
            LinkFunction::SecAck => self.pri_on_ack(header.fcv_dfc),
            LinkFunction::SecNack => self.pri_on_nack(header.fcv_dfc),
            LinkFunction::SecLinkStatus => self.pri_on_link_status(header.fcv_dfc),
            LinkFunction::SecNotSupported => self.pri_on_not_supported(header.fcv_dfc),
            LinkFunction::PriTestLinkStates => self.sec_on_test_link_states(header.fcb),
            LinkFunction::PriResetLinkStates => self.sec_on_reset_link_states(),
            LinkFunction::PriRequestLinkStatus => self.sec_on_request_link_status(),
            LinkFunction::PriConfirmedUserData => {
                self.sec_on_confirmed_user_data(header.fcb, userdata)
            }
            LinkFunction::PriUnconfirmedUserData => self.push_data_up(userdata),
        }

        self.try_start_transmission();
        true
    }

    fn validate(&self, is_from_master: bool, src: u16, dest: u16) -> bool {
        if is_from_master == self.config.is_master {
            warn!(
                "{}",
                if is_from_master {
                    "Master frame received by a master"
                } else {
                    "Outstation frame received by an outstation"
                }
            );
            return false;
        }

        if dest != self.config.local_addr {
            warn!("Frame for unknown destination: {}", dest);
            return false;
        }

        if src != self.config.remote_addr {
            warn!("Frame from unknown source: {}", src);
            return false;
        }

        true
    }

    // ---------------------------------------------------------------
    // transmit arbiter
    // ---------------------------------------------------------------

    /// Completion of the transmission handed to the router
    pub fn on_transmit_result(&mut self, success: bool, now: Instant) -> bool {
        if self.tx_mode == TxMode::Idle {
            error!("Unknown transmission callback");
            return false;
        }

        let was_primary = self.tx_mode == TxMode::Primary;
        self.tx_mode = TxMode::Idle;

        // pending transmissions get the wire before the completion event
        // is dispatched, secondary responses first
        self.try_pending_tx(false);
        self.try_pending_tx(true);

        if was_primary {
            self.pri_on_transmit_result(success, now);
        } else {
            self.sec_on_transmit_result(success);
        }

        self.try_start_transmission();
        true
    }

    /// Hand a formatted buffer to the router, or park it until the wire
    /// frees up
    pub(crate) fn queue_transmit(&mut self, length: usize, primary: bool) {
        if self.tx_mode == TxMode::Idle {
            self.tx_mode = if primary {
                TxMode::Primary
            } else {
                TxMode::Secondary
            };
            let buffer = if primary {
                &self.pri_tx_buffer[..length]
            } else {
                &self.sec_tx_buffer[..length]
            };
            self.statistics.frames_sent += 1;
            self.router.begin_transmit(buffer);
        } else if primary {
            self.pending_pri_tx = Some(length);
        } else {
            self.pending_sec_tx = Some(length);
        }
    }

    fn try_pending_tx(&mut self, primary: bool) {
        if self.tx_mode != TxMode::Idle {
            return;
        }
        let parked = if primary {
            self.pending_pri_tx.take()
        } else {
            self.pending_sec_tx.take()
        };
        if let Some(length) = parked {
            self.tx_mode = if primary {
                TxMode::Primary
            } else {
                TxMode::Secondary
            };
            let buffer = if primary {
                &self.pri_tx_buffer[..length]
            } else {
                &self.sec_tx_buffer[..length]
            };
            self.statistics.frames_sent += 1;
            self.router.begin_transmit(buffer);
        }
    }

    /// Feed the primary machine anything it has been asked to do
    ///
    /// Safe to call after every event; all `try_*` transitions are no-ops
    /// outside the Idle state.
    pub(crate) fn try_start_transmission(&mut self) {
        if self.keep_alive_pending {
            self.pri_try_send_request_link_status();
        }

        if self.segments.is_some() {
            if self.config.use_confirms {
                self.pri_try_send_confirmed();
            } else {
                self.pri_try_send_unconfirmed();
            }
        }
    }

    // ---------------------------------------------------------------
    // frame formatting into the owned transmit buffers
    // ---------------------------------------------------------------

    pub(crate) fn format_primary_confirmed(&mut self, fcb: bool) -> Option<usize> {
        let segments = self.segments.as_ref()?;
        Some(frame::format_confirmed_user_data(
            &mut self.pri_tx_buffer,
            self.config.is_master,
            fcb,
            self.config.remote_addr,
            self.config.local_addr,
            segments.segment(),
        ))
    }

    pub(crate) fn format_primary_unconfirmed(&mut self) -> Option<usize> {
        let segments = self.segments.as_ref()?;
        Some(frame::format_unconfirmed_user_data(
            &mut self.pri_tx_buffer,
            self.config.is_master,
            self.config.remote_addr,
            self.config.local_addr,
            segments.segment(),
        ))
    }

    pub(crate) fn queue_reset_links(&mut self) {
        let length = frame::format_reset_link_states(
            &mut self.pri_tx_buffer,
            self.config.is_master,
            self.config.remote_addr,
            self.config.local_addr,
        );
        self.queue_transmit(length, true);
    }

    pub(crate) fn queue_request_link_status(&mut self) {
        let length = frame::format_request_link_status(
            &mut self.pri_tx_buffer,
            self.config.is_master,
            self.config.remote_addr,
            self.config.local_addr,
        );
        self.queue_transmit(length, true);
    }

    pub(crate) fn queue_ack(&mut self) {
        let length = frame::format_ack(
            &mut self.sec_tx_buffer,
            self.config.is_master,
            false,
            self.config.remote_addr,
            self.config.local_addr,
        );
        self.queue_transmit(length, false);
    }

    pub(crate) fn queue_nack(&mut self) {
        let length = frame::format_nack(
            &mut self.sec_tx_buffer,
            self.config.is_master,
            false,
            self.config.remote_addr,
            self.config.local_addr,
        );
        self.queue_transmit(length, false);
    }

    pub(crate) fn queue_link_status(&mut self) {
        let length = frame::format_link_status(
            &mut self.sec_tx_buffer,
            self.config.is_master,
            false,
            self.config.remote_addr,
            self.config.local_addr,
        );
        self.queue_transmit(length, false);
    }

    // ---------------------------------------------------------------
    // timers
    // ---------------------------------------------------------------

    /// The armed response deadline and its generation, if any
    pub fn response_deadline(&self) -> Option<(Instant, u64)> {
        self.response_timer.scheduled()
    }

    /// The armed keep-alive deadline and its generation, if any
    pub fn keep_alive_deadline(&self) -> Option<(Instant, u64)> {
        self.keep_alive_timer.scheduled()
    }

    /// Expiration of the response timer armed with `generation`
    ///
    /// Stale generations (the timer was cancelled or re-armed after this
    /// expiration was queued) and offline sessions are ignored.
    pub fn on_response_timeout(&mut self, generation: u64) {
        if !self.online {
            return;
        }
        if !self.response_timer.try_expire(generation) {
            return;
        }

        self.statistics.response_timeouts += 1;
        self.pri_on_timeout();
        self.try_start_transmission();
    }

    /// Expiration of the keep-alive timer armed with `generation`
    pub fn on_keep_alive_timeout(&mut self, now: Instant, generation: u64) {
        if !self.online {
            return;
        }
        if !self.keep_alive_timer.try_expire(generation) {
            return;
        }

        if now.saturating_duration_since(self.last_message_ts) >= self.config.keep_alive_timeout {
            self.last_message_ts = now;
            self.keep_alive_pending = true;
        }

        // always reschedule from the last message timestamp
        self.keep_alive_timer
            .start(self.last_message_ts + self.config.keep_alive_timeout);

        self.try_start_transmission();
    }

    pub(crate) fn start_response_timer(&mut self, now: Instant) {
        self.response_timer
            .start(now + self.config.response_timeout);
    }

    pub(crate) fn cancel_response_timer(&mut self) {
        self.response_timer.cancel();
    }

    // ---------------------------------------------------------------
    // retry budget
    // ---------------------------------------------------------------

    pub(crate) fn reset_retry(&mut self) {
        self.num_retry_remaining = self.config.num_retry;
    }

    /// Consume one retry attempt
    pub(crate) fn retry(&mut self) -> bool {
        if self.num_retry_remaining > 0 {
            self.num_retry_remaining -= 1;
            self.statistics.retransmissions += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn retries_remaining(&self) -> u32 {
        self.num_retry_remaining
    }

    // ---------------------------------------------------------------
    // operation outcomes
    // ---------------------------------------------------------------

    pub(crate) fn complete_send_operation(&mut self, success: bool) {
        self.segments = None;
        self.posted_send_results.push_back(success);
    }

    /// Keep-alive failed; only the timeout variant is listener-visible
    pub(crate) fn fail_keep_alive(&mut self, timeout: bool) {
        if timeout {
            self.listener.on_keep_alive_failure();
        }
    }

    pub(crate) fn complete_keep_alive(&mut self) {
        self.listener.on_keep_alive_success();
    }

    pub(crate) fn push_data_up(&mut self, data: &[u8]) {
        self.upper.on_receive(data);
    }

    // ---------------------------------------------------------------
    // test support
    // ---------------------------------------------------------------

    #[cfg(test)]
    pub(crate) fn force_remote_reset(&mut self) {
        self.is_remote_reset = true;
    }

    #[cfg(test)]
    pub(crate) fn tx_mode(&self) -> TxMode {
        self.tx_mode
    }
}
