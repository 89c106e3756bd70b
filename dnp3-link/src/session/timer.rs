//! One-shot logical timers with stale-expiration suppression

use std::time::Instant;

/// A one-shot deadline with a generation counter
///
/// Arming or cancelling bumps the generation, so an expiration callback
/// that raced with a cancel (it was already queued on the executor when
/// the timer was re-armed or cancelled) carries a stale generation and
/// is ignored.
#[derive(Debug)]
pub(crate) struct DeadlineTimer {
    deadline: Option<Instant>,
    generation: u64,
}

impl DeadlineTimer {
    pub(crate) fn new() -> Self {
        Self {
            deadline: None,
            generation: 0,
        }
    }

    /// Arm the timer, returning the generation of this arming
    pub(crate) fn start(&mut self, at: Instant) -> u64 {
        self.generation += 1;
        self.deadline = Some(at);
        self.generation
    }

    /// Disarm the timer; a queued expiration for the old generation will
    /// no longer fire
    pub(crate) fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.generation += 1;
        }
    }

    /// Consume an expiration carrying `generation`
    ///
    /// # Returns
    /// `true` iff the timer was armed and the generation is current
    pub(crate) fn try_expire(&mut self, generation: u64) -> bool {
        if self.deadline.is_some() && self.generation == generation {
            self.deadline = None;
            true
        } else {
            false
        }
    }

    /// The armed deadline and its generation, if any
    pub(crate) fn scheduled(&self) -> Option<(Instant, u64)> {
        self.deadline.map(|at| (at, self.generation))
    }
}
