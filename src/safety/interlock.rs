//! Operator interlock state machine (§4.4 "Interlock check", §6, §9).
//!
//! A second agent drives the shared interlock word from `Ok` to
//! `StopRequest` and waits for `Stopped` before performing an intrusive
//! operation such as reconfiguring timers. The core must never silently
//! bypass the wait (§4.4 "Interlock contract").

use crate::consts::INTERLOCK_STOP_GRACE_MS;
use crate::types::InterlockState;

/// What the caller should do this iteration of the interlock wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockAction {
    /// Interlock is `Ok`; resume the steady loop (re-programming PWM
    /// first if this is the exit edge from a stop).
    Resume,
    /// Interlock is `StopRequest` or `Stopped`; commit failsafe and keep
    /// waiting.
    HoldFailsafe,
}

/// Tracks how long the interlock has continuously been in `StopRequest`,
/// to implement the 100ms grace period before latching `Stopped` (§4.4
/// step 6).
#[derive(Debug, Clone, Default)]
pub struct InterlockTracker {
    stop_request_since_ms: Option<u64>,
    latched_stopped: bool,
}

impl InterlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the current interlock word and the task's clock, and
    /// decide this iteration's action. Returns `(action, next_state)`;
    /// `next_state` is what the caller should report back out (e.g. for
    /// telemetry) — the authoritative word is still owned by the
    /// external writer, this tracker only derives `Stopped` locally from
    /// how long `StopRequest` has persisted.
    pub fn observe(&mut self, raw: InterlockState, now_ms: u64) -> (InterlockAction, InterlockState) {
        match raw {
            InterlockState::Ok => {
                self.stop_request_since_ms = None;
                self.latched_stopped = false;
                (InterlockAction::Resume, InterlockState::Ok)
            }
            InterlockState::StopRequest | InterlockState::Stopped => {
                let since = *self.stop_request_since_ms.get_or_insert(now_ms);
                if now_ms.saturating_sub(since) >= INTERLOCK_STOP_GRACE_MS {
                    self.latched_stopped = true;
                }
                let reported = if self.latched_stopped {
                    InterlockState::Stopped
                } else {
                    InterlockState::StopRequest
                };
                (InterlockAction::HoldFailsafe, reported)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_resumes_immediately() {
        let mut tracker = InterlockTracker::new();
        let (action, state) = tracker.observe(InterlockState::Ok, 0);
        assert_eq!(action, InterlockAction::Resume);
        assert_eq!(state, InterlockState::Ok);
    }

    #[test]
    fn stop_request_holds_failsafe_until_grace_elapses() {
        let mut tracker = InterlockTracker::new();
        let (action, state) = tracker.observe(InterlockState::StopRequest, 0);
        assert_eq!(action, InterlockAction::HoldFailsafe);
        assert_eq!(state, InterlockState::StopRequest);

        let (action, state) = tracker.observe(InterlockState::StopRequest, 50);
        assert_eq!(action, InterlockAction::HoldFailsafe);
        assert_eq!(state, InterlockState::StopRequest, "grace period has not elapsed yet");

        let (action, state) = tracker.observe(InterlockState::StopRequest, 150);
        assert_eq!(action, InterlockAction::HoldFailsafe);
        assert_eq!(state, InterlockState::Stopped, "100ms of continuous StopRequest latches Stopped");
    }

    #[test]
    fn returning_to_ok_resets_the_tracker() {
        let mut tracker = InterlockTracker::new();
        tracker.observe(InterlockState::StopRequest, 0);
        tracker.observe(InterlockState::StopRequest, 150);
        let (action, state) = tracker.observe(InterlockState::Ok, 200);
        assert_eq!(action, InterlockAction::Resume);
        assert_eq!(state, InterlockState::Ok);

        let (_, state) = tracker.observe(InterlockState::StopRequest, 201);
        assert_eq!(state, InterlockState::StopRequest, "a fresh stop request must restart its own grace timer");
    }
}
