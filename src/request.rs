//! Single-slot ticket request state.
//!
//! At most one ticket request is in flight. A press is accepted only while idle and only
//! when the previous accepted press is older than the minimum press interval; the request
//! then waits for the server's answer or for the no-response timeout.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const MIN_PRESS_INTERVAL: Duration = Duration::from_millis(500);
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    AwaitingResponse {
        since: Instant,
    },
}

#[derive(Debug)]
pub struct RequestMachine {
    state: RequestState,
    last_accepted: Option<Instant>,
    min_press_interval: Duration,
    response_timeout: Duration,
}

impl Default for RequestMachine {
    fn default() -> Self {
        Self::new(MIN_PRESS_INTERVAL, RESPONSE_TIMEOUT)
    }
}

impl RequestMachine {
    pub fn new(min_press_interval: Duration, response_timeout: Duration) -> Self {
        Self {
            state: RequestState::Idle,
            last_accepted: None,
            min_press_interval,
            response_timeout,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RequestState::Idle
    }

    /// Idle → AwaitingResponse. Returns whether the press starts a new request.
    pub fn try_trigger(&mut self, now: Instant) -> bool {
        if !self.is_idle() {
            debug!("Press ignored, request still awaiting response");
            return false;
        }
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) <= self.min_press_interval {
                debug!("Press ignored, within {:?} of previous", self.min_press_interval);
                return false;
            }
        }

        self.last_accepted = Some(now);
        self.state = RequestState::AwaitingResponse { since: now };
        info!("Ticket request started");
        true
    }

    /// AwaitingResponse → Idle on a server answer. Returns whether a request was pending.
    pub fn complete(&mut self) -> bool {
        let was_waiting = !self.is_idle();
        self.state = RequestState::Idle;
        was_waiting
    }

    /// AwaitingResponse → Idle once the response timeout has elapsed.
    ///
    /// Returns true exactly once per timed-out request.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        match self.state {
            RequestState::AwaitingResponse { since }
                if now.saturating_duration_since(since) >= self.response_timeout =>
            {
                warn!("Server no callback after {:?}", self.response_timeout);
                self.state = RequestState::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Turns button levels into press events (released → pressed transitions).
#[derive(Debug, Default)]
pub struct PressDetector {
    was_pressed: bool,
}

impl PressDetector {
    /// Feeds the current level; true on the transition into pressed.
    pub fn update(&mut self, pressed: bool) -> bool {
        let edge = pressed && !self.was_pressed;
        self.was_pressed = pressed;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn second_trigger_while_waiting_is_rejected() {
        let mut machine = RequestMachine::default();
        let t0 = Instant::now();

        assert!(machine.try_trigger(t0));
        assert!(!machine.try_trigger(t0 + ms(600)));
        assert!(!machine.try_trigger(t0 + ms(9_999)));
        assert!(matches!(
            machine.state(),
            RequestState::AwaitingResponse { since } if since == t0
        ));
    }

    #[test]
    fn timeout_fires_once_after_ten_seconds() {
        let mut machine = RequestMachine::default();
        let t0 = Instant::now();
        machine.try_trigger(t0);

        assert!(!machine.check_timeout(t0 + ms(9_999)));
        assert!(machine.check_timeout(t0 + ms(10_000)));
        assert!(!machine.check_timeout(t0 + ms(10_001)));
        assert!(machine.is_idle());
    }

    #[test]
    fn response_returns_to_idle() {
        let mut machine = RequestMachine::default();
        let t0 = Instant::now();
        machine.try_trigger(t0);

        assert!(machine.complete());
        assert!(machine.is_idle());
        assert!(!machine.check_timeout(t0 + ms(20_000)));
        assert!(!machine.complete());
    }

    #[test]
    fn press_interval_gates_new_requests() {
        let mut machine = RequestMachine::default();
        let t0 = Instant::now();
        machine.try_trigger(t0);
        machine.complete();

        assert!(!machine.try_trigger(t0 + ms(500)));
        assert!(machine.try_trigger(t0 + ms(501)));
    }

    #[test]
    fn detector_reports_only_press_edges() {
        let mut detector = PressDetector::default();
        let levels = [false, true, true, false, true, false];
        let edges: Vec<bool> = levels.iter().map(|l| detector.update(*l)).collect();
        assert_eq!(edges, [false, true, false, false, true, false]);
    }
}
