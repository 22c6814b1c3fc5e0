//! Connectivity state maintained by the replica-side monitor.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl ConnectivityState {
    /// Folds a single probe outcome into the state, returning whether
    /// this was a false→true transition (i.e. a reconnect).
    pub fn record(&mut self, success: bool, at: DateTime<Utc>) -> bool {
        self.last_checked = Some(at);
        let was_online = self.is_online;

        if success {
            self.last_success = Some(at);
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
            self.is_online = true;
        } else {
            self.last_failure = Some(at);
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            self.is_online = false;
        }

        !was_online && self.is_online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_to_online_is_reported_once() {
        let mut state = ConnectivityState::default();
        let now = Utc::now();
        assert!(state.record(true, now));
        assert!(!state.record(true, now));
    }

    #[test]
    fn failure_resets_consecutive_success_counter() {
        let mut state = ConnectivityState::default();
        let now = Utc::now();
        state.record(true, now);
        state.record(true, now);
        assert_eq!(state.consecutive_successes, 2);
        state.record(false, now);
        assert_eq!(state.consecutive_successes, 0);
        assert_eq!(state.consecutive_failures, 1);
        assert!(!state.is_online);
    }
}
