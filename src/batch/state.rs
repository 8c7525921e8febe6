//! Per-sample attempt state machine.

use std::fmt;

/// Attempts per sample before it is abandoned.
pub const MAX_ATTEMPTS: u32 = 5;

/// Samples between full environment resets.
pub const CLEANUP_INTERVAL: usize = 100;

/// Lifecycle of one sample within a batch.
///
/// ```text
/// Pending -> Attempting -> Done
///                |
///                +-> Retrying -> Attempting ...
///                +-> Abandoned
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleState {
    Pending,
    /// Attempt `n` (1-based) is running
    Attempting(u32),
    /// Attempt `n` failed, another one is allowed
    Retrying(u32),
    /// Succeeded on attempt `n`
    Done(u32),
    /// Every allowed attempt failed
    Abandoned(u32),
}

impl SampleState {
    /// No further attempts will be made.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SampleState::Done(_) | SampleState::Abandoned(_))
    }
}

impl fmt::Display for SampleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleState::Pending => write!(f, "pending"),
            SampleState::Attempting(n) => write!(f, "attempt {}", n),
            SampleState::Retrying(n) => write!(f, "failed, retry {}", n),
            SampleState::Done(n) => write!(f, "done after {} attempt(s)", n),
            SampleState::Abandoned(n) => write!(f, "abandoned after {} attempts", n),
        }
    }
}

/// Tracks attempts of one sample against a fixed budget.
#[derive(Clone, Debug)]
pub struct AttemptTracker {
    state: SampleState,
    max_attempts: u32,
}

impl AttemptTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self { state: SampleState::Pending, max_attempts: max_attempts.max(1) }
    }

    #[inline]
    pub fn state(&self) -> SampleState {
        self.state
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        match self.state {
            SampleState::Pending => 0,
            SampleState::Attempting(n)
            | SampleState::Retrying(n)
            | SampleState::Done(n)
            | SampleState::Abandoned(n) => n,
        }
    }

    /// Start the next attempt; `None` once the sample is finished.
    pub fn begin(&mut self) -> Option<u32> {
        let next = match self.state {
            SampleState::Pending => 1,
            SampleState::Retrying(n) => n + 1,
            SampleState::Attempting(_) | SampleState::Done(_) | SampleState::Abandoned(_) => return None,
        };
        self.state = SampleState::Attempting(next);
        Some(next)
    }

    /// Mark the running attempt as successful.
    pub fn succeed(&mut self) -> SampleState {
        if let SampleState::Attempting(n) = self.state {
            self.state = SampleState::Done(n);
        }
        self.state
    }

    /// Mark the running attempt as failed.
    pub fn fail(&mut self) -> SampleState {
        if let SampleState::Attempting(n) = self.state {
            self.state = if n >= self.max_attempts {
                SampleState::Abandoned(n)
            } else {
                SampleState::Retrying(n)
            };
        }
        self.state
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_first_try() {
        let mut t = AttemptTracker::default();
        assert_eq!(t.begin(), Some(1));
        assert_eq!(t.succeed(), SampleState::Done(1));
        assert!(t.state().is_terminal());
        assert_eq!(t.begin(), None);
    }

    #[test]
    fn test_abandoned_after_budget() {
        let mut t = AttemptTracker::default();
        let mut started = 0;
        while t.begin().is_some() {
            started += 1;
            t.fail();
        }
        assert_eq!(started, MAX_ATTEMPTS);
        assert_eq!(t.state(), SampleState::Abandoned(MAX_ATTEMPTS));
    }

    #[test]
    fn test_retry_then_success() {
        let mut t = AttemptTracker::new(3);
        t.begin();
        assert_eq!(t.fail(), SampleState::Retrying(1));
        assert_eq!(t.begin(), Some(2));
        assert_eq!(t.succeed(), SampleState::Done(2));
        assert_eq!(t.attempts(), 2);
    }

    #[test]
    fn test_transitions_ignored_outside_attempt() {
        let mut t = AttemptTracker::default();
        assert_eq!(t.fail(), SampleState::Pending);
        assert_eq!(t.succeed(), SampleState::Pending);
        assert_eq!(SampleState::Retrying(2).to_string(), "failed, retry 2");
    }
}
