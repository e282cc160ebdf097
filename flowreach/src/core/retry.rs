// =============================================================================
// LOCK ACQUISITION RETRY BEHAVIOR
// =============================================================================
//
// Lock contention is expected: many instances compute the same graph views and
// race for the same write lease. Contention is recovered locally, but only up
// to a small bound. Past that bound the request is shed with a retryable
// response instead of queueing behind the holder.
//
// Each attempt after the first waits for a state-change event on the lock
// (pub/sub wakeup) instead of sleeping on a timer, so a released lease is
// picked up as soon as it is released and idle waiters never poll.
//
// Worst case per acquisition: max_attempts * wait_timeout.
// =============================================================================

use std::time::Duration;

/// Default number of acquisition attempts (including the first try).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default time to wait for a lock state change between attempts.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounds on how long a caller keeps trying to acquire a contended lock.
///
/// # Examples
///
/// ```
/// use flowreach::core::AcquirePolicy;
/// use std::time::Duration;
///
/// let policy = AcquirePolicy::STANDARD;
/// assert_eq!(policy.max_attempts, 3);
/// assert_eq!(policy.worst_case(), Duration::from_secs(2));
///
/// let fast = AcquirePolicy::default().with_wait_timeout(Duration::from_millis(50));
/// assert_eq!(fast.wait_timeout, Duration::from_millis(50));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AcquirePolicy {
    /// Maximum number of acquisition attempts (including the first try).
    ///
    /// For example, `max_attempts = 3` means:
    /// - Attempt 1: immediate
    /// - Attempt 2: after a state-change event (at most `wait_timeout`)
    /// - Attempt 3: after another state-change event
    ///
    /// A value of 0 is treated as 1.
    pub max_attempts: u32,

    /// How long to wait for a lock state-change event between attempts.
    pub wait_timeout: Duration,
}

impl AcquirePolicy {
    /// Single attempt, never waits. Contention fails immediately.
    pub const NONE: Self = Self {
        max_attempts: 1,
        wait_timeout: Duration::from_secs(0),
    };

    /// Three attempts, one second of event wait between them.
    pub const STANDARD: Self = Self {
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        wait_timeout: DEFAULT_WAIT_TIMEOUT,
    };

    /// Returns a copy with a different attempt bound.
    pub const fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Returns a copy with a different wait timeout.
    pub const fn with_wait_timeout(self, wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            ..self
        }
    }

    /// Number of attempts actually made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns true if `attempt` (1-indexed) is the last one allowed.
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt >= self.attempts()
    }

    /// Upper bound on the total time spent waiting for one acquisition.
    pub fn worst_case(&self) -> Duration {
        self.wait_timeout * (self.attempts() - 1)
    }
}

impl Default for AcquirePolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}
