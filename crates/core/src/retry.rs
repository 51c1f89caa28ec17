//! Retry bounds for failed job attempts.
//!
//! `retry_count` on a job counts failed (or stale-recovered) attempts. A job
//! gets at most `max_retries` attempts in total: the attempt that fails while
//! `retry_count == max_retries - 1` is the last one and ends in `failed`.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum number of attempts per job.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What to do with a job whose processing attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Put the job back in the queue with the incremented retry count.
    Requeue { next_retry_count: i32 },
    /// Retries are used up; the job fails permanently after `attempts` tries.
    Fail { attempts: i32 },
}

/// Retry bound shared by the outcome recorder and the reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: i32,
}

impl RetryPolicy {
    /// Build a policy, rejecting a bound below one attempt.
    pub fn new(max_retries: i32) -> Result<Self, CoreError> {
        if max_retries < 1 {
            return Err(CoreError::Validation(format!(
                "max_retries must be at least 1, got {max_retries}"
            )));
        }
        Ok(Self { max_retries })
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Decide the fate of a job that failed while holding `retry_count`.
    pub fn on_failure(&self, retry_count: i32) -> FailureDisposition {
        if retry_count < self.max_retries - 1 {
            FailureDisposition::Requeue {
                next_retry_count: retry_count + 1,
            }
        } else {
            FailureDisposition::Fail {
                attempts: retry_count + 1,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rejects_zero_max_retries() {
        assert_matches!(RetryPolicy::new(0), Err(CoreError::Validation(_)));
        assert_matches!(RetryPolicy::new(-2), Err(CoreError::Validation(_)));
    }

    #[test]
    fn default_is_three() {
        assert_eq!(RetryPolicy::default().max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn three_attempts_then_fail() {
        let policy = RetryPolicy::new(3).unwrap();
        assert_eq!(
            policy.on_failure(0),
            FailureDisposition::Requeue { next_retry_count: 1 }
        );
        assert_eq!(
            policy.on_failure(1),
            FailureDisposition::Requeue { next_retry_count: 2 }
        );
        assert_eq!(policy.on_failure(2), FailureDisposition::Fail { attempts: 3 });
    }

    #[test]
    fn single_attempt_policy_never_requeues() {
        let policy = RetryPolicy::new(1).unwrap();
        assert_eq!(policy.on_failure(0), FailureDisposition::Fail { attempts: 1 });
    }

    #[test]
    fn over_the_bound_still_fails() {
        let policy = RetryPolicy::new(3).unwrap();
        assert_eq!(policy.on_failure(3), FailureDisposition::Fail { attempts: 4 });
    }
}
