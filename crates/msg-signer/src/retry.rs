//! # Retry Scheduler
//!
//! Attempt-bounded retry around one send or receive run. An attempt that
//! appends no new error record settles the loop; otherwise the next attempt
//! resumes from the state the previous one left behind.

use async_trait::async_trait;
use sign_types::ErrorRecord;
use tracing::{debug, warn};

/// One resumable send or receive run.
#[async_trait]
pub trait Attempt: Send {
    /// Run once, appending any failure to `errors`.
    async fn run(&mut self, errors: &mut Vec<ErrorRecord>);
}

/// How a retry loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// An attempt finished without new errors.
    Settled { attempts: u32 },
    /// Every attempt failed; holds the records of all of them in order.
    Exhausted(Vec<ErrorRecord>),
}

impl RetryOutcome {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    /// Records to report to the caller; empty once settled.
    #[must_use]
    pub fn into_errors(self) -> Vec<ErrorRecord> {
        match self {
            Self::Settled { .. } => Vec::new(),
            Self::Exhausted(errors) => errors,
        }
    }
}

/// Attempt budget shared by the send and receive paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl RetryPolicy {
    /// A policy allowing `attempts` runs. At least one run always happens.
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Drive `attempt` until a run adds no error record or the budget runs
    /// out.
    pub async fn run<A>(&self, attempt: &mut A) -> RetryOutcome
    where
        A: Attempt + ?Sized,
    {
        let mut errors = Vec::new();
        let mut previous = 0;

        for number in 1..=self.attempts {
            attempt.run(&mut errors).await;

            if errors.len() <= previous {
                debug!(attempt = number, "Attempt settled");
                return RetryOutcome::Settled { attempts: number };
            }

            for record in errors.iter().skip(previous) {
                warn!(
                    attempt = number,
                    of = self.attempts,
                    error = %record,
                    "Attempt failed"
                );
            }
            previous = errors.len();
        }

        RetryOutcome::Exhausted(errors)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
