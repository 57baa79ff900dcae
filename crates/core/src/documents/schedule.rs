use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use omnidocs_protocol::DocumentStatus;

/// Limits of a status polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PollPolicy {
    /// Delay before the first poll. Processing has almost certainly not
    /// finished right after the upload is accepted.
    pub initial_delay: Duration,
    /// Delay between polls while the document is being processed.
    pub interval: Duration,
    /// Total number of polls, failed ones included.
    pub max_attempts: u32,
    /// Number of failed polls in a row after which polling is abandoned.
    pub max_consecutive_errors: u32,
    /// Upper bound of the delay after a failed poll.
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(3),
            max_attempts: 60,
            max_consecutive_errors: 3,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// How a polling loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollEnd {
    /// The document was processed.
    Completed,
    /// The server gave up processing the document.
    Failed,
    /// The attempt budget ran out before the document settled.
    TimedOut,
    /// Too many polls failed in a row.
    ConnectivityLost,
}

/// What a polling loop should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollStep {
    /// Poll again after the duration.
    Wait(Duration),
    /// Stop polling.
    Finish(PollEnd),
}

/// The decisions of a polling loop, without any timers.
///
/// After the n-th failed poll in a row, the next poll is delayed by
/// `min(interval * 2^n, max_backoff)`. A successful poll resets that
/// progression.
#[derive(Debug)]
pub struct PollSchedule {
    policy: PollPolicy,
    attempts: u32,
    consecutive_errors: u32,
    backoff: ExponentialBackoff,
}

impl PollSchedule {
    /// Creates a schedule for one polling loop.
    pub fn new(policy: PollPolicy) -> Self {
        let first_retry = policy.interval.saturating_mul(2);
        let backoff = ExponentialBackoff {
            current_interval: first_retry,
            initial_interval: first_retry,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: policy.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        };
        Self {
            policy,
            attempts: 0,
            consecutive_errors: 0,
            backoff,
        }
    }

    /// Returns the delay before the first poll.
    #[inline]
    pub fn initial_delay(&self) -> Duration {
        self.policy.initial_delay
    }

    /// Returns the number of polls so far.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decides what to do after a poll reported `status`.
    pub fn on_status(&mut self, status: DocumentStatus) -> PollStep {
        self.attempts += 1;
        self.consecutive_errors = 0;
        self.backoff.reset();

        match status {
            DocumentStatus::Completed => PollStep::Finish(PollEnd::Completed),
            DocumentStatus::Failed => PollStep::Finish(PollEnd::Failed),
            DocumentStatus::Pending | DocumentStatus::Processing => {
                if self.attempts >= self.policy.max_attempts {
                    PollStep::Finish(PollEnd::TimedOut)
                } else {
                    PollStep::Wait(self.policy.interval)
                }
            }
        }
    }

    /// Decides what to do after a poll failed.
    pub fn on_error(&mut self) -> PollStep {
        self.attempts += 1;
        self.consecutive_errors += 1;

        if self.consecutive_errors >= self.policy.max_consecutive_errors {
            return PollStep::Finish(PollEnd::ConnectivityLost);
        }
        if self.attempts >= self.policy.max_attempts {
            return PollStep::Finish(PollEnd::TimedOut);
        }
        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.policy.max_backoff)
            .min(self.policy.max_backoff);
        PollStep::Wait(delay)
    }
}
