use std::time::Duration;

use crate::{PipelineError, PipelineOptions, RequestSpec};

/// Retry limits and backoff for one request.
///
/// Two independent branches: HTTP 429 backs off exponentially (base 3),
/// network errors, timeouts and 5xx back off linearly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub retry_delay: Duration,
    pub rate_limit_max_retries: usize,
    pub rate_limit_base_delay: Duration,
}

/// Per-request retry bookkeeping, owned by the dispatch loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    pub rate_limit_retries: usize,
    pub transient_retries: usize,
    /// Set once the transient retry sequence has started. A request gets
    /// one such sequence; its budget is not replenished.
    pub marked_for_retry: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// HTTP 429; `attempt` is 1-based.
    RateLimited { attempt: usize, delay: Duration },
    /// Network error, timeout or 5xx; `attempt` is 1-based.
    Transient { attempt: usize, delay: Duration },
    GiveUp,
}

impl RetryPolicy {
    /// Configured limits with the request's own overrides applied.
    pub fn for_request(options: &PipelineOptions, spec: &RequestSpec) -> Self {
        Self {
            max_retries: spec.retry.unwrap_or(options.max_retries),
            retry_delay: spec.retry_delay.unwrap_or(options.retry_delay),
            rate_limit_max_retries: options.rate_limit_max_retries,
            rate_limit_base_delay: options.rate_limit_base_delay,
        }
    }

    /// `base * 3^attempt`, `attempt` counted from zero.
    pub fn rate_limit_delay(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.rate_limit_base_delay
            .saturating_mul(3u32.saturating_pow(exp))
    }

    /// `retry_delay * attempt`, `attempt` counted from one.
    pub fn transient_delay(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }

    /// Decides what to do after `error`, updating `state`.
    ///
    /// The rate-limit branch is checked first and returns early, so one
    /// failure never counts against both budgets.
    pub fn next(&self, state: &mut RetryState, error: &PipelineError) -> RetryDecision {
        if error.is_rate_limited() {
            if state.rate_limit_retries >= self.rate_limit_max_retries {
                return RetryDecision::GiveUp;
            }
            let delay = self.rate_limit_delay(state.rate_limit_retries);
            state.rate_limit_retries += 1;
            return RetryDecision::RateLimited {
                attempt: state.rate_limit_retries,
                delay,
            };
        }

        if !error.is_transient() {
            return RetryDecision::GiveUp;
        }
        state.marked_for_retry = true;
        if state.transient_retries >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        state.transient_retries += 1;
        RetryDecision::Transient {
            attempt: state.transient_retries,
            delay: self.transient_delay(state.transient_retries),
        }
    }
}
