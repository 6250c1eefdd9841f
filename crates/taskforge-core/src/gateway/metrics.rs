//! Per-client usage counters.
//!
//! One [`ParsingMetrics`] lives inside each `GatewayClient`. It is updated
//! exactly once per logical call, when the call reaches its terminal
//! outcome, so retries never inflate the request count.

use std::time::Duration;

use serde::Serialize;

use super::types::Usage;

/// Cumulative counters for one gateway client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ParsingMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Running mean, in milliseconds, of the provider's response time for
    /// the terminal attempt of each logical call. Backoff sleeps and
    /// earlier failed attempts are not included.
    pub average_response_time_ms: f64,
    /// Rate-limited attempts, counting each retry separately.
    pub rate_limit_hits: u64,
}

/// What a single logical call contributes to the counters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallOutcome {
    /// Token usage of the terminal successful response; `None` on failure.
    pub usage: Option<Usage>,
    /// Duration of the terminal attempt.
    pub provider_time: Duration,
    pub rate_limit_hits: u32,
}

impl ParsingMetrics {
    /// Fraction of logical calls that succeeded, or 0 before any call.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub(crate) fn record(&mut self, outcome: CallOutcome) {
        self.total_requests += 1;
        match outcome.usage {
            Some(usage) => {
                self.successful_requests += 1;
                self.total_input_tokens += usage.input_tokens;
                self.total_output_tokens += usage.output_tokens;
            }
            None => self.failed_requests += 1,
        }
        self.rate_limit_hits += u64::from(outcome.rate_limit_hits);

        let n = self.total_requests as f64;
        let sample = outcome.provider_time.as_secs_f64() * 1000.0;
        self.average_response_time_ms = (self.average_response_time_ms * (n - 1.0) + sample) / n;
    }
}
