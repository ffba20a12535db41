use serde::Serialize;
use std::{collections::VecDeque, time::Duration};

/// Counters kept by one executor for introspection.
///
/// Only `rate_remaining` and `rate_reset` are ever read back by the dispatch code, and
/// only to hand them to throttle policies.
#[derive(Clone, Debug, Serialize)]
pub struct Statistics {
    /// `execute` calls, one per logical request.
    pub simple_api: u64,
    /// Requests actually put on the wire, retries included.
    pub server_requests: u64,
    /// First pages fetched by collection iteration.
    pub first_chunks: u64,
    /// Follow-up pages fetched by collection iteration.
    pub additional_chunks: u64,
    /// Items dropped because they repeated an item of the previous page.
    pub duplicates_filtered: u64,
    /// 429 responses the default policy retried.
    pub throttle_429: u64,
    /// Times the default policy gave up because its backoff table was exhausted.
    pub throttle_maxed: u64,
    /// Voluntary pauses taken because quota was running low.
    pub voluntary_backoffs: u64,
    /// Latest `x-rate-limit-remaining`, -1 when the server did not say.
    pub rate_remaining: i64,
    /// Latest `x-rate-limit-reset` in seconds, -1 when the server did not say.
    pub rate_reset: i64,
    pub response_times: ResponseTimes,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            simple_api: 0,
            server_requests: 0,
            first_chunks: 0,
            additional_chunks: 0,
            duplicates_filtered: 0,
            throttle_429: 0,
            throttle_maxed: 0,
            voluntary_backoffs: 0,
            rate_remaining: -1,
            rate_reset: -1,
            response_times: ResponseTimes::default(),
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics that remember the last `len` response times, newest first.
    pub fn with_response_time_history(len: usize) -> Self {
        Self {
            response_times: ResponseTimes::history(len),
            ..Self::new()
        }
    }

    pub(crate) fn record_response_time(&mut self, elapsed: Duration) {
        self.response_times.record(elapsed);
    }
}

/// Either the latest response time or a fixed-length history of them.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResponseTimes {
    Latest { elapsed: Option<Duration> },
    History { len: usize, elapsed: VecDeque<Duration> },
}

impl Default for ResponseTimes {
    fn default() -> Self {
        ResponseTimes::Latest { elapsed: None }
    }
}

impl ResponseTimes {
    pub fn history(len: usize) -> Self {
        ResponseTimes::History {
            len,
            elapsed: VecDeque::with_capacity(len),
        }
    }

    pub fn latest(&self) -> Option<Duration> {
        match self {
            ResponseTimes::Latest { elapsed } => *elapsed,
            ResponseTimes::History { elapsed, .. } => elapsed.front().copied(),
        }
    }

    fn record(&mut self, value: Duration) {
        match self {
            ResponseTimes::Latest { elapsed } => *elapsed = Some(value),
            ResponseTimes::History { len, elapsed } => {
                if *len == 0 {
                    return;
                }
                elapsed.push_front(value);
                elapsed.truncate(*len);
            }
        }
    }
}
