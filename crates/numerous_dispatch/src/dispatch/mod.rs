//! Dispatch one logical API call: send, throttle, retry, classify, paginate.

pub mod context;
pub mod error;
pub mod executor;
pub mod http;
pub mod internal_event;
pub mod paginate;
pub mod reqwest_integration;
pub mod stats;
pub mod throttle;

use bon::Builder;

/// Configuration of the dispatch core.
///
/// These parameters rarely need changes. The defaults match the server's documented
/// rate-limit behavior; lowering `voluntary_threshold` trades smoother throughput for
/// a higher chance of hitting 429s.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `base_url` | required | Server root, e.g. `https://api.numerousapp.com` |
/// | `max_attempts` | 10 | Hard ceiling on sends per logical request, whatever the policy says |
/// | `voluntary_threshold` | 40 | Quota level below which the default policy slows down |
/// | `duplicate_filter` | true | Drop items repeated across adjacent collection pages |
/// | `response_time_history` | none | Keep the last N latencies instead of only the latest |
///
/// # Example
///
/// ```rust
/// use numerous_dispatch::dispatch::DispatchSettings;
///
/// let settings = DispatchSettings::builder()
///     .base_url("https://api.numerousapp.com")
///     .voluntary_threshold(100)
///     .response_time_history(16)
///     .build();
/// assert_eq!(settings.max_attempts(), 10);
/// ```
#[derive(Clone, Debug, Builder)]
pub struct DispatchSettings {
    /// Server root that relative request paths are appended to.
    #[builder(into)]
    pub(crate) base_url: String,

    /// Total sends allowed for one `execute` call, first attempt included.
    ///
    /// **Default**: 10
    #[builder(default = default_max_attempts())]
    pub(crate) max_attempts: u32,

    /// `x-rate-limit-remaining` value below which the default throttle policy
    /// pauses voluntarily.
    ///
    /// **Default**: 40
    #[builder(default = default_voluntary_threshold())]
    pub(crate) voluntary_threshold: i64,

    /// Whether collection iteration drops page-boundary duplicates for endpoints that
    /// declare a duplicate key.
    ///
    /// **Default**: true
    #[builder(default = true)]
    pub(crate) duplicate_filter: bool,

    /// Length of the response-time ring buffer. `None` keeps only the latest value.
    pub(crate) response_time_history: Option<usize>,
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_voluntary_threshold() -> i64 {
    40
}

impl DispatchSettings {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
    pub fn voluntary_threshold(&self) -> i64 {
        self.voluntary_threshold
    }
    pub fn duplicate_filter(&self) -> bool {
        self.duplicate_filter
    }
    pub fn response_time_history(&self) -> Option<usize> {
        self.response_time_history
    }
}
