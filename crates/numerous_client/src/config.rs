use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use numerous_dispatch::dispatch::throttle::ThrottlePolicy;

use crate::{credentials, error::NumerousError};

pub const DEFAULT_SERVER: &str = "https://api.numerousapp.com";

const ENV_SERVER: &str = "NUMEROUS_SERVER";
const ENV_MAX_ATTEMPTS: &str = "NUMEROUS_MAX_ATTEMPTS";
const ENV_VOLUNTARY_THRESHOLD: &str = "NUMEROUS_VOLUNTARY_THRESHOLD";
const ENV_DUPLICATE_FILTER: &str = "NUMEROUS_DUPLICATE_FILTER";

/// Everything needed to construct a [`crate::Numerous`] client.
#[derive(Clone)]
pub struct NumerousConfig {
    pub api_key: String,
    /// Server root, without a trailing path.
    pub server: String,
    pub user_agent: String,
    /// Used as-is when set; the timeouts below are then ignored. It must not follow
    /// redirects or [`crate::Metric::photo_url`] cannot see the photo location.
    pub reqwest_client: Option<reqwest::Client>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_attempts: u32,
    pub voluntary_threshold: i64,
    pub duplicate_filter: bool,
    pub response_time_history: Option<usize>,
    /// Consulted before the built-in throttle policy, which it may delegate to.
    pub throttle: Option<Arc<dyn ThrottlePolicy>>,
}

impl Default for NumerousConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            server: DEFAULT_SERVER.to_string(),
            user_agent: format!(
                "numerous-rs/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.2.0")
            ),
            reqwest_client: None,
            request_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            max_attempts: 10,
            voluntary_threshold: 40,
            duplicate_filter: true,
            response_time_history: None,
            throttle: None,
        }
    }
}

impl fmt::Debug for NumerousConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumerousConfig")
            .field("api_key", &"<redacted>")
            .field("server", &self.server)
            .field("user_agent", &self.user_agent)
            .field("custom_reqwest_client", &self.reqwest_client.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("voluntary_threshold", &self.voluntary_threshold)
            .field("duplicate_filter", &self.duplicate_filter)
            .field("response_time_history", &self.response_time_history)
            .field("custom_throttle", &self.throttle.is_some())
            .finish()
    }
}

impl NumerousConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Loads `.env` if present, then reads the key and tunables from the environment.
    pub fn from_env() -> Result<Self, NumerousError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(target: "numerous_client", path = %path.display(), ".env loaded"),
            Err(e) if e.not_found() => {}
            Err(e) => warn!(target: "numerous_client", error = %e, "Ignoring unreadable .env"),
        }
        let api_key = credentials::resolve_api_key(None)?;
        Ok(Self::from_lookup(api_key, |name| std::env::var(name).ok()))
    }

    pub(crate) fn from_lookup(api_key: String, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::with_api_key(api_key);
        Self {
            server: lookup(ENV_SERVER)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.server.clone()),
            max_attempts: parse_or(&lookup, ENV_MAX_ATTEMPTS, defaults.max_attempts),
            voluntary_threshold: parse_or(
                &lookup,
                ENV_VOLUNTARY_THRESHOLD,
                defaults.voluntary_threshold,
            ),
            duplicate_filter: parse_or(&lookup, ENV_DUPLICATE_FILTER, defaults.duplicate_filter),
            ..defaults
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + fmt::Debug,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            warn!(
                target: "numerous_client",
                var = name,
                value = %raw,
                error = %e,
                default = ?default,
                "Unparseable environment variable; using default"
            );
            default
        }
    }
}
