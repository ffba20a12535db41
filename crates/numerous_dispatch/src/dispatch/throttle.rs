use std::{fmt, sync::Arc, time::Duration};

use http::{Method, StatusCode};

use super::stats::Statistics;

/// Delays added on top of the server's reset time when retrying a 429, indexed by
/// attempt. Once the table runs out the default policy stops retrying.
pub const DEFAULT_BACKOFF_SECS: [u64; 5] = [2, 5, 15, 30, 60];

/// Voluntary pause when quota is low but more than half the threshold remains.
pub const VOLUNTARY_SHORT_PAUSE: Duration = Duration::from_secs(1);
/// Voluntary pause when half the threshold or less remains.
pub const VOLUNTARY_LONG_PAUSE: Duration = Duration::from_secs(3);

/// What to do with the response just received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Hand the response to the caller.
    Accept,
    /// Hand the response to the caller after pausing.
    AcceptAfter(Duration),
    /// Pause, then send the same request again.
    RetryAfter(Duration),
}

impl ThrottleDecision {
    pub const fn is_retry(&self) -> bool {
        matches!(self, ThrottleDecision::RetryAfter(_))
    }

    pub const fn delay(&self) -> Duration {
        match self {
            ThrottleDecision::Accept => Duration::ZERO,
            ThrottleDecision::AcceptAfter(d) | ThrottleDecision::RetryAfter(d) => *d,
        }
    }
}

/// The request a decision is about.
#[derive(Clone, Debug)]
pub struct RequestEcho {
    pub method: Method,
    pub url: String,
}

/// Everything a policy sees after one response.
pub struct ThrottleInput<'a> {
    /// 0 for the first send of a request.
    pub attempt: u32,
    /// `x-rate-limit-remaining`, -1 when absent.
    pub rate_remaining: i64,
    /// `x-rate-limit-reset` in seconds, -1 when absent.
    pub rate_reset: i64,
    pub status: StatusCode,
    pub stats: &'a mut Statistics,
    pub request: &'a RequestEcho,
}

impl fmt::Debug for ThrottleInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleInput")
            .field("attempt", &self.attempt)
            .field("rate_remaining", &self.rate_remaining)
            .field("rate_reset", &self.rate_reset)
            .field("status", &self.status)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Decides, after every response, whether the request is sent again.
///
/// Policies are linked into a [`ThrottleChain`]. A policy receives its parent link and
/// may delegate to it, typically to fall back to [`DefaultThrottle`] after doing its own
/// bookkeeping.
///
/// # Example
/// ```rust
/// use numerous_dispatch::dispatch::throttle::{
///     ThrottleChain, ThrottleDecision, ThrottleInput, ThrottlePolicy,
/// };
/// use std::time::Duration;
///
/// /// Also retries 503s, once, otherwise behaves like the built-in policy.
/// struct RetryUnavailable;
///
/// impl ThrottlePolicy for RetryUnavailable {
///     fn decide(
///         &self,
///         input: &mut ThrottleInput<'_>,
///         parent: Option<&ThrottleChain>,
///     ) -> ThrottleDecision {
///         if input.status.as_u16() == 503 && input.attempt == 0 {
///             return ThrottleDecision::RetryAfter(Duration::from_secs(1));
///         }
///         parent.map_or(ThrottleDecision::Accept, |p| p.decide(input))
///     }
/// }
/// ```
pub trait ThrottlePolicy: Send + Sync + 'static {
    fn decide(
        &self,
        input: &mut ThrottleInput<'_>,
        parent: Option<&ThrottleChain>,
    ) -> ThrottleDecision;
}

impl<P: ThrottlePolicy + ?Sized> ThrottlePolicy for Arc<P> {
    fn decide(
        &self,
        input: &mut ThrottleInput<'_>,
        parent: Option<&ThrottleChain>,
    ) -> ThrottleDecision {
        (**self).decide(input, parent)
    }
}

/// A policy built from caller data and a plain function.
pub struct PolicyFn<D, F> {
    data: D,
    f: F,
}

impl<D, F> PolicyFn<D, F>
where
    D: Send + Sync + 'static,
    F: Fn(&mut ThrottleInput<'_>, &D, Option<&ThrottleChain>) -> ThrottleDecision
        + Send
        + Sync
        + 'static,
{
    pub fn new(data: D, f: F) -> Self {
        Self { data, f }
    }
}

impl<D, F> ThrottlePolicy for PolicyFn<D, F>
where
    D: Send + Sync + 'static,
    F: Fn(&mut ThrottleInput<'_>, &D, Option<&ThrottleChain>) -> ThrottleDecision
        + Send
        + Sync
        + 'static,
{
    fn decide(
        &self,
        input: &mut ThrottleInput<'_>,
        parent: Option<&ThrottleChain>,
    ) -> ThrottleDecision {
        (self.f)(input, &self.data, parent)
    }
}

/// One link of the policy list: a policy and the link it may defer to.
#[derive(Clone)]
pub struct ThrottleChain {
    policy: Arc<dyn ThrottlePolicy>,
    parent: Option<Arc<ThrottleChain>>,
}

impl ThrottleChain {
    pub fn new(policy: impl ThrottlePolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            parent: None,
        }
    }

    /// Puts `policy` in front of this chain.
    pub fn push(self, policy: impl ThrottlePolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            parent: Some(Arc::new(self)),
        }
    }

    /// The built-in policy alone.
    pub fn default_with_threshold(voluntary_threshold: i64) -> Self {
        Self::new(DefaultThrottle::new(voluntary_threshold))
    }

    pub fn parent(&self) -> Option<&ThrottleChain> {
        self.parent.as_deref()
    }

    pub fn decide(&self, input: &mut ThrottleInput<'_>) -> ThrottleDecision {
        self.policy.decide(input, self.parent())
    }

    /// Number of links, head included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }
}

impl fmt::Debug for ThrottleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleChain")
            .field("depth", &self.depth())
            .finish()
    }
}

/// The built-in policy.
///
/// - attempt past the backoff table: give up and accept whatever came back
/// - 429: wait `rate_reset + backoff[attempt]` seconds, then retry
/// - quota below `voluntary_threshold`: accept, but pause first so the next call does
///   not run into the limit
#[derive(Clone, Debug)]
pub struct DefaultThrottle {
    voluntary_threshold: i64,
    backoff_secs: Vec<u64>,
}

impl DefaultThrottle {
    pub fn new(voluntary_threshold: i64) -> Self {
        Self {
            voluntary_threshold,
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }

    pub fn voluntary_threshold(&self) -> i64 {
        self.voluntary_threshold
    }

    fn voluntary_pause(&self, remaining: i64) -> Duration {
        if remaining > self.voluntary_threshold / 2 {
            VOLUNTARY_SHORT_PAUSE
        } else {
            VOLUNTARY_LONG_PAUSE
        }
    }
}

impl ThrottlePolicy for DefaultThrottle {
    fn decide(
        &self,
        input: &mut ThrottleInput<'_>,
        _parent: Option<&ThrottleChain>,
    ) -> ThrottleDecision {
        let Some(slop) = self.backoff_secs.get(input.attempt as usize).copied() else {
            input.stats.throttle_maxed += 1;
            warn!(
                message = "Throttle backoff table exhausted; accepting response.",
                attempt = input.attempt,
                status = %input.status,
                url = %input.request.url,
            );
            return ThrottleDecision::Accept;
        };

        if input.status == StatusCode::TOO_MANY_REQUESTS {
            input.stats.throttle_429 += 1;
            let delay = Duration::from_secs(input.rate_reset.max(0) as u64 + slop);
            warn!(
                message = "Rate limited; retrying after server reset.",
                attempt = input.attempt,
                rate_reset = input.rate_reset,
                delay_secs = delay.as_secs(),
            );
            return ThrottleDecision::RetryAfter(delay);
        }

        if input.rate_remaining >= 0 && input.rate_remaining < self.voluntary_threshold {
            input.stats.voluntary_backoffs += 1;
            let delay = self.voluntary_pause(input.rate_remaining);
            debug!(
                message = "Quota running low; pausing voluntarily.",
                rate_remaining = input.rate_remaining,
                threshold = self.voluntary_threshold,
                delay_secs = delay.as_secs(),
            );
            return ThrottleDecision::AcceptAfter(delay);
        }

        ThrottleDecision::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn echo() -> RequestEcho {
        RequestEcho {
            method: Method::GET,
            url: "https://api.numerousapp.com/v1/metrics/1".to_string(),
        }
    }

    fn decide(
        chain: &ThrottleChain,
        stats: &mut Statistics,
        attempt: u32,
        status: u16,
        remaining: i64,
        reset: i64,
    ) -> ThrottleDecision {
        let request = echo();
        let mut input = ThrottleInput {
            attempt,
            rate_remaining: remaining,
            rate_reset: reset,
            status: StatusCode::from_u16(status).unwrap(),
            stats,
            request: &request,
        };
        chain.decide(&mut input)
    }

    #[test]
    fn too_many_requests_waits_reset_plus_slop() {
        let chain = ThrottleChain::default_with_threshold(40);
        let mut stats = Statistics::new();

        for (attempt, slop) in DEFAULT_BACKOFF_SECS.iter().enumerate() {
            let decision = decide(&chain, &mut stats, attempt as u32, 429, 0, 7);
            assert_eq!(decision, ThrottleDecision::RetryAfter(Duration::from_secs(7 + slop)));
        }
        assert_eq!(stats.throttle_429, 5);
    }

    #[test]
    fn unknown_reset_counts_as_zero() {
        let chain = ThrottleChain::default_with_threshold(40);
        let mut stats = Statistics::new();
        let decision = decide(&chain, &mut stats, 0, 429, -1, -1);
        assert_eq!(decision, ThrottleDecision::RetryAfter(Duration::from_secs(2)));
    }

    #[test]
    fn gives_up_past_backoff_table() {
        let chain = ThrottleChain::default_with_threshold(40);
        let mut stats = Statistics::new();
        let decision = decide(&chain, &mut stats, 5, 429, 0, 0);
        assert_eq!(decision, ThrottleDecision::Accept);
        assert_eq!(stats.throttle_maxed, 1);
        assert_eq!(stats.throttle_429, 0);
    }

    #[test]
    fn healthy_quota_never_pauses() {
        let chain = ThrottleChain::default_with_threshold(40);
        let mut stats = Statistics::new();
        for remaining in [40, 41, 299, 1_000_000] {
            let decision = decide(&chain, &mut stats, 0, 200, remaining, 60);
            assert_eq!(decision, ThrottleDecision::Accept);
            assert_eq!(decision.delay(), Duration::ZERO);
        }
        assert_eq!(decide(&chain, &mut stats, 0, 200, -1, -1), ThrottleDecision::Accept);
        assert_eq!(stats.voluntary_backoffs, 0);
    }

    #[test]
    fn low_quota_pauses_without_retrying() {
        let chain = ThrottleChain::default_with_threshold(40);
        let mut stats = Statistics::new();

        assert_eq!(
            decide(&chain, &mut stats, 0, 200, 39, 60),
            ThrottleDecision::AcceptAfter(VOLUNTARY_SHORT_PAUSE)
        );
        assert_eq!(
            decide(&chain, &mut stats, 0, 200, 21, 60),
            ThrottleDecision::AcceptAfter(VOLUNTARY_SHORT_PAUSE)
        );
        assert_eq!(
            decide(&chain, &mut stats, 0, 200, 20, 60),
            ThrottleDecision::AcceptAfter(VOLUNTARY_LONG_PAUSE)
        );
        assert_eq!(
            decide(&chain, &mut stats, 0, 404, 0, 60),
            ThrottleDecision::AcceptAfter(VOLUNTARY_LONG_PAUSE)
        );
        assert_eq!(stats.voluntary_backoffs, 4);
    }

    #[test]
    fn unauthorized_is_accepted_by_default_policy() {
        let chain = ThrottleChain::default_with_threshold(40);
        let mut stats = Statistics::new();
        assert!(!decide(&chain, &mut stats, 0, 401, 100, 60).is_retry());
    }

    #[test]
    fn custom_policy_can_delegate_to_parent() {
        let seen = Arc::new(AtomicU32::new(0));
        let chain = ThrottleChain::default_with_threshold(40).push(PolicyFn::new(
            Arc::clone(&seen),
            |input: &mut ThrottleInput<'_>, seen: &Arc<AtomicU32>, parent: Option<&ThrottleChain>| {
                seen.fetch_add(1, Ordering::SeqCst);
                if input.status == StatusCode::SERVICE_UNAVAILABLE {
                    return ThrottleDecision::RetryAfter(Duration::ZERO);
                }
                parent.map_or(ThrottleDecision::Accept, |p| p.decide(input))
            },
        ));
        let mut stats = Statistics::new();

        assert_eq!(chain.depth(), 2);
        assert!(decide(&chain, &mut stats, 0, 503, 100, 0).is_retry());
        assert_eq!(
            decide(&chain, &mut stats, 0, 429, 100, 1),
            ThrottleDecision::RetryAfter(Duration::from_secs(3))
        );
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(stats.throttle_429, 1);
    }

    #[test]
    fn custom_policy_may_ignore_parent() {
        let chain = ThrottleChain::default_with_threshold(40).push(PolicyFn::new(
            (),
            |_: &mut ThrottleInput<'_>, _: &(), _: Option<&ThrottleChain>| ThrottleDecision::Accept,
        ));
        let mut stats = Statistics::new();
        assert_eq!(decide(&chain, &mut stats, 0, 429, 0, 0), ThrottleDecision::Accept);
        assert_eq!(stats.throttle_429, 0);
    }
}
