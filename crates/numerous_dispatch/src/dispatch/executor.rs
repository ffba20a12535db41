use bytes::Bytes;
use http::{
    HeaderMap, Method, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, LOCATION},
};
use serde_json::{Map, Value};
use snafu::ResultExt;
use tokio::time::{Instant, sleep};
use tower::{Service, ServiceExt};

use crate::Error as CrateError;

use super::{
    DispatchSettings,
    context::{RequestBody, RequestContext},
    error::{
        DispatchError, ErrorDetails, InvalidRequestSnafu, NetworkSnafu, ProtocolSnafu, classify,
    },
    http::{Payload, TransportRequest, TransportResponse},
    internal_event::{DelayKind, InternalEvent, RequestCompleted, RetryCeilingReached, ThrottleDelay},
    stats::Statistics,
    throttle::{RequestEcho, ThrottleChain, ThrottleInput, ThrottlePolicy},
};

pub const RATE_REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RATE_RESET_HEADER: &str = "x-rate-limit-reset";

/// The interpreted result of one successful call.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body; an empty object when the server sent nothing.
    pub value: Value,
}

impl ApiResponse {
    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

/// Sends requests through a transport under control of a throttle-policy chain.
///
/// One logical request at a time: every method takes `&mut self`, and the statistics
/// are owned by the executor.
pub struct RequestExecutor<S> {
    transport: S,
    settings: DispatchSettings,
    chain: ThrottleChain,
    stats: Statistics,
}

impl<S> std::fmt::Debug for RequestExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("settings", &self.settings)
            .field("chain", &self.chain)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<S> RequestExecutor<S>
where
    S: Service<TransportRequest, Response = TransportResponse>,
    S::Error: Into<CrateError>,
{
    /// An executor using only the built-in throttle policy.
    pub fn new(transport: S, settings: DispatchSettings) -> Self {
        let chain = ThrottleChain::default_with_threshold(settings.voluntary_threshold);
        Self::with_chain(transport, settings, chain)
    }

    /// An executor that consults `policy` first, with the built-in policy as its parent.
    pub fn with_throttle(transport: S, settings: DispatchSettings, policy: impl ThrottlePolicy) -> Self {
        let chain = ThrottleChain::default_with_threshold(settings.voluntary_threshold).push(policy);
        Self::with_chain(transport, settings, chain)
    }

    pub fn with_chain(transport: S, settings: DispatchSettings, chain: ThrottleChain) -> Self {
        let stats = match settings.response_time_history {
            Some(len) => Statistics::with_response_time_history(len),
            None => Statistics::new(),
        };
        Self {
            transport,
            settings,
            chain,
            stats,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    pub fn chain(&self) -> &ThrottleChain {
        &self.chain
    }

    /// Performs one logical request.
    ///
    /// `override_url` replaces the context's target; pagination uses it for
    /// server-supplied next-page links.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Network`] when the transport fails; never retried
    /// - [`DispatchError::Auth`], [`DispatchError::Conflict`], [`DispatchError::Api`]
    ///   when the final status is outside the context's accepted set
    /// - [`DispatchError::Protocol`] when an accepted status carries a body that is not
    ///   JSON
    /// - [`DispatchError::InvalidRequest`] when the request cannot be built
    pub async fn execute(
        &mut self,
        ctx: &RequestContext,
        body: Option<RequestBody>,
        override_url: Option<&str>,
    ) -> Result<ApiResponse, DispatchError> {
        self.stats.simple_api += 1;

        let url = match override_url {
            Some(url) => url.to_string(),
            None => ctx.target.resolve(&self.settings.base_url),
        };
        let payload = encode_body(body, &url).await?;
        let echo = RequestEcho {
            method: ctx.method.clone(),
            url: url.clone(),
        };

        let mut attempt = 0u32;
        let response = loop {
            let request = build_request(&ctx.method, &url, payload.clone())
                .context(InvalidRequestSnafu { url: url.as_str() })?;

            self.stats.server_requests += 1;
            debug!(
                message = "Sending request.",
                method = %ctx.method,
                url = %url,
                attempt,
            );
            let started = Instant::now();
            let response = self
                .send(request)
                .await
                .context(NetworkSnafu { url: url.as_str() })?;
            let elapsed = started.elapsed();
            self.stats.record_response_time(elapsed);

            let status = response.status();
            RequestCompleted {
                method: &ctx.method,
                status,
                attempt,
                elapsed,
            }
            .emit();

            let rate_remaining = header_i64(response.headers(), RATE_REMAINING_HEADER);
            let rate_reset = header_i64(response.headers(), RATE_RESET_HEADER);
            self.stats.rate_remaining = rate_remaining;
            self.stats.rate_reset = rate_reset;

            let decision = {
                let mut input = ThrottleInput {
                    attempt,
                    rate_remaining,
                    rate_reset,
                    status,
                    stats: &mut self.stats,
                    request: &echo,
                };
                self.chain.decide(&mut input)
            };

            let retry = decision.is_retry()
                && status != StatusCode::UNAUTHORIZED
                && attempt + 1 < self.settings.max_attempts;

            if decision.is_retry() && !retry {
                if status == StatusCode::UNAUTHORIZED {
                    debug!(message = "Not retrying an authorization failure.", url = %url);
                } else {
                    RetryCeilingReached {
                        attempts: attempt + 1,
                    }
                    .emit();
                }
            }

            let delay = decision.delay();
            if !delay.is_zero() && (retry || !decision.is_retry()) {
                let kind = if retry {
                    DelayKind::Retry
                } else {
                    DelayKind::Voluntary
                };
                ThrottleDelay { kind, delay }.emit();
                sleep(delay).await;
            }

            if retry {
                attempt += 1;
                continue;
            }
            break response;
        };

        interpret(ctx, &url, response)
    }

    async fn send(&mut self, request: TransportRequest) -> Result<TransportResponse, CrateError> {
        let svc = self.transport.ready().await.map_err(Into::into)?;
        svc.call(request).await.map_err(Into::into)
    }
}

async fn encode_body(body: Option<RequestBody>, url: &str) -> Result<Option<Payload>, DispatchError> {
    match body {
        None => Ok(None),
        Some(RequestBody::Json(value)) => {
            let bytes = serde_json::to_vec(&value)
                .map_err(CrateError::from)
                .context(InvalidRequestSnafu { url })?;
            Ok(Some(Payload::Json(Bytes::from(bytes))))
        }
        Some(RequestBody::Upload(upload)) => {
            let (data, mime_type) = upload
                .into_bytes()
                .await
                .map_err(CrateError::from)
                .context(InvalidRequestSnafu { url })?;
            Ok(Some(Payload::Multipart {
                field: "image",
                file_name: "image",
                mime_type,
                data,
            }))
        }
    }
}

fn build_request(
    method: &Method,
    url: &str,
    payload: Option<Payload>,
) -> Result<TransportRequest, CrateError> {
    let mut builder = http::Request::builder()
        .method(method.clone())
        .uri(url)
        .header(ACCEPT, "application/json");
    if let Some(Payload::Json(_)) = &payload {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }
    Ok(builder.body(payload)?)
}

fn header_i64(headers: &HeaderMap, name: &str) -> i64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(-1)
}

fn interpret(
    ctx: &RequestContext,
    url: &str,
    response: TransportResponse,
) -> Result<ApiResponse, DispatchError> {
    let (parts, body) = response.into_parts();
    let status = parts.status;
    let code = i32::from(status.as_u16());

    if ctx.accepts(status) {
        let value = if ctx.ignore_body || body.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&body).context(ProtocolSnafu { code, url })?
        };
        return Ok(ApiResponse {
            status,
            headers: parts.headers,
            value,
        });
    }

    let kind = classify(status, ctx.conditional);
    let body = parse_error_body(&body);
    let message = body
        .as_ref()
        .and_then(|b| b.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "{} {} returned unexpected status {}",
                ctx.method, url, code
            )
        });
    let details = ErrorDetails {
        kind,
        code,
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        message,
        url: url.to_string(),
        body,
    };
    error!(
        message = "Request failed.",
        kind = %details.kind,
        code = details.code,
        url = %details.url,
        reason = %details.message,
    );
    Err(DispatchError::from_details(details))
}

fn parse_error_body(body: &Bytes) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())),
    )
}
