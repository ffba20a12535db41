use std::sync::Arc;

use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use numerous_dispatch::dispatch::{
    DispatchSettings,
    context::{RequestBody, RequestContext, Upload},
    executor::{ApiResponse, RequestExecutor},
    paginate::Paginator,
    reqwest_integration::ReqwestService,
    stats::Statistics,
};
use regex::Regex;
use serde_json::{Map, Value};
use snafu::ResultExt;
use tokio::sync::Mutex;

use crate::{
    config::NumerousConfig,
    endpoints::{self, ME},
    error::{HttpClientSnafu, InvalidLabelPatternSnafu, NumerousError, missing},
    metric::{Metric, id_string},
};

type Executor = RequestExecutor<ReqwestService>;

/// How [`Numerous::metric_by_label`] matches labels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LabelMatch {
    /// First metric whose label contains a match of the regex.
    #[default]
    First,
    /// Like `First`, but more than one match is an error.
    One,
    /// Label equal to the pattern string.
    Exact,
}

/// Client for one Numerous account.
///
/// Cloning is cheap: clones share one executor, so they share its throttle state and
/// statistics. Requests from all clones are sent one at a time.
#[derive(Clone)]
pub struct Numerous {
    executor: Arc<Mutex<Executor>>,
    server: Arc<str>,
}

impl std::fmt::Debug for Numerous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Numerous")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl Numerous {
    pub fn new(config: NumerousConfig) -> Result<Self, NumerousError> {
        if config.api_key.trim().is_empty() {
            return Err(crate::credentials::CredentialError::Empty.into());
        }
        let server = config.server.trim_end_matches('/').to_string();
        match server.parse::<http::Uri>() {
            Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => {}
            _ => {
                return Err(NumerousError::Config {
                    details: format!("server {:?} is not an absolute URL", config.server),
                });
            }
        }

        let client = match config.reqwest_client.clone() {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(config.request_timeout)
                .connect_timeout(config.connect_timeout)
                .user_agent(config.user_agent.as_str())
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .context(HttpClientSnafu)?,
        };
        let transport = ReqwestService::new_with_client(client).with_basic_auth(&config.api_key);

        let settings = DispatchSettings::builder()
            .base_url(server.clone())
            .max_attempts(config.max_attempts)
            .voluntary_threshold(config.voluntary_threshold)
            .duplicate_filter(config.duplicate_filter)
            .maybe_response_time_history(config.response_time_history)
            .build();

        let executor = match config.throttle.clone() {
            Some(policy) => RequestExecutor::with_throttle(transport, settings, policy),
            None => RequestExecutor::new(transport, settings),
        };

        info!(target: "numerous_client", server = %server, "Numerous client initialized");
        debug!(target: "numerous_client", config = ?config, "Full client configuration");

        Ok(Self {
            executor: Arc::new(Mutex::new(executor)),
            server: server.into(),
        })
    }

    /// A client configured from `.env` and the process environment.
    pub fn from_env() -> Result<Self, NumerousError> {
        Self::new(NumerousConfig::from_env()?)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Snapshot of the executor's counters.
    pub async fn statistics(&self) -> Statistics {
        self.executor.lock().await.stats().clone()
    }

    pub(crate) async fn call(
        &self,
        ctx: &RequestContext,
        body: Option<RequestBody>,
    ) -> Result<ApiResponse, NumerousError> {
        let mut executor = self.executor.lock().await;
        Ok(executor.execute(ctx, body, None).await?)
    }

    pub(crate) async fn call_value(
        &self,
        ctx: &RequestContext,
        body: Option<RequestBody>,
    ) -> Result<Value, NumerousError> {
        Ok(self.call(ctx, body).await?.into_value())
    }

    /// Items of a paginated collection. The executor is locked per item, never across
    /// the consumer's own work.
    pub(crate) fn paginate(&self, ctx: RequestContext) -> BoxStream<'static, Result<Value, NumerousError>> {
        let executor = Arc::clone(&self.executor);
        stream::try_unfold(
            (Paginator::new(ctx), executor),
            |(mut pager, executor)| async move {
                let item = {
                    let mut guard = executor.lock().await;
                    pager.next_item(&mut *guard).await?
                };
                Ok::<_, NumerousError>(item.map(|item| (item, (pager, executor))))
            },
        )
        .boxed()
    }

    /// A user record, the authenticated user when `user_id` is `None`.
    pub async fn user(&self, user_id: Option<&str>) -> Result<Value, NumerousError> {
        let ctx = RequestContext::from_descriptor(
            &endpoints::USER,
            &[("userId", user_id.unwrap_or(ME))],
        );
        self.call_value(&ctx, None).await
    }

    /// Sets the authenticated user's photo. Returns the updated user record.
    pub async fn user_photo(&self, upload: Upload) -> Result<Value, NumerousError> {
        let ctx = RequestContext::from_descriptor(&endpoints::USER_PHOTO, &[("userId", ME)]);
        self.call_value(&ctx, Some(upload.into())).await
    }

    /// Metrics owned by a user. Each handle arrives with its cache filled from the
    /// listing.
    pub fn metrics(&self, user_id: Option<&str>) -> BoxStream<'static, Result<Metric, NumerousError>> {
        let ctx = RequestContext::from_descriptor(
            &endpoints::USER_METRICS,
            &[("userId", user_id.unwrap_or(ME))],
        );
        let client = self.clone();
        self.paginate(ctx)
            .and_then(move |value| {
                let client = client.clone();
                async move {
                    let id = id_string(&value).ok_or_else(|| missing("id"))?;
                    Ok::<_, NumerousError>(Metric::with_cache(client, id, value))
                }
            })
            .boxed()
    }

    /// Subscriptions held by a user.
    pub fn subscriptions(&self, user_id: Option<&str>) -> BoxStream<'static, Result<Value, NumerousError>> {
        let ctx = RequestContext::from_descriptor(
            &endpoints::USER_SUBSCRIPTIONS,
            &[("userId", user_id.unwrap_or(ME))],
        );
        self.paginate(ctx)
    }

    /// Creates a metric. `attrs` must be a JSON object or null; `label` and `value`
    /// override members of the same name.
    pub async fn create_metric(
        &self,
        label: &str,
        value: Option<Value>,
        attrs: Value,
    ) -> Result<Metric, NumerousError> {
        let mut body = match attrs {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(NumerousError::Config {
                    details: format!("metric attributes must be an object, got {other}"),
                });
            }
        };
        body.insert("label".to_string(), Value::String(label.to_string()));
        if let Some(value) = value {
            body.insert("value".to_string(), value);
        }

        let ctx = RequestContext::from_descriptor(&endpoints::METRIC_CREATE, &[]);
        let created = self.call_value(&ctx, Some(Value::Object(body).into())).await?;
        let id = id_string(&created).ok_or_else(|| missing("id"))?;
        info!(target: "numerous_client", metric = %id, label, "Metric created");
        Ok(Metric::with_cache(self.clone(), id, created))
    }

    /// A handle on a metric. No request is made.
    pub fn metric(&self, id: impl Into<String>) -> Metric {
        Metric::new(self.clone(), id.into())
    }

    /// Finds one of the authenticated user's metrics by label.
    pub async fn metric_by_label(
        &self,
        pattern: &str,
        how: LabelMatch,
    ) -> Result<Metric, NumerousError> {
        let regex = match how {
            LabelMatch::Exact => None,
            LabelMatch::First | LabelMatch::One => {
                Some(Regex::new(pattern).context(InvalidLabelPatternSnafu { pattern })?)
            }
        };
        let matches = |label: &str| match &regex {
            Some(regex) => regex.is_match(label),
            None => label == pattern,
        };

        let mut metrics = self.metrics(None);
        let mut found: Option<Metric> = None;
        let mut count = 0usize;
        while let Some(metric) = metrics.try_next().await? {
            let hit = metric
                .cached()
                .and_then(|m| m.get("label"))
                .and_then(Value::as_str)
                .is_some_and(&matches);
            if !hit {
                continue;
            }
            count += 1;
            if how != LabelMatch::One {
                return Ok(metric);
            }
            found.get_or_insert(metric);
        }

        match found {
            Some(_) if count > 1 => Err(NumerousError::AmbiguousLabel {
                pattern: pattern.to_string(),
                count,
            }),
            Some(metric) => Ok(metric),
            None => Err(NumerousError::LabelNotFound {
                pattern: pattern.to_string(),
            }),
        }
    }
}
