use futures::stream::BoxStream;
use numerous_dispatch::dispatch::{
    context::{ApiDescriptor, RequestContext, Upload},
    error::ErrorKind,
};
use serde_json::{Map, Value, json};

use crate::{
    client::Numerous,
    endpoints::{self, ME},
    error::{NumerousError, missing},
};

/// Options for [`Metric::write`].
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// Only write if the value differs from the current one. An unchanged value is
    /// reported as a conflict error.
    pub only_if: bool,
    /// Add to the current value instead of replacing it.
    pub add: bool,
    /// Timestamp to record the event at, RFC 3339.
    pub updated: Option<String>,
}

/// Handle on one metric.
///
/// The handle remembers the last metric record it saw. Calls that change the metric
/// drop that copy before they are sent.
#[derive(Clone, Debug)]
pub struct Metric {
    client: Numerous,
    id: String,
    cache: Option<Value>,
}

/// The `id` member of a record as a string; the server uses both strings and numbers.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Shallow merge: members of `changes` replace members of `base`.
fn merge(base: Value, changes: Value) -> Value {
    match (base, changes) {
        (Value::Object(mut base), Value::Object(changes)) => {
            base.extend(changes);
            Value::Object(base)
        }
        (_, changes) => changes,
    }
}

impl Metric {
    pub(crate) fn new(client: Numerous, id: String) -> Self {
        Self {
            client,
            id,
            cache: None,
        }
    }

    pub(crate) fn with_cache(client: Numerous, id: String, record: Value) -> Self {
        Self {
            client,
            id,
            cache: Some(record),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The last metric record seen, without a request.
    pub fn cached(&self) -> Option<&Value> {
        self.cache.as_ref()
    }

    fn ctx(&self, descriptor: &ApiDescriptor) -> RequestContext {
        RequestContext::from_descriptor(descriptor, &[("metricId", self.id.as_str())])
    }

    fn item_ctx(
        &self,
        descriptor: &ApiDescriptor,
        name: &str,
        value: &str,
    ) -> RequestContext {
        RequestContext::from_descriptor(descriptor, &[("metricId", self.id.as_str()), (name, value)])
    }

    /// Fetches the metric record and caches it.
    pub async fn read(&mut self) -> Result<Value, NumerousError> {
        let record = self.client.call_value(&self.ctx(&endpoints::METRIC), None).await?;
        self.cache = Some(record.clone());
        Ok(record)
    }

    /// One member of the metric record, read from the cache when there is one.
    pub async fn get(&mut self, key: &str) -> Result<Option<Value>, NumerousError> {
        if self.cache.is_none() {
            self.read().await?;
        }
        Ok(self.cache.as_ref().and_then(|record| record.get(key)).cloned())
    }

    /// Whether the metric exists and is readable. Only "no such metric" answers (400,
    /// 404) yield `false`; other failures are returned.
    pub async fn validate(&mut self) -> Result<bool, NumerousError> {
        match self.read().await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == Some(ErrorKind::Api) && matches!(e.code(), 400 | 404) => {
                debug!(target: "numerous_client", metric = %self.id, code = e.code(), "Metric failed validation");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn label(&mut self) -> Result<String, NumerousError> {
        self.get("label")
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| missing("label"))
    }

    /// Link to the metric in the web app.
    pub async fn web_url(&mut self) -> Result<String, NumerousError> {
        self.get("links")
            .await?
            .and_then(|links| links.get("web").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| missing("links.web"))
    }

    /// Writes a new value. Returns the resulting event.
    ///
    /// With [`WriteOptions::only_if`], a write that would not change the value fails
    /// with a conflict error, see [`NumerousError::is_conflict`].
    pub async fn write(
        &mut self,
        value: impl Into<Value>,
        options: WriteOptions,
    ) -> Result<Value, NumerousError> {
        self.cache = None;
        let mut body = Map::new();
        body.insert("value".to_string(), value.into());
        if options.only_if {
            body.insert("onlyIf".to_string(), Value::Bool(true));
        }
        if options.add {
            body.insert("action".to_string(), Value::String("ADD".to_string()));
        }
        if let Some(updated) = options.updated {
            body.insert("updated".to_string(), Value::String(updated));
        }

        let ctx = self
            .ctx(&endpoints::METRIC_WRITE)
            .with_conditional(options.only_if);
        self.client.call_value(&ctx, Some(Value::Object(body).into())).await
    }

    /// Changes metric attributes. Unless `overwrite_all`, the current record is read
    /// first and `attrs` is merged into it, so unnamed attributes keep their values.
    pub async fn update(&mut self, attrs: Value, overwrite_all: bool) -> Result<Value, NumerousError> {
        self.cache = None;
        let body = if overwrite_all {
            attrs
        } else {
            let current = self
                .client
                .call_value(&self.ctx(&endpoints::METRIC), None)
                .await?;
            merge(current, attrs)
        };
        let record = self
            .client
            .call_value(&self.ctx(&endpoints::METRIC_UPDATE), Some(body.into()))
            .await?;
        self.cache = Some(record.clone());
        Ok(record)
    }

    pub async fn delete(&mut self) -> Result<(), NumerousError> {
        self.cache = None;
        self.client
            .call(&self.ctx(&endpoints::METRIC_DELETE), None)
            .await?;
        info!(target: "numerous_client", metric = %self.id, "Metric deleted");
        Ok(())
    }

    /// Events, newest first.
    pub fn events(&self) -> BoxStream<'static, Result<Value, NumerousError>> {
        self.client.paginate(self.ctx(&endpoints::METRIC_EVENTS))
    }

    /// Events and interactions merged, newest first.
    pub fn stream(&self) -> BoxStream<'static, Result<Value, NumerousError>> {
        self.client.paginate(self.ctx(&endpoints::METRIC_STREAM))
    }

    pub fn interactions(&self) -> BoxStream<'static, Result<Value, NumerousError>> {
        self.client.paginate(self.ctx(&endpoints::METRIC_INTERACTIONS))
    }

    pub fn subscriptions(&self) -> BoxStream<'static, Result<Value, NumerousError>> {
        self.client.paginate(self.ctx(&endpoints::METRIC_SUBSCRIPTIONS))
    }

    pub async fn event(&self, event_id: &str) -> Result<Value, NumerousError> {
        let ctx = self.item_ctx(&endpoints::METRIC_EVENT, "eventId", event_id);
        self.client.call_value(&ctx, None).await
    }

    pub async fn delete_event(&mut self, event_id: &str) -> Result<(), NumerousError> {
        self.cache = None;
        let ctx = self.item_ctx(&endpoints::METRIC_EVENT_DELETE, "eventId", event_id);
        self.client.call(&ctx, None).await?;
        Ok(())
    }

    pub async fn interaction(&self, item_id: &str) -> Result<Value, NumerousError> {
        let ctx = self.item_ctx(&endpoints::METRIC_INTERACTION, "itemId", item_id);
        self.client.call_value(&ctx, None).await
    }

    pub async fn delete_interaction(&mut self, item_id: &str) -> Result<(), NumerousError> {
        self.cache = None;
        let ctx = self.item_ctx(&endpoints::METRIC_INTERACTION_DELETE, "itemId", item_id);
        self.client.call(&ctx, None).await?;
        Ok(())
    }

    async fn interact(&mut self, body: Value) -> Result<String, NumerousError> {
        self.cache = None;
        let created = self
            .client
            .call_value(&self.ctx(&endpoints::METRIC_INTERACT), Some(body.into()))
            .await?;
        id_string(&created).ok_or_else(|| missing("id"))
    }

    /// Likes the metric. Returns the id of the new interaction.
    pub async fn like(&mut self) -> Result<String, NumerousError> {
        self.interact(json!({"kind": "like"})).await
    }

    pub async fn comment(&mut self, text: &str) -> Result<String, NumerousError> {
        self.interact(json!({"kind": "comment", "commentBody": text}))
            .await
    }

    /// Posts an error interaction, shown to subscribers as an alert.
    pub async fn send_error(&mut self, text: &str) -> Result<String, NumerousError> {
        self.interact(json!({"kind": "error", "commentBody": text}))
            .await
    }

    /// A user's subscription to this metric, the authenticated user when `None`.
    pub async fn subscription(&self, user_id: Option<&str>) -> Result<Value, NumerousError> {
        let ctx = self.item_ctx(&endpoints::SUBSCRIPTION, "userId", user_id.unwrap_or(ME));
        self.client.call_value(&ctx, None).await
    }

    /// Creates or changes a subscription. Unless `overwrite_all`, the existing
    /// subscription is read first and `attrs` merged into it.
    pub async fn subscribe(
        &mut self,
        attrs: Value,
        user_id: Option<&str>,
        overwrite_all: bool,
    ) -> Result<Value, NumerousError> {
        self.cache = None;
        let body = if overwrite_all {
            attrs
        } else {
            merge(self.subscription(user_id).await?, attrs)
        };
        let ctx = self.item_ctx(&endpoints::SUBSCRIBE, "userId", user_id.unwrap_or(ME));
        self.client.call_value(&ctx, Some(body.into())).await
    }

    /// Sets the metric photo. Returns the updated metric record.
    pub async fn photo(&mut self, upload: Upload) -> Result<Value, NumerousError> {
        self.cache = None;
        self.client
            .call_value(&self.ctx(&endpoints::METRIC_PHOTO_SET), Some(upload.into()))
            .await
    }

    /// Where the metric photo can be downloaded, `None` when the metric has none.
    pub async fn photo_url(&self) -> Result<Option<String>, NumerousError> {
        match self
            .client
            .call(&self.ctx(&endpoints::METRIC_PHOTO_GET), None)
            .await
        {
            Ok(response) => Ok(response.location().map(str::to_string)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_photo(&mut self) -> Result<(), NumerousError> {
        self.cache = None;
        self.client
            .call(&self.ctx(&endpoints::METRIC_PHOTO_DELETE), None)
            .await?;
        Ok(())
    }
}
