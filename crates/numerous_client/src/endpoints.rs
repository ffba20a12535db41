//! Endpoint table of the Numerous REST API.
//!
//! Placeholders: `%{userId}`, `%{metricId}`, `%{eventId}`, `%{itemId}`. A missing
//! user id means the authenticated user, `me`.

use http::Method;
use numerous_dispatch::dispatch::context::ApiDescriptor;

pub const ME: &str = "me";

pub const USER: ApiDescriptor = ApiDescriptor::new("user", Method::GET, "/v1/users/%{userId}");

pub const USER_PHOTO: ApiDescriptor =
    ApiDescriptor::new("user_photo", Method::POST, "/v1/users/%{userId}/photo")
        .success_codes(&[200, 201]);

pub const USER_METRICS: ApiDescriptor =
    ApiDescriptor::new("user_metrics", Method::GET, "/v2/users/%{userId}/metrics")
        .paginated("metrics", "nextURL");

pub const USER_SUBSCRIPTIONS: ApiDescriptor = ApiDescriptor::new(
    "user_subscriptions",
    Method::GET,
    "/v2/users/%{userId}/subscriptions",
)
.paginated("subscriptions", "nextURL");

pub const METRIC_CREATE: ApiDescriptor =
    ApiDescriptor::new("metric_create", Method::POST, "/v1/metrics").success_codes(&[201]);

pub const METRIC: ApiDescriptor =
    ApiDescriptor::new("metric", Method::GET, "/v1/metrics/%{metricId}");

pub const METRIC_UPDATE: ApiDescriptor =
    ApiDescriptor::new("metric_update", Method::PUT, "/v1/metrics/%{metricId}");

pub const METRIC_DELETE: ApiDescriptor =
    ApiDescriptor::new("metric_delete", Method::DELETE, "/v1/metrics/%{metricId}")
        .success_codes(&[200, 204]);

pub const METRIC_EVENTS: ApiDescriptor =
    ApiDescriptor::new("events", Method::GET, "/v1/metrics/%{metricId}/events")
        .paginated("events", "nextURL")
        .dedup_on("id");

/// Writes are made conditional per call, see [`crate::WriteOptions::only_if`].
pub const METRIC_WRITE: ApiDescriptor =
    ApiDescriptor::new("write", Method::POST, "/v1/metrics/%{metricId}/events")
        .success_codes(&[200, 201]);

pub const METRIC_EVENT: ApiDescriptor = ApiDescriptor::new(
    "event",
    Method::GET,
    "/v1/metrics/%{metricId}/events/%{eventId}",
);

pub const METRIC_EVENT_DELETE: ApiDescriptor = ApiDescriptor::new(
    "event_delete",
    Method::DELETE,
    "/v1/metrics/%{metricId}/events/%{eventId}",
)
.success_codes(&[200, 204]);

pub const METRIC_STREAM: ApiDescriptor =
    ApiDescriptor::new("stream", Method::GET, "/v2/metrics/%{metricId}/stream")
        .paginated("items", "next")
        .dedup_on("id");

pub const METRIC_INTERACTIONS: ApiDescriptor = ApiDescriptor::new(
    "interactions",
    Method::GET,
    "/v2/metrics/%{metricId}/interactions",
)
.paginated("interactions", "nextURL")
.dedup_on("id");

pub const METRIC_INTERACT: ApiDescriptor =
    ApiDescriptor::new("interact", Method::POST, "/v1/metrics/%{metricId}/interactions")
        .success_codes(&[201]);

pub const METRIC_INTERACTION: ApiDescriptor = ApiDescriptor::new(
    "interaction",
    Method::GET,
    "/v1/metrics/%{metricId}/interactions/%{itemId}",
);

pub const METRIC_INTERACTION_DELETE: ApiDescriptor = ApiDescriptor::new(
    "interaction_delete",
    Method::DELETE,
    "/v1/metrics/%{metricId}/interactions/%{itemId}",
)
.success_codes(&[200, 204]);

pub const METRIC_SUBSCRIPTIONS: ApiDescriptor = ApiDescriptor::new(
    "metric_subscriptions",
    Method::GET,
    "/v2/metrics/%{metricId}/subscriptions",
)
.paginated("subscriptions", "nextURL");

pub const SUBSCRIPTION: ApiDescriptor = ApiDescriptor::new(
    "subscription",
    Method::GET,
    "/v1/metrics/%{metricId}/subscriptions/%{userId}",
);

pub const SUBSCRIBE: ApiDescriptor = ApiDescriptor::new(
    "subscribe",
    Method::PUT,
    "/v1/metrics/%{metricId}/subscriptions/%{userId}",
)
.success_codes(&[200, 201]);

pub const METRIC_PHOTO_SET: ApiDescriptor =
    ApiDescriptor::new("photo_set", Method::POST, "/v1/metrics/%{metricId}/photo")
        .success_codes(&[200, 201]);

/// The server answers with a redirect to the image; only `Location` matters.
pub const METRIC_PHOTO_GET: ApiDescriptor =
    ApiDescriptor::new("photo_get", Method::GET, "/v1/metrics/%{metricId}/photo")
        .success_codes(&[302])
        .ignore_body();

pub const METRIC_PHOTO_DELETE: ApiDescriptor =
    ApiDescriptor::new("photo_delete", Method::DELETE, "/v1/metrics/%{metricId}/photo")
        .success_codes(&[200, 204]);
