use futures::TryStreamExt;
use numerous_client::{
    ErrorKind, LabelMatch, Numerous, NumerousConfig, NumerousError, Upload, WriteOptions,
};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{basic_auth, body_json, method, path, query_param, query_param_is_missing},
};

const KEY: &str = "nmrs_test_key";

async fn client(server: &MockServer) -> Numerous {
    let config = NumerousConfig {
        server: server.uri(),
        ..NumerousConfig::with_api_key(KEY)
    };
    Numerous::new(config).unwrap()
}

fn metric_record(id: &str, label: &str) -> Value {
    json!({
        "id": id,
        "label": label,
        "value": 1,
        "links": {"web": format!("https://n.numerousapp.com/m/{id}")},
    })
}

#[tokio::test]
async fn read_sends_basic_auth_and_fills_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/5746"))
        .and(basic_auth(KEY, ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(metric_record("5746", "coffee")))
        .expect(1)
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("5746");
    assert!(metric.cached().is_none());

    let record = metric.read().await.unwrap();
    assert_eq!(record["label"], "coffee");

    // served from the cache, the mock expects a single call
    assert_eq!(metric.label().await.unwrap(), "coffee");
    assert_eq!(
        metric.web_url().await.unwrap(),
        "https://n.numerousapp.com/m/5746"
    );
}

#[tokio::test]
async fn write_sends_options_and_drops_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/events"))
        .and(body_json(json!({"value": 2, "action": "ADD", "updated": "2024-01-01T00:00:00Z"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "e1", "value": 7})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metric_record("1", "x")))
        .expect(2)
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("1");
    metric.read().await.unwrap();
    let event = metric
        .write(
            2,
            WriteOptions {
                add: true,
                updated: Some("2024-01-01T00:00:00Z".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(event["value"], 7);
    assert!(metric.cached().is_none());
    metric.get("value").await.unwrap();
}

#[tokio::test]
async fn conditional_write_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/events"))
        .and(body_json(json!({"value": 5, "onlyIf": true})))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "value unchanged"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/events"))
        .and(body_json(json!({"value": 5})))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("1");

    let err = metric
        .write(5, WriteOptions { only_if: true, ..Default::default() })
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.code(), 409);

    let err = metric.write(5, WriteOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Api));
}

#[tokio::test]
async fn update_merges_current_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "1", "label": "a", "units": "m"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/metrics/1"))
        .and(body_json(json!({"id": "1", "label": "b", "units": "m"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "1", "label": "b", "units": "m"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/metrics/1"))
        .and(body_json(json!({"label": "c"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1", "label": "c"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("1");

    metric.update(json!({"label": "b"}), false).await.unwrap();
    assert_eq!(metric.cached().unwrap()["units"], "m");

    metric.update(json!({"label": "c"}), true).await.unwrap();
    assert_eq!(metric.label().await.unwrap(), "c");
}

#[tokio::test]
async fn events_follow_pages_and_drop_boundary_duplicates() {
    let server = MockServer::start().await;
    let next = format!("{}/v1/metrics/1/events?chunk=2", server.uri());
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1/events"))
        .and(query_param_is_missing("chunk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"id": "e3", "value": 3}, {"id": "e2", "value": 2}],
            "nextURL": next,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1/events"))
        .and(query_param("chunk", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"id": "e2", "value": 2}, {"id": "e1", "value": 1}],
            "nextURL": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let numerous = client(&server).await;
    let metric = numerous.metric("1");
    let events: Vec<Value> = metric.events().try_collect().await.unwrap();

    let ids: Vec<&str> = events.iter().filter_map(|e| e["id"].as_str()).collect();
    assert_eq!(ids, vec!["e3", "e2", "e1"]);

    let stats = numerous.statistics().await;
    assert_eq!(stats.first_chunks, 1);
    assert_eq!(stats.additional_chunks, 1);
    assert_eq!(stats.duplicates_filtered, 1);
}

#[tokio::test]
async fn client_is_usable_while_iterating() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/users/me/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": [metric_record("1", "a"), metric_record("2", "b")],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
        .expect(2)
        .mount(&server)
        .await;

    let numerous = client(&server).await;
    let mut metrics = numerous.metrics(None);
    let mut labels = Vec::new();
    while let Some(mut metric) = metrics.try_next().await.unwrap() {
        numerous.user(None).await.unwrap();
        labels.push(metric.label().await.unwrap());
    }
    assert_eq!(labels, vec!["a", "b"]);
}

async fn label_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/users/me/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": [
                metric_record("1", "coffee cups"),
                metric_record("2", "coffee"),
                metric_record("3", "tea"),
            ],
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn metric_by_label_modes() {
    let server = label_server().await;
    let numerous = client(&server).await;

    let first = numerous
        .metric_by_label("^coffee", LabelMatch::First)
        .await
        .unwrap();
    assert_eq!(first.id(), "1");

    let exact = numerous
        .metric_by_label("coffee", LabelMatch::Exact)
        .await
        .unwrap();
    assert_eq!(exact.id(), "2");

    let one = numerous.metric_by_label("^t", LabelMatch::One).await.unwrap();
    assert_eq!(one.id(), "3");
}

#[tokio::test]
async fn metric_by_label_failures() {
    let server = label_server().await;
    let numerous = client(&server).await;

    let err = numerous
        .metric_by_label("coffee", LabelMatch::One)
        .await
        .unwrap_err();
    assert!(matches!(err, NumerousError::AmbiguousLabel { count: 2, .. }));

    let err = numerous
        .metric_by_label("juice", LabelMatch::First)
        .await
        .unwrap_err();
    assert!(matches!(err, NumerousError::LabelNotFound { .. }));

    let err = numerous
        .metric_by_label("(", LabelMatch::First)
        .await
        .unwrap_err();
    assert!(matches!(err, NumerousError::InvalidLabelPattern { .. }));
}

#[tokio::test]
async fn create_metric_returns_cached_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics"))
        .and(body_json(json!({"label": "new", "value": 10, "private": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(metric_record("99", "new")))
        .expect(1)
        .mount(&server)
        .await;

    let metric = client(&server)
        .await
        .create_metric("new", Some(json!(10)), json!({"private": true}))
        .await
        .unwrap();

    assert_eq!(metric.id(), "99");
    assert_eq!(metric.cached().unwrap()["label"], "new");
}

#[tokio::test]
async fn interactions_return_new_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/interactions"))
        .and(body_json(json!({"kind": "like"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "i1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/interactions"))
        .and(body_json(json!({"kind": "comment", "commentBody": "hi"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 12})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/interactions"))
        .and(body_json(json!({"kind": "error", "commentBody": "sensor down"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "i3"})))
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("1");
    assert_eq!(metric.like().await.unwrap(), "i1");
    assert_eq!(metric.comment("hi").await.unwrap(), "12");
    assert_eq!(metric.send_error("sensor down").await.unwrap(), "i3");
}

#[tokio::test]
async fn subscribe_merges_existing_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1/subscriptions/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"notificationsEnabled": false, "userId": "u1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/metrics/1/subscriptions/me"))
        .and(body_json(json!({"notificationsEnabled": true, "userId": "u1"})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"notificationsEnabled": true, "userId": "u1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("1");
    let sub = metric
        .subscribe(json!({"notificationsEnabled": true}), None, false)
        .await
        .unwrap();
    assert_eq!(sub["notificationsEnabled"], true);
}

#[tokio::test]
async fn photo_url_reads_redirect_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1/photo"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://images.test/1.png")
                .set_body_string("<html>redirect</html>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/2/photo"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let numerous = client(&server).await;
    assert_eq!(
        numerous.metric("1").photo_url().await.unwrap().as_deref(),
        Some("https://images.test/1.png")
    );
    assert_eq!(numerous.metric("2").photo_url().await.unwrap(), None);
}

#[tokio::test]
async fn photo_upload_is_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics/1/photo"))
        .respond_with(ResponseTemplate::new(201).set_body_json(metric_record("1", "x")))
        .expect(1)
        .mount(&server)
        .await;

    let mut metric = client(&server).await.metric("1");
    metric
        .photo(Upload::bytes(&b"\x89PNG\r\n"[..], "image/png"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"image\""));
    assert!(body.contains("image/png"));
}

#[tokio::test]
async fn user_photo_and_photo_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/users/me/photo"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "u1", "photoURL": "https://images.test/u1.png"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/metrics/1/photo"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let numerous = client(&server).await;
    let user = numerous
        .user_photo(Upload::bytes(&b"GIF89a"[..], "image/gif"))
        .await
        .unwrap();
    assert_eq!(user["photoURL"], "https://images.test/u1.png");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"image\""));
    assert!(body.contains("image/gif"));

    numerous.metric("1").delete_photo().await.unwrap();
}

#[tokio::test]
async fn interaction_is_fetched_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/1/interactions/i7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "i7", "kind": "comment", "commentBody": "nice"})))
        .expect(1)
        .mount(&server)
        .await;

    let interaction = client(&server).await.metric("1").interaction("i7").await.unwrap();
    assert_eq!(interaction["commentBody"], "nice");
}

#[tokio::test]
async fn validate_propagates_server_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/7"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "down for maintenance"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/bad-id"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad id"})))
        .mount(&server)
        .await;

    let numerous = client(&server).await;
    let err = numerous.metric("7").validate().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Api));
    assert_eq!(err.code(), 503);

    assert!(!numerous.metric("bad-id").validate().await.unwrap());
}

#[tokio::test]
async fn validate_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/metrics/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/metrics/1/events/e9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let numerous = client(&server).await;
    assert!(!numerous.metric("gone").validate().await.unwrap());

    let mut metric = numerous.metric("1");
    metric.delete_event("e9").await.unwrap();
    metric.delete().await.unwrap();
}

#[tokio::test]
async fn unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).await.user(None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Auth));
    assert_eq!(err.code(), 401);
}

#[test]
fn empty_key_is_rejected() {
    let err = Numerous::new(NumerousConfig::default()).unwrap_err();
    assert!(matches!(err, NumerousError::Credentials { .. }));

    let err = Numerous::new(NumerousConfig {
        server: "not a url".to_string(),
        ..NumerousConfig::with_api_key(KEY)
    })
    .unwrap_err();
    assert!(matches!(err, NumerousError::Config { .. }));
}
