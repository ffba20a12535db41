use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use http::{Method, StatusCode};
use tower::Service;

use crate::Error as CrateError;
use crate::dispatch::{
    DispatchSettings,
    http::{Payload, TransportRequest, TransportResponse},
};

pub(crate) const BASE_URL: &str = "https://api.test.invalid";

/// A request as the scripted transport saw it.
#[derive(Clone, Debug)]
pub(crate) struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub content_type: Option<String>,
    pub payload: Option<Payload>,
}

/// Canned responses, handed out in order, plus a log of what was sent.
#[derive(Default)]
pub(crate) struct Script {
    responses: Mutex<VecDeque<Result<TransportResponse, CrateError>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl Script {
    pub fn new(responses: Vec<Result<TransportResponse, CrateError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn sends(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

pub(crate) fn transport(
    script: Arc<Script>,
) -> impl Service<TransportRequest, Response = TransportResponse, Error = CrateError> + Clone {
    tower::service_fn(move |request: TransportRequest| {
        let script = Arc::clone(&script);
        async move {
            let (parts, payload) = request.into_parts();
            script.seen.lock().unwrap().push(SeenRequest {
                method: parts.method,
                url: parts.uri.to_string(),
                content_type: parts
                    .headers
                    .get(http::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                payload,
            });
            script
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".into()))
        }
    })
}

pub(crate) fn settings() -> DispatchSettings {
    DispatchSettings::builder().base_url(BASE_URL).build()
}

pub(crate) fn response(status: u16, body: &str) -> TransportResponse {
    let mut response = http::Response::new(Bytes::copy_from_slice(body.as_bytes()));
    *response.status_mut() = StatusCode::from_u16(status).unwrap();
    response
}

pub(crate) fn rate_limited(status: u16, body: &str, remaining: i64, reset: i64) -> TransportResponse {
    let mut response = response(status, body);
    let headers = response.headers_mut();
    headers.insert("x-rate-limit-remaining", remaining.into());
    headers.insert("x-rate-limit-reset", reset.into());
    response
}

pub(crate) fn ok(body: &str) -> Result<TransportResponse, CrateError> {
    Ok(response(200, body))
}
