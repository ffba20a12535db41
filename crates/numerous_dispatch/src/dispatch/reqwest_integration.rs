use super::http::{HttpError, Payload, TransportRequest, TransportResponse};
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use std::task::{Context, Poll};
use tower::Service;

/// A `tower::Service` wrapper for `reqwest::Client`.
///
/// Accepts `http::Request<Option<Payload>>`, buffers the whole response body and hands
/// back an `http::Response<Bytes>` whatever the status code: deciding what a status
/// means is the executor's job, not the transport's.
#[derive(Clone)]
pub struct ReqwestService {
    client: reqwest::Client,
    basic_auth: Option<String>,
}

impl ReqwestService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            basic_auth: None,
        }
    }

    pub fn new_with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            basic_auth: None,
        }
    }

    /// Authenticate every request with `api_key` as the basic-auth user and an empty
    /// password.
    pub fn with_basic_auth(mut self, api_key: impl Into<String>) -> Self {
        self.basic_auth = Some(api_key.into());
        self
    }
}

impl Default for ReqwestService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReqwestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestService")
            .field("basic_auth", &self.basic_auth.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Service<TransportRequest> for ReqwestService {
    type Response = TransportResponse;
    type Error = HttpError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, http_request: TransportRequest) -> Self::Future {
        let (parts, payload) = http_request.into_parts();

        let url_str = parts.uri.to_string();
        let url = match reqwest::Url::parse(&url_str) {
            Ok(u) => u,
            Err(parse_err) => {
                let ge = HttpError::InvalidRequest {
                    details: format!("Invalid URL '{}': {}", url_str, parse_err),
                };
                return Box::pin(async move { Err(ge) });
            }
        };

        let mut request_builder = self.client.request(parts.method, url);

        for (header_name, header_value) in parts.headers.iter() {
            request_builder = request_builder.header(header_name, header_value);
        }

        if let Some(api_key) = &self.basic_auth {
            request_builder = request_builder.basic_auth(api_key, Some(""));
        }

        match payload {
            Some(Payload::Json(bytes)) => {
                request_builder = request_builder.body(bytes);
            }
            Some(Payload::Multipart {
                field,
                file_name,
                mime_type,
                data,
            }) => {
                let part = match Part::bytes(data.to_vec())
                    .file_name(file_name)
                    .mime_str(&mime_type)
                {
                    Ok(part) => part,
                    Err(e) => {
                        let ge = HttpError::BuildRequest {
                            details: format!("Invalid upload MIME type '{}': {}", mime_type, e),
                        };
                        return Box::pin(async move { Err(ge) });
                    }
                };
                request_builder = request_builder.multipart(Form::new().part(field, part));
            }
            None => {}
        }

        let request_future = request_builder.send();
        Box::pin(async move {
            let response = request_future.await.map_err(classify_reqwest_error)?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(classify_reqwest_error)?;

            let mut transport_response = http::Response::new(body);
            *transport_response.status_mut() = status;
            *transport_response.headers_mut() = headers;
            Ok(transport_response)
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        warn!(error = %e, "Request timed out");
        HttpError::Timeout
    } else if e.is_builder() {
        error!(error = %e, "Request builder error");
        HttpError::BuildRequest {
            details: e.to_string(),
        }
    } else {
        error!(error = %e, "Transport error");
        HttpError::Transport {
            source: Box::new(e),
        }
    }
}
