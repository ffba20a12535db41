use crate::Error as CrateError;
use bytes::Bytes;
use snafu::Snafu;

/// Transport-level failures reported by the HTTP transport.
///
/// None of these carry an HTTP status: a request that reached the server and got any
/// answer back is a response, not an `HttpError`. The executor folds all of them into
/// a single network error for callers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    /// Connection refused or reset, DNS failure, TLS failure, truncated body.
    #[snafu(display("HTTP transport error: {}", source))]
    Transport { source: CrateError },

    /// The request URL or headers were rejected before anything was sent.
    #[snafu(display("Invalid HTTP request: {}", details))]
    InvalidRequest { details: String },

    /// The transport's connect or read timeout elapsed.
    #[snafu(display("HTTP request timed out"))]
    Timeout,

    /// The request body could not be assembled (e.g. a malformed upload MIME type).
    #[snafu(display("Failed to build HTTP request: {}", details))]
    BuildRequest { details: String },
}

/// Encoded request body handed to the transport.
///
/// Cheap to clone so the same bytes can be resent on every retry.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Serialized JSON document.
    Json(Bytes),
    /// A single-part `multipart/form-data` upload.
    Multipart {
        field: &'static str,
        file_name: &'static str,
        mime_type: String,
        data: Bytes,
    },
}

/// Request shape accepted by dispatch transports.
pub type TransportRequest = http::Request<Option<Payload>>;

/// Response shape produced by dispatch transports: the body is fully buffered.
pub type TransportResponse = http::Response<Bytes>;
