use crate::Error as CrateError;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use snafu::Snafu;
use std::fmt;

/// High-level classification of a failed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The request never produced an HTTP response (connect, DNS, TLS, timeout).
    Network,
    /// HTTP 401.
    Auth,
    /// HTTP 409 answering a conditional write.
    Conflict,
    /// An accepted status whose body could not be understood.
    Protocol,
    /// Any other status outside the call's accepted set.
    Api,
    /// The request could not be assembled locally.
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "NetworkError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::Api => "APIError",
            ErrorKind::InvalidRequest => "InvalidRequest",
        };
        f.write_str(name)
    }
}

/// Maps a status outside a call's accepted set to an error kind.
///
/// `conditional` is set only for conditional writes, the one call site where the server
/// uses 409 to say "the condition did not hold".
pub fn classify(status: StatusCode, conditional: bool) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED => ErrorKind::Auth,
        StatusCode::CONFLICT if conditional => ErrorKind::Conflict,
        _ => ErrorKind::Api,
    }
}

/// What the server said when it refused a request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorDetails {
    pub kind: ErrorKind,
    pub code: i32,
    /// Reason phrase of the status line.
    pub reason: String,
    pub message: String,
    pub url: String,
    /// Response body, parsed as JSON when possible, otherwise as a string.
    pub body: Option<Value>,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}): {}",
            self.code, self.reason, self.url, self.message
        )
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DispatchError {
    #[snafu(display("Network error while requesting {}: {}", url, source))]
    Network { url: String, source: CrateError },

    #[snafu(display("Authorization failed: {}", details))]
    Auth { details: ErrorDetails },

    #[snafu(display("Conditional write rejected: {}", details))]
    Conflict { details: ErrorDetails },

    #[snafu(display(
        "Server sent an unparseable body with status {} from {}: {}",
        code,
        url,
        source
    ))]
    Protocol {
        code: i32,
        url: String,
        source: serde_json::Error,
    },

    #[snafu(display("API error: {}", details))]
    Api { details: ErrorDetails },

    #[snafu(display("Could not build request for {}: {}", url, source))]
    InvalidRequest { url: String, source: CrateError },
}

impl DispatchError {
    pub(crate) fn from_details(details: ErrorDetails) -> Self {
        match details.kind {
            ErrorKind::Auth => DispatchError::Auth { details },
            ErrorKind::Conflict => DispatchError::Conflict { details },
            _ => DispatchError::Api { details },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Network { .. } => ErrorKind::Network,
            DispatchError::Auth { .. } => ErrorKind::Auth,
            DispatchError::Conflict { .. } => ErrorKind::Conflict,
            DispatchError::Protocol { .. } => ErrorKind::Protocol,
            DispatchError::Api { .. } => ErrorKind::Api,
            DispatchError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
        }
    }

    /// HTTP status of the failed call, -1 when there was none.
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Network { .. } | DispatchError::InvalidRequest { .. } => -1,
            DispatchError::Protocol { code, .. } => *code,
            DispatchError::Auth { details }
            | DispatchError::Conflict { details }
            | DispatchError::Api { details } => details.code,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            DispatchError::Network { url, .. }
            | DispatchError::Protocol { url, .. }
            | DispatchError::InvalidRequest { url, .. } => url,
            DispatchError::Auth { details }
            | DispatchError::Conflict { details }
            | DispatchError::Api { details } => &details.url,
        }
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            DispatchError::Auth { details }
            | DispatchError::Conflict { details }
            | DispatchError::Api { details } => Some(details),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == i32::from(StatusCode::NOT_FOUND.as_u16())
    }
}
