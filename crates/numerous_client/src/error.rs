use numerous_dispatch::dispatch::error::{DispatchError, ErrorKind};
use snafu::Snafu;

use crate::credentials::CredentialError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NumerousError {
    #[snafu(context(false), display("{source}"))]
    Dispatch { source: DispatchError },

    #[snafu(context(false), display("Could not load API key: {source}"))]
    Credentials { source: CredentialError },

    #[snafu(display("Invalid client configuration: {details}"))]
    Config { details: String },

    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("No metric label matches {pattern:?}"))]
    LabelNotFound { pattern: String },

    #[snafu(display("{count} metric labels match {pattern:?}, expected exactly one"))]
    AmbiguousLabel { pattern: String, count: usize },

    #[snafu(display("Invalid label pattern {pattern:?}: {source}"))]
    InvalidLabelPattern {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Server response is missing field {field:?}"))]
    MissingField { field: String },
}

impl NumerousError {
    /// Classification of a failed server call, `None` for local failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            NumerousError::Dispatch { source } => Some(source.kind()),
            _ => None,
        }
    }

    /// HTTP status of a failed server call, -1 otherwise.
    pub fn code(&self) -> i32 {
        match self {
            NumerousError::Dispatch { source } => source.code(),
            _ => -1,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NumerousError::Dispatch { source } if source.is_not_found())
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == Some(ErrorKind::Conflict)
    }
}

pub(crate) fn missing(field: &str) -> NumerousError {
    NumerousError::MissingField {
        field: field.to_string(),
    }
}
