//! API key loading.
//!
//! A key spec is one of:
//!
//! | spec | source |
//! |------|--------|
//! | none | `NUMEROUSAPIKEY`, then `NUMEROUS_API_KEY` |
//! | `@-` | standard input |
//! | `@path` | the named file |
//! | anything else | the key itself |
//!
//! Whatever is read is trimmed. Text holding a JSON object with a `NumerousAPIKey`
//! member, as written by the web app's credential download, is unwrapped.

use std::{
    io::{self, Read},
    path::PathBuf,
};

use serde_json::Value;
use snafu::{ResultExt, Snafu};

pub const KEY_ENV: &str = "NUMEROUSAPIKEY";
pub const KEY_ENV_ALT: &str = "NUMEROUS_API_KEY";

const JSON_MEMBER: &str = "NumerousAPIKey";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CredentialError {
    #[snafu(display("Neither {KEY_ENV} nor {KEY_ENV_ALT} is set"))]
    Missing,

    #[snafu(display("Failed to read API key file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to read API key from stdin: {source}"))]
    ReadStdin { source: io::Error },

    #[snafu(display("API key is empty"))]
    Empty,
}

/// Resolves a key spec against the process environment and stdin.
pub fn resolve_api_key(spec: Option<&str>) -> Result<String, CredentialError> {
    resolve_with(
        spec,
        |name| std::env::var(name).ok(),
        || {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        },
    )
}

pub(crate) fn resolve_with<E, I>(
    spec: Option<&str>,
    env: E,
    stdin: I,
) -> Result<String, CredentialError>
where
    E: Fn(&str) -> Option<String>,
    I: FnOnce() -> io::Result<String>,
{
    let raw = match spec {
        None => env(KEY_ENV)
            .or_else(|| env(KEY_ENV_ALT))
            .ok_or(CredentialError::Missing)?,
        Some("@-") => stdin().context(ReadStdinSnafu)?,
        Some(spec) => match spec.strip_prefix('@') {
            Some(path) => {
                std::fs::read_to_string(path).context(ReadFileSnafu { path })?
            }
            None => spec.to_string(),
        },
    };

    let key = unwrap_json(raw.trim());
    if key.is_empty() {
        return Err(CredentialError::Empty);
    }
    Ok(key)
}

fn unwrap_json(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => match map.get(JSON_MEMBER).and_then(Value::as_str) {
            Some(key) => key.trim().to_string(),
            None => text.to_string(),
        },
        _ => text.to_string(),
    }
}
