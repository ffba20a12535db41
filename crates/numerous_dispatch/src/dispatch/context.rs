//! Static endpoint descriptors and the per-call contexts built from them.

use bytes::Bytes;
use http::{Method, StatusCode};
use std::{fmt, pin::Pin};
use tokio::io::{AsyncRead, AsyncReadExt};

const DEFAULT_SUCCESS_CODES: &[u16] = &[200];

/// Static metadata about one API operation.
///
/// Descriptors are `const`-constructible so an endpoint table can live in a `const`
/// item:
///
/// ```rust
/// use http::Method;
/// use numerous_dispatch::dispatch::context::ApiDescriptor;
///
/// const EVENTS: ApiDescriptor =
///     ApiDescriptor::new("events", Method::GET, "/v1/metrics/%{metricId}/events")
///         .paginated("events", "nextURL")
///         .dedup_on("id");
/// assert_eq!(EVENTS.list_field, Some("events"));
/// ```
#[derive(Clone, Debug)]
pub struct ApiDescriptor {
    pub name: &'static str,
    pub method: Method,
    /// Path with `%{name}` placeholders.
    pub path: &'static str,
    pub success_codes: &'static [u16],
    pub next_field: Option<&'static str>,
    pub list_field: Option<&'static str>,
    pub dup_filter: Option<&'static str>,
    pub conditional: bool,
    pub ignore_body: bool,
}

impl ApiDescriptor {
    pub const fn new(name: &'static str, method: Method, path: &'static str) -> Self {
        Self {
            name,
            method,
            path,
            success_codes: DEFAULT_SUCCESS_CODES,
            next_field: None,
            list_field: None,
            dup_filter: None,
            conditional: false,
            ignore_body: false,
        }
    }

    pub const fn success_codes(mut self, codes: &'static [u16]) -> Self {
        self.success_codes = codes;
        self
    }

    /// Marks a collection endpoint: items live under `list_field`, the next page's
    /// URL under `next_field`.
    pub const fn paginated(mut self, list_field: &'static str, next_field: &'static str) -> Self {
        self.list_field = Some(list_field);
        self.next_field = Some(next_field);
        self
    }

    pub const fn dedup_on(mut self, key: &'static str) -> Self {
        self.dup_filter = Some(key);
        self
    }

    pub const fn conditional(mut self) -> Self {
        self.conditional = true;
        self
    }

    pub const fn ignore_body(mut self) -> Self {
        self.ignore_body = true;
        self
    }
}

/// Replaces every `%{name}` in `template` with its value from `substitutions`.
///
/// Unknown placeholders are left untouched.
pub fn fill_template(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in substitutions {
        out = out.replace(&format!("%{{{}}}", name), value);
    }
    out
}

/// Where a request goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Path relative to the executor's base URL.
    Path(String),
    /// Absolute URL, typically a server-supplied next-page link.
    Url(String),
}

impl Target {
    /// Absolute URLs become [`Target::Url`], anything else is treated as a path.
    pub fn parse(link: &str) -> Self {
        match url::Url::parse(link) {
            Ok(url) => Target::Url(url.into()),
            Err(_) => Target::Path(link.to_string()),
        }
    }

    pub fn resolve(&self, base_url: &str) -> String {
        match self {
            Target::Url(url) => url.clone(),
            Target::Path(path) => {
                let base = base_url.trim_end_matches('/');
                if path.starts_with('/') {
                    format!("{}{}", base, path)
                } else {
                    format!("{}/{}", base, path)
                }
            }
        }
    }
}

/// Everything the executor and paginator need to issue one call.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub target: Target,
    pub method: Method,
    pub success_codes: Vec<StatusCode>,
    pub next_field: Option<String>,
    pub list_field: Option<String>,
    pub dup_filter: Option<String>,
    pub conditional: bool,
    pub ignore_body: bool,
}

impl RequestContext {
    pub fn new(method: Method, target: Target) -> Self {
        Self {
            target,
            method,
            success_codes: vec![StatusCode::OK],
            next_field: None,
            list_field: None,
            dup_filter: None,
            conditional: false,
            ignore_body: false,
        }
    }

    pub fn from_descriptor(descriptor: &ApiDescriptor, substitutions: &[(&str, &str)]) -> Self {
        let success_codes = descriptor
            .success_codes
            .iter()
            .filter_map(|code| StatusCode::from_u16(*code).ok())
            .collect();

        Self {
            target: Target::Path(fill_template(descriptor.path, substitutions)),
            method: descriptor.method.clone(),
            success_codes,
            next_field: descriptor.next_field.map(str::to_string),
            list_field: descriptor.list_field.map(str::to_string),
            dup_filter: descriptor.dup_filter.map(str::to_string),
            conditional: descriptor.conditional,
            ignore_body: descriptor.ignore_body,
        }
    }

    pub fn with_success_codes(mut self, codes: &[u16]) -> Self {
        self.success_codes = codes
            .iter()
            .filter_map(|code| StatusCode::from_u16(*code).ok())
            .collect();
        self
    }

    pub fn with_conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    /// Appends `key=value` query pairs to the target.
    pub fn with_query(mut self, pairs: &[(&str, &str)]) -> Self {
        if pairs.is_empty() {
            return self;
        }
        let encoded: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let append = |s: &mut String| {
            s.push(if s.contains('?') { '&' } else { '?' });
            s.push_str(&encoded);
        };
        match &mut self.target {
            Target::Path(path) => append(path),
            Target::Url(url) => append(url),
        }
        self
    }

    pub fn accepts(&self, status: StatusCode) -> bool {
        self.success_codes.contains(&status)
    }
}

/// Request body of one call.
pub enum RequestBody {
    Json(serde_json::Value),
    Upload(Upload),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::Upload(upload) => f.debug_tuple("Upload").field(upload).finish(),
        }
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<Upload> for RequestBody {
    fn from(upload: Upload) -> Self {
        RequestBody::Upload(upload)
    }
}

/// Binary upload: raw bytes or a reader drained once, plus a MIME type.
pub struct Upload {
    pub source: UploadSource,
    pub mime_type: String,
}

pub enum UploadSource {
    RawBytes(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl Upload {
    pub fn bytes(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            source: UploadSource::RawBytes(data.into()),
            mime_type: mime_type.into(),
        }
    }

    pub fn stream(reader: impl AsyncRead + Send + 'static, mime_type: impl Into<String>) -> Self {
        Self {
            source: UploadSource::Stream(Box::pin(reader)),
            mime_type: mime_type.into(),
        }
    }

    /// Reads the whole upload into memory so retries resend identical bytes.
    pub async fn into_bytes(self) -> std::io::Result<(Bytes, String)> {
        let data = match self.source {
            UploadSource::RawBytes(bytes) => bytes,
            UploadSource::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Bytes::from(buf)
            }
        };
        Ok((data, self.mime_type))
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            UploadSource::RawBytes(bytes) => format!("RawBytes({} bytes)", bytes.len()),
            UploadSource::Stream(_) => "Stream".to_string(),
        };
        f.debug_struct("Upload")
            .field("source", &source)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}
