//! Client library for the Numerous metrics service.
//!
//! [`Numerous`] talks to one account; [`Metric`] handles one metric of it. Every call
//! goes through the `numerous_dispatch` executor, which honors the server's rate
//! limits: throttled requests are retried after the advertised reset time, and calls
//! slow down on their own when the remaining quota runs low.
//!
//! # Example
//! ```no_run
//! use futures::TryStreamExt;
//! use numerous_client::{LabelMatch, Numerous, NumerousConfig, WriteOptions};
//!
//! # async fn run() -> Result<(), numerous_client::NumerousError> {
//! let client = Numerous::new(NumerousConfig::with_api_key("nmrs_xxxxxxxx"))?;
//!
//! let mut metric = client.metric_by_label("^coffee", LabelMatch::First).await?;
//! metric.write(3, WriteOptions { add: true, ..Default::default() }).await?;
//!
//! let mut events = metric.events();
//! while let Some(event) = events.try_next().await? {
//!     println!("{} {}", event["updated"], event["value"]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//! [`NumerousConfig::from_env`] reads the key from `NUMEROUSAPIKEY` or
//! `NUMEROUS_API_KEY` (see [`credentials`] for the accepted forms) and the tunables
//! `NUMEROUS_SERVER`, `NUMEROUS_MAX_ATTEMPTS`, `NUMEROUS_VOLUNTARY_THRESHOLD` and
//! `NUMEROUS_DUPLICATE_FILTER`, after loading `.env` if there is one.

pub mod client;
pub mod config;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod metric;

#[macro_use]
extern crate tracing;

pub use client::{LabelMatch, Numerous};
pub use config::NumerousConfig;
pub use error::NumerousError;
pub use metric::{Metric, WriteOptions};
pub use numerous_dispatch::dispatch::{
    context::Upload,
    error::{DispatchError, ErrorKind},
    stats::Statistics,
    throttle::{ThrottleChain, ThrottleDecision, ThrottleInput, ThrottlePolicy},
};
