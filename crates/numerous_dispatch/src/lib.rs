//! Request dispatch core for the Numerous metrics API.
//!
//! Every call the client library makes goes through this crate. It sends one HTTP
//! request, lets a chain of throttle policies look at the server's rate-limit headers
//! and status code, and repeats the request until the chain accepts the response or
//! the attempt ceiling is reached.
//!
//! # Components
//! - [`dispatch::executor::RequestExecutor`]: single-request execution, response
//!   classification and statistics
//! - [`dispatch::throttle`]: the policy chain and the built-in rate-limit aware policy
//! - [`dispatch::paginate::Paginator`]: flattens server-chunked collections and drops
//!   duplicates that straddle page boundaries
//! - [`dispatch::error`]: the error taxonomy and status classification
//! - [`dispatch::context`]: static endpoint descriptors and per-call request contexts
//!
//! # Throttling
//! The built-in policy keeps steady-state throughput close to the server's cap:
//! 1. **429**: wait the server-advertised reset time plus a growing slop, then retry
//! 2. **Low quota**: when `x-rate-limit-remaining` drops below a threshold, pause
//!    briefly before handing the response back so the next call does not hit the cap
//!
//! # Basic Usage
//! ```no_run
//! use numerous_dispatch::dispatch::{
//!     DispatchSettings,
//!     context::{ApiDescriptor, RequestContext},
//!     executor::RequestExecutor,
//!     reqwest_integration::ReqwestService,
//! };
//! use http::Method;
//!
//! const ME: ApiDescriptor = ApiDescriptor::new("user", Method::GET, "/v1/users/%{userId}");
//!
//! # async fn run() -> Result<(), numerous_dispatch::dispatch::error::DispatchError> {
//! let settings = DispatchSettings::builder()
//!     .base_url("https://api.numerousapp.com")
//!     .build();
//! let transport = ReqwestService::new().with_basic_auth("nmrs_xxxxxxxx");
//! let mut executor = RequestExecutor::new(transport, settings);
//!
//! let ctx = RequestContext::from_descriptor(&ME, &[("userId", "me")]);
//! let user = executor.execute(&ctx, None, None).await?;
//! println!("{}", user.value);
//! # Ok(())
//! # }
//! ```
//!
//! # Metrics
//! Emits metrics through the `metrics` facade via the internal `InternalEvent` trait.
//! No recorder is installed here.
pub mod dispatch;
#[cfg(test)]
pub(crate) mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
