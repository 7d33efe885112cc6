//! Shared HTTP client with typed endpoints and callback dispatch.
//!
//! # Overview
//! Configure a `NetClient` once with a base URL, timeout, cache directory,
//! default headers and optional trust roots. Typed clients obtained through
//! `load_api` produce deferred `Call`s; `send_request` runs them in the
//! background and reports exactly one outcome through a callback.
//!
//! # Design
//! - `NetClient` holds its configuration explicitly; there is no global.
//! - The transport (`ureq` agent + interceptor chain) is built lazily and
//!   swapped atomically when the timeout changes.
//! - Interceptors run in a fixed order: header injection, URL override,
//!   logging (debug only).
//! - Outcomes are delivered through a pluggable `CallbackExecutor`, so hosts
//!   can route callbacks to their UI thread.

pub mod api;
pub mod cache;
pub mod call;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod transport;

pub use api::{ApiClient, ApiService, Endpoint, Params};
pub use call::Call;
pub use client::{NetClient, NetClientBuilder};
pub use config::{ClientConfig, TrustConfig, DEFAULT_CACHE_QUOTA, DEFAULT_TIMEOUT};
pub use dispatcher::{callback_queue, CallbackExecutor, CallbackLoop, CallbackQueue, Immediate, RequestHandle};
pub use error::NetError;
pub use http::{Body, HttpMethod, HttpRequest, HttpResponse};
pub use interceptor::{Chain, Interceptor};
pub use transport::{Connector, Transport};
