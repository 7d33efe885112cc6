//! Request/response middleware.
//!
//! # Design
//! An `Interceptor` receives the in-flight request plus a `Chain` and decides
//! what to forward. `Chain::proceed` hands the request to the next
//! interceptor, and the last link calls the connector. The transport
//! assembles the built-in interceptors in a fixed order: header injection,
//! URL override, then logging.

use std::time::Instant;

use tracing::{info, warn};
use url::Url;

use crate::error::NetError;
use crate::http::{Body, HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Connector;

const LOG_TARGET: &str = "netlib::http";

/// A middleware step applied to every request passing through a transport.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, request: HttpRequest, chain: Chain<'_>) -> Result<HttpResponse, NetError>;
}

/// The remainder of the interceptor stack, ending in the connector.
pub struct Chain<'a> {
    rest: &'a [&'a dyn Interceptor],
    connector: &'a dyn Connector,
}

impl<'a> Chain<'a> {
    pub fn new(interceptors: &'a [&'a dyn Interceptor], connector: &'a dyn Connector) -> Self {
        Self {
            rest: interceptors,
            connector,
        }
    }

    /// Forward `request` downstream and return whatever comes back.
    pub fn proceed(self, request: HttpRequest) -> Result<HttpResponse, NetError> {
        match self.rest.split_first() {
            Some((next, rest)) => next.intercept(
                request,
                Chain {
                    rest,
                    connector: self.connector,
                },
            ),
            None => self.connector.execute(&request),
        }
    }
}

/// Adds the configured headers to every request.
///
/// Additive: a caller-set header with the same name is kept and both values
/// are sent.
#[derive(Debug, Clone, Default)]
pub struct HeaderInterceptor {
    headers: Vec<(String, String)>,
}

impl HeaderInterceptor {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }
}

impl Interceptor for HeaderInterceptor {
    fn intercept(&self, mut request: HttpRequest, chain: Chain<'_>) -> Result<HttpResponse, NetError> {
        for (name, value) in &self.headers {
            request.add_header(name.clone(), value.clone());
        }
        chain.proceed(request)
    }
}

/// Replaces the whole request URL with a secondary base URL.
///
/// The original path and query are discarded. The replacement is parsed on
/// every request, so a malformed value fails the request rather than the
/// client construction.
#[derive(Debug, Clone, Default)]
pub struct UrlOverrideInterceptor {
    target: Option<String>,
}

impl UrlOverrideInterceptor {
    pub fn new(target: Option<String>) -> Self {
        Self {
            target: target.filter(|t| !t.is_empty()),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

impl Interceptor for UrlOverrideInterceptor {
    fn intercept(&self, mut request: HttpRequest, chain: Chain<'_>) -> Result<HttpResponse, NetError> {
        if let Some(target) = &self.target {
            let url = Url::parse(target).map_err(|e| NetError::invalid_url(target, e))?;
            request.url = url.into();
        }
        chain.proceed(request)
    }
}

/// Problems hit while rendering a response for the log. Never returned to
/// the caller.
#[derive(Debug, thiserror::Error)]
enum CaptureError {
    #[error("unsupported charset `{0}`")]
    UnsupportedCharset(String),
    #[error("body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Logs each exchange: request line, headers, form fields, elapsed time,
/// status and body text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept(&self, request: HttpRequest, chain: Chain<'_>) -> Result<HttpResponse, NetError> {
        let method = request.method;
        let url = request.url.clone();
        info!(
            target: LOG_TARGET,
            method = method.as_str(),
            url = %url,
            "request\n{}",
            describe_request(&request)
        );

        let started = Instant::now();
        let result = chain.proceed(request);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                if response.status != 200 {
                    warn!(target: LOG_TARGET, status = response.status, url = %url, "unexpected status code");
                }
                let body = match response_text(response) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(target: LOG_TARGET, error = %e, "could not capture response body");
                        response.text().into_owned()
                    }
                };
                info!(target: LOG_TARGET, status = response.status, elapsed_ms, "response\n{body}");
            }
            Err(e) => {
                warn!(target: LOG_TARGET, error = %e, elapsed_ms, url = %url, "request failed");
            }
        }
        result
    }
}

/// Render headers and, for form POSTs, each submitted field.
fn describe_request(request: &HttpRequest) -> String {
    let mut out = String::from("headers:\n");
    for (name, value) in &request.headers {
        out.push_str(&format!("{name}={value}\n"));
    }
    out.push_str("\nparams:\n");
    if request.method == HttpMethod::Post {
        match &request.body {
            Some(Body::Form(fields)) if !fields.is_empty() => {
                for (name, value) in fields {
                    out.push_str(&format!("{name}={value};\n"));
                }
            }
            _ => out.push_str("(none)\n"),
        }
    }
    out
}

/// Decode the buffered body using the charset named in `Content-Type`.
fn response_text(response: &HttpResponse) -> Result<String, CaptureError> {
    let charset = response
        .header("content-type")
        .and_then(|ct| {
            ct.split(';')
                .filter_map(|part| part.trim().strip_prefix("charset="))
                .next()
        })
        .map(|c| c.trim_matches('"').to_ascii_lowercase());

    match charset.as_deref() {
        None | Some("utf-8") | Some("utf8") | Some("us-ascii") => {
            Ok(std::str::from_utf8(&response.body)?.to_string())
        }
        Some(other) => Err(CaptureError::UnsupportedCharset(other.to_string())),
    }
}
