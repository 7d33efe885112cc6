//! The built HTTP stack: connector plus interceptor chain.
//!
//! # Design
//! `Connector` performs one network exchange and is the seam tests replace.
//! `UreqConnector` is the production implementation: a `ureq` agent with all
//! socket timeouts set to the configured duration, optional custom trust
//! roots, an optional disk cache and one retry after a connection failure.
//! `Transport` is immutable once built; a `NetClient` swaps in a new one
//! when its configuration changes, and anything holding the old one keeps
//! using it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use ureq::tls::{PemItem, RootCerts, TlsConfig};

use crate::cache::ResponseCache;
use crate::config::{ClientConfig, TrustConfig};
use crate::error::NetError;
use crate::http::{Body, HttpMethod, HttpRequest, HttpResponse};
use crate::interceptor::{Chain, HeaderInterceptor, Interceptor, LoggingInterceptor, UrlOverrideInterceptor};

/// Executes a single HTTP exchange.
///
/// Implementations return non-2xx responses as `Ok`; status interpretation
/// happens further up.
pub trait Connector: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, NetError>;
}

/// Production connector backed by a `ureq` agent.
pub struct UreqConnector {
    agent: ureq::Agent,
    cache: Option<ResponseCache>,
    retry_on_connection_failure: bool,
}

impl UreqConnector {
    pub fn new(config: &ClientConfig) -> Result<Self, NetError> {
        let timeout = Some(config.timeout);
        let mut builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(timeout)
            .timeout_send_request(timeout)
            .timeout_send_body(timeout)
            .timeout_recv_response(timeout)
            .timeout_recv_body(timeout);

        if let Some(trust) = config.effective_trust() {
            let roots = load_roots(trust)?;
            builder = builder.tls_config(
                TlsConfig::builder()
                    .root_certs(RootCerts::Specific(Arc::new(roots)))
                    .build(),
            );
        }

        let cache = match &config.cache_dir {
            Some(dir) => ResponseCache::open(dir, config.cache_quota).unwrap_or_else(|e| {
                warn!(error = %e, dir = %dir.display(), "could not open response cache");
                None
            }),
            None => None,
        };

        Ok(Self {
            agent: builder.build().new_agent(),
            cache,
            retry_on_connection_failure: true,
        })
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    fn send_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, ureq::Error> {
        match self.send(request) {
            Err(e) if self.retry_on_connection_failure && is_retryable(&e, request.method) => {
                debug!(error = %e, url = %request.url, "retrying after connection failure");
                self.send(request)
            }
            other => other,
        }
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ureq::Error> {
        let url = request.url.as_str();
        let mut response = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), request).call()?,
            HttpMethod::Head => with_headers(self.agent.head(url), request).call()?,
            HttpMethod::Delete => with_headers(self.agent.delete(url), request).call()?,
            HttpMethod::Post => send_body(with_headers(self.agent.post(url), request), request.body.as_ref())?,
            HttpMethod::Put => send_body(with_headers(self.agent.put(url), request), request.body.as_ref())?,
            HttpMethod::Patch => send_body(with_headers(self.agent.patch(url), request), request.body.as_ref())?,
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = if request.method == HttpMethod::Head {
            Vec::new()
        } else {
            // no size cap beyond what the server sends
            response.body_mut().with_config().limit(u64::MAX).read_to_vec()?
        };

        Ok(HttpResponse { status, headers, body })
    }
}

impl Connector for UreqConnector {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, NetError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.lookup(request)) {
            return Ok(hit);
        }
        let response = self.send_with_retry(request)?;
        if let Some(cache) = &self.cache {
            cache.store(request, &response);
        }
        Ok(response)
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    builder
}

fn send_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&Body>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.content_type(body.content_type()).send(body.to_bytes().as_slice()),
        None => builder.send_empty(),
    }
}

/// A failed connect is always retried. An I/O error is retried only for
/// methods without a body, since a body may already have reached the server.
fn is_retryable(err: &ureq::Error, method: HttpMethod) -> bool {
    match err {
        ureq::Error::ConnectionFailed => true,
        ureq::Error::Io(_) => !method.sends_body(),
        _ => false,
    }
}

fn load_roots(trust: &TrustConfig) -> Result<Vec<ureq::tls::Certificate<'static>>, NetError> {
    let mut roots = Vec::new();
    for item in ureq::tls::parse_pem(&trust.pem) {
        if let PemItem::Certificate(cert) = item.map_err(|e| NetError::TlsSetup(e.to_string()))? {
            roots.push(cert.to_owned());
        }
    }
    if roots.is_empty() {
        return Err(NetError::TlsSetup("no certificates found in trust PEM".into()));
    }
    Ok(roots)
}

/// A built, immutable HTTP stack.
///
/// Requests pass header injection, then URL override, then (in debug mode)
/// logging, before reaching the connector.
#[derive(Clone)]
pub struct Transport {
    connector: Arc<dyn Connector>,
    headers: Arc<HeaderInterceptor>,
    url_override: UrlOverrideInterceptor,
    logging: Option<LoggingInterceptor>,
    timeout: Duration,
}

impl Transport {
    /// Build the production stack for `config`.
    pub fn build(config: &ClientConfig) -> Result<Self, NetError> {
        let connector = UreqConnector::new(config)?;
        debug!(
            timeout_ms = config.timeout.as_millis() as u64,
            cache = connector.cache().is_some(),
            custom_trust = config.effective_trust().is_some(),
            "built transport"
        );
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Build a stack around an arbitrary connector.
    pub fn with_connector(config: &ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            headers: Arc::new(HeaderInterceptor::new(config.headers.clone())),
            url_override: UrlOverrideInterceptor::default(),
            logging: config.debug.then_some(LoggingInterceptor),
            timeout: config.timeout,
        }
    }

    /// A sibling stack that shares everything but the secondary base URL.
    pub fn with_url_override(&self, target: Option<String>) -> Self {
        Self {
            url_override: UrlOverrideInterceptor::new(target),
            ..self.clone()
        }
    }

    /// The timeout this stack was built with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn url_override(&self) -> Option<&str> {
        self.url_override.target()
    }

    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetError> {
        let mut stack: Vec<&dyn Interceptor> = Vec::with_capacity(3);
        stack.push(&*self.headers);
        stack.push(&self.url_override);
        if let Some(logging) = &self.logging {
            stack.push(logging);
        }
        Chain::new(&stack, self.connector.as_ref()).proceed(request)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("headers", &self.headers)
            .field("url_override", &self.url_override)
            .field("logging", &self.logging.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
