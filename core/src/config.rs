//! Client configuration.
//!
//! # Design
//! `ClientConfig` is a plain value owned by a `NetClient`. Nothing is
//! validated here: a malformed base URL surfaces when the first typed client
//! is built, and an empty one when a request is dispatched.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default connect/read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default size limit of the on-disk response cache, in bytes.
pub const DEFAULT_CACHE_QUOTA: u64 = 10 * 1024 * 1024;

/// PEM-encoded root certificates that replace the platform trust store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfig {
    pub(crate) pem: Vec<u8>,
}

impl TrustConfig {
    /// Trust only the certificates in `pem` (one or more `CERTIFICATE` blocks).
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into() }
    }
}

/// Settings a `NetClient` builds its transport from.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Added to every outgoing request, alongside caller-set headers.
    pub headers: Vec<(String, String)>,
    /// Response cache directory. The cache is only enabled if it exists.
    pub cache_dir: Option<PathBuf>,
    pub cache_quota: u64,
    pub trust: Option<TrustConfig>,
    /// Whether `trust` is attached to the transport at all.
    pub custom_trust_enabled: bool,
    pub timeout: Duration,
    /// Attach the request/response logging interceptor.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            headers: Vec::new(),
            cache_dir: None,
            cache_quota: DEFAULT_CACHE_QUOTA,
            trust: None,
            custom_trust_enabled: true,
            timeout: DEFAULT_TIMEOUT,
            debug: false,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn cache_quota(mut self, bytes: u64) -> Self {
        self.cache_quota = bytes;
        self
    }

    pub fn trust(mut self, trust: TrustConfig) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn custom_trust_enabled(mut self, enabled: bool) -> Self {
        self.custom_trust_enabled = enabled;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Trust roots to install, if any are configured and enabled.
    pub(crate) fn effective_trust(&self) -> Option<&TrustConfig> {
        self.trust.as_ref().filter(|_| self.custom_trust_enabled)
    }

    /// Load settings from `NETLIB_*` environment variables.
    ///
    /// Recognised: `NETLIB_BASE_URL`, `NETLIB_TIMEOUT_SECS`, `NETLIB_CACHE_DIR`,
    /// `NETLIB_CACHE_QUOTA`, `NETLIB_DEBUG`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(lookup("NETLIB_BASE_URL").unwrap_or_default());
        if let Some(raw) = lookup("NETLIB_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.timeout = Duration::from_secs(secs),
                Err(e) => warn!(value = %raw, error = %e, "ignoring NETLIB_TIMEOUT_SECS"),
            }
        }
        if let Some(dir) = lookup("NETLIB_CACHE_DIR").filter(|d| !d.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("NETLIB_CACHE_QUOTA") {
            match raw.trim().parse::<u64>() {
                Ok(bytes) => config.cache_quota = bytes,
                Err(e) => warn!(value = %raw, error = %e, "ignoring NETLIB_CACHE_QUOTA"),
            }
        }
        if let Some(raw) = lookup("NETLIB_DEBUG") {
            config.debug = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        config
    }
}
