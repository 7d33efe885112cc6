//! Error types for the netlib client.
//!
//! # Design
//! `EmptyBaseUrl` is raised before any network activity and reported
//! synchronously. Everything else travels to the failure callback of the
//! dispatched request. `NotFound` keeps a dedicated variant because callers
//! frequently distinguish "the resource does not exist" from "the server
//! returned an unexpected status"; all other non-2xx responses land in
//! `Http` with the raw status code and body.

/// Errors produced while configuring the client or executing a request.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// `send_request` was called before a base URL was configured.
    #[error("base domain address is empty")]
    EmptyBaseUrl,

    /// A base URL, secondary base URL or endpoint URL failed to parse.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The custom trust roots could not be loaded.
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    /// Connection, read or write failure reported by the HTTP stack.
    #[error("transport error: {0}")]
    Transport(String),

    /// A connect, read or write deadline elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request was cancelled before its outcome was delivered.
    #[error("request cancelled")]
    Cancelled,

    /// The background worker failed before producing an outcome.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl NetError {
    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        NetError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ureq::Error> for NetError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(which) => NetError::Timeout(format!("{which:?}")),
            ureq::Error::BadUri(uri) => NetError::invalid_url(&uri, "rejected by transport"),
            other => NetError::Transport(other.to_string()),
        }
    }
}
