//! HTTP request/response types passed through the interceptor chain.
//!
//! # Design
//! Requests and responses are plain data. Interceptors receive and return
//! owned values, so rewriting a request is a matter of mutating a field
//! rather than going through a builder. The response body is fully buffered
//! before it enters the chain, which lets the logging interceptor read it
//! without starving the caller that deserializes it.
//!
//! All fields use owned types (`String`, `Vec`) so values can cross FFI
//! boundaries without lifetime concerns.

use std::borrow::Cow;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Whether requests with this method carry a body on the wire.
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

/// A request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Serialized JSON text.
    Json(String),
    /// Form fields in submission order, sent url-encoded.
    Form(Vec<(String, String)>),
    /// Arbitrary text with an explicit content type.
    Text { content_type: String, text: String },
}

impl Body {
    pub fn content_type(&self) -> &str {
        match self {
            Body::Json(_) => "application/json; charset=utf-8",
            Body::Form(_) => "application/x-www-form-urlencoded",
            Body::Text { content_type, .. } => content_type,
        }
    }

    /// Encode the payload into the bytes sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Json(json) => json.clone().into_bytes(),
            Body::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter())
                .finish()
                .into_bytes(),
            Body::Text { text, .. } => text.clone().into_bytes(),
        }
    }
}

/// An outgoing HTTP request.
///
/// `headers` is a multi-map: the same name may appear more than once and
/// every occurrence is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header, keeping any existing values of the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// All values for `name`, compared case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
