//! Typed clients.
//!
//! # Design
//! An API is described as a plain struct holding an `ApiClient` and one
//! method per endpoint, each returning a `Call<T>`:
//!
//! ```
//! use netlib_core::{ApiClient, ApiService, Call, Endpoint, Params};
//! # #[derive(serde::Deserialize)] struct UserInfo { id: u64 }
//!
//! const USER: Endpoint = Endpoint::get("v1/users/{id}");
//!
//! struct AccountApi {
//!     client: ApiClient,
//! }
//!
//! impl ApiService for AccountApi {
//!     fn from_client(client: ApiClient) -> Self {
//!         Self { client }
//!     }
//! }
//!
//! impl AccountApi {
//!     fn user_info(&self) -> Call<UserInfo> {
//!         self.client.get("v1/userinfo")
//!     }
//!
//!     fn user(&self, id: u64) -> Call<UserInfo> {
//!         self.client.call(&USER, Params::new().path("id", id.to_string()))
//!     }
//! }
//! ```
//!
//! `NetClient::load_api::<AccountApi>(..)` binds the struct to the shared
//! transport. The secondary base URL passed there belongs to that one
//! client; other typed clients are unaffected.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::call::Call;
use crate::error::NetError;
use crate::http::{Body, HttpMethod, HttpRequest};
use crate::transport::Transport;

/// Something `NetClient::load_api` can construct.
pub trait ApiService: Sized {
    fn from_client(client: ApiClient) -> Self;
}

/// A declared endpoint: verb plus a path relative to the base URL.
///
/// `{name}` segments are filled from `Params::path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: &'static str,
}

impl Endpoint {
    pub const fn new(method: HttpMethod, path: &'static str) -> Self {
        Self { method, path }
    }

    pub const fn get(path: &'static str) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub const fn post(path: &'static str) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub const fn put(path: &'static str) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub const fn patch(path: &'static str) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub const fn delete(path: &'static str) -> Self {
        Self::new(HttpMethod::Delete, path)
    }
}

/// Arguments for one endpoint invocation.
#[derive(Debug, Default)]
pub struct Params {
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    json: Option<Result<String, NetError>>,
    headers: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for a `{name}` placeholder in the endpoint path.
    pub fn path(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// A form field; any field makes the body form-encoded.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.json = Some(serde_json::to_string(body).map_err(|e| NetError::Serialization(e.to_string())));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A typed-client handle: shared transport, base URL and this client's
/// secondary base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Arc<Transport>,
    base_url: Option<Url>,
}

impl ApiClient {
    pub(crate) fn new(transport: Arc<Transport>, base_url: Option<Url>) -> Self {
        Self { transport, base_url }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn secondary_base_url(&self) -> Option<&str> {
        self.transport.url_override()
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn get<T>(&self, path: &str) -> Call<T> {
        self.simple(HttpMethod::Get, path)
    }

    pub fn delete<T>(&self, path: &str) -> Call<T> {
        self.simple(HttpMethod::Delete, path)
    }

    pub fn head<T>(&self, path: &str) -> Call<T> {
        self.simple(HttpMethod::Head, path)
    }

    /// POST the given fields form-encoded.
    pub fn post_form<T>(&self, path: &str, fields: &[(&str, &str)]) -> Call<T> {
        let params = fields
            .iter()
            .fold(Params::new(), |params, (name, value)| params.field(*name, *value));
        self.invoke(HttpMethod::Post, path, params)
    }

    pub fn post_json<T, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Call<T> {
        self.invoke(HttpMethod::Post, path, Params::new().json(body))
    }

    pub fn put_json<T, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Call<T> {
        self.invoke(HttpMethod::Put, path, Params::new().json(body))
    }

    pub fn patch_json<T, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Call<T> {
        self.invoke(HttpMethod::Patch, path, Params::new().json(body))
    }

    /// Invoke a declared endpoint.
    pub fn call<T>(&self, endpoint: &Endpoint, params: Params) -> Call<T> {
        self.invoke(endpoint.method, endpoint.path, params)
    }

    fn simple<T>(&self, method: HttpMethod, path: &str) -> Call<T> {
        self.invoke(method, path, Params::new())
    }

    /// Build a call from a method and a path known only at runtime.
    pub fn invoke<T>(&self, method: HttpMethod, path: &str, params: Params) -> Call<T> {
        Call::new(self.build_request(method, path, params), self.transport.clone())
    }

    fn build_request(&self, method: HttpMethod, path: &str, params: Params) -> Result<HttpRequest, NetError> {
        let path = fill_placeholders(path, &params.path)?;
        let url = self.resolve(&path, &params.query)?;

        let mut request = HttpRequest::new(method, url);
        request.headers = params.headers;
        request.body = if !params.form.is_empty() {
            Some(Body::Form(params.form))
        } else {
            params.json.transpose()?.map(Body::Json)
        };
        Ok(request)
    }

    /// Join `path` onto the base URL and append the query pairs.
    ///
    /// Without a base URL the path is kept as-is; dispatching such a call
    /// fails with `EmptyBaseUrl` before anything is sent.
    fn resolve(&self, path: &str, query: &[(String, String)]) -> Result<String, NetError> {
        let Some(base) = &self.base_url else {
            if query.is_empty() {
                return Ok(path.to_string());
            }
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query.iter())
                .finish();
            return Ok(format!("{path}?{encoded}"));
        };

        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|e| NetError::invalid_url(path, e))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url.into())
    }
}

impl ApiService for ApiClient {
    fn from_client(client: ApiClient) -> Self {
        client
    }
}

fn fill_placeholders(path: &str, values: &[(String, String)]) -> Result<String, NetError> {
    let mut filled = path.to_string();
    for (name, value) in values {
        filled = filled.replace(&format!("{{{name}}}"), value);
    }
    if filled.contains('{') {
        return Err(NetError::invalid_url(&filled, "unfilled path placeholder"));
    }
    Ok(filled)
}
