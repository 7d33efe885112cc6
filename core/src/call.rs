//! Deferred request descriptions.
//!
//! A `Call<T>` is produced by a typed client and does nothing until it is
//! executed, either directly with `execute` or through
//! `NetClient::send_request`. Construction never fails: a bad path or an
//! unserializable body is carried inside the call and reported as its
//! outcome.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::NetError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// One not-yet-executed HTTP call whose response decodes into `T`.
pub struct Call<T> {
    request: Result<HttpRequest, NetError>,
    transport: Arc<Transport>,
    _response: PhantomData<fn() -> T>,
}

impl<T> Call<T> {
    pub(crate) fn new(request: Result<HttpRequest, NetError>, transport: Arc<Transport>) -> Self {
        Self {
            request,
            transport,
            _response: PhantomData,
        }
    }

    /// The request that will be sent, or the error that prevented building it.
    pub fn request(&self) -> Result<&HttpRequest, &NetError> {
        self.request.as_ref()
    }

    /// Add a header to this call only.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(request) = &mut self.request {
            request.add_header(name, value);
        }
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

impl<T: DeserializeOwned> Call<T> {
    /// Run the call on the current thread.
    pub fn execute(self) -> Result<T, NetError> {
        let response = self.transport.execute(self.request?)?;
        decode(response)
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.request)
            .field("response", &std::any::type_name::<T>())
            .finish()
    }
}

/// Map a response to `T`: any 2xx decodes as JSON (an empty body decodes as
/// `null`), 404 is `NotFound`, anything else is `Http`.
pub(crate) fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T, NetError> {
    if response.status == 404 {
        return Err(NetError::NotFound);
    }
    if !response.is_success() {
        return Err(NetError::Http {
            status: response.status,
            body: response.text().into_owned(),
        });
    }
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(serde_json::Value::Null).map_err(|e| NetError::Deserialization(e.to_string()));
    }
    serde_json::from_slice(&response.body).map_err(|e| NetError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct UserInfo {
        id: u64,
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn decodes_json_on_success() {
        let user: UserInfo = decode(response(200, r#"{"id":1}"#)).unwrap();
        assert_eq!(user, UserInfo { id: 1 });
    }

    #[test]
    fn any_2xx_is_success() {
        let user: UserInfo = decode(response(201, r#"{"id":2}"#)).unwrap();
        assert_eq!(user.id, 2);
    }

    #[test]
    fn empty_body_decodes_as_null() {
        decode::<()>(response(204, "")).unwrap();
        let missing: Option<UserInfo> = decode(response(200, "  ")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn not_found_has_its_own_variant() {
        let err = decode::<UserInfo>(response(404, "")).unwrap_err();
        assert!(matches!(err, NetError::NotFound));
    }

    #[test]
    fn other_statuses_keep_status_and_body() {
        let err = decode::<UserInfo>(response(503, "maintenance")).unwrap_err();
        assert!(matches!(err, NetError::Http { status: 503, ref body } if body == "maintenance"));
    }

    #[test]
    fn bad_json_is_a_deserialization_error() {
        let err = decode::<UserInfo>(response(200, "not json")).unwrap_err();
        assert!(matches!(err, NetError::Deserialization(_)));
    }
}
