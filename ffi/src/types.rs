//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Configuration, client and request handle are opaque boxes owned by the
//! C caller. Outcomes cross the boundary as a single `FfiResult` envelope:
//! an error code, the HTTP status for `Http` errors, and one C string that
//! holds either the JSON response body or the error message.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use netlib_core::{ClientConfig, HttpMethod, NetClient, NetError, RequestHandle};

/// Opaque configuration under construction.
pub struct FfiConfig {
    pub(crate) inner: ClientConfig,
}

/// Opaque handle to a `NetClient`.
pub struct FfiNetClient {
    pub(crate) inner: NetClient,
}

/// Opaque handle to an in-flight request.
pub struct FfiRequestHandle {
    pub(crate) inner: RequestHandle,
}

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Clone, Copy)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
    Patch = 4,
    Head = 5,
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Delete => HttpMethod::Delete,
            FfiHttpMethod::Patch => HttpMethod::Patch,
            FfiHttpMethod::Head => HttpMethod::Head,
        }
    }
}

/// Error codes returned in `FfiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    EmptyBaseUrl = 1,
    InvalidUrl = 2,
    TlsSetup = 3,
    Transport = 4,
    Timeout = 5,
    NotFound = 6,
    Http = 7,
    Serialization = 8,
    Deserialization = 9,
    Cancelled = 10,
    Dispatch = 11,
    Panic = 12,
    NullArg = 13,
}

/// Outcome of one request.
///
/// On success `error_code` is `Ok` and `body` holds the response JSON.
/// On failure `body` holds a human-readable message and `http_status` is
/// set for `Http` and `NotFound`.
#[repr(C)]
pub struct FfiResult {
    pub error_code: FfiErrorCode,
    pub http_status: u16,
    pub body: *mut c_char,
}

/// Outcome callback. Called exactly once per request, on a worker thread;
/// the receiver owns `result` and must release it with `netlib_free_result`.
pub type FfiCallback = extern "C" fn(user_data: *mut c_void, result: *mut FfiResult);

/// Caller context passed back to the callback untouched.
#[derive(Clone, Copy)]
pub(crate) struct UserData(*mut c_void);

// The pointer is only handed back to the caller, never dereferenced here.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub(crate) fn get(self) -> *mut c_void {
        self.0
    }
}

/// Copy `s` into a caller-owned C string, dropping interior NULs.
pub(crate) fn to_c_string(s: impl Into<String>) -> *mut c_char {
    let s: String = s.into();
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

impl FfiResult {
    fn boxed(error_code: FfiErrorCode, http_status: u16, body: String) -> *mut Self {
        Box::into_raw(Box::new(FfiResult {
            error_code,
            http_status,
            body: to_c_string(body),
        }))
    }

    /// Build a success result carrying the response JSON.
    pub(crate) fn ok_json(value: &serde_json::Value) -> *mut Self {
        Self::boxed(FfiErrorCode::Ok, 0, value.to_string())
    }

    /// Build an error result from a `NetError`.
    pub(crate) fn from_error(err: NetError) -> *mut Self {
        let (code, status) = match &err {
            NetError::EmptyBaseUrl => (FfiErrorCode::EmptyBaseUrl, 0),
            NetError::InvalidUrl { .. } => (FfiErrorCode::InvalidUrl, 0),
            NetError::TlsSetup(_) => (FfiErrorCode::TlsSetup, 0),
            NetError::Transport(_) => (FfiErrorCode::Transport, 0),
            NetError::Timeout(_) => (FfiErrorCode::Timeout, 0),
            NetError::NotFound => (FfiErrorCode::NotFound, 404),
            NetError::Http { status, .. } => (FfiErrorCode::Http, *status),
            NetError::Serialization(_) => (FfiErrorCode::Serialization, 0),
            NetError::Deserialization(_) => (FfiErrorCode::Deserialization, 0),
            NetError::Cancelled => (FfiErrorCode::Cancelled, 0),
            NetError::Dispatch(_) => (FfiErrorCode::Dispatch, 0),
        };
        Self::boxed(code, status, err.to_string())
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::boxed(FfiErrorCode::NullArg, 0, format!("null argument: {name}"))
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(FfiErrorCode::Panic, 0, msg.to_string())
    }
}
