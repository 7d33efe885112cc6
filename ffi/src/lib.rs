//! C-ABI wrapper around `netlib-core`.
//!
//! # Overview
//! Lets a host application (a JNI shim on Android, or any language with a
//! C FFI) configure one shared HTTP client, fire JSON requests at it and
//! receive each outcome through a callback.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Configuration is built up on an opaque `FfiConfig`, then handed to
//!   `netlib_client_new` or `netlib_client_init`, which copy it.
//! - `netlib_send_request` invokes the callback exactly once, either
//!   synchronously (bad arguments, empty base URL) or later on a worker
//!   thread. The receiver owns the `FfiResult` it is given.
//! - The C caller owns all returned pointers and must call the matching
//!   `netlib_*_free` function to release them.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use netlib_core::{ApiClient, ClientConfig, HttpMethod, NetClient, NetError, Params, TrustConfig};
use tracing_subscriber::EnvFilter;

use types::*;

/// Borrow a C string as UTF-8. Null or invalid UTF-8 yields `None`.
fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Create a configuration for `base_url` with a timeout in milliseconds.
///
/// A null `base_url` leaves the base URL empty; requests sent through a
/// client built from it fail with `EmptyBaseUrl`. A `timeout_ms` of zero
/// keeps the default. Free with `netlib_config_free`.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_new(base_url: *const c_char, timeout_ms: u64) -> *mut FfiConfig {
    catch_unwind(|| {
        let mut config = ClientConfig::new(c_str(base_url).unwrap_or(""));
        if timeout_ms > 0 {
            config = config.timeout(Duration::from_millis(timeout_ms));
        }
        Box::into_raw(Box::new(FfiConfig { inner: config }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a configuration. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_free(config: *mut FfiConfig) {
    if !config.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(config) });
        });
    }
}

/// Apply `f` to the configuration behind `config`.
fn edit_config(config: *mut FfiConfig, f: impl FnOnce(ClientConfig) -> ClientConfig) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if config.is_null() {
            return false;
        }
        let config = unsafe { &mut *config };
        config.inner = f(std::mem::take(&mut config.inner));
        true
    }))
    .unwrap_or(false)
}

/// Add a header sent with every request. Returns false on null arguments.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_set_header(
    config: *mut FfiConfig,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    let (Some(name), Some(value)) = (c_str(name), c_str(value)) else {
        return false;
    };
    edit_config(config, |c| c.header(name, value))
}

/// Enable the disk cache under `dir`. The directory must already exist.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_set_cache_dir(config: *mut FfiConfig, dir: *const c_char) -> bool {
    let Some(dir) = c_str(dir) else {
        return false;
    };
    edit_config(config, |c| c.cache_dir(dir))
}

#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_set_cache_quota(config: *mut FfiConfig, bytes: u64) -> bool {
    edit_config(config, |c| c.cache_quota(bytes))
}

/// Trust the PEM certificates in `pem` and enable custom trust.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_set_trust_pem(config: *mut FfiConfig, pem: *const c_char) -> bool {
    let Some(pem) = c_str(pem) else {
        return false;
    };
    edit_config(config, |c| {
        c.trust(TrustConfig::from_pem(pem.as_bytes().to_vec()))
            .custom_trust_enabled(true)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_set_custom_trust_enabled(config: *mut FfiConfig, enabled: bool) -> bool {
    edit_config(config, |c| c.custom_trust_enabled(enabled))
}

/// Turn request/response logging on or off.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_config_set_debug(config: *mut FfiConfig, debug: bool) -> bool {
    edit_config(config, |c| c.debug(debug))
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client from a copy of `config`.
///
/// Returns null if `config` is null or the worker runtime cannot start.
/// The caller keeps ownership of `config`. Free the client with
/// `netlib_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_client_new(config: *const FfiConfig) -> *mut FfiNetClient {
    catch_unwind(AssertUnwindSafe(|| {
        if config.is_null() {
            return std::ptr::null_mut();
        }
        let config = unsafe { &*config }.inner.clone();
        match NetClient::new(config) {
            Ok(inner) => Box::into_raw(Box::new(FfiNetClient { inner })),
            Err(e) => {
                tracing::error!(error = %e, "client creation failed");
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Replace the client's configuration with a copy of `config`.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_client_init(client: *const FfiNetClient, config: *const FfiConfig) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || config.is_null() {
            return false;
        }
        let client = unsafe { &*client };
        client.inner.init(unsafe { &*config }.inner.clone());
        true
    }))
    .unwrap_or(false)
}

/// Set the timeout, in milliseconds, for requests prepared from now on.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_client_set_timeout(client: *const FfiNetClient, timeout_ms: u64) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return false;
        }
        unsafe { &*client }.inner.set_timeout(Duration::from_millis(timeout_ms));
        true
    }))
    .unwrap_or(false)
}

/// Free a client. Requests still in flight are abandoned and their
/// callbacks receive a `Dispatch` error. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_client_free(client: *mut FfiNetClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Send a request and report its outcome through `callback`.
///
/// `path` is resolved against the configured base URL. `json_body` may be
/// null; otherwise it must be valid JSON. When `secondary_base_url` is
/// non-null and non-empty the request goes to exactly that URL instead.
///
/// `callback` is invoked exactly once with `user_data` and a result the
/// receiver must free with `netlib_free_result`. Returns a handle for
/// cancellation, or null when the outcome was already delivered
/// synchronously or `callback` is null. Free the handle with
/// `netlib_request_free`.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_send_request(
    client: *const FfiNetClient,
    method: FfiHttpMethod,
    path: *const c_char,
    json_body: *const c_char,
    secondary_base_url: *const c_char,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> *mut FfiRequestHandle {
    let Some(callback) = callback else {
        return std::ptr::null_mut();
    };
    let user_data = UserData::new(user_data);
    let deliver = move |result: *mut FfiResult| callback(user_data.get(), result);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            deliver(FfiResult::null_arg("client"));
            return std::ptr::null_mut();
        }
        let Some(path) = c_str(path) else {
            deliver(FfiResult::null_arg("path"));
            return std::ptr::null_mut();
        };
        let client = unsafe { &*client };

        let mut params = Params::new();
        if let Some(body) = c_str(json_body) {
            match serde_json::from_str::<serde_json::Value>(body) {
                Ok(value) => params = params.json(&value),
                Err(e) => {
                    deliver(FfiResult::from_error(NetError::Serialization(e.to_string())));
                    return std::ptr::null_mut();
                }
            }
        }

        let api: ApiClient = match client.inner.load_api(c_str(secondary_base_url)) {
            Ok(api) => api,
            Err(e) => {
                deliver(FfiResult::from_error(e));
                return std::ptr::null_mut();
            }
        };
        let call = api.invoke::<serde_json::Value>(HttpMethod::from(method), path, params);

        let handle = client.inner.send_request(
            call,
            move |value| deliver(FfiResult::ok_json(&value)),
            move |err| deliver(FfiResult::from_error(err)),
        );
        if handle.is_finished() {
            return std::ptr::null_mut();
        }
        Box::into_raw(Box::new(FfiRequestHandle { inner: handle }))
    }));

    outcome.unwrap_or_else(|_| {
        deliver(FfiResult::panic("panic while sending request"));
        std::ptr::null_mut()
    })
}

/// Cancel a pending request. Its callback then receives `Cancelled`.
///
/// Returns false if the outcome was already delivered or `handle` is null.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_request_cancel(handle: *const FfiRequestHandle) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if handle.is_null() {
            return false;
        }
        unsafe { &*handle }.inner.cancel()
    }))
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn netlib_request_is_finished(handle: *const FfiRequestHandle) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if handle.is_null() {
            return true;
        }
        unsafe { &*handle }.inner.is_finished()
    }))
    .unwrap_or(true)
}

/// Free a request handle. Does not cancel the request. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_request_free(handle: *mut FfiRequestHandle) {
    if !handle.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(handle) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a result passed to a callback. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_free_result(result: *mut FfiResult) {
    if !result.is_null() {
        let _ = catch_unwind(|| {
            let r = unsafe { Box::from_raw(result) };
            netlib_free_string(r.body);
        });
    }
}

/// Free a string returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { std::ffi::CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a stderr log subscriber. `RUST_LOG` wins when set; otherwise the
/// level is `debug` or `info`. Returns false if a subscriber already exists.
#[unsafe(no_mangle)]
pub extern "C" fn netlib_init_logging(debug: bool) -> bool {
    catch_unwind(|| {
        let fallback = if debug { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}
