//! Background execution with single-shot outcome delivery.
//!
//! # Design
//! A dispatched `Call` runs on tokio's blocking pool (the exchange itself is
//! synchronous `ureq` I/O). Its outcome is handed to a `CallbackExecutor`,
//! which decides where the success or failure callback runs: inline on the
//! worker (`Immediate`) or on a thread that drains a `CallbackLoop`.
//!
//! Each request owns an outcome slot holding both callbacks. Whoever takes
//! them first (completion, cancellation, or the task being dropped during
//! shutdown) delivers, so exactly one callback fires per request.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::call::Call;
use crate::error::NetError;

/// A unit of callback work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where outcome callbacks run.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs callbacks on the worker that finished the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl CallbackExecutor for Immediate {
    fn execute(&self, task: Task) {
        task()
    }
}

/// Sending half of a callback loop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CallbackQueue {
    tx: mpsc::Sender<Task>,
}

impl CallbackExecutor for CallbackQueue {
    fn execute(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("callback loop is gone; outcome discarded");
        }
    }
}

/// Receiving half: drained by the thread that should run callbacks.
#[derive(Debug)]
pub struct CallbackLoop {
    rx: mpsc::Receiver<Task>,
}

/// Create a queue/loop pair.
pub fn callback_queue() -> (CallbackQueue, CallbackLoop) {
    let (tx, rx) = mpsc::channel();
    (CallbackQueue { tx }, CallbackLoop { rx })
}

impl CallbackLoop {
    /// Run every callback already queued, without waiting.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one callback and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }
}

type Callbacks<T> = (Box<dyn FnOnce(T) + Send>, Box<dyn FnOnce(NetError) + Send>);

struct Outcome<T> {
    callbacks: Mutex<Option<Callbacks<T>>>,
    executor: Arc<dyn CallbackExecutor>,
}

impl<T: Send + 'static> Outcome<T> {
    /// Hand `result` to the executor unless something else already did.
    fn deliver(&self, result: Result<T, NetError>) -> bool {
        let taken = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((on_success, on_failure)) = taken else {
            return false;
        };
        self.executor.execute(Box::new(move || match result {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        }));
        true
    }
}

trait Settle: Send + Sync {
    fn cancel(&self) -> bool;
    fn is_settled(&self) -> bool;
}

impl<T: Send + 'static> Settle for Outcome<T> {
    fn cancel(&self) -> bool {
        self.deliver(Err(NetError::Cancelled))
    }

    fn is_settled(&self) -> bool {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// An outcome that was delivered before the handle was created.
struct Settled;

impl Settle for Settled {
    fn cancel(&self) -> bool {
        false
    }

    fn is_settled(&self) -> bool {
        true
    }
}

/// Delivers a dispatch failure if the task is dropped before finishing.
struct DropGuard<T: Send + 'static>(Arc<Outcome<T>>);

impl<T: Send + 'static> Drop for DropGuard<T> {
    fn drop(&mut self) {
        if self.0.deliver(Err(NetError::Dispatch("request dropped before completion".into()))) {
            debug!("request task dropped before completion");
        }
    }
}

/// Handle to an in-flight request.
///
/// Dropping the handle does not cancel the request.
pub struct RequestHandle {
    outcome: Arc<dyn Settle>,
    abort: Option<AbortHandle>,
}

impl RequestHandle {
    pub(crate) fn settled() -> Self {
        Self {
            outcome: Arc::new(Settled),
            abort: None,
        }
    }

    /// Cancel the request. Returns true if this call delivered the
    /// `Cancelled` failure, false if an outcome was already delivered.
    ///
    /// A blocking exchange already on the wire runs to completion; its
    /// result is discarded.
    pub fn cancel(&self) -> bool {
        let cancelled = self.outcome.cancel();
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        cancelled
    }

    /// True once an outcome has been handed to the callback executor.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_settled()
    }
}

/// Runs calls in the background and routes outcomes to callbacks.
pub struct Dispatcher {
    runtime: Option<Runtime>,
    handle: Handle,
    callbacks: Arc<dyn CallbackExecutor>,
}

impl Dispatcher {
    /// Start a dedicated multi-threaded runtime for network work.
    pub fn new(callbacks: Arc<dyn CallbackExecutor>) -> Result<Self, NetError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("netlib-io")
            .enable_all()
            .build()
            .map_err(|e| NetError::Dispatch(format!("failed to start runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            callbacks,
        })
    }

    /// Use a runtime the caller already owns.
    pub fn with_handle(handle: Handle, callbacks: Arc<dyn CallbackExecutor>) -> Self {
        Self {
            runtime: None,
            handle,
            callbacks,
        }
    }

    /// Execute `call` in the background and deliver exactly one outcome.
    pub fn dispatch<T, S, F>(&self, call: Call<T>, on_success: S, on_failure: F) -> RequestHandle
    where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(NetError) + Send + 'static,
    {
        let on_success: Box<dyn FnOnce(T) + Send> = Box::new(on_success);
        let on_failure: Box<dyn FnOnce(NetError) + Send> = Box::new(on_failure);
        let outcome = Arc::new(Outcome {
            callbacks: Mutex::new(Some((on_success, on_failure))),
            executor: self.callbacks.clone(),
        });
        let guard = DropGuard(outcome.clone());

        let task = self.handle.spawn(async move {
            let result = tokio::task::spawn_blocking(move || call.execute())
                .await
                .unwrap_or_else(|e| Err(NetError::Dispatch(e.to_string())));
            guard.0.deliver(result);
        });

        RequestHandle {
            outcome,
            abort: Some(task.abort_handle()),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::ClientConfig;
    use crate::http::{HttpRequest, HttpResponse};
    use crate::transport::{Connector, Transport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::RecvTimeoutError;

    /// Replies after an optional delay, or fails, or panics.
    enum Script {
        Reply(u16, &'static str),
        Fail,
        Panic,
        Sleep(Duration),
    }

    impl Connector for Script {
        fn execute(&self, _: &HttpRequest) -> Result<HttpResponse, NetError> {
            match self {
                Script::Reply(status, body) => Ok(HttpResponse {
                    status: *status,
                    headers: Vec::new(),
                    body: body.as_bytes().to_vec(),
                }),
                Script::Fail => Err(NetError::Transport("connection reset".into())),
                Script::Panic => panic!("connector exploded"),
                Script::Sleep(d) => {
                    std::thread::sleep(*d);
                    Ok(HttpResponse {
                        status: 200,
                        headers: Vec::new(),
                        body: b"1".to_vec(),
                    })
                }
            }
        }
    }

    fn api(script: Script) -> ApiClient {
        let transport = Transport::with_connector(&ClientConfig::default(), Arc::new(script));
        ApiClient::new(Arc::new(transport), url::Url::parse("https://api.example.com/").ok())
    }

    /// Dispatch and collect outcomes as strings on a channel.
    fn run(dispatcher: &Dispatcher, call: Call<u64>) -> (RequestHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let fail_tx = tx.clone();
        let handle = dispatcher.dispatch(
            call,
            move |v| tx.send(format!("ok:{v}")).unwrap(),
            move |e| fail_tx.send(format!("err:{e}")).unwrap(),
        );
        (handle, rx)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Immediate)).unwrap()
    }

    #[test]
    fn success_is_delivered_once() {
        let d = dispatcher();
        let (handle, rx) = run(&d, api(Script::Reply(200, "7")).get("n"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "ok:7");
        assert!(handle.is_finished());
        assert!(!handle.cancel());
        assert_eq!(rx.recv_timeout(Duration::from_millis(100)), Err(RecvTimeoutError::Disconnected));
    }

    #[test]
    fn transport_failure_reaches_on_failure() {
        let d = dispatcher();
        let (_handle, rx) = run(&d, api(Script::Fail).get("n"));
        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(msg.starts_with("err:transport error"), "{msg}");
    }

    #[test]
    fn worker_panic_becomes_dispatch_failure() {
        let d = dispatcher();
        let (_handle, rx) = run(&d, api(Script::Panic).get("n"));
        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(msg.starts_with("err:dispatch failed"), "{msg}");
    }

    #[test]
    fn cancel_delivers_cancelled_exactly_once() {
        let d = dispatcher();
        let (handle, rx) = run(&d, api(Script::Sleep(Duration::from_millis(300))).get("n"));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "err:request cancelled");
        assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());
    }

    #[test]
    fn shutdown_fails_in_flight_requests() {
        let d = dispatcher();
        let (_handle, rx) = run(&d, api(Script::Sleep(Duration::from_millis(500))).get("n"));
        std::thread::sleep(Duration::from_millis(50));
        drop(d);
        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(msg.starts_with("err:dispatch failed"), "{msg}");
    }

    #[test]
    fn queue_runs_callbacks_on_the_draining_thread() {
        let (queue, callbacks) = callback_queue();
        let d = Dispatcher::new(Arc::new(queue)).unwrap();
        let main_thread = std::thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let seen = ran_on.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let count = calls.clone();

        d.dispatch(
            api(Script::Reply(200, "1")).get::<u64>("n"),
            move |_| {
                *seen.lock().unwrap() = Some(std::thread::current().id());
                count.fetch_add(1, Ordering::SeqCst);
            },
            |e| panic!("unexpected failure: {e}"),
        );

        assert!(callbacks.run_next(Duration::from_secs(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*ran_on.lock().unwrap(), Some(main_thread));
        assert_eq!(callbacks.run_pending(), 0);
    }

    #[test]
    fn shared_runtime_handle_is_used() {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
        let d = Dispatcher::with_handle(runtime.handle().clone(), Arc::new(Immediate));
        let (_handle, rx) = run(&d, api(Script::Reply(200, "3")).get("n"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "ok:3");
    }
}
