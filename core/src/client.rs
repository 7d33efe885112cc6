//! The `NetClient` facade.
//!
//! # Design
//! A `NetClient` owns its configuration, the currently built transport and
//! a dispatcher. There is no process-wide state: independently configured
//! clients can coexist.
//!
//! The transport is built lazily and reused. `transport()` rebuilds it, under
//! one mutex, when none exists or when the configured timeout no longer
//! matches the one it was built with. `init` discards it outright. Typed
//! clients and calls hold an `Arc` to the transport they were created from,
//! so a rebuild never changes a client that already exists.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{ApiClient, ApiService};
use crate::call::Call;
use crate::config::ClientConfig;
use crate::dispatcher::{CallbackExecutor, Dispatcher, Immediate, RequestHandle};
use crate::error::NetError;
use crate::transport::{Connector, Transport};

/// Shared HTTP client: configuration, transport and request dispatch.
pub struct NetClient {
    config: RwLock<ClientConfig>,
    transport: Mutex<Option<Arc<Transport>>>,
    connector: Option<Arc<dyn Connector>>,
    dispatcher: Dispatcher,
}

/// Options for constructing a `NetClient`.
pub struct NetClientBuilder {
    config: ClientConfig,
    callbacks: Arc<dyn CallbackExecutor>,
    runtime: Option<Handle>,
    connector: Option<Arc<dyn Connector>>,
}

impl NetClientBuilder {
    /// Where success/failure callbacks run. Defaults to the worker thread.
    pub fn callbacks(mut self, callbacks: Arc<dyn CallbackExecutor>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Run network work on an existing tokio runtime instead of a private one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Replace the `ureq` connector, e.g. with a test double.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn build(self) -> Result<NetClient, NetError> {
        let dispatcher = match self.runtime {
            Some(handle) => Dispatcher::with_handle(handle, self.callbacks),
            None => Dispatcher::new(self.callbacks)?,
        };
        Ok(NetClient {
            config: RwLock::new(self.config),
            transport: Mutex::new(None),
            connector: self.connector,
            dispatcher,
        })
    }
}

impl NetClient {
    /// A client with its own runtime, delivering callbacks on worker threads.
    pub fn new(config: ClientConfig) -> Result<Self, NetError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> NetClientBuilder {
        NetClientBuilder {
            config,
            callbacks: Arc::new(Immediate),
            runtime: None,
            connector: None,
        }
    }

    /// Replace the whole configuration. Nothing is built until needed.
    pub fn init(&self, config: ClientConfig) {
        let mut slot = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        *slot = None;
        debug!("client configuration replaced");
    }

    /// Change the socket timeout used by transports built from now on.
    pub fn set_timeout(&self, timeout: Duration) {
        self.config.write().unwrap_or_else(PoisonError::into_inner).timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.config.read().unwrap_or_else(PoisonError::into_inner).timeout
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> ClientConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Return the current transport, building it first if required.
    pub fn transport(&self) -> Result<Arc<Transport>, NetError> {
        self.snapshot().map(|(transport, _)| transport)
    }

    /// The transport together with the configuration it belongs to.
    ///
    /// Both are read under the transport lock, which `init` also holds, so
    /// they never come from two different configurations.
    fn snapshot(&self) -> Result<(Arc<Transport>, ClientConfig), NetError> {
        let mut slot = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        let config = self.config();
        if let Some(current) = slot.as_ref() {
            if current.timeout() == config.timeout {
                return Ok((current.clone(), config));
            }
        }

        let built = Arc::new(match &self.connector {
            Some(connector) => Transport::with_connector(&config, connector.clone()),
            None => Transport::build(&config)?,
        });
        info!(
            timeout_ms = config.timeout.as_millis() as u64,
            debug = config.debug,
            "transport built"
        );
        *slot = Some(built.clone());
        Ok((built, config))
    }

    /// Build a typed client.
    ///
    /// `secondary_base_url`, when given, replaces the full URL of every
    /// request made through the returned client (and only that client).
    pub fn load_api<A: ApiService>(&self, secondary_base_url: Option<&str>) -> Result<A, NetError> {
        let (transport, config) = self.snapshot()?;
        let base = config.base_url;
        let base_url = if base.is_empty() {
            None
        } else {
            Some(Url::parse(&base).map_err(|e| NetError::invalid_url(&base, e))?)
        };
        let transport = match secondary_base_url {
            Some(target) => Arc::new(transport.with_url_override(Some(target.to_string()))),
            None => transport,
        };
        Ok(A::from_client(ApiClient::new(transport, base_url)))
    }

    /// Fire `call` in the background; exactly one of the callbacks runs.
    ///
    /// With no base URL configured, `on_failure` runs before this returns
    /// and nothing is sent.
    pub fn send_request<T, S, F>(&self, call: Call<T>, on_success: S, on_failure: F) -> RequestHandle
    where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(NetError) + Send + 'static,
    {
        if let Err(e) = self.check_base_url() {
            on_failure(e);
            return RequestHandle::settled();
        }
        self.dispatcher.dispatch(call, on_success, on_failure)
    }

    /// Run `call` on the current thread, with the same base URL check.
    pub fn execute<T: DeserializeOwned>(&self, call: Call<T>) -> Result<T, NetError> {
        self.check_base_url()?;
        call.execute()
    }

    fn check_base_url(&self) -> Result<(), NetError> {
        if self.config.read().unwrap_or_else(PoisonError::into_inner).base_url.is_empty() {
            warn!("request rejected: no base URL configured");
            return Err(NetError::EmptyBaseUrl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse};
    use std::sync::mpsc;

    #[derive(Default)]
    struct Canned {
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Connector for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, NetError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: br#"{"id":1}"#.to_vec(),
            })
        }
    }

    #[derive(Debug, serde::Deserialize)]
    struct UserInfo {
        id: u64,
    }

    fn client(config: ClientConfig) -> (NetClient, Arc<Canned>) {
        let canned = Arc::new(Canned::default());
        let client = NetClient::builder(config).connector(canned.clone()).build().unwrap();
        (client, canned)
    }

    #[test]
    fn empty_base_url_fails_synchronously() {
        let (client, canned) = client(ClientConfig::default());
        let api: ApiClient = client.load_api(None).unwrap();
        let failed = Arc::new(Mutex::new(None));
        let sink = failed.clone();

        let handle = client.send_request(
            api.get::<UserInfo>("v1/userinfo"),
            |_| panic!("must not succeed"),
            move |e| *sink.lock().unwrap() = Some(e),
        );

        assert!(matches!(*failed.lock().unwrap(), Some(NetError::EmptyBaseUrl)));
        assert!(handle.is_finished());
        assert!(!handle.cancel());
        assert!(canned.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn transport_is_reused_until_timeout_changes() {
        let (client, _) = client(ClientConfig::new("https://api.example.com/"));
        let first = client.transport().unwrap();
        let again = client.transport().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        client.set_timeout(Duration::from_secs(30));
        assert!(Arc::ptr_eq(&first, &client.transport().unwrap()));

        client.set_timeout(Duration::from_secs(5));
        let rebuilt = client.transport().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.timeout(), Duration::from_secs(5));
        assert_eq!(first.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn existing_typed_clients_keep_their_transport() {
        let (client, _) = client(ClientConfig::new("https://api.example.com/"));
        let before: ApiClient = client.load_api(None).unwrap();
        client.set_timeout(Duration::from_secs(2));
        let after: ApiClient = client.load_api(None).unwrap();

        assert_eq!(before.transport().timeout(), Duration::from_secs(30));
        assert_eq!(after.transport().timeout(), Duration::from_secs(2));
    }

    #[test]
    fn init_discards_the_built_transport() {
        let (client, _) = client(ClientConfig::new("https://api.example.com/"));
        let first = client.transport().unwrap();
        client.init(ClientConfig::new("https://other.example.com/").header("X-App", "2"));
        let second = client.transport().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(client.config().base_url, "https://other.example.com/");
    }

    #[test]
    fn secondary_base_url_is_per_client() {
        let (client, canned) = client(ClientConfig::new("https://api.example.com/"));
        let alt: ApiClient = client.load_api(Some("https://alt.example.com/")).unwrap();
        let plain: ApiClient = client.load_api(None).unwrap();

        client.execute(alt.get::<UserInfo>("v1/userinfo")).unwrap();
        client.execute(plain.get::<UserInfo>("v1/userinfo")).unwrap();

        let seen = canned.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://alt.example.com/");
        assert_eq!(seen[1].url, "https://api.example.com/v1/userinfo");
    }

    #[test]
    fn malformed_base_url_fails_load_api() {
        let (client, _) = client(ClientConfig::new("api.example.com"));
        let err = client.load_api::<ApiClient>(None).unwrap_err();
        assert!(matches!(err, NetError::InvalidUrl { .. }));
    }

    #[test]
    fn send_request_delivers_decoded_value() {
        let (client, canned) = client(ClientConfig::new("https://api.example.com/").header("X-App", "1"));
        let api: ApiClient = client.load_api(None).unwrap();
        let (tx, rx) = mpsc::channel();
        let fail_tx = tx.clone();

        client.send_request(
            api.get::<UserInfo>("/v1/userinfo"),
            move |user| tx.send(Ok(user.id)).unwrap(),
            move |e| fail_tx.send(Err(e.to_string())).unwrap(),
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(1));
        let seen = canned.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://api.example.com/v1/userinfo");
        assert_eq!(seen[0].header_values("X-App").collect::<Vec<_>>(), vec!["1"]);
    }

    #[test]
    fn clients_are_independent() {
        let (a, _) = client(ClientConfig::new("https://a.example.com/"));
        let (b, _) = client(ClientConfig::default());
        a.set_timeout(Duration::from_secs(1));
        assert_eq!(a.timeout(), Duration::from_secs(1));
        assert_eq!(b.timeout(), Duration::from_secs(30));
        assert!(b.execute(b.load_api::<ApiClient>(None).unwrap().get::<UserInfo>("x")).is_err());
    }

    #[test]
    fn typed_clients_never_mix_two_configurations() {
        let config = |name: &str| ClientConfig::new(format!("https://{name}.example.com/")).header("X-Cfg", name);
        let (client, canned) = client(config("a"));
        let client = Arc::new(client);
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let flipper = {
            let (client, done) = (client.clone(), done.clone());
            std::thread::spawn(move || {
                let mut i = 0u64;
                while !done.load(std::sync::atomic::Ordering::SeqCst) {
                    client.init(config(if i % 2 == 0 { "b" } else { "a" }));
                    i += 1;
                }
            })
        };

        for _ in 0..5000 {
            let api: ApiClient = client.load_api(None).unwrap();
            api.get::<UserInfo>("v1/userinfo").execute().unwrap();
        }
        done.store(true, std::sync::atomic::Ordering::SeqCst);
        flipper.join().unwrap();

        let seen = canned.seen.lock().unwrap();
        assert_eq!(seen.len(), 5000);
        for request in seen.iter() {
            let cfg = request.header_values("X-Cfg").collect::<Vec<_>>();
            assert_eq!(cfg.len(), 1);
            assert_eq!(request.url, format!("https://{}.example.com/v1/userinfo", cfg[0]));
        }
    }
}
