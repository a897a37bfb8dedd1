//! Process-wide store and auth handles.
//!
//! A [`ClientRegistry`] is created once at startup and passed to whatever
//! needs handles. The first [`acquire`](ClientRegistry::acquire) with a
//! credential connects through the registry's [`Connector`] and caches the
//! result; every later call gets the same handles back. Without a
//! credential the registry hands out one shared set of stub handles without
//! recording a connection, so a later call that does carry a credential
//! still connects.

use std::sync::{Arc, OnceLock};

use gatehouse_types::FromDocument;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::auth::AuthClient;
use crate::backends::{MemoryAuth, MemoryStore, StubAuth, StubStore};
use crate::config::{StoreConfig, Transport};
use crate::error::StoreError;
use crate::error_channel::ErrorChannel;
use crate::mutation::MutationGateway;
use crate::reference::Reference;
use crate::session::{SessionOptions, SessionState, SessionSubscription};
use crate::store::DocumentStore;
use crate::subscriptions::{CollectionSubscription, DocumentSubscription};

/// Builds live store and auth clients from configuration.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        config: &StoreConfig,
    ) -> Result<(Arc<dyn DocumentStore>, Arc<dyn AuthClient>), StoreError>;
}

/// Connector backed by the in-process store and auth service.
///
/// Every connection shares the same backend instances, which stay reachable
/// through [`store`](Self::store) and [`auth`](Self::auth) for seeding and
/// fault injection.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    auth: Arc<MemoryAuth>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backends(store: Arc<MemoryStore>, auth: Arc<MemoryAuth>) -> Self {
        Self { store, auth }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn auth(&self) -> &Arc<MemoryAuth> {
        &self.auth
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        config: &StoreConfig,
    ) -> Result<(Arc<dyn DocumentStore>, Arc<dyn AuthClient>), StoreError> {
        debug!(
            "Connecting in-memory backend for project {}",
            config.project_id.as_deref().unwrap_or("(unnamed)")
        );
        let store: Arc<dyn DocumentStore> = self.store.clone();
        let auth: Arc<dyn AuthClient> = self.auth.clone();
        Ok((store, auth))
    }
}

/// The store, auth, and error-channel handles for this process.
#[derive(Clone)]
pub struct ClientHandles {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthClient>,
    errors: ErrorChannel,
    session: Arc<OnceLock<SessionSubscription>>,
    transport: Option<Transport>,
}

impl ClientHandles {
    fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthClient>,
        errors: ErrorChannel,
        transport: Option<Transport>,
    ) -> Self {
        Self {
            store,
            auth,
            errors,
            session: Arc::new(OnceLock::new()),
            transport,
        }
    }

    fn stub(errors: ErrorChannel) -> Self {
        Self::new(Arc::new(StubStore), Arc::new(StubAuth), errors, None)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn auth(&self) -> &Arc<dyn AuthClient> {
        &self.auth
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    /// True for the inert handles returned without a credential.
    pub fn is_stub(&self) -> bool {
        self.transport.is_none()
    }

    /// Transport the live connection was configured with.
    pub fn transport(&self) -> Option<Transport> {
        self.transport
    }

    pub fn gateway(&self) -> MutationGateway {
        MutationGateway::new(self.store.clone(), self.errors.clone())
    }

    /// Receiver for the process session state.
    ///
    /// The session listener is created on first use; `options` from that
    /// first call apply for the life of these handles.
    pub fn session(&self, options: SessionOptions) -> watch::Receiver<SessionState> {
        self.session
            .get_or_init(|| SessionSubscription::subscribe(self.auth.clone(), options))
            .watch()
    }

    pub fn collection<R>(&self, reference: Option<Arc<Reference>>) -> CollectionSubscription<R>
    where
        R: FromDocument + Clone + Send + Sync + 'static,
    {
        CollectionSubscription::new(self.store.clone(), reference)
    }

    pub fn document<R>(&self, reference: Option<Arc<Reference>>) -> DocumentSubscription<R>
    where
        R: FromDocument + Clone + Send + Sync + 'static,
    {
        DocumentSubscription::new(self.store.clone(), reference)
    }
}

impl std::fmt::Debug for ClientHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandles")
            .field("stub", &self.is_stub())
            .field("transport", &self.transport)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// Owner of the process's client handles.
pub struct ClientRegistry {
    connector: Box<dyn Connector>,
    handles: Mutex<Option<ClientHandles>>,
    /// Inert handles shared by every uncredentialed or failed acquire.
    stub: OnceLock<ClientHandles>,
    errors: ErrorChannel,
}

impl ClientRegistry {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            handles: Mutex::new(None),
            stub: OnceLock::new(),
            errors: ErrorChannel::new(),
        }
    }

    /// Return the process handles, connecting on first use.
    ///
    /// Never fails: a missing credential or a failed connection yields stub
    /// handles (with a warning or error logged).
    pub fn acquire(&self, config: &StoreConfig) -> ClientHandles {
        let mut slot = self.handles.lock();
        if let Some(handles) = slot.as_ref() {
            debug!("Reusing existing client handles; ignoring passed config");
            return handles.clone();
        }

        if !config.has_credentials() {
            warn!("No API key configured; using stub store and auth handles");
            return self.stub();
        }

        match self.connector.connect(config) {
            Ok((store, auth)) => {
                let transport = config.transport();
                info!(
                    "Connected to project {} ({:?})",
                    config.project_id.as_deref().unwrap_or("(unnamed)"),
                    transport
                );
                let handles = ClientHandles::new(store, auth, self.errors.clone(), Some(transport));
                *slot = Some(handles.clone());
                handles
            }
            Err(e) => {
                error!("Failed to connect, falling back to stub handles: {}", e);
                self.stub()
            }
        }
    }

    fn stub(&self) -> ClientHandles {
        self.stub
            .get_or_init(|| ClientHandles::stub(self.errors.clone()))
            .clone()
    }

    /// The process error channel, shared by every handle set.
    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    /// Whether live handles have been created.
    pub fn is_connected(&self) -> bool {
        self.handles.lock().is_some()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("connected", &self.is_connected())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gatehouse_types::Fields;

    use crate::store::Snapshot;

    fn credentialed() -> StoreConfig {
        StoreConfig {
            api_key: Some("key-123".into()),
            project_id: Some("gate-test".into()),
            ..StoreConfig::default()
        }
    }

    struct CountingConnector {
        inner: MemoryConnector,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Connector for CountingConnector {
        fn connect(
            &self,
            config: &StoreConfig,
        ) -> Result<(Arc<dyn DocumentStore>, Arc<dyn AuthClient>), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Unavailable("backend down".into()));
            }
            self.inner.connect(config)
        }
    }

    fn counting(fail: bool) -> (ClientRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ClientRegistry::new(CountingConnector {
            inner: MemoryConnector::new(),
            calls: calls.clone(),
            fail,
        });
        (registry, calls)
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (registry, calls) = counting(false);
        let a = registry.acquire(&credentialed());
        let b = registry.acquire(&StoreConfig {
            force_long_polling: false,
            ..credentialed()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(a.store(), b.store()));
        // Later config is ignored
        assert_eq!(b.transport(), Some(Transport::LongPolling));
        assert!(!a.is_stub());
    }

    #[test]
    fn test_missing_credential_returns_uncached_stub() {
        let (registry, calls) = counting(false);
        let blank = StoreConfig {
            api_key: Some("   ".into()),
            ..StoreConfig::default()
        };
        assert!(registry.acquire(&StoreConfig::default()).is_stub());
        assert!(registry.acquire(&blank).is_stub());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!registry.is_connected());

        assert!(!registry.acquire(&credentialed()).is_stub());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stub_handles_shared_across_acquires() {
        let (registry, _calls) = counting(true);
        let a = registry.acquire(&StoreConfig::default());
        let b = registry.acquire(&StoreConfig::default());
        let c = registry.acquire(&credentialed());
        assert!(Arc::ptr_eq(&a.session, &b.session));
        assert!(Arc::ptr_eq(&a.session, &c.session));
        assert!(Arc::ptr_eq(a.store(), c.store()));

        let _session = a.session(SessionOptions::default());
        assert!(b.session.get().is_some());
        assert!(!registry.is_connected());
    }

    #[test]
    fn test_connect_failure_falls_back_to_stub() {
        let (registry, calls) = counting(true);
        assert!(registry.acquire(&credentialed()).is_stub());
        assert!(registry.acquire(&credentialed()).is_stub());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stub_handles_are_safe() {
        let registry = ClientRegistry::new(MemoryConnector::new());
        let handles = registry.acquire(&StoreConfig::default());
        let c = Reference::collection("personnel").unwrap();

        let sub = handles.collection::<Fields>(Some(Arc::new(c.clone())));
        assert_eq!(sub.state().data, Some(vec![]));
        assert!(sub.state().error.is_none());

        assert_eq!(handles.store().get(&c).await.unwrap(), Snapshot::Query(vec![]));
        handles.auth().sign_in_anonymously().await.unwrap();
        assert_eq!(handles.auth().current_user(), None);
        let session = handles.session(SessionOptions::default());
        assert_eq!(session.borrow().user, None);
        assert!(!session.borrow().is_loading);
    }

    #[test]
    fn test_error_channel_shared_across_handles() {
        let registry = ClientRegistry::new(MemoryConnector::new());
        let stub = registry.acquire(&StoreConfig::default());
        let live = registry.acquire(&credentialed());
        let _guard = stub.errors().subscribe(|_| {});
        assert_eq!(live.errors().listener_count(), 1);
        assert_eq!(registry.errors().listener_count(), 1);
    }

    #[test]
    fn test_session_created_once_per_handles() {
        let connector = MemoryConnector::new();
        let auth = connector.auth().clone();
        let registry = ClientRegistry::new(connector);
        let handles = registry.acquire(&credentialed());

        let _a = handles.session(SessionOptions::default());
        let _b = handles.clone().session(SessionOptions { auto_anonymous: true });
        assert_eq!(auth.observer_count(), 1);
    }
}
