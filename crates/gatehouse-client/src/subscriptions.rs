//! Live bindings from store references to observable state slots.
//!
//! A subscription owns at most one store listener at a time. Its state lives
//! in a [`tokio::sync::watch`] channel: the listener callback is the only
//! writer, consumers read snapshots through [`watch`](CollectionSubscription::watch)
//! or the [`updates`](CollectionSubscription::updates) stream.
//!
//! ```text
//!  set_reference(r) ──► cancel old ──► state = loading ──► store.listen(r)
//!                                                              │
//!           ┌────────────────── snapshot / error ◄─────────────┘
//!           ▼
//!     epoch matches? ── no ──► discard
//!           │ yes
//!           ▼
//!     decode at boundary ──► state.send
//! ```
//!
//! Retargeting bumps an epoch under the gate lock before the old listener is
//! released, so a notification already in flight for the old target can
//! never write into the slot afterwards.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::Stream;
use gatehouse_types::{FromDocument, RecordError};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::{ErrorKind, Operation, StoreError, StructuredError};
use crate::reference::Reference;
use crate::store::{DocumentSnapshot, DocumentStore, ListenerRegistration, Snapshot, SnapshotObserver};

/// Observable state of a subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<StructuredError>,
}

impl<T> SubscriptionState<T> {
    /// Listener registered, nothing delivered yet.
    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }

    /// No reference to follow.
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }

    fn failed(error: StructuredError) -> Self {
        Self {
            data: None,
            is_loading: false,
            error: Some(error),
        }
    }
}

impl<T> Default for SubscriptionState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cardinality {
    Collection,
    Document,
}

impl Cardinality {
    fn accepts(self, reference: &Reference) -> bool {
        match self {
            Cardinality::Collection => reference.is_collection(),
            Cardinality::Document => reference.is_document(),
        }
    }
}

type Project<T> = fn(Snapshot) -> Result<T, StoreError>;

fn malformed(e: RecordError) -> StoreError {
    StoreError::Malformed(e.to_string())
}

fn decode<R: FromDocument>(doc: &DocumentSnapshot) -> Option<Result<R, StoreError>> {
    let fields = doc.fields.as_ref()?;
    Some(R::from_document(doc.reference.collection_id(), doc.id(), fields).map_err(malformed))
}

fn project_collection<R: FromDocument>(snapshot: Snapshot) -> Result<Vec<R>, StoreError> {
    match snapshot {
        Snapshot::Query(docs) => docs.iter().filter_map(decode::<R>).collect(),
        Snapshot::Document(doc) => Err(StoreError::InvalidState(format!(
            "expected a collection snapshot, got document {}",
            doc.reference
        ))),
    }
}

fn project_document<R: FromDocument>(snapshot: Snapshot) -> Result<Option<R>, StoreError> {
    match snapshot {
        Snapshot::Document(doc) => decode(&doc).transpose(),
        Snapshot::Query(_) => Err(StoreError::InvalidState(
            "expected a document snapshot, got a collection".into(),
        )),
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Shared machinery behind both subscription kinds.
struct Binding<T> {
    store: Arc<dyn DocumentStore>,
    cardinality: Cardinality,
    project: Project<T>,
    reference: Option<Arc<Reference>>,
    registration: Option<ListenerRegistration>,
    /// Current listener generation. Observers hold this lock while applying.
    gate: Arc<Mutex<u64>>,
    state: Arc<watch::Sender<SubscriptionState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Binding<T> {
    fn new(store: Arc<dyn DocumentStore>, cardinality: Cardinality, project: Project<T>) -> Self {
        let (tx, _rx) = watch::channel(SubscriptionState::idle());
        Self {
            store,
            cardinality,
            project,
            reference: None,
            registration: None,
            gate: Arc::new(Mutex::new(0)),
            state: Arc::new(tx),
        }
    }

    fn set_reference(&mut self, reference: Option<Arc<Reference>>) {
        if self.reference.as_deref() == reference.as_deref() {
            return;
        }
        self.cancel();
        self.reference = reference.clone();

        let Some(target) = reference else {
            self.state.send_replace(SubscriptionState::idle());
            return;
        };

        if !self.cardinality.accepts(&target) {
            let expected = match self.cardinality {
                Cardinality::Collection => "collection",
                Cardinality::Document => "document",
            };
            warn!("Refusing to subscribe to {}: not a {} reference", target, expected);
            self.state.send_replace(SubscriptionState::failed(StructuredError::new(
                ErrorKind::InvalidState,
                target.path(),
                Operation::Read,
                format!("{target} is not a {expected} reference"),
            )));
            return;
        }

        let epoch = *self.gate.lock();
        self.state.send_replace(SubscriptionState::loading());
        debug!("Subscribing to {} (epoch {})", target, epoch);

        let gate = self.gate.clone();
        let state = self.state.clone();
        let project = self.project;
        let path = target.clone();
        let observer: SnapshotObserver = Arc::new(move |result| {
            let current = gate.lock();
            if *current != epoch {
                trace!("Discarding stale notification for {} (epoch {} != {})", path, epoch, *current);
                return;
            }
            match result.and_then(project) {
                Ok(data) => {
                    state.send_replace(SubscriptionState {
                        data: Some(data),
                        is_loading: false,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Subscription to {} failed: {}", path, e);
                    let error = StructuredError::from_store(&e, &path, Operation::Read);
                    state.send_modify(|s| {
                        s.error = Some(error);
                        s.is_loading = false;
                    });
                }
            }
        });

        self.registration = Some(self.store.listen(&target, observer));
    }

    /// Invalidate the current listener, then release it.
    fn cancel(&mut self) {
        *self.gate.lock() += 1;
        if let Some(registration) = self.registration.take() {
            trace!("Cancelling listener for {:?}", self.reference.as_deref().map(Reference::path));
            drop(registration);
        }
    }

    fn updates(&self) -> impl Stream<Item = SubscriptionState<T>> + Send + 'static {
        let rx = self.state.subscribe();
        futures::stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let state = rx.borrow_and_update().clone();
            Some((state, (rx, false)))
        })
    }
}

impl<T> Drop for Binding<T> {
    fn drop(&mut self) {
        *self.gate.lock() += 1;
        self.registration.take();
    }
}

// ============================================================================
// Public subscriptions
// ============================================================================

macro_rules! subscription_accessors {
    ($data:ty) => {
        /// Retarget the subscription.
        ///
        /// Equal references (by value) are a no-op. Otherwise the previous
        /// listener is cancelled before the new one is registered; `None`
        /// settles the state to idle.
        pub fn set_reference(&mut self, reference: Option<Arc<Reference>>) {
            self.binding.set_reference(reference);
        }

        pub fn reference(&self) -> Option<&Arc<Reference>> {
            self.binding.reference.as_ref()
        }

        /// Copy of the current state.
        pub fn state(&self) -> SubscriptionState<$data> {
            self.binding.state.borrow().clone()
        }

        /// Receiver for the state slot.
        pub fn watch(&self) -> watch::Receiver<SubscriptionState<$data>> {
            self.binding.state.subscribe()
        }

        /// The current state, then every change, ending once the
        /// subscription and its listener are gone.
        pub fn updates(&self) -> impl Stream<Item = SubscriptionState<$data>> + Send + 'static {
            self.binding.updates()
        }

        /// Whether a store listener is registered right now.
        pub fn is_active(&self) -> bool {
            self.binding.registration.is_some()
        }
    };
}

/// Live, ordered list of the records in a collection.
pub struct CollectionSubscription<R> {
    binding: Binding<Vec<R>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> CollectionSubscription<R>
where
    R: FromDocument + Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn DocumentStore>, reference: Option<Arc<Reference>>) -> Self {
        let mut binding = Binding::new(store, Cardinality::Collection, project_collection::<R>);
        binding.set_reference(reference);
        Self {
            binding,
            _record: PhantomData,
        }
    }

    subscription_accessors!(Vec<R>);
}

/// Live view of one document. `data == Some(None)` means the document was
/// looked up and does not exist.
pub struct DocumentSubscription<R> {
    binding: Binding<Option<R>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> DocumentSubscription<R>
where
    R: FromDocument + Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn DocumentStore>, reference: Option<Arc<Reference>>) -> Self {
        let mut binding = Binding::new(store, Cardinality::Document, project_document::<R>);
        binding.set_reference(reference);
        Self {
            binding,
            _record: PhantomData,
        }
    }

    subscription_accessors!(Option<R>);
}

impl<R> std::fmt::Debug for CollectionSubscription<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionSubscription")
            .field("reference", &self.binding.reference)
            .field("active", &self.binding.registration.is_some())
            .finish()
    }
}

impl<R> std::fmt::Debug for DocumentSubscription<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSubscription")
            .field("reference", &self.binding.reference)
            .field("active", &self.binding.registration.is_some())
            .finish()
    }
}
