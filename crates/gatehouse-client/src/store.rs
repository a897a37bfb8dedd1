//! Capability surface of the remote document store.
//!
//! The binding layer only ever talks to a store through [`DocumentStore`]:
//!
//! - `listen` registers a snapshot observer and returns a
//!   [`ListenerRegistration`] disposer; every notification is a complete
//!   [`Snapshot`], never a delta.
//! - `get` is a one-shot read.
//! - `commit` applies a [`WriteBatch`] atomically.
//!
//! Concrete backends live in [`backends`](crate::backends).

use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_types::Fields;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::reference::Reference;

// ============================================================================
// Snapshots
// ============================================================================

/// Point-in-time state of one document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    pub reference: Reference,
    /// `None` when the document does not exist.
    pub fields: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn missing(reference: Reference) -> Self {
        Self { reference, fields: None }
    }

    pub fn id(&self) -> &str {
        self.reference.id().unwrap_or_default()
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }
}

/// What a listener receives: the full state of its target.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    /// Every document in a collection, in the store's native order.
    Query(Vec<DocumentSnapshot>),
    Document(DocumentSnapshot),
}

impl Snapshot {
    /// The empty result for `reference`: no documents, or a missing document.
    pub fn empty_for(reference: &Reference) -> Self {
        if reference.is_document() {
            Snapshot::Document(DocumentSnapshot::missing(reference.clone()))
        } else {
            Snapshot::Query(Vec::new())
        }
    }

    /// Number of existing documents in the snapshot.
    pub fn len(&self) -> usize {
        match self {
            Snapshot::Query(docs) => docs.len(),
            Snapshot::Document(doc) => usize::from(doc.exists()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Callback invoked with each snapshot (or the failure that ended the listener).
pub type SnapshotObserver = Arc<dyn Fn(Result<Snapshot, StoreError>) + Send + Sync>;

// ============================================================================
// Listener registration
// ============================================================================

/// Disposer for a registered listener.
///
/// Dropping the registration (or calling [`remove`](Self::remove)) detaches
/// the listener synchronously; the backend delivers nothing to it afterwards.
pub struct ListenerRegistration {
    dispose: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerRegistration {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Mutex::new(Some(Box::new(dispose))),
        }
    }

    /// A registration with nothing to release (stub backends).
    pub fn noop() -> Self {
        Self { dispose: Mutex::new(None) }
    }

    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.lock().take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("armed", &self.dispose.lock().is_some())
            .finish()
    }
}

// ============================================================================
// Writes
// ============================================================================

/// How `set` treats fields already on the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document.
    #[default]
    Overwrite,
    /// Merge the given top-level fields; others are left untouched.
    Merge,
}

/// One write inside a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Set {
        reference: Reference,
        fields: Fields,
        mode: SetMode,
    },
    /// Merge fields into an existing document; fails if it does not exist.
    Update { reference: Reference, fields: Fields },
    Delete { reference: Reference },
}

impl WriteOp {
    pub fn reference(&self) -> &Reference {
        match self {
            WriteOp::Set { reference, .. }
            | WriteOp::Update { reference, .. }
            | WriteOp::Delete { reference } => reference,
        }
    }
}

/// Writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, reference: Reference, fields: Fields, mode: SetMode) -> Self {
        self.ops.push(WriteOp::Set { reference, fields, mode });
        self
    }

    pub fn update(mut self, reference: Reference, fields: Fields) -> Self {
        self.ops.push(WriteOp::Update { reference, fields });
        self
    }

    pub fn delete(mut self, reference: Reference) -> Self {
        self.ops.push(WriteOp::Delete { reference });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// A real-time document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register `observer` for snapshots of `reference`.
    ///
    /// The initial snapshot may be delivered before this returns. After an
    /// error is delivered the listener is finished and receives nothing more.
    fn listen(&self, reference: &Reference, observer: SnapshotObserver) -> ListenerRegistration;

    /// Read the current state of `reference` once.
    async fn get(&self, reference: &Reference) -> Result<Snapshot, StoreError>;

    /// Apply every op in `batch`, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
