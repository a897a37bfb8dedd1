//! In-memory document store.
//!
//! Behaves like the remote store as far as the binding layer can tell:
//! snapshot listeners, atomic batches, merge semantics, and access rules.
//! All data is lost when dropped.
//!
//! # Ordering
//!
//! Documents keep insertion order within a collection. Notifications for a
//! commit are computed while the state lock is held and delivered under a
//! separate delivery lock taken *before* the state lock, so two commits can
//! never interleave their notifications: every listener sees commits in the
//! order they were applied.
//!
//! The delivery lock is reentrant; an observer may register or drop
//! listeners on this store from inside its callback.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_types::Fields;
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, trace, warn};

use crate::error::{ErrorKind, Operation, StoreError};
use crate::reference::Reference;
use crate::store::{
    DocumentSnapshot, DocumentStore, ListenerRegistration, SetMode, Snapshot, SnapshotObserver,
    WriteBatch, WriteOp,
};

type Collections = HashMap<String, IndexMap<String, Fields>>;

struct Listener {
    id: u64,
    reference: Reference,
    observer: SnapshotObserver,
}

#[derive(Default)]
struct StoreState {
    collections: Collections,
    listeners: Vec<Listener>,
    next_listener: u64,
    /// (collection path, operation) pairs rejected by access rules.
    denied: HashSet<(String, Operation)>,
    /// Errors returned by upcoming commits, oldest first.
    faults: VecDeque<StoreError>,
}

impl StoreState {
    fn is_denied(&self, collection: &str, operation: Operation) -> bool {
        self.denied.contains(&(collection.to_string(), operation))
    }

    fn snapshot(&self, reference: &Reference) -> Snapshot {
        snapshot_of(&self.collections, reference)
    }
}

fn snapshot_of(collections: &Collections, reference: &Reference) -> Snapshot {
    match reference {
        Reference::Collection { path } => {
            let docs = collections
                .get(path)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| DocumentSnapshot {
                            reference: Reference::Document {
                                collection: path.clone(),
                                id: id.clone(),
                            },
                            fields: Some(fields.clone()),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Snapshot::Query(docs)
        }
        Reference::Document { collection, id } => Snapshot::Document(DocumentSnapshot {
            reference: reference.clone(),
            fields: collections.get(collection).and_then(|docs| docs.get(id)).cloned(),
        }),
    }
}

fn merge_into(target: &mut Fields, patch: &Fields) {
    for (k, v) in patch {
        target.insert(k.clone(), v.clone());
    }
}

fn check(
    denied: &HashSet<(String, Operation)>,
    reference: &Reference,
    operation: Operation,
) -> Result<(), StoreError> {
    if denied.contains(&(reference.collection_path().to_string(), operation)) {
        return Err(StoreError::PermissionDenied(format!(
            "{operation} on {reference} rejected by access rules"
        )));
    }
    Ok(())
}

/// Apply one op to the working copy.
fn apply_op(
    denied: &HashSet<(String, Operation)>,
    collections: &mut Collections,
    op: &WriteOp,
) -> Result<(), StoreError> {
    let reference = op.reference();
    let (collection, id) = match reference {
        Reference::Document { collection, id } => (collection, id),
        Reference::Collection { path } => {
            return Err(StoreError::InvalidState(format!(
                "cannot write to collection '{path}' directly"
            )));
        }
    };
    let docs = collections.entry(collection.clone()).or_default();

    match op {
        WriteOp::Set { fields, mode, .. } => {
            let exists = docs.contains_key(id);
            check(denied, reference, if exists { Operation::Update } else { Operation::Create })?;
            match (mode, docs.get_mut(id)) {
                (SetMode::Merge, Some(existing)) => merge_into(existing, fields),
                _ => {
                    docs.insert(id.clone(), fields.clone());
                }
            }
        }
        WriteOp::Update { fields, .. } => {
            check(denied, reference, Operation::Update)?;
            let existing = docs
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("no document at {reference}")))?;
            merge_into(existing, fields);
        }
        WriteOp::Delete { .. } => {
            check(denied, reference, Operation::Delete)?;
            docs.shift_remove(id);
        }
    }
    Ok(())
}

/// Thread-safe in-memory store.
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    delivery: ReentrantMutex<()>,
    latency: Mutex<Option<Duration>>,
    commits: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            delivery: ReentrantMutex::new(()),
            latency: Mutex::new(None),
            commits: AtomicU64::new(0),
        }
    }

    /// Delay every commit by `latency` before it applies.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Make the next commit fail with an error of `kind` without applying
    /// anything.
    pub fn fail_next(&self, kind: ErrorKind, message: impl Into<String>) {
        self.state.lock().faults.push_back(StoreError::of_kind(kind, message));
    }

    /// Reject `operation` on `collection` from now on.
    ///
    /// Denying `Read` also terminates live listeners on that collection with
    /// a `PermissionDenied` error, like a rules change on the real store.
    pub fn deny(&self, collection: &str, operation: Operation) {
        let _delivery = self.delivery.lock();
        let terminated: Vec<Listener> = {
            let mut st = self.state.lock();
            st.denied.insert((collection.to_string(), operation));
            if operation != Operation::Read {
                return;
            }
            let (hit, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut st.listeners)
                .into_iter()
                .partition(|l| l.reference.collection_path() == collection);
            st.listeners = keep;
            hit
        };
        for listener in terminated {
            debug!("Terminating listener {} on {}: read denied", listener.id, listener.reference);
            (listener.observer)(Err(StoreError::PermissionDenied(format!(
                "read on {} rejected by access rules",
                listener.reference
            ))));
        }
    }

    /// Lift a previous [`deny`](Self::deny).
    pub fn allow(&self, collection: &str, operation: Operation) {
        self.state.lock().denied.remove(&(collection.to_string(), operation));
    }

    /// Current fields of a document, bypassing access rules.
    pub fn document(&self, reference: &Reference) -> Option<Fields> {
        match self.state.lock().snapshot(reference) {
            Snapshot::Document(doc) => doc.fields,
            Snapshot::Query(_) => None,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Number of commits that applied successfully.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn listen(&self, reference: &Reference, observer: SnapshotObserver) -> ListenerRegistration {
        let _delivery = self.delivery.lock();
        let (initial, registration) = {
            let mut st = self.state.lock();
            if st.is_denied(reference.collection_path(), Operation::Read) {
                let err = StoreError::PermissionDenied(format!(
                    "read on {reference} rejected by access rules"
                ));
                (Err(err), ListenerRegistration::noop())
            } else {
                let id = st.next_listener;
                st.next_listener += 1;
                st.listeners.push(Listener {
                    id,
                    reference: reference.clone(),
                    observer: observer.clone(),
                });
                trace!("Listener {} registered on {}", id, reference);

                let weak = Arc::downgrade(&self.state);
                let registration = ListenerRegistration::new(move || {
                    if let Some(state) = weak.upgrade() {
                        state.lock().listeners.retain(|l| l.id != id);
                        trace!("Listener {} removed", id);
                    }
                });
                (Ok(st.snapshot(reference)), registration)
            }
        };
        observer(initial);
        registration
    }

    async fn get(&self, reference: &Reference) -> Result<Snapshot, StoreError> {
        let st = self.state.lock();
        check(&st.denied, reference, Operation::Read)?;
        Ok(st.snapshot(reference))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let _delivery = self.delivery.lock();
        let notifications: Vec<(SnapshotObserver, Snapshot)> = {
            let mut st = self.state.lock();
            if let Some(fault) = st.faults.pop_front() {
                warn!("Injected fault failing commit of {} writes: {}", batch.len(), fault);
                return Err(fault);
            }

            let mut next = st.collections.clone();
            for op in batch.ops() {
                apply_op(&st.denied, &mut next, op)?;
            }
            st.collections = next;
            self.commits.fetch_add(1, Ordering::AcqRel);

            let touched: Vec<&Reference> = batch.ops().iter().map(WriteOp::reference).collect();
            st.listeners
                .iter()
                .filter(|l| match &l.reference {
                    Reference::Collection { path } => {
                        touched.iter().any(|t| t.collection_path() == path)
                    }
                    doc => touched.iter().any(|t| *t == doc),
                })
                .map(|l| (l.observer.clone(), st.snapshot(&l.reference)))
                .collect()
        };

        debug!(
            "Committed {} writes, notifying {} listeners",
            batch.len(),
            notifications.len()
        );
        for (observer, snapshot) in notifications {
            observer(Ok(snapshot));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn collect(store: &MemoryStore, reference: &Reference) -> (Arc<Mutex<Vec<Result<Snapshot, StoreError>>>>, ListenerRegistration) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let reg = store.listen(reference, Arc::new(move |r| s.lock().push(r)));
        (seen, reg)
    }

    fn ids(snapshot: &Snapshot) -> Vec<String> {
        match snapshot {
            Snapshot::Query(docs) => docs.iter().map(|d| d.id().to_string()).collect(),
            Snapshot::Document(d) => vec![d.id().to_string()],
        }
    }

    #[tokio::test]
    async fn test_listen_delivers_initial_and_updates_in_order() {
        let store = MemoryStore::new();
        let c = Reference::collection("visitors").unwrap();
        let (seen, _reg) = collect(&store, &c);

        for id in ["v1", "v2", "v3"] {
            store
                .commit(WriteBatch::new().set(c.doc(id).unwrap(), fields(json!({"n": id})), SetMode::Overwrite))
                .await
                .unwrap();
        }

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        let snapshots: Vec<Vec<String>> = seen.iter().map(|r| ids(r.as_ref().unwrap())).collect();
        assert_eq!(snapshots[0], Vec::<String>::new());
        assert_eq!(snapshots[3], ["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = MemoryStore::new();
        let c = Reference::collection("personnel").unwrap();
        let batch = WriteBatch::new()
            .set(c.doc("p1").unwrap(), fields(json!({"name": "a"})), SetMode::Overwrite)
            .update(c.doc("missing").unwrap(), fields(json!({"name": "b"})));

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.document(&c.doc("p1").unwrap()), None);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_update_merges_and_set_merge_creates() {
        let store = MemoryStore::new();
        let d = Reference::document("users/u1").unwrap();

        store
            .commit(WriteBatch::new().set(d.clone(), fields(json!({"firstName": "A"})), SetMode::Merge))
            .await
            .unwrap();
        store
            .commit(WriteBatch::new().update(d.clone(), fields(json!({"lastName": "B"}))))
            .await
            .unwrap();
        assert_eq!(
            store.document(&d).unwrap(),
            fields(json!({"firstName": "A", "lastName": "B"}))
        );

        store
            .commit(WriteBatch::new().set(d.clone(), fields(json!({"x": 1})), SetMode::Overwrite))
            .await
            .unwrap();
        assert_eq!(store.document(&d).unwrap(), fields(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_delete_preserves_order_of_rest() {
        let store = MemoryStore::new();
        let c = Reference::collection("visitors").unwrap();
        let mut batch = WriteBatch::new();
        for id in ["a", "b", "c"] {
            batch = batch.set(c.doc(id).unwrap(), Fields::new(), SetMode::Overwrite);
        }
        store.commit(batch).await.unwrap();
        store.commit(WriteBatch::new().delete(c.doc("b").unwrap())).await.unwrap();
        assert_eq!(ids(&store.get(&c).await.unwrap()), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_denied_write_is_permission_denied() {
        let store = MemoryStore::new();
        store.deny("personnel", Operation::Create);
        let d = Reference::document("personnel/p1").unwrap();
        let err = store
            .commit(WriteBatch::new().set(d.clone(), Fields::new(), SetMode::Overwrite))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        store.allow("personnel", Operation::Create);
        store
            .commit(WriteBatch::new().set(d, Fields::new(), SetMode::Overwrite))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deny_read_terminates_listeners() {
        let store = MemoryStore::new();
        let c = Reference::collection("visitors").unwrap();
        let (seen, _reg) = collect(&store, &c);
        assert_eq!(store.listener_count(), 1);

        store.deny("visitors", Operation::Read);
        assert_eq!(store.listener_count(), 0);
        assert!(matches!(seen.lock().last(), Some(Err(StoreError::PermissionDenied(_)))));

        let (late, _reg2) = collect(&store, &c);
        assert!(matches!(late.lock().as_slice(), [Err(StoreError::PermissionDenied(_))]));
        assert!(store.get(&c).await.is_err());
    }

    #[tokio::test]
    async fn test_dropping_registration_stops_delivery() {
        let store = MemoryStore::new();
        let c = Reference::collection("visitors").unwrap();
        let (seen, reg) = collect(&store, &c);
        drop(reg);
        assert_eq!(store.listener_count(), 0);

        store
            .commit(WriteBatch::new().set(c.doc("v1").unwrap(), Fields::new(), SetMode::Overwrite))
            .await
            .unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_document_listener_only_sees_own_document() {
        let store = MemoryStore::new();
        let d = Reference::document("users/u1").unwrap();
        let (seen, _reg) = collect(&store, &d);

        store
            .commit(WriteBatch::new().set(Reference::document("users/u2").unwrap(), Fields::new(), SetMode::Overwrite))
            .await
            .unwrap();
        assert_eq!(seen.lock().len(), 1);

        store
            .commit(WriteBatch::new().set(d.clone(), fields(json!({"a": 1})), SetMode::Overwrite))
            .await
            .unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[1], Ok(Snapshot::Document(doc)) if doc.exists()));
    }

    #[tokio::test]
    async fn test_injected_fault_fails_once() {
        let store = MemoryStore::new();
        store.fail_next(ErrorKind::Unavailable, "offline");
        let d = Reference::document("visitors/v1").unwrap();
        let batch = WriteBatch::new().set(d.clone(), Fields::new(), SetMode::Overwrite);
        assert!(store.commit(batch.clone()).await.is_err());
        store.commit(batch).await.unwrap();
        assert!(store.document(&d).is_some());
    }

    #[tokio::test]
    async fn test_write_to_collection_reference_is_invalid_state() {
        let store = MemoryStore::new();
        let c = Reference::collection("visitors").unwrap();
        let err = store.commit(WriteBatch::new().delete(c)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }
}
