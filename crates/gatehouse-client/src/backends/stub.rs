//! Inert store and auth handles.
//!
//! Returned by the registry when configuration has no credential, so code
//! paths stay identical with or without a backend (offline renders, builds,
//! tests). Every operation succeeds with an empty result and does no I/O.

use async_trait::async_trait;
use gatehouse_types::Principal;
use tracing::debug;

use crate::auth::{AuthClient, SessionObserver};
use crate::error::{AuthError, StoreError};
use crate::reference::Reference;
use crate::store::{DocumentStore, ListenerRegistration, Snapshot, SnapshotObserver, WriteBatch};

/// Store that holds nothing and accepts every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubStore;

#[async_trait]
impl DocumentStore for StubStore {
    fn listen(&self, reference: &Reference, observer: SnapshotObserver) -> ListenerRegistration {
        // One empty snapshot so subscribers settle instead of loading forever.
        observer(Ok(Snapshot::empty_for(reference)));
        ListenerRegistration::noop()
    }

    async fn get(&self, reference: &Reference) -> Result<Snapshot, StoreError> {
        Ok(Snapshot::empty_for(reference))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        debug!("Stub store dropping batch of {} writes", batch.len());
        Ok(())
    }
}

/// Auth service with no session that ignores sign-in requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubAuth;

#[async_trait]
impl AuthClient for StubAuth {
    fn current_user(&self) -> Option<Principal> {
        None
    }

    fn on_session_changed(&self, observer: SessionObserver) -> ListenerRegistration {
        observer(None);
        ListenerRegistration::noop()
    }

    async fn sign_in_with_email(&self, email: &str, _password: &str) -> Result<(), AuthError> {
        debug!("Stub auth ignoring sign-in for {email}");
        Ok(())
    }

    async fn create_user_with_email(&self, email: &str, _password: &str) -> Result<(), AuthError> {
        debug!("Stub auth ignoring sign-up for {email}");
        Ok(())
    }

    async fn sign_in_anonymously(&self) -> Result<(), AuthError> {
        debug!("Stub auth ignoring anonymous sign-in");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gatehouse_types::Fields;
    use parking_lot::Mutex;

    use crate::store::SetMode;

    #[tokio::test]
    async fn test_stub_store_operations_succeed_empty() {
        let store = StubStore;
        let c = Reference::collection("personnel").unwrap();
        let d = c.doc("p1").unwrap();

        assert_eq!(store.get(&c).await.unwrap(), Snapshot::Query(vec![]));
        assert!(store.get(&d).await.unwrap().is_empty());

        let batch = WriteBatch::new()
            .set(d.clone(), Fields::new(), SetMode::Merge)
            .update(d.clone(), Fields::new())
            .delete(d.clone());
        store.commit(batch).await.unwrap();

        // Writes are not visible
        assert!(store.get(&d).await.unwrap().is_empty());
    }

    #[test]
    fn test_stub_listen_delivers_one_empty_snapshot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let reg = StubStore.listen(
            &Reference::collection("visitors").unwrap(),
            Arc::new(move |r| s.lock().push(r)),
        );
        drop(reg);
        assert_eq!(*seen.lock(), vec![Ok(Snapshot::Query(vec![]))]);
    }

    #[tokio::test]
    async fn test_stub_auth_never_establishes_session() {
        let auth = StubAuth;
        auth.sign_in_with_email("a@b.c", "secret").await.unwrap();
        auth.create_user_with_email("a@b.c", "secret").await.unwrap();
        auth.sign_in_anonymously().await.unwrap();
        auth.sign_out().await.unwrap();
        assert_eq!(auth.current_user(), None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _reg = auth.on_session_changed(Arc::new(move |u| s.lock().push(u)));
        assert_eq!(*seen.lock(), vec![None]);
    }
}
