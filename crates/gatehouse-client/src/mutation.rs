//! Fire-and-forget writes.
//!
//! Every [`MutationGateway`] call validates its target and payload, spawns
//! the commit on the ambient runtime, and returns. The caller never awaits
//! and never sees an error: failures become [`StructuredError`]s on the
//! [`ErrorChannel`]. Local effects show up through the store's own
//! listeners (and therefore through subscriptions), not through the gateway.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::dispatch::spawn_detached;
use crate::error::{ErrorKind, Operation, StructuredError};
use crate::error_channel::ErrorChannel;
use crate::reference::Reference;
use crate::store::{DocumentStore, SetMode, Snapshot, WriteBatch};
use gatehouse_types::Fields;

/// How `create` picks the new document's id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DocumentKey {
    /// Generate a fresh id client-side.
    #[default]
    Auto,
    Id(String),
}

/// Operation a failed commit is reported as.
#[derive(Clone, Copy, Debug)]
enum Label {
    Fixed(Operation),
    /// Overwrite: an update if the document exists, a create otherwise.
    Overwrite,
}

/// Non-blocking write surface over a [`DocumentStore`].
#[derive(Clone)]
pub struct MutationGateway {
    store: Arc<dyn DocumentStore>,
    errors: ErrorChannel,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn DocumentStore>, errors: ErrorChannel) -> Self {
        Self { store, errors }
    }

    /// Write `payload` as a new document in `collection`.
    ///
    /// Returns the reference the document will be written to, or `None` if
    /// the write was rejected before dispatch (the reason is published).
    pub fn create<P>(&self, collection: &Reference, payload: &P, key: DocumentKey) -> Option<Reference>
    where
        P: Serialize + ?Sized,
    {
        if !collection.is_collection() {
            self.reject(
                ErrorKind::InvalidState,
                collection,
                Operation::Create,
                "create needs a collection reference",
            );
            return None;
        }
        let id = match key {
            DocumentKey::Auto => uuid::Uuid::new_v4().simple().to_string(),
            DocumentKey::Id(id) => id,
        };
        let target = match collection.doc(&id) {
            Ok(target) => target,
            Err(e) => {
                self.reject(ErrorKind::NotFound, collection, Operation::Create, e.to_string());
                return None;
            }
        };
        let fields = self.encode(payload, &target, Operation::Create)?;
        let batch = WriteBatch::new().set(target.clone(), fields, SetMode::Overwrite);
        self.dispatch(&target, Label::Overwrite, batch);
        Some(target)
    }

    /// Write `payload` to `document`, replacing it or merging into it.
    ///
    /// Rejections before dispatch report an overwrite as `create` and a merge
    /// as `update`. A failed overwrite commit reports `update` when the
    /// document already existed, matching the access rule the store checked.
    pub fn set<P>(&self, document: &Reference, payload: &P, mode: SetMode)
    where
        P: Serialize + ?Sized,
    {
        let (operation, label) = match mode {
            SetMode::Overwrite => (Operation::Create, Label::Overwrite),
            SetMode::Merge => (Operation::Update, Label::Fixed(Operation::Update)),
        };
        if !self.require_document(document, operation) {
            return;
        }
        let Some(fields) = self.encode(payload, document, operation) else {
            return;
        };
        self.dispatch(document, label, WriteBatch::new().set(document.clone(), fields, mode));
    }

    /// Merge the top-level fields of `patch` into an existing document.
    pub fn update<P>(&self, document: &Reference, patch: &P)
    where
        P: Serialize + ?Sized,
    {
        if !self.require_document(document, Operation::Update) {
            return;
        }
        let Some(fields) = self.encode(patch, document, Operation::Update) else {
            return;
        };
        self.dispatch(
            document,
            Label::Fixed(Operation::Update),
            WriteBatch::new().update(document.clone(), fields),
        );
    }

    pub fn delete(&self, document: &Reference) {
        if !self.require_document(document, Operation::Delete) {
            return;
        }
        self.dispatch(document, Label::Fixed(Operation::Delete), WriteBatch::new().delete(document.clone()));
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    fn require_document(&self, reference: &Reference, operation: Operation) -> bool {
        if reference.is_document() {
            return true;
        }
        self.reject(
            ErrorKind::InvalidState,
            reference,
            operation,
            format!("{operation} needs a document reference"),
        );
        false
    }

    fn encode<P>(&self, payload: &P, target: &Reference, operation: Operation) -> Option<Fields>
    where
        P: Serialize + ?Sized,
    {
        match serde_json::to_value(payload) {
            Ok(Value::Object(fields)) => Some(fields),
            Ok(other) => {
                let kind = match other {
                    Value::Null => "null",
                    Value::Bool(_) => "a boolean",
                    Value::Number(_) => "a number",
                    Value::String(_) => "a string",
                    Value::Array(_) => "an array",
                    Value::Object(_) => "an object",
                };
                self.reject(
                    ErrorKind::Malformed,
                    target,
                    operation,
                    format!("payload must be an object, got {kind}"),
                );
                None
            }
            Err(e) => {
                self.reject(ErrorKind::Malformed, target, operation, e.to_string());
                None
            }
        }
    }

    fn dispatch(&self, target: &Reference, label: Label, batch: WriteBatch) {
        let store = self.store.clone();
        let errors = self.errors.clone();
        let path = target.clone();
        let operation = match label {
            Label::Fixed(operation) => operation,
            Label::Overwrite => Operation::Create,
        };
        let task_name = format!("{operation} {target}");
        let dispatched = spawn_detached(&task_name, async move {
            if let Err(e) = store.commit(batch).await {
                let operation = match label {
                    Label::Fixed(operation) => operation,
                    Label::Overwrite => overwrite_operation(store.as_ref(), &path).await,
                };
                let error = StructuredError::from_store(&e, &path, operation);
                warn!("{}", error);
                errors.publish(&error);
            }
        });
        if !dispatched {
            self.reject(
                ErrorKind::Unavailable,
                target,
                operation,
                "no async runtime to dispatch the write",
            );
        }
    }

    fn reject(&self, kind: ErrorKind, target: &Reference, operation: Operation, message: impl Into<String>) {
        let error = StructuredError::new(kind, target.path(), operation, message);
        warn!("{}", error);
        self.errors.publish(&error);
    }
}

/// A failed batch applied nothing, so the document exists now exactly when
/// it existed at commit time (barring a concurrent writer).
async fn overwrite_operation(store: &dyn DocumentStore, target: &Reference) -> Operation {
    match store.get(target).await {
        Ok(Snapshot::Document(doc)) if doc.fields.is_some() => Operation::Update,
        _ => Operation::Create,
    }
}

impl std::fmt::Debug for MutationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationGateway")
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
