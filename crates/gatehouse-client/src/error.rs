//! Error taxonomy for the binding layer.
//!
//! Two layers:
//! - [`StoreError`] / [`AuthError`]: what a backend call returned, carried
//!   through `Result` inside the layer.
//! - [`StructuredError`]: the event that leaves the layer, either in a
//!   subscription's `error` slot (reads) or on the
//!   [`ErrorChannel`](crate::ErrorChannel) (writes). It records *what* was
//!   targeted and *which* operation failed, never who initiated it.

use serde::Serialize;
use strum::Display;

use crate::reference::{Reference, ReferenceError};

/// Failure category shared by reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The store rejected the operation under its access rules.
    PermissionDenied,
    /// The referenced document or collection path is invalid or missing.
    NotFound,
    /// Transient network or service failure.
    Unavailable,
    /// Operation attempted against the wrong kind of target or an
    /// uninitialized handle.
    InvalidState,
    /// A payload or snapshot that does not fit the record shape.
    Malformed,
}

/// Which operation a [`StructuredError`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

/// Errors returned by a [`DocumentStore`](crate::DocumentStore).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("malformed: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Unavailable(_) => ErrorKind::Unavailable,
            StoreError::InvalidState(_) => ErrorKind::InvalidState,
            StoreError::Malformed(_) => ErrorKind::Malformed,
        }
    }

    /// Build an error of the given kind.
    pub fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::PermissionDenied => StoreError::PermissionDenied(message),
            ErrorKind::NotFound => StoreError::NotFound(message),
            ErrorKind::Unavailable => StoreError::Unavailable(message),
            ErrorKind::InvalidState => StoreError::InvalidState(message),
            ErrorKind::Malformed => StoreError::Malformed(message),
        }
    }
}

impl From<ReferenceError> for StoreError {
    fn from(e: ReferenceError) -> Self {
        StoreError::NotFound(e.to_string())
    }
}

/// Errors returned by an [`AuthClient`](crate::AuthClient).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredential,
    #[error("an account already exists for {0}")]
    EmailInUse(String),
    #[error("password is too weak")]
    WeakPassword,
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
}

/// Why an action reserved for signed-in accounts was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("not signed in")]
    SignedOut,
    #[error("guest sessions cannot do this; sign in with an account")]
    Anonymous,
    #[error("session listener closed")]
    Closed,
}

/// A failure event as seen outside the binding layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    /// Slash-separated path of the reference the operation targeted.
    pub path: String,
    pub operation: Operation,
    pub message: String,
    /// Unix milliseconds at construction.
    pub timestamp: u64,
}

impl StructuredError {
    pub fn new(
        kind: ErrorKind,
        path: impl Into<String>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            operation,
            message: message.into(),
            timestamp: gatehouse_types::now_millis(),
        }
    }

    /// Wrap a backend error with the target and operation it came from.
    pub fn from_store(error: &StoreError, reference: &Reference, operation: Operation) -> Self {
        Self::new(error.kind(), reference.path(), operation, error.to_string())
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} failed ({}): {}", self.operation, self.path, self.kind, self.message)
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping_roundtrip() {
        for kind in [
            ErrorKind::PermissionDenied,
            ErrorKind::NotFound,
            ErrorKind::Unavailable,
            ErrorKind::InvalidState,
            ErrorKind::Malformed,
        ] {
            assert_eq!(StoreError::of_kind(kind, "x").kind(), kind);
        }
    }

    #[test]
    fn test_from_store_carries_target() {
        let r = Reference::document("personnel/p1").unwrap();
        let e = StructuredError::from_store(
            &StoreError::PermissionDenied("rules".into()),
            &r,
            Operation::Update,
        );
        assert_eq!(e.kind, ErrorKind::PermissionDenied);
        assert_eq!(e.path, "personnel/p1");
        assert_eq!(e.operation, Operation::Update);
        assert!(e.timestamp > 0);
        assert_eq!(e.to_string(), "update personnel/p1 failed (PermissionDenied): permission denied: rules");
    }

    #[test]
    fn test_reference_error_is_not_found() {
        let err: StoreError = Reference::collection("").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_serializes_snake_case() {
        let e = StructuredError::new(ErrorKind::NotFound, "users/x", Operation::Read, "gone");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["operation"], "read");
    }
}
