//! Typed principal identifier.
//!
//! Wraps UUIDv7 (time-ordered, globally unique). The hex form doubles as the
//! document id of the principal's profile in the `users` collection. The
//! `short()` form (first 8 hex chars) is for human-facing output only;
//! never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A principal identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(uuid::Uuid);

impl PrincipalId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters, for human display only, not lookup.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Full 32-character hex string (no hyphens). Used as a document id.
    pub fn to_hex(&self) -> String {
        self.0.as_simple().to_string()
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for PrincipalId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full UUID with hyphens for log readability
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId({})", self.short())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = PrincipalId::new();
        let b = PrincipalId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_is_display_without_hyphens() {
        let id = PrincipalId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(hex, id.to_string().replace('-', ""));
    }

    #[test]
    fn test_short_is_hex_prefix() {
        let id = PrincipalId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_hex().starts_with(&id.short()));
    }

    #[test]
    fn test_debug_uses_short_form() {
        let id = PrincipalId::from(uuid::Uuid::nil());
        assert_eq!(format!("{id:?}"), "PrincipalId(00000000)");
    }
}
