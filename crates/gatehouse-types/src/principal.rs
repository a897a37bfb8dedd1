//! Session principal.
//!
//! A `Principal` is whoever the auth service says is on the other end of the
//! session: either a signed-in account or an anonymous guest. Anonymous
//! principals are real sessions (they can read public data) but access-gated
//! views treat them as "not logged in".

use serde::{Deserialize, Serialize};

use crate::ids::PrincipalId;

/// An authenticated or anonymous session identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier assigned by the auth service.
    pub uid: PrincipalId,
    /// Account email. Always `None` for anonymous sessions.
    pub email: Option<String>,
    /// Guest session with no account behind it.
    pub is_anonymous: bool,
}

impl Principal {
    /// A signed-in account.
    pub fn account(uid: PrincipalId, email: impl Into<String>) -> Self {
        Self {
            uid,
            email: Some(email.into()),
            is_anonymous: false,
        }
    }

    /// A fresh anonymous guest.
    pub fn anonymous() -> Self {
        Self {
            uid: PrincipalId::new(),
            email: None,
            is_anonymous: true,
        }
    }

    /// True for account sessions; the check access-gated views make.
    pub fn is_authenticated(&self) -> bool {
        !self.is_anonymous
    }

    /// Handle derived from the email local part, as profiles store it.
    pub fn username(&self) -> Option<&str> {
        self.email.as_deref().and_then(|e| e.split('@').next()).filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{email} ({})", self.uid.short()),
            None => write!(f, "guest ({})", self.uid.short()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_is_authenticated() {
        let p = Principal::account(PrincipalId::new(), "guard@camp.example");
        assert!(p.is_authenticated());
        assert_eq!(p.username(), Some("guard"));
    }

    #[test]
    fn test_anonymous_is_not_authenticated() {
        let p = Principal::anonymous();
        assert!(p.is_anonymous);
        assert!(!p.is_authenticated());
        assert_eq!(p.username(), None);
        assert!(p.to_string().starts_with("guest ("));
    }

    #[test]
    fn test_serde_json_roundtrip() {
        let p = Principal::account(PrincipalId::new(), "amy@example.com");
        let json = serde_json::to_string(&p).unwrap();
        let parsed: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(p, parsed);
    }
}
