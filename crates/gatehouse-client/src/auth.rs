//! Capability surface of the authentication service.
//!
//! Sign-in calls resolve once the service has accepted or rejected the
//! request; the resulting principal is observed through
//! [`AuthClient::on_session_changed`], the same path that reports restored
//! sessions and sign-outs. Nothing hands a principal back directly.

use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_types::Principal;

use crate::error::AuthError;
use crate::store::ListenerRegistration;

/// Callback invoked with the current principal whenever the session changes.
pub type SessionObserver = Arc<dyn Fn(Option<Principal>) + Send + Sync>;

#[async_trait]
pub trait AuthClient: Send + Sync {
    /// The session principal right now, if one is established.
    fn current_user(&self) -> Option<Principal>;

    /// Register for session changes.
    ///
    /// Once the service knows the initial session state, the observer is
    /// called with it, then again on every change.
    fn on_session_changed(&self, observer: SessionObserver) -> ListenerRegistration;

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<(), AuthError>;

    async fn create_user_with_email(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// Establish a guest session. A no-op when a session already exists.
    async fn sign_in_anonymously(&self) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}
