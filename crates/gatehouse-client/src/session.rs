//! Authentication session binding and fire-and-forget auth calls.
//!
//! [`SessionSubscription`] mirrors the auth service's session into a watch
//! slot with three observable states:
//!
//! | `is_loading` | `user`                      | meaning                    |
//! |--------------|-----------------------------|----------------------------|
//! | `true`       | `None`                      | not determined yet         |
//! | `false`      | `Some(p)`, `p.is_anonymous` | guest session              |
//! | `false`      | `Some(p)`, account          | authenticated              |
//! | `false`      | `None`                      | signed out                 |
//!
//! The `initiate_*` functions start an auth call and return at once. Their
//! outcome arrives through the subscription; failures are only logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gatehouse_types::Principal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::{AuthClient, SessionObserver};
use crate::dispatch::spawn_detached;
use crate::error::AccessError;
use crate::store::ListenerRegistration;

/// Observable session state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<Principal>,
    pub is_loading: bool,
}

impl SessionState {
    pub fn undetermined() -> Self {
        Self {
            user: None,
            is_loading: true,
        }
    }

    fn settled(user: Option<Principal>) -> Self {
        Self {
            user,
            is_loading: false,
        }
    }

    /// Signed in with an account. Guests do not pass.
    pub fn is_authenticated(&self) -> bool {
        self.user.as_ref().is_some_and(Principal::is_authenticated)
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_anonymous)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::undetermined()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Establish a guest session when the service first reports none.
    pub auto_anonymous: bool,
}

/// Session listener feeding a watch slot.
pub struct SessionSubscription {
    state: Arc<watch::Sender<SessionState>>,
    _registration: ListenerRegistration,
}

impl SessionSubscription {
    pub fn subscribe(auth: Arc<dyn AuthClient>, options: SessionOptions) -> Self {
        let (tx, _rx) = watch::channel(SessionState::undetermined());
        let state = Arc::new(tx);

        // The observer lives inside the auth client; a strong handle here
        // would keep the client alive forever.
        let weak_auth = Arc::downgrade(&auth);
        let auto_requested = AtomicBool::new(false);
        let slot = state.clone();

        let observer: SessionObserver = Arc::new(move |user: Option<Principal>| {
            let wants_guest = user.is_none()
                && options.auto_anonymous
                && !auto_requested.swap(true, Ordering::AcqRel);
            if wants_guest {
                if let Some(auth) = weak_auth.upgrade() {
                    slot.send_replace(SessionState::undetermined());
                    start_auto_anonymous(auth, slot.clone());
                    return;
                }
            }
            debug!(
                "Session changed: {}",
                user.as_ref().map_or_else(|| "signed out".to_string(), ToString::to_string)
            );
            slot.send_replace(SessionState::settled(user));
        });

        let registration = auth.on_session_changed(observer);
        Self {
            state,
            _registration: registration,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscription")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Settle to "signed out" unless a session arrived in the meantime.
fn settle_if_pending(slot: &watch::Sender<SessionState>) {
    slot.send_if_modified(|s| {
        if s.is_loading && s.user.is_none() {
            s.is_loading = false;
            true
        } else {
            false
        }
    });
}

fn start_auto_anonymous(auth: Arc<dyn AuthClient>, slot: Arc<watch::Sender<SessionState>>) {
    let task_slot = slot.clone();
    let dispatched = spawn_detached("auto anonymous sign-in", async move {
        match auth.sign_in_anonymously().await {
            // Inert services accept the call without creating a session
            Ok(()) if auth.current_user().is_none() => {
                debug!("Anonymous sign-in accepted but no session established");
                settle_if_pending(&task_slot);
            }
            Ok(()) => {}
            Err(e) => {
                warn!("Automatic anonymous sign-in failed: {}", e);
                settle_if_pending(&task_slot);
            }
        }
    });
    if !dispatched {
        warn!("No async runtime; skipping automatic anonymous sign-in");
        settle_if_pending(&slot);
    }
}

/// Wait for the session to settle, then return its principal if it is a
/// signed-in account. Guest sessions and signed-out states are refused.
pub async fn require_account(rx: &mut watch::Receiver<SessionState>) -> Result<Principal, AccessError> {
    let state = rx.wait_for(|s| !s.is_loading).await.map_err(|_| AccessError::Closed)?;
    match &state.user {
        None => Err(AccessError::SignedOut),
        Some(user) if !user.is_authenticated() => Err(AccessError::Anonymous),
        Some(user) => Ok(user.clone()),
    }
}

// ============================================================================
// Non-blocking auth calls
// ============================================================================

pub fn initiate_anonymous_sign_in(auth: &Arc<dyn AuthClient>) {
    let auth = auth.clone();
    dispatch("anonymous sign-in", async move {
        if let Err(e) = auth.sign_in_anonymously().await {
            warn!("Anonymous sign-in failed: {}", e);
        }
    });
}

pub fn initiate_email_sign_in(auth: &Arc<dyn AuthClient>, email: &str, password: &str) {
    let (auth, email, password) = (auth.clone(), email.to_string(), password.to_string());
    dispatch("email sign-in", async move {
        match auth.sign_in_with_email(&email, &password).await {
            Ok(()) => info!("Sign-in accepted for {}", email),
            Err(e) => warn!("Sign-in for {} failed: {}", email, e),
        }
    });
}

pub fn initiate_email_sign_up(auth: &Arc<dyn AuthClient>, email: &str, password: &str) {
    let (auth, email, password) = (auth.clone(), email.to_string(), password.to_string());
    dispatch("email sign-up", async move {
        match auth.create_user_with_email(&email, &password).await {
            Ok(()) => info!("Account created for {}", email),
            Err(e) => warn!("Sign-up for {} failed: {}", email, e),
        }
    });
}

pub fn initiate_sign_out(auth: &Arc<dyn AuthClient>) {
    let auth = auth.clone();
    dispatch("sign-out", async move {
        if let Err(e) = auth.sign_out().await {
            warn!("Sign-out failed: {}", e);
        }
    });
}

fn dispatch<F>(label: &str, task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if !spawn_detached(label, task) {
        warn!("No async runtime; dropping {}", label);
    }
}
