//! In-process auth service.
//!
//! Accounts live in a map keyed by lowercase email. Session changes are
//! pushed to observers outside the state lock, in the order they happen.
//!
//! A [`deferred`](MemoryAuth::deferred) instance models a service that has
//! not yet resolved the persisted session: observers are registered but get
//! nothing until [`ready`](MemoryAuth::ready) is called.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_types::{Principal, PrincipalId};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info};

use crate::auth::{AuthClient, SessionObserver};
use crate::constants::MIN_PASSWORD_LEN;
use crate::error::AuthError;
use crate::store::ListenerRegistration;

struct Account {
    uid: PrincipalId,
    email: String,
    password: String,
}

struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<Principal>,
    observers: Vec<(u64, SessionObserver)>,
    next_observer: u64,
    ready: bool,
    unavailable: bool,
}

pub struct MemoryAuth {
    state: Arc<Mutex<AuthState>>,
    delivery: ReentrantMutex<()>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

fn key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryAuth {
    /// A service whose initial (empty) session is already known.
    pub fn new() -> Self {
        Self::with_ready(true)
    }

    /// A service still resolving its initial session.
    pub fn deferred() -> Self {
        Self::with_ready(false)
    }

    fn with_ready(ready: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(AuthState {
                accounts: HashMap::new(),
                current: None,
                observers: Vec::new(),
                next_observer: 0,
                ready,
                unavailable: false,
            })),
            delivery: ReentrantMutex::new(()),
        }
    }

    /// Resolve the initial session and notify everyone registered so far.
    pub fn ready(&self) {
        let was_ready = std::mem::replace(&mut self.state.lock().ready, true);
        if !was_ready {
            debug!("Auth session resolved");
            self.notify();
        }
    }

    /// Register an account without signing in.
    pub fn add_account(&self, email: &str, password: &str) -> Result<PrincipalId, AuthError> {
        let mut st = self.state.lock();
        let k = key(email);
        if st.accounts.contains_key(&k) {
            return Err(AuthError::EmailInUse(email.to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let uid = PrincipalId::new();
        st.accounts.insert(
            k,
            Account {
                uid,
                email: email.trim().to_string(),
                password: password.to_string(),
            },
        );
        Ok(uid)
    }

    /// Make every sign-in attempt fail with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    fn ensure_available(&self) -> Result<(), AuthError> {
        if self.state.lock().unavailable {
            return Err(AuthError::Unavailable("auth service offline".into()));
        }
        Ok(())
    }

    /// Replace the session principal and notify observers.
    fn establish(&self, principal: Option<Principal>) {
        self.state.lock().current = principal;
        self.notify();
    }

    fn notify(&self) {
        let _delivery = self.delivery.lock();
        let (current, observers): (Option<Principal>, Vec<SessionObserver>) = {
            let st = self.state.lock();
            if !st.ready {
                return;
            }
            (st.current.clone(), st.observers.iter().map(|(_, o)| o.clone()).collect())
        };
        for observer in observers {
            observer(current.clone());
        }
    }
}

#[async_trait]
impl AuthClient for MemoryAuth {
    fn current_user(&self) -> Option<Principal> {
        self.state.lock().current.clone()
    }

    fn on_session_changed(&self, observer: SessionObserver) -> ListenerRegistration {
        let _delivery = self.delivery.lock();
        let (id, initial) = {
            let mut st = self.state.lock();
            let id = st.next_observer;
            st.next_observer += 1;
            st.observers.push((id, observer.clone()));
            (id, st.ready.then(|| st.current.clone()))
        };
        if let Some(current) = initial {
            observer(current);
        }

        let weak = Arc::downgrade(&self.state);
        ListenerRegistration::new(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().observers.retain(|(i, _)| *i != id);
            }
        })
    }

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.ensure_available()?;
        let principal = {
            let st = self.state.lock();
            match st.accounts.get(&key(email)) {
                Some(account) if account.password == password => {
                    Principal::account(account.uid, account.email.clone())
                }
                _ => return Err(AuthError::InvalidCredential),
            }
        };
        info!("Signed in {}", principal);
        self.establish(Some(principal));
        Ok(())
    }

    async fn create_user_with_email(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.ensure_available()?;
        let uid = self.add_account(email, password)?;
        let principal = Principal::account(uid, email.trim());
        info!("Created account {}", principal);
        self.establish(Some(principal));
        Ok(())
    }

    async fn sign_in_anonymously(&self) -> Result<(), AuthError> {
        self.ensure_available()?;
        if self.state.lock().current.is_some() {
            return Ok(());
        }
        let principal = Principal::anonymous();
        info!("Signed in {}", principal);
        self.establish(Some(principal));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.state.lock().current.is_none() {
            return Ok(());
        }
        debug!("Signing out");
        self.establish(None);
        Ok(())
    }
}
