//! Gatehouse binding layer
//!
//! Connects UI state to the remote document store and auth service:
//! live subscriptions for reads, fire-and-forget writes whose failures go to
//! a shared error channel, and one set of client handles per process.
//!
//! ```text
//! ClientRegistry::acquire(config) ──► ClientHandles { store, auth, errors }
//!                                        │
//!   Stabilizer ──► Arc<Reference> ──► Collection/DocumentSubscription ──► watch
//!                                        │
//!   MutationGateway::{create,set,update,delete} ──► spawn(commit)
//!                                                        │ Err
//!                                                        ▼
//!                                                  ErrorChannel::publish
//! ```

pub mod auth;
pub mod backends;
pub mod config;
pub mod constants;
mod dispatch;
pub mod error;
pub mod error_channel;
pub mod mutation;
pub mod reference;
pub mod registry;
pub mod seed;
pub mod session;
pub mod stabilize;
pub mod store;
pub mod subscriptions;

pub use auth::{AuthClient, SessionObserver};
pub use backends::{MemoryAuth, MemoryStore, StubAuth, StubStore};
pub use config::{ConfigError, StoreConfig, Transport};
pub use error::{AccessError, AuthError, ErrorKind, Operation, StoreError, StructuredError};
pub use error_channel::{ErrorChannel, ListenerGuard};
pub use mutation::{DocumentKey, MutationGateway};
pub use reference::{Reference, ReferenceError};
pub use registry::{ClientHandles, ClientRegistry, Connector, MemoryConnector};
pub use seed::{SeedOutcome, SeedReport, seed};
pub use session::{
    SessionOptions, SessionState, SessionSubscription, initiate_anonymous_sign_in,
    initiate_email_sign_in, initiate_email_sign_up, initiate_sign_out, require_account,
};
pub use stabilize::Stabilizer;
pub use store::{
    DocumentSnapshot, DocumentStore, ListenerRegistration, SetMode, Snapshot, SnapshotObserver,
    WriteBatch, WriteOp,
};
pub use subscriptions::{CollectionSubscription, DocumentSubscription, SubscriptionState};
