//! Store and auth backends.
//!
//! - [`stub`]: inert handles returned when no credential is configured.
//! - [`memory`] / [`memory_auth`]: complete in-process implementations, used
//!   by the default connector, the CLI, and the test suite.

pub mod memory;
pub mod memory_auth;
pub mod stub;

pub use memory::MemoryStore;
pub use memory_auth::MemoryAuth;
pub use stub::{StubAuth, StubStore};
