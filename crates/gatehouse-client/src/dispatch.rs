//! Detached task dispatch on the ambient runtime.

use std::future::Future;

use tokio::runtime::Handle;
use tracing::trace;

/// Spawn `task` on the current tokio runtime and forget it.
///
/// Returns `false` without running anything when called outside a runtime;
/// callers decide how to report that.
pub(crate) fn spawn_detached<F>(label: &str, task: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            trace!("Dispatching {}", label);
            drop(handle.spawn(task));
            true
        }
        Err(_) => false,
    }
}
