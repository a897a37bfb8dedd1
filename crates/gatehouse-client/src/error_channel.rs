//! Process-wide channel for write failures.
//!
//! The [`MutationGateway`](crate::MutationGateway) never reports failures to
//! the caller; it publishes a [`StructuredError`] here instead, and whatever
//! UI surface renders alerts subscribes once.
//!
//! # Delivery
//!
//! - `publish` calls every listener registered when the pass starts,
//!   synchronously and in registration order, then returns.
//! - No buffering: a listener added after an event never sees it.
//! - Each call is isolated. A listener that panics is logged and skipped;
//!   the rest of the pass continues.
//! - Listeners may unsubscribe (themselves or others) mid-pass. The pass
//!   walks a snapshot of the list, and a listener removed before its turn
//!   is not called.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::error::StructuredError;

type Listener = Arc<dyn Fn(&StructuredError) + Send + Sync>;

#[derive(Clone)]
struct Slot {
    id: u64,
    listener: Listener,
    live: Arc<AtomicBool>,
}

#[derive(Default)]
struct ChannelInner {
    next_id: u64,
    slots: Vec<Slot>,
}

/// Many-producer, many-consumer fan-out of [`StructuredError`]s.
///
/// Cloning is cheap and yields a handle to the same channel.
#[derive(Clone, Default)]
pub struct ErrorChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. It stays registered until the returned guard is
    /// dropped, unsubscribed, or detached.
    pub fn subscribe(
        &self,
        listener: impl Fn(&StructuredError) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let live = Arc::new(AtomicBool::new(true));
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.push(Slot {
            id,
            listener: Arc::new(listener),
            live: live.clone(),
        });
        trace!("Error channel listener {} registered ({} total)", id, inner.slots.len());
        ListenerGuard {
            channel: Arc::downgrade(&self.inner),
            id,
            live,
            detached: false,
        }
    }

    /// Deliver `error` to every currently registered listener.
    pub fn publish(&self, error: &StructuredError) {
        // Clone the slot list so listeners can (un)subscribe without
        // deadlocking or invalidating this pass.
        let slots: Vec<Slot> = self.inner.lock().slots.clone();
        trace!("Publishing {} to {} listeners", error, slots.len());

        for slot in slots {
            if !slot.live.load(Ordering::Acquire) {
                continue;
            }
            let listener = slot.listener.clone();
            if catch_unwind(AssertUnwindSafe(|| listener(error))).is_err() {
                error!("Error channel listener {} panicked while handling: {}", slot.id, error);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl std::fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Keeps a listener registered on an [`ErrorChannel`].
#[must_use = "dropping the guard unsubscribes the listener"]
pub struct ListenerGuard {
    channel: Weak<Mutex<ChannelInner>>,
    id: u64,
    live: Arc<AtomicBool>,
    detached: bool,
}

impl ListenerGuard {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the listener registered for the life of the channel.
    pub fn detach(mut self) {
        self.detached = true;
    }

    fn remove(&self) {
        self.live.store(false, Ordering::Release);
        if let Some(channel) = self.channel.upgrade() {
            channel.lock().slots.retain(|s| s.id != self.id);
            trace!("Error channel listener {} removed", self.id);
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if !self.detached {
            self.remove();
        }
    }
}
