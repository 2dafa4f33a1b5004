//! Subscription handles for change notifications.
//!
//! Subscribing to a cell returns a [`Subscription`] that must be torn down
//! explicitly with [`Subscription::unsubscribe`], typically when the
//! consumer goes away. Dropping the handle without unsubscribing leaves the
//! callback registered; that is the caller's leak to avoid, matching the
//! explicit-teardown contract of the accessor surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered subscriber callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one or more registered callbacks.
///
/// A subscription on a derived cell fans out to every value cell its
/// computation reads, so a single handle may own several registrations;
/// [`unsubscribe`](Self::unsubscribe) cancels them all and is idempotent.
pub struct Subscription {
    cancels: Vec<Box<dyn FnMut() + Send>>,
    done: bool,
}

impl Subscription {
    pub(crate) fn single(cancel: impl FnMut() + Send + 'static) -> Self {
        Self {
            cancels: vec![Box::new(cancel)],
            done: false,
        }
    }

    pub(crate) fn merged(parts: Vec<Subscription>) -> Self {
        let mut cancels = Vec::new();
        for mut part in parts {
            // Absorb the parts; their own `done` flags never fire.
            part.done = true;
            cancels.append(&mut part.cancels);
        }
        Self {
            cancels,
            done: false,
        }
    }

    /// Remove every callback this handle registered. Calling it more than
    /// once is a no-op.
    pub fn unsubscribe(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        for cancel in &mut self.cancels {
            cancel();
        }
    }

    /// Whether this subscription has been torn down.
    pub fn is_cancelled(&self) -> bool {
        self.done
    }
}
