//! Scoped Store Registry
//!
//! Maps fully-qualified store keys (`"<store name>:<scope>"`) to live
//! [`StoreInstance`]s. Each provider publishes an overlay registry for the
//! duration of its render pass: a copy-on-write snapshot of the enclosing
//! registry with the provider's own entries added. Consumers resolve
//! against whatever snapshot is on top of the thread-local stack, so
//! resolution always sees the nearest enclosing provider for a given key.
//!
//! # Resolution order
//!
//! 1. Exact match on `"<name>:<scope>"` when a scope was requested.
//! 2. Fallback to `"<name>:provider"`, the entry every provider of that
//!    store registers regardless of scope.
//! 3. `None`, optionally with a warning.

use std::sync::Arc;

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt::Debug;

use crate::reactive::StoreInstance;

/// Scope every provider registers under, in addition to its explicit
/// scope. Serves as the nearest-provider fallback during resolution.
pub const PROVIDER_SCOPE: &str = "provider";

fn qualified(name: &str, scope: &str) -> String {
    format!("{name}:{scope}")
}

thread_local! {
    static REGISTRY_STACK: RefCell<Vec<StoreRegistry>> = RefCell::new(Vec::new());
}

/// An immutable snapshot of store-key-to-instance bindings.
///
/// Snapshots are cheap to clone (the entry map is shared) and never
/// mutated in place; [`with_instance`](Self::with_instance) produces a new
/// snapshot with entries added, leaving the parent untouched.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    entries: Arc<IndexMap<String, Arc<StoreInstance>>>,
}

impl StoreRegistry {
    /// The snapshot currently in effect on this thread: the innermost
    /// entered provider's registry, or an empty one outside any provider.
    pub fn current() -> StoreRegistry {
        REGISTRY_STACK.with(|stack| {
            stack.borrow().last().cloned().unwrap_or_default()
        })
    }

    /// Look up the instance for a store name, preferring an exact scope
    /// match and falling back to the store's nearest provider entry.
    pub fn get(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> Option<Arc<StoreInstance>> {
        if let Some(scope) = scope {
            if let Some(instance) = self.entries.get(&qualified(name, scope)) {
                return Some(instance.clone());
            }
        }
        self.entries
            .get(&qualified(name, PROVIDER_SCOPE))
            .cloned()
    }

    /// Resolve against the current thread's snapshot.
    ///
    /// When no entry matches and `warn_if_missing` is set, logs a warning;
    /// callers that expect to run outside a provider pass `false`.
    pub fn resolve(
        name: &str,
        scope: Option<&str>,
        warn_if_missing: bool,
    ) -> Option<Arc<StoreInstance>> {
        let found = Self::current().get(name, scope);
        if found.is_none() && warn_if_missing {
            tracing::warn!(
                store = name,
                scope = scope.unwrap_or(PROVIDER_SCOPE),
                "tried to access a store outside of a matching provider"
            );
        }
        found
    }

    /// Derive a new snapshot binding `instance` for `name`.
    ///
    /// Registers the explicit scope entry when a scope is given, and
    /// always registers the `provider` fallback entry.
    pub fn with_instance(
        &self,
        name: &str,
        scope: Option<&str>,
        instance: Arc<StoreInstance>,
    ) -> StoreRegistry {
        let mut entries = (*self.entries).clone();
        if let Some(scope) = scope {
            entries.insert(qualified(name, scope), instance.clone());
        }
        entries.insert(qualified(name, PROVIDER_SCOPE), instance);
        StoreRegistry {
            entries: Arc::new(entries),
        }
    }

    /// Push this snapshot onto the thread's stack; the returned frame pops
    /// it again on drop.
    pub fn enter(self) -> RegistryFrame {
        let depth = REGISTRY_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self);
            stack.len()
        });
        RegistryFrame { depth }
    }

    /// Number of bindings in this snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this snapshot holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// RAII guard for an entered registry snapshot.
pub struct RegistryFrame {
    depth: usize,
}

impl Drop for RegistryFrame {
    fn drop(&mut self) {
        REGISTRY_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "registry frames dropped out of order"
            );
            stack.pop();
        });
    }
}
