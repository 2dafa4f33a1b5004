//! Store Instances
//!
//! A [`StoreInstance`] is one concrete realization of a set of cell
//! definitions. It lazily materializes a slot per cell on first access;
//! each slot holds the current value, a version counter bumped on every
//! write, and the cell's subscriber list.
//!
//! # How reads are tracked
//!
//! Evaluating a derived cell's computation happens inside a tracking frame
//! on a thread-local stack (one frame per evaluation, so nested derived
//! reads still attribute their dependencies to the outermost subscriber).
//! Subscribing to a derived cell evaluates it once to discover the value
//! cells it reads, then watches each of those and re-evaluates on change.
//!
//! # Ordering
//!
//! Writes are last-write-wins; subscribers observe the value as of their
//! notification, never a partial value. Notification is synchronous unless
//! the subscription was registered as deferred, in which case it is queued
//! on the [`Scheduler`] and delivered on the next tick.
//!
//! [`Scheduler`]: super::scheduler::Scheduler

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use smallvec::SmallVec;

use super::atom::{
    box_fn, unbox_fn, Atom, AtomId, AtomKind, ErasedAtom, ErasedValue,
    Readable,
};
use super::scheduler::Scheduler;
use super::subscription::{Subscription, SubscriptionId};

/// Type-erased change callback, invoked with the cell's new value.
pub(crate) type SubscriberFn = Arc<dyn Fn(&ErasedValue) + Send + Sync>;

#[derive(Clone)]
struct SubscriberEntry {
    id: SubscriptionId,
    notify: SubscriberFn,
    deferred: bool,
}

struct CellSlot {
    value: ErasedValue,
    version: u64,
    subscribers: SmallVec<[SubscriberEntry; 2]>,
}

impl CellSlot {
    fn new(value: ErasedValue) -> Self {
        Self {
            value,
            version: 0,
            subscribers: SmallVec::new(),
        }
    }
}

// Thread-local stack of dependency-tracking frames. Each frame collects the
// cells read while it is on top; see `subscribe_erased` for the one place a
// frame is pushed.
thread_local! {
    static TRACK_STACK: RefCell<Vec<Vec<ErasedAtom>>> = RefCell::new(Vec::new());
}

fn push_track_frame() {
    TRACK_STACK.with(|stack| stack.borrow_mut().push(Vec::new()));
}

fn pop_track_frame() -> Vec<ErasedAtom> {
    let mut deps = TRACK_STACK
        .with(|stack| stack.borrow_mut().pop())
        .unwrap_or_default();

    // Keep the first occurrence of each cell.
    let mut seen = std::collections::HashSet::new();
    deps.retain(|atom| seen.insert(atom.id()));
    deps
}

fn track(atom: &ErasedAtom) {
    TRACK_STACK.with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            frame.push(atom.clone());
        }
    });
}

/// One concrete, independently-addressable realization of a cell set.
///
/// Created per provider mount (or adopted); shared by every consumer that
/// resolves it. All operations are synchronous.
pub struct StoreInstance {
    cells: DashMap<AtomId, CellSlot>,
}

impl StoreInstance {
    /// Create a fresh, empty instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cells: DashMap::new(),
        })
    }

    /// The process-wide default instance.
    ///
    /// Read and write accessors fall back to this instance when no
    /// matching provider is registered, which keeps the accessor surface
    /// usable outside any provider (e.g. in tests).
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<StoreInstance>> = OnceLock::new();
        GLOBAL.get_or_init(StoreInstance::new).clone()
    }

    /// Read the current value of a cell.
    ///
    /// Value cells are seeded from their initial value on first access;
    /// derived cells recompute on every read.
    pub fn get<T>(&self, atom: &impl Readable<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.get_erased(atom.cell());
        value
            .downcast_ref::<T>()
            .expect("cell value type matches its definition")
            .clone()
    }

    /// Write a new value to a cell and notify its subscribers.
    pub fn set<T>(&self, atom: &Atom<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let value: ErasedValue = Arc::new(value);
        self.set_erased(atom.cell(), value);
    }

    /// Register a callback fired with the new value on every change.
    pub fn subscribe<T, F>(
        self: &Arc<Self>,
        atom: &impl Readable<T>,
        callback: F,
    ) -> Subscription
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let callback: SubscriberFn = Arc::new(move |value: &ErasedValue| {
            if let Some(v) = value.downcast_ref::<T>() {
                callback(v.clone());
            }
        });
        self.subscribe_erased(atom.cell(), callback, false)
    }

    pub(crate) fn get_erased(&self, atom: &ErasedAtom) -> ErasedValue {
        track(atom);
        match &atom.core.kind {
            AtomKind::Value { initial, fn_boxed } => {
                let stored = {
                    let slot = self
                        .cells
                        .entry(atom.id())
                        .or_insert_with(|| CellSlot::new(initial.clone()));
                    slot.value.clone()
                };
                if *fn_boxed {
                    unbox_fn(stored)
                } else {
                    stored
                }
            }
            AtomKind::Derived { compute } => {
                let ctx = ReadContext::new(self);
                compute(&ctx)
            }
        }
    }

    // Callers are responsible for writability: the typed surface only
    // admits `Atom<T>`, and the keyed surface checks before erasing.
    pub(crate) fn set_erased(&self, atom: &ErasedAtom, value: ErasedValue) {
        let fn_boxed = match &atom.core.kind {
            AtomKind::Value { fn_boxed, .. } => *fn_boxed,
            AtomKind::Derived { .. } => {
                debug_assert!(false, "write to a read-only cell");
                return;
            }
        };

        let stored = if fn_boxed {
            box_fn(value)
        } else {
            value
        };

        let subscribers = {
            let mut slot = self
                .cells
                .entry(atom.id())
                .or_insert_with(|| CellSlot::new(stored.clone()));
            slot.value = stored.clone();
            slot.version += 1;
            slot.subscribers.clone()
        };
        tracing::trace!(atom = ?atom.id(), "cell written");

        if subscribers.is_empty() {
            return;
        }

        let visible = if fn_boxed { unbox_fn(stored) } else { stored };
        for entry in subscribers {
            if entry.deferred {
                let notify = entry.notify.clone();
                let value = visible.clone();
                Scheduler::defer(move || notify(&value));
            } else {
                (entry.notify)(&visible);
            }
        }
    }

    /// Version counter for a value cell's slot, bumped on every write.
    /// Derived cells have no slot and no version.
    pub(crate) fn version_erased(&self, atom: &ErasedAtom) -> Option<u64> {
        match &atom.core.kind {
            AtomKind::Value { initial, .. } => {
                let slot = self
                    .cells
                    .entry(atom.id())
                    .or_insert_with(|| CellSlot::new(initial.clone()));
                Some(slot.version)
            }
            AtomKind::Derived { .. } => None,
        }
    }

    pub(crate) fn subscribe_erased(
        self: &Arc<Self>,
        atom: &ErasedAtom,
        callback: SubscriberFn,
        deferred: bool,
    ) -> Subscription {
        match &atom.core.kind {
            AtomKind::Value { initial, .. } => {
                let id = SubscriptionId::new();
                {
                    let mut slot = self
                        .cells
                        .entry(atom.id())
                        .or_insert_with(|| CellSlot::new(initial.clone()));
                    slot.subscribers.push(SubscriberEntry {
                        id,
                        notify: callback,
                        deferred,
                    });
                }

                let weak = Arc::downgrade(self);
                let atom_id = atom.id();
                Subscription::single(move || {
                    if let Some(instance) = weak.upgrade() {
                        if let Some(mut slot) = instance.cells.get_mut(&atom_id) {
                            slot.subscribers.retain(|entry| entry.id != id);
                        }
                    }
                })
            }
            AtomKind::Derived { compute } => {
                // Evaluate once to discover the value cells the computation
                // reads, then watch each of those. The dependency set is
                // captured here; computations with dynamic dependencies
                // should be re-subscribed when their shape changes.
                push_track_frame();
                let ctx = ReadContext::new(self);
                let _ = compute(&ctx);
                let deps = pop_track_frame();

                let mut parts = Vec::new();
                for dep in deps {
                    if !dep.is_writable() {
                        continue;
                    }
                    let weak = Arc::downgrade(self);
                    let compute = compute.clone();
                    let callback = callback.clone();
                    let recompute: SubscriberFn =
                        Arc::new(move |_changed: &ErasedValue| {
                            if let Some(instance) = weak.upgrade() {
                                let ctx = ReadContext::new(&instance);
                                let value = compute(&ctx);
                                callback(&value);
                            }
                        });
                    parts.push(self.subscribe_erased(&dep, recompute, deferred));
                }
                Subscription::merged(parts)
            }
        }
    }

    /// Number of materialized cell slots.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl Debug for StoreInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInstance")
            .field("cell_count", &self.cell_count())
            .finish()
    }
}

/// Dependency-tracking read scope handed to derived computations.
pub struct ReadContext<'a> {
    instance: &'a StoreInstance,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(instance: &'a StoreInstance) -> Self {
        Self { instance }
    }

    /// Read a cell, recording it as a dependency of the computation.
    pub fn get<T>(&self, atom: &impl Readable<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.instance.get(atom)
    }

    /// Read a type-erased cell, downcasting to `T`. Returns `None` when
    /// the stored value is not a `T`. Used by computations built over
    /// erased definition handles.
    pub fn get_as<T>(&self, atom: &ErasedAtom) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.instance
            .get_erased(atom)
            .downcast_ref::<T>()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::atom::Derived;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    #[test]
    fn get_seeds_from_initial_value() {
        let atom = Atom::new(10);
        let instance = StoreInstance::new();
        assert_eq!(instance.get(&atom), 10);
    }

    #[test]
    fn set_then_get() {
        let atom = Atom::new(0);
        let instance = StoreInstance::new();

        instance.set(&atom, 42);
        assert_eq!(instance.get(&atom), 42);
    }

    #[test]
    fn instances_do_not_share_values() {
        let atom = Atom::new(1);
        let a = StoreInstance::new();
        let b = StoreInstance::new();

        a.set(&atom, 100);

        assert_eq!(a.get(&atom), 100);
        assert_eq!(b.get(&atom), 1);
    }

    #[test]
    fn subscribers_see_new_values() {
        let atom = Atom::new(0);
        let instance = StoreInstance::new();

        let observed = Arc::new(AtomicI64::new(-1));
        let observed_clone = observed.clone();
        let mut sub = instance.subscribe(&atom, move |value: i64| {
            observed_clone.store(value, Ordering::SeqCst);
        });

        instance.set(&atom, 7);
        assert_eq!(observed.load(Ordering::SeqCst), 7);

        instance.set(&atom, 9);
        assert_eq!(observed.load(Ordering::SeqCst), 9);

        sub.unsubscribe();
        instance.set(&atom, 11);
        assert_eq!(observed.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn derived_recomputes_on_read() {
        let count = Atom::new(2);
        let doubled = Derived::new({
            let count = count.clone();
            move |ctx: &ReadContext<'_>| ctx.get(&count) * 2
        });

        let instance = StoreInstance::new();
        assert_eq!(instance.get(&doubled), 4);

        instance.set(&count, 5);
        assert_eq!(instance.get(&doubled), 10);
    }

    #[test]
    fn derived_subscription_fires_on_dependency_change() {
        let count = Atom::new(1);
        let doubled = Derived::new({
            let count = count.clone();
            move |ctx: &ReadContext<'_>| ctx.get(&count) * 2
        });

        let instance = StoreInstance::new();
        let observed = Arc::new(AtomicI64::new(0));
        let observed_clone = observed.clone();
        let mut sub = instance.subscribe(&doubled, move |value: i64| {
            observed_clone.store(value, Ordering::SeqCst);
        });

        instance.set(&count, 3);
        assert_eq!(observed.load(Ordering::SeqCst), 6);

        sub.unsubscribe();
        instance.set(&count, 4);
        assert_eq!(observed.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn derived_chain_tracks_base_cells() {
        let base = Atom::new(1);
        let doubled = Derived::new({
            let base = base.clone();
            move |ctx: &ReadContext<'_>| ctx.get(&base) * 2
        });
        let plus_ten = Derived::new({
            let doubled = doubled.clone();
            move |ctx: &ReadContext<'_>| ctx.get(&doubled) + 10
        });

        let instance = StoreInstance::new();
        assert_eq!(instance.get(&plus_ten), 12);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let _sub = instance.subscribe(&plus_ten, move |_: i64| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Writing the base cell reaches the subscriber through the chain.
        instance.set(&base, 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fn_cell_round_trips_the_callable() {
        type Callback = Arc<dyn Fn(i64, i64) -> i64 + Send + Sync>;

        let add: Callback = Arc::new(|a, b| a + b);
        let atom = Atom::of_fn(add);
        let instance = StoreInstance::new();

        let restored: Callback = instance.get(&atom);
        assert_eq!(restored(2, 3), 5);

        let mul: Callback = Arc::new(|a, b| a * b);
        instance.set(&atom, mul);
        let restored: Callback = instance.get(&atom);
        assert_eq!(restored(2, 3), 6);
    }

    #[test]
    fn versions_bump_on_write() {
        let atom = Atom::new(0);
        let instance = StoreInstance::new();
        let erased = atom.erased();

        assert_eq!(instance.version_erased(&erased), Some(0));
        instance.set(&atom, 1);
        assert_eq!(instance.version_erased(&erased), Some(1));
        instance.set(&atom, 2);
        assert_eq!(instance.version_erased(&erased), Some(2));
    }

    #[test]
    fn global_instance_is_shared() {
        let a = StoreInstance::global();
        let b = StoreInstance::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
