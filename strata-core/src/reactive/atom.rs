//! Cell Definitions
//!
//! An atom is the *definition* of a reactive cell: its identity, how to
//! produce its initial value, and whether it can be written. The live value
//! never lives here. It lives in the [`StoreInstance`] that materialized
//! the cell, so any number of independent instances can realize the same
//! definition.
//!
//! Two definition shapes exist:
//!
//! - [`Atom<T>`]: a writable value cell seeded from an initial value.
//! - [`Derived<T>`]: a read-only computed cell whose value is produced by a
//!   closure reading other cells through a [`ReadContext`].
//!
//! Writability is a property of the variant, not a runtime flag: `Atom<T>`
//! exposes writes, `Derived<T>` does not. The type-erased [`ErasedAtom`]
//! carries the same distinction as a tagged enum so the store builder can
//! classify cells without duck typing.
//!
//! # Function-valued cells
//!
//! The cell layer reserves closures for derived computations, so a callable
//! cannot be stored directly as a cell value. [`Atom::of_fn`] builds a cell
//! whose stored representation boxes the callable in an opaque carrier;
//! reads unbox it and writes re-box it, so consumers only ever see the raw
//! callable.
//!
//! [`StoreInstance`]: super::instance::StoreInstance
//! [`ReadContext`]: super::instance::ReadContext

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::instance::ReadContext;

/// Unique identifier for a cell definition.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomId(u64);

impl AtomId {
    /// Generate a new unique atom ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for AtomId {
    fn default() -> Self {
        Self::new()
    }
}

/// A type-erased cell value.
pub type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Type-erased compute closure for derived cells.
pub(crate) type ComputeFn =
    Arc<dyn Fn(&ReadContext<'_>) -> ErasedValue + Send + Sync>;

/// The two kinds of cell definition.
pub(crate) enum AtomKind {
    /// A writable value cell. `initial` seeds the cell in each instance;
    /// `fn_boxed` marks cells whose stored representation carries a boxed
    /// callable.
    Value { initial: ErasedValue, fn_boxed: bool },
    /// A read-only computed cell.
    Derived { compute: ComputeFn },
}

pub(crate) struct AtomCore {
    pub(crate) id: AtomId,
    pub(crate) kind: AtomKind,
}

/// A type-erased handle to a cell definition.
///
/// Cheap to clone; clones refer to the same definition.
#[derive(Clone)]
pub struct ErasedAtom {
    pub(crate) core: Arc<AtomCore>,
}

impl ErasedAtom {
    pub(crate) fn value(initial: ErasedValue, fn_boxed: bool) -> Self {
        Self {
            core: Arc::new(AtomCore {
                id: AtomId::new(),
                kind: AtomKind::Value { initial, fn_boxed },
            }),
        }
    }

    pub(crate) fn derived(compute: ComputeFn) -> Self {
        Self {
            core: Arc::new(AtomCore {
                id: AtomId::new(),
                kind: AtomKind::Derived { compute },
            }),
        }
    }

    /// Get the definition's unique ID.
    pub fn id(&self) -> AtomId {
        self.core.id
    }

    /// Whether external code may write this cell.
    pub fn is_writable(&self) -> bool {
        matches!(self.core.kind, AtomKind::Value { .. })
    }

    pub(crate) fn fn_boxed(&self) -> bool {
        matches!(
            self.core.kind,
            AtomKind::Value { fn_boxed: true, .. }
        )
    }
}

impl Debug for ErasedAtom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedAtom")
            .field("id", &self.id())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Carrier that hides a callable from the cell layer. Never visible to
/// consumers: reads unbox before handing the value out.
pub(crate) struct FnBox(pub(crate) ErasedValue);

pub(crate) fn box_fn(value: ErasedValue) -> ErasedValue {
    Arc::new(FnBox(value))
}

pub(crate) fn unbox_fn(value: ErasedValue) -> ErasedValue {
    match value.downcast_ref::<FnBox>() {
        Some(boxed) => boxed.0.clone(),
        None => value,
    }
}

/// A writable value cell definition.
///
/// # Example
///
/// ```rust,ignore
/// let count = Atom::new(0);
///
/// let instance = StoreInstance::new();
/// assert_eq!(instance.get(&count), 0);
/// instance.set(&count, 5);
/// ```
pub struct Atom<T> {
    erased: ErasedAtom,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Atom<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new writable cell definition with the given initial value.
    pub fn new(initial: T) -> Self {
        let initial: ErasedValue = Arc::new(initial);
        Self {
            erased: ErasedAtom::value(initial, false),
            _marker: PhantomData,
        }
    }

    /// Create a cell definition for a function-typed value.
    ///
    /// The callable is boxed in an opaque carrier before storage so the
    /// cell layer never interprets it as a computation; reads hand back the
    /// original callable.
    pub fn of_fn(initial: T) -> Self {
        let initial: ErasedValue = Arc::new(initial);
        Self {
            erased: ErasedAtom::value(box_fn(initial), true),
            _marker: PhantomData,
        }
    }

    /// Get the definition's unique ID.
    pub fn id(&self) -> AtomId {
        self.erased.id()
    }

    /// Type-erase this definition.
    pub fn erased(&self) -> ErasedAtom {
        self.erased.clone()
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

/// A read-only computed cell definition.
///
/// The compute closure runs against a [`ReadContext`] so that the cells it
/// reads are tracked as its dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let count = Atom::new(2);
/// let doubled = Derived::new({
///     let count = count.clone();
///     move |ctx| ctx.get(&count) * 2
/// });
/// ```
pub struct Derived<T> {
    erased: ErasedAtom,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed cell definition.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&ReadContext<'_>) -> T + Send + Sync + 'static,
    {
        let compute: ComputeFn = Arc::new(move |ctx: &ReadContext<'_>| {
            let value: ErasedValue = Arc::new(compute(ctx));
            value
        });
        Self {
            erased: ErasedAtom::derived(compute),
            _marker: PhantomData,
        }
    }

    /// Get the definition's unique ID.
    pub fn id(&self) -> AtomId {
        self.erased.id()
    }

    /// Type-erase this definition.
    pub fn erased(&self) -> ErasedAtom {
        self.erased.clone()
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

/// Read capability shared by value and derived cell definitions.
///
/// Implemented by [`Atom`] and [`Derived`]; write-shaped operations accept
/// only [`Atom`], which is what makes "no setter for a derived cell" a
/// compile-time property rather than a runtime check.
pub trait Readable<T> {
    /// Borrow the type-erased definition handle.
    fn cell(&self) -> &ErasedAtom;
}

impl<T> Readable<T> for Atom<T> {
    fn cell(&self) -> &ErasedAtom {
        &self.erased
    }
}

impl<T> Readable<T> for Derived<T> {
    fn cell(&self) -> &ErasedAtom {
        &self.erased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_ids_are_unique() {
        let a = Atom::new(0);
        let b = Atom::new(0);
        let c = Atom::new(0);

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn value_atoms_are_writable() {
        let atom = Atom::new(1);
        assert!(atom.erased().is_writable());
    }

    #[test]
    fn derived_atoms_are_read_only() {
        let derived = Derived::new(|_ctx| 42);
        assert!(!derived.erased().is_writable());
    }

    #[test]
    fn clone_refers_to_same_definition() {
        let atom = Atom::new("hello".to_string());
        let clone = atom.clone();
        assert_eq!(atom.id(), clone.id());
    }

    #[test]
    fn fn_box_round_trips() {
        type Callback = Arc<dyn Fn(i64) -> i64 + Send + Sync>;

        let callable: Callback = Arc::new(|x| x + 1);
        let erased: ErasedValue = Arc::new(callable);
        let boxed = box_fn(erased);

        // The carrier itself is not the callable.
        assert!(boxed.downcast_ref::<Callback>().is_none());

        let unboxed = unbox_fn(boxed);
        let restored = unboxed
            .downcast_ref::<Callback>()
            .expect("unboxed value should be the callable");
        assert_eq!(restored(41), 42);
    }

    #[test]
    fn unbox_passes_plain_values_through() {
        let plain: ErasedValue = Arc::new(7i64);
        let out = unbox_fn(plain);
        assert_eq!(*out.downcast_ref::<i64>().unwrap(), 7);
    }
}
