//! Store Accessors
//!
//! A [`StoreHandle`] binds a store's cell layout to one resolved
//! [`StoreInstance`] and exposes the keyed accessor surface: read, write,
//! setter, state pair, subscription, and cached value hooks, all addressed
//! by field name. Typed [`FieldHandle`]s and [`WritableField`]s skip the
//! per-call name lookup for hot paths, and the `*_atom` methods operate on
//! raw cell definitions against the same instance.
//!
//! # Instance resolution
//!
//! Accessor options resolve an instance in priority order: an explicit
//! instance override, then the scoped registry lookup, then the
//! process-wide default instance.
//!
//! # Hooks and the evaluation guard
//!
//! [`ValueHook`] caches its selected value and recomputes only when the
//! underlying cell's version moves, applying an equality check so an
//! unchanged selection keeps its previous identity. Constructing a hook
//! counts against the store's per-pass evaluation guard; a loop that
//! rebuilds its hook (and thereby its selector) on every iteration trips
//! the guard instead of spinning forever.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::reactive::{
    ErasedAtom, ErasedValue, EvalGuard, StoreInstance, SubscriberFn,
    Subscription,
};
use crate::store::builder::CellSet;
use crate::store::registry::StoreRegistry;

/// Options accepted by the accessor entry points.
///
/// `From<&str>` treats a bare string as a scope, the common case:
///
/// ```rust,ignore
/// let handle = store.use_store("sidebar");
/// ```
#[derive(Clone)]
pub struct UseAtomOptions {
    /// Resolve within this scope before falling back to the nearest
    /// provider.
    pub scope: Option<String>,
    /// Bypass resolution entirely and use this instance.
    pub store: Option<Arc<StoreInstance>>,
    /// Deliver subscription callbacks on the next scheduler tick instead
    /// of synchronously.
    pub delay: Option<Duration>,
    /// Warn when resolution finds no provider. On by default.
    pub warn_if_no_store: bool,
}

impl Default for UseAtomOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl UseAtomOptions {
    pub fn new() -> Self {
        Self {
            scope: None,
            store: None,
            delay: None,
            warn_if_no_store: true,
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn store(mut self, instance: Arc<StoreInstance>) -> Self {
        self.store = Some(instance);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn warn_if_no_store(mut self, warn: bool) -> Self {
        self.warn_if_no_store = warn;
        self
    }
}

impl From<&str> for UseAtomOptions {
    fn from(scope: &str) -> Self {
        Self::new().scope(scope)
    }
}

impl From<String> for UseAtomOptions {
    fn from(scope: String) -> Self {
        Self::new().scope(scope)
    }
}

/// Resolve the instance a handle should bind to.
pub(crate) fn resolve_instance(
    name: &str,
    options: &UseAtomOptions,
    suppress_warnings: bool,
) -> Arc<StoreInstance> {
    if let Some(instance) = &options.store {
        return instance.clone();
    }
    let warn = options.warn_if_no_store && !suppress_warnings;
    StoreRegistry::resolve(name, options.scope.as_deref(), warn)
        .unwrap_or_else(StoreInstance::global)
}

/// The keyed accessor surface for one store, bound to one instance.
pub struct StoreHandle {
    name: String,
    cells: Arc<CellSet>,
    instance: Arc<StoreInstance>,
    deferred: bool,
    guard: Arc<EvalGuard>,
}

impl StoreHandle {
    pub(crate) fn new(
        name: String,
        cells: Arc<CellSet>,
        instance: Arc<StoreInstance>,
        deferred: bool,
        guard: Arc<EvalGuard>,
    ) -> Self {
        Self {
            name,
            cells,
            instance,
            deferred,
            guard,
        }
    }

    fn lookup(&self, key: &str) -> Result<&ErasedAtom> {
        self.cells.atom(key).ok_or_else(|| StoreError::UnknownField {
            store: self.name.clone(),
            field: key.to_string(),
        })
    }

    /// The store name this handle accesses.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instance this handle resolved to.
    pub fn instance(&self) -> &Arc<StoreInstance> {
        &self.instance
    }

    /// Read the current value of a field.
    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let atom = self.lookup(key)?;
        let value = self.instance.get_erased(atom);
        downcast_value(&value, key)
    }

    /// Write a new value to a writable field.
    pub fn set<T>(&self, key: &str, value: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        let atom = self.lookup(key)?;
        if !atom.is_writable() {
            return Err(StoreError::ReadOnlyField {
                field: key.to_string(),
            });
        }
        self.instance.set_erased(atom, Arc::new(value));
        Ok(())
    }

    /// A reusable setter for a writable field.
    pub fn setter<T>(&self, key: &str) -> Result<Setter<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let atom = self.lookup(key)?;
        if !atom.is_writable() {
            return Err(StoreError::ReadOnlyField {
                field: key.to_string(),
            });
        }
        Ok(Setter {
            instance: self.instance.clone(),
            atom: atom.clone(),
            _marker: PhantomData,
        })
    }

    /// Current value plus a setter, the read-write pair.
    pub fn state<T>(&self, key: &str) -> Result<(T, Setter<T>)>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok((self.get(key)?, self.setter(key)?))
    }

    /// Subscribe to changes of a field. Delivery is synchronous unless the
    /// handle was opened with a delay.
    pub fn subscribe<T, F>(&self, key: &str, callback: F) -> Result<Subscription>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let atom = self.lookup(key)?.clone();
        Ok(self.subscribe_atom(&atom, callback))
    }

    /// A cached hook over a field's raw value, compared with `PartialEq`.
    pub fn value_hook<T>(&self, key: &str) -> Result<ValueHook<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.value_hook_with(key, |value: &T| value.clone(), T::eq)
    }

    /// A cached hook over a selection of a field's value.
    ///
    /// `select` runs only when the cell's version moves; `equal` decides
    /// whether the fresh selection replaces the cached one.
    pub fn value_hook_with<T, S, F, E>(
        &self,
        key: &str,
        select: F,
        equal: E,
    ) -> Result<ValueHook<S>>
    where
        T: Clone + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
        F: Fn(&T) -> S + Send + Sync + 'static,
        E: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        let atom = self.lookup(key)?.clone();
        let field = key.to_string();
        self.guard.bump()?;
        Ok(ValueHook {
            instance: self.instance.clone(),
            atom,
            select: Box::new(move |value: &ErasedValue| {
                let typed = value.downcast_ref::<T>().ok_or_else(|| {
                    StoreError::TypeMismatch {
                        field: field.clone(),
                    }
                })?;
                Ok(select(typed))
            }),
            equal: Box::new(equal),
            cached: Mutex::new(None),
            guard: self.guard.clone(),
        })
    }

    /// A typed read handle for a field, validated once up front.
    pub fn field<T>(&self, key: &str) -> Result<FieldHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let atom = self.lookup(key)?.clone();
        // Validate the type early so later reads fail only on misuse of
        // the raw surface.
        let value = self.instance.get_erased(&atom);
        downcast_value::<T>(&value, key)?;
        Ok(FieldHandle {
            key: key.to_string(),
            instance: self.instance.clone(),
            atom,
            deferred: self.deferred,
            guard: self.guard.clone(),
            _marker: PhantomData,
        })
    }

    /// A typed read-write handle for a writable field.
    pub fn writable_field<T>(&self, key: &str) -> Result<WritableField<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let field = self.field::<T>(key)?;
        if !field.atom.is_writable() {
            return Err(StoreError::ReadOnlyField {
                field: key.to_string(),
            });
        }
        Ok(WritableField { inner: field })
    }

    /// Read a raw cell definition against this handle's instance.
    pub fn get_atom<T>(&self, atom: &ErasedAtom) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.instance.get_erased(atom);
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| StoreError::TypeMismatch {
                field: format!("{:?}", atom.id()),
            })
    }

    /// Write a raw writable cell against this handle's instance.
    pub fn set_atom<T>(&self, atom: &ErasedAtom, value: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !atom.is_writable() {
            return Err(StoreError::ReadOnlyField {
                field: format!("{:?}", atom.id()),
            });
        }
        self.instance.set_erased(atom, Arc::new(value));
        Ok(())
    }

    /// Subscribe to a raw cell against this handle's instance.
    pub fn subscribe_atom<T, F>(&self, atom: &ErasedAtom, callback: F) -> Subscription
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let erased: SubscriberFn = Arc::new(move |value: &ErasedValue| {
            if let Some(typed) = value.downcast_ref::<T>() {
                callback(typed.clone());
            }
        });
        self.instance
            .subscribe_erased(atom, erased, self.deferred)
    }

    /// A cached hook over a raw cell's value.
    pub fn atom_value_hook<T>(&self, atom: &ErasedAtom) -> Result<ValueHook<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.guard.bump()?;
        let field = format!("{:?}", atom.id());
        Ok(ValueHook {
            instance: self.instance.clone(),
            atom: atom.clone(),
            select: Box::new(move |value: &ErasedValue| {
                value
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| StoreError::TypeMismatch {
                        field: field.clone(),
                    })
            }),
            equal: Box::new(T::eq),
            cached: Mutex::new(None),
            guard: self.guard.clone(),
        })
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .field("deferred", &self.deferred)
            .finish()
    }
}

fn downcast_value<T>(value: &ErasedValue, key: &str) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| StoreError::TypeMismatch {
            field: key.to_string(),
        })
}

/// A cached, equality-stabilized view over one cell.
///
/// Recomputes its selection only when the cell's version counter has
/// moved since the cached read (derived cells have no version and
/// recompute every read, with equality still stabilizing the result).
pub struct ValueHook<S> {
    instance: Arc<StoreInstance>,
    atom: ErasedAtom,
    select: Box<dyn Fn(&ErasedValue) -> Result<S> + Send + Sync>,
    equal: Box<dyn Fn(&S, &S) -> bool + Send + Sync>,
    cached: Mutex<Option<(Option<u64>, S)>>,
    guard: Arc<EvalGuard>,
}

impl<S> ValueHook<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Current selected value. Each evaluation counts against the store's
    /// per-pass guard.
    pub fn get(&self) -> Result<S> {
        self.guard.bump()?;
        let version = self.instance.version_erased(&self.atom);

        let mut cached = self.cached.lock();
        if let Some((seen, value)) = &*cached {
            if version.is_some() && *seen == version {
                return Ok(value.clone());
            }
        }

        let raw = self.instance.get_erased(&self.atom);
        let fresh = (self.select)(&raw)?;

        let keep = match &*cached {
            Some((_, prev)) if (self.equal)(prev, &fresh) => prev.clone(),
            _ => fresh,
        };
        *cached = Some((version, keep.clone()));
        Ok(keep)
    }
}

/// A reusable writer for one writable cell.
pub struct Setter<T> {
    instance: Arc<StoreInstance>,
    atom: ErasedAtom,
    _marker: PhantomData<fn(T)>,
}

impl<T> Setter<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn set(&self, value: T) {
        self.instance.set_erased(&self.atom, Arc::new(value));
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            atom: self.atom.clone(),
            _marker: PhantomData,
        }
    }
}

/// A typed read handle for one field, bound at lookup time.
pub struct FieldHandle<T> {
    key: String,
    instance: Arc<StoreInstance>,
    atom: ErasedAtom,
    deferred: bool,
    guard: Arc<EvalGuard>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FieldHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn get(&self) -> Result<T> {
        let value = self.instance.get_erased(&self.atom);
        downcast_value(&value, &self.key)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let erased: SubscriberFn = Arc::new(move |value: &ErasedValue| {
            if let Some(typed) = value.downcast_ref::<T>() {
                callback(typed.clone());
            }
        });
        self.instance
            .subscribe_erased(&self.atom, erased, self.deferred)
    }

    /// A cached hook over this field, compared with `PartialEq`.
    pub fn value_hook(&self) -> Result<ValueHook<T>>
    where
        T: PartialEq,
    {
        self.value_hook_with(|value: &T| value.clone(), T::eq)
    }

    /// A cached hook over a selection of this field's value.
    pub fn value_hook_with<S, F, E>(&self, select: F, equal: E) -> Result<ValueHook<S>>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&T) -> S + Send + Sync + 'static,
        E: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        self.guard.bump()?;
        let field = self.key.clone();
        Ok(ValueHook {
            instance: self.instance.clone(),
            atom: self.atom.clone(),
            select: Box::new(move |value: &ErasedValue| {
                let typed = value.downcast_ref::<T>().ok_or_else(|| {
                    StoreError::TypeMismatch {
                        field: field.clone(),
                    }
                })?;
                Ok(select(typed))
            }),
            equal: Box::new(equal),
            cached: Mutex::new(None),
            guard: self.guard.clone(),
        })
    }
}

impl<T> Clone for FieldHandle<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            instance: self.instance.clone(),
            atom: self.atom.clone(),
            deferred: self.deferred,
            guard: self.guard.clone(),
            _marker: PhantomData,
        }
    }
}

/// A typed read-write handle for one writable field.
pub struct WritableField<T> {
    inner: FieldHandle<T>,
}

impl<T> WritableField<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn get(&self) -> Result<T> {
        self.inner.get()
    }

    pub fn set(&self, value: T) {
        self.inner
            .instance
            .set_erased(&self.inner.atom, Arc::new(value));
    }

    /// A reusable setter detached from this handle.
    pub fn setter(&self) -> Setter<T> {
        Setter {
            instance: self.inner.instance.clone(),
            atom: self.inner.atom.clone(),
            _marker: PhantomData,
        }
    }

    /// Current value plus a detached setter.
    pub fn state(&self) -> Result<(T, Setter<T>)> {
        Ok((self.get()?, self.setter()))
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.subscribe(callback)
    }
}

impl<T> Clone for WritableField<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
