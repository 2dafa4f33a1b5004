//! Store Definitions
//!
//! [`create_atom_store`] is the main entry point: it takes a declarative
//! initial-state map plus [`StoreOptions`] and produces an [`AtomStore`],
//! the immutable definition from which providers and accessor handles are
//! minted.
//!
//! ```rust,ignore
//! let store = create_atom_store(
//!     [
//!         ("count".to_string(), FieldInit::value(1i64)),
//!         ("name".to_string(), FieldInit::value("app".to_string())),
//!     ]
//!     .into_iter()
//!     .collect(),
//!     StoreOptions::named("app"),
//! );
//!
//! let provider = store.provider();
//! provider.render(&ProviderProps::new(), || {
//!     let handle = store.use_store(());
//!     assert_eq!(handle.get::<i64>("count").unwrap(), 1);
//! });
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::reactive::{ErasedAtom, EvalGuard};
use crate::store::builder::{
    build_cell_set, CellSet, CreateCellFn, ExtendFn, FieldValues,
};
use crate::store::handle::{
    resolve_instance, Setter, StoreHandle, UseAtomOptions,
};
use crate::store::provider::Provider;

/// Default per-pass evaluation budget before the runaway-loop diagnostic
/// trips.
pub const DEFAULT_EVAL_LIMIT: usize = 100_000;

/// Configuration for [`create_atom_store`].
#[derive(Clone)]
pub struct StoreOptions {
    name: String,
    delay: Option<Duration>,
    effect: Option<Arc<dyn Fn() + Send + Sync>>,
    extend: Option<ExtendFn>,
    create_cell: Option<CreateCellFn>,
    eval_limit: usize,
    suppress_warnings: bool,
}

impl StoreOptions {
    /// Options for a store with the given name. The name keys registry
    /// entries, so it should be unique per store definition.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            effect: None,
            extend: None,
            create_cell: None,
            eval_limit: DEFAULT_EVAL_LIMIT,
            suppress_warnings: false,
        }
    }

    /// Default delay applied to every handle minted from this store.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Callback run inside every provider render pass, after hydration.
    pub fn effect(mut self, effect: impl Fn() + Send + Sync + 'static) -> Self {
        self.effect = Some(Arc::new(effect));
        self
    }

    /// Derive extra read-only cells over the base cell set.
    pub fn extend(mut self, extend: ExtendFn) -> Self {
        self.extend = Some(extend);
        self
    }

    /// Override how plain-value fields become cells.
    pub fn create_cell(mut self, create: CreateCellFn) -> Self {
        self.create_cell = Some(create);
        self
    }

    /// Per-pass evaluation budget for this store's guard.
    pub fn eval_limit(mut self, limit: usize) -> Self {
        self.eval_limit = limit;
        self
    }

    /// Silence the missing-provider warning for every handle of this
    /// store.
    pub fn suppress_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }
}

/// Build a store definition from its initial state and options.
pub fn create_atom_store(
    initial_state: FieldValues,
    options: StoreOptions,
) -> AtomStore {
    let cells = build_cell_set(
        &initial_state,
        options.extend.as_ref(),
        options.create_cell.as_ref(),
    );
    tracing::debug!(
        store = %options.name,
        fields = cells.atoms().len(),
        "store defined"
    );
    AtomStore {
        name: options.name,
        cells: Arc::new(cells),
        delay: options.delay,
        effect: options.effect,
        suppress_warnings: options.suppress_warnings,
        guard: EvalGuard::new(options.eval_limit),
    }
}

/// An immutable store definition: named cells plus accessor defaults.
///
/// Cheap to clone; clones share the same cells and evaluation guard.
#[derive(Clone)]
pub struct AtomStore {
    name: String,
    cells: Arc<CellSet>,
    delay: Option<Duration>,
    effect: Option<Arc<dyn Fn() + Send + Sync>>,
    suppress_warnings: bool,
    guard: Arc<EvalGuard>,
}

impl AtomStore {
    /// The store's registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store's cell layout.
    pub fn cells(&self) -> &Arc<CellSet> {
        &self.cells
    }

    /// Look up the raw cell definition behind a field.
    pub fn atom(&self, key: &str) -> Option<&ErasedAtom> {
        self.cells.atom(key)
    }

    /// Mint a provider for this store. Each provider owns its own
    /// instance until one is adopted through the `store` prop.
    pub fn provider(&self) -> Provider {
        Provider::new(self.name.clone(), self.cells.clone(), self.effect.clone())
    }

    /// Open an accessor handle, resolving the backing instance from the
    /// given options (explicit instance, then scoped registry lookup,
    /// then the process default).
    pub fn use_store(&self, options: impl Into<UseAtomOptions>) -> StoreHandle {
        let mut options = options.into();
        if options.delay.is_none() {
            options.delay = self.delay;
        }
        let instance =
            resolve_instance(&self.name, &options, self.suppress_warnings);
        StoreHandle::new(
            self.name.clone(),
            self.cells.clone(),
            instance,
            options.delay.is_some(),
            self.guard.clone(),
        )
    }

    /// Read one field through a freshly resolved handle.
    pub fn use_value<T>(
        &self,
        key: &str,
        options: impl Into<UseAtomOptions>,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.use_store(options).get(key)
    }

    /// Setter for one field through a freshly resolved handle.
    pub fn use_set<T>(
        &self,
        key: &str,
        options: impl Into<UseAtomOptions>,
    ) -> Result<Setter<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.use_store(options).setter(key)
    }

    /// Value-and-setter pair for one field through a freshly resolved
    /// handle.
    pub fn use_state<T>(
        &self,
        key: &str,
        options: impl Into<UseAtomOptions>,
    ) -> Result<(T, Setter<T>)>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.use_store(options).state(key)
    }
}

impl std::fmt::Debug for AtomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomStore")
            .field("name", &self.name)
            .field("fields", &self.cells.atoms().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl From<()> for UseAtomOptions {
    fn from(_: ()) -> Self {
        UseAtomOptions::new()
    }
}
