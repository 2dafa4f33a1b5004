//! Store Builder
//!
//! Turns a declarative initial-state map into a [`CellSet`]: one cell per
//! field, classified by how the field was declared.
//!
//! - [`FieldInit::value`] becomes a writable value cell seeded from the
//!   value (routed through the store's `create_cell` override if one is
//!   configured).
//! - [`FieldInit::func`] becomes a writable cell whose stored
//!   representation boxes the callable, so it round-trips instead of being
//!   treated as a computation.
//! - [`FieldInit::cell`] passes a pre-built cell definition through
//!   unchanged, keeping whatever writability it already has.
//!
//! An `extend` closure may add cells computed over the base set; extended
//! cells are never hydration or sync targets, which is what
//! [`CellSet::base_writable`] captures.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::{box_fn, ErasedAtom, ErasedValue};

/// How one store field is initialized.
#[derive(Clone)]
pub enum FieldInit {
    /// A plain value; becomes a writable cell seeded with it.
    Value(ErasedValue),
    /// A callable value; becomes a writable cell that stores it boxed.
    Func(ErasedValue),
    /// A pre-built cell definition, adopted as-is.
    Cell(ErasedAtom),
}

impl FieldInit {
    /// Declare a plain-value field.
    pub fn value<T>(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::Value(Arc::new(value))
    }

    /// Declare a function-valued field.
    ///
    /// `T` should be the callable's handle type (e.g. an `Arc<dyn Fn..>`),
    /// which is what reads hand back.
    pub fn func<T>(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::Func(Arc::new(value))
    }

    /// Adopt an existing cell definition as a field.
    pub fn cell(atom: ErasedAtom) -> Self {
        Self::Cell(atom)
    }

    /// The raw value carried by a `Value` or `Func` initializer. `Cell`
    /// initializers carry no value of their own.
    pub(crate) fn as_value(&self) -> Option<ErasedValue> {
        match self {
            Self::Value(value) | Self::Func(value) => Some(value.clone()),
            Self::Cell(_) => None,
        }
    }
}

impl std::fmt::Debug for FieldInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("FieldInit::Value"),
            Self::Func(_) => f.write_str("FieldInit::Func"),
            Self::Cell(atom) => f.debug_tuple("FieldInit::Cell").field(atom).finish(),
        }
    }
}

/// Field-name-to-initializer map, in declaration order.
pub type FieldValues = IndexMap<String, FieldInit>;

/// Override hook for value-cell creation.
pub type CreateCellFn = Arc<dyn Fn(ErasedValue) -> ErasedAtom + Send + Sync>;

/// Hook that derives extra cells over the base set.
pub type ExtendFn =
    Arc<dyn Fn(&IndexMap<String, ErasedAtom>) -> IndexMap<String, ErasedAtom> + Send + Sync>;

/// The complete, named cell layout of one store definition.
pub struct CellSet {
    atoms: IndexMap<String, ErasedAtom>,
    base_writable: IndexMap<String, ErasedAtom>,
}

impl CellSet {
    /// Look up a cell by field name.
    pub fn atom(&self, key: &str) -> Option<&ErasedAtom> {
        self.atoms.get(key)
    }

    /// All cells, base and extended, in declaration order.
    pub fn atoms(&self) -> &IndexMap<String, ErasedAtom> {
        &self.atoms
    }

    /// Whether the named field accepts writes through the store surface.
    pub fn is_writable(&self, key: &str) -> bool {
        self.atoms
            .get(key)
            .map(ErasedAtom::is_writable)
            .unwrap_or(false)
    }

    /// The writable base fields, the only hydration and sync targets.
    /// Extended cells are excluded even when writable.
    pub(crate) fn base_writable(&self) -> &IndexMap<String, ErasedAtom> {
        &self.base_writable
    }
}

impl std::fmt::Debug for CellSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellSet")
            .field("fields", &self.atoms.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build the cell set for a store from its declared initial state.
pub(crate) fn build_cell_set(
    initial_state: &FieldValues,
    extend: Option<&ExtendFn>,
    create_cell: Option<&CreateCellFn>,
) -> CellSet {
    let mut atoms: IndexMap<String, ErasedAtom> = IndexMap::new();

    for (key, init) in initial_state {
        let atom = match init {
            FieldInit::Value(value) => match create_cell {
                Some(create) => create(value.clone()),
                None => ErasedAtom::value(value.clone(), false),
            },
            FieldInit::Func(value) => {
                ErasedAtom::value(box_fn(value.clone()), true)
            }
            FieldInit::Cell(atom) => atom.clone(),
        };
        atoms.insert(key.clone(), atom);
    }

    let base_writable: IndexMap<String, ErasedAtom> = atoms
        .iter()
        .filter(|(_, atom)| atom.is_writable())
        .map(|(key, atom)| (key.clone(), atom.clone()))
        .collect();

    if let Some(extend) = extend {
        let extra = extend(&atoms);
        for (key, atom) in extra {
            atoms.insert(key, atom);
        }
    }

    CellSet {
        atoms,
        base_writable,
    }
}
