//! Named Store Layer
//!
//! Builds the declarative store surface on top of the reactive cell
//! primitives:
//!
//! - [`create_atom_store`] turns an initial-state map into an
//!   [`AtomStore`] definition.
//! - [`Provider`] realizes a definition into a live instance and
//!   publishes it into the scoped [`StoreRegistry`] for the duration of a
//!   render pass.
//! - [`StoreHandle`] is the keyed accessor surface consumers use to read,
//!   write, and observe fields; it resolves its backing instance through
//!   the registry.

mod builder;
mod definition;
mod handle;
mod provider;
mod registry;

pub use builder::{CellSet, CreateCellFn, ExtendFn, FieldInit, FieldValues};
pub use definition::{
    create_atom_store, AtomStore, StoreOptions, DEFAULT_EVAL_LIMIT,
};
pub use handle::{
    FieldHandle, Setter, StoreHandle, UseAtomOptions, ValueHook, WritableField,
};
pub use provider::{Provider, ProviderProps};
pub use registry::{RegistryFrame, StoreRegistry, PROVIDER_SCOPE};
