//! # Strata Core
//!
//! Scoped reactive atom stores: declarative store definitions, provider
//! instances resolved through named scopes, and a keyed accessor surface
//! with cached value hooks.
//!
//! ## Architecture
//!
//! The crate is two layers:
//!
//! - [`reactive`]: cell definitions ([`Atom`], [`Derived`]), live
//!   [`StoreInstance`]s holding cell values, change subscriptions, and the
//!   cooperative [`Scheduler`].
//! - [`store`]: the named surface. [`create_atom_store`] declares a store,
//!   [`Provider`] publishes an instance of it into the scoped registry for
//!   a render pass, and [`StoreHandle`] reads and writes fields against
//!   whichever instance resolution finds.
//!
//! ## Resolution
//!
//! Store lookups are keyed `"<store name>:<scope>"`. A consumer asking for
//! a scope gets the nearest provider registered under that exact scope, or
//! failing that the nearest provider of the store at all; with no provider
//! in reach, a process-wide default instance backs the accessors.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::store::{
//!     create_atom_store, FieldInit, ProviderProps, StoreOptions,
//! };
//!
//! let store = create_atom_store(
//!     [("count".to_string(), FieldInit::value(0i64))]
//!         .into_iter()
//!         .collect(),
//!     StoreOptions::named("app"),
//! );
//!
//! let provider = store.provider();
//! provider.render(&ProviderProps::new(), || {
//!     let handle = store.use_store(());
//!     handle.set("count", 5i64).unwrap();
//!     assert_eq!(handle.get::<i64>("count").unwrap(), 5);
//! });
//! ```
//!
//! [`Atom`]: reactive::Atom
//! [`Derived`]: reactive::Derived
//! [`StoreInstance`]: reactive::StoreInstance
//! [`Scheduler`]: reactive::Scheduler
//! [`create_atom_store`]: store::create_atom_store
//! [`Provider`]: store::Provider
//! [`StoreHandle`]: store::StoreHandle

pub mod error;
pub mod reactive;
pub mod store;

pub use error::{Result, StoreError};
pub use reactive::{
    Atom, AtomId, Derived, ErasedAtom, ErasedValue, ReadContext, Readable,
    Scheduler, StoreInstance, Subscription, SubscriptionId,
};
pub use store::{
    create_atom_store, AtomStore, CellSet, CreateCellFn, ExtendFn, FieldHandle,
    FieldInit, FieldValues, Provider, ProviderProps, RegistryFrame, Setter,
    StoreHandle, StoreOptions, StoreRegistry, UseAtomOptions, ValueHook,
    WritableField, DEFAULT_EVAL_LIMIT, PROVIDER_SCOPE,
};
