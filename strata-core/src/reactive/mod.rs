//! Reactive Cell Primitives
//!
//! This module implements the cell layer the store surface is built on:
//! cell definitions, store instances holding live values, change
//! subscriptions, and the cooperative scheduler.
//!
//! # Concepts
//!
//! ## Cell definitions
//!
//! [`Atom`] and [`Derived`] describe cells without holding live state: an
//! atom is a writable value cell seeded from an initial value, a derived
//! cell is a read-only computation over other cells. Definitions are cheap
//! handles that can be shared freely.
//!
//! ## Instances
//!
//! A [`StoreInstance`] realizes definitions into live cells on first
//! access. The same definition realized in two instances yields two fully
//! independent values, which is what lets multiple providers of the same
//! store coexist.
//!
//! ## Subscriptions and scheduling
//!
//! Writes notify subscribers synchronously by default; a deferred
//! subscription is delivered on the next [`Scheduler`] tick instead. The
//! tick is also the reset point for the runaway-recomputation guard.

mod atom;
mod instance;
mod scheduler;
mod subscription;

pub use atom::{Atom, AtomId, Derived, ErasedAtom, ErasedValue, Readable};
pub use instance::{ReadContext, StoreInstance};
pub use scheduler::Scheduler;
pub use subscription::{Subscription, SubscriptionId};

pub(crate) use atom::box_fn;
pub(crate) use instance::SubscriberFn;
pub(crate) use scheduler::EvalGuard;
