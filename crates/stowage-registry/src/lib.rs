//! Object identity for stowage.
//!
//! The [`IdentityRegistry`] is the bidirectional mapping between a live
//! instance's identity and its persistent [`ObjectId`]. It is what makes
//! "the same object means the same record" hold: a loaded object is
//! registered before anything else can reference it, and a stored object
//! keeps the id it was first given.
//!
//! # Design Rules
//!
//! 1. The mapping is a bijection for the registry's lifetime.
//! 2. Reads never block on unrelated writes.
//! 3. Registration is compare-and-insert per object id and per instance,
//!    never a global lock.
//! 4. Conflicting registrations fail; they are never silently resolved.
//!
//! Fresh ids come from an [`IdProvider`]; [`MonotonicIdProvider`] is the
//! in-process implementation.

pub mod error;
pub mod ids;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use ids::{IdProvider, MonotonicIdProvider};
pub use registry::{IdentityRegistry, Registration};

pub use stowage_types::ObjectId;
