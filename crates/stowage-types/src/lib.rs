//! Foundation types for stowage, an object-graph persistence engine.
//!
//! This crate provides the identity and value primitives shared by every
//! other stowage crate. It has no knowledge of type dictionaries, handlers or
//! storage; it only describes what a persisted object *is*.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Persistent identity of one object instance (never reused)
//! - [`TypeId`]: Persistent identity of a type name within a domain
//! - [`ValueKind`] / [`Value`]: Member value model with widening conversions
//! - [`Instance`]: Shared handle to a live entity; identity is pointer identity
//! - [`RawRecord`]: Decoded member values of one persisted object

pub mod error;
pub mod id;
pub mod instance;
pub mod record;
pub mod value;

pub use error::TypeError;
pub use id::{ObjectId, TypeId};
pub use instance::{Instance, InstanceKey};
pub use record::RawRecord;
pub use value::{Value, ValueKind};
