//! Persisted type shapes for stowage.
//!
//! A [`TypeDefinition`] is one version of a type's persisted shape: its name,
//! its [`TypeId`](stowage_types::TypeId) and an ordered list of
//! [`Member`]s. A [`TypeLineage`] is the append-only history of such shapes
//! for one type id, oldest first. The [`TypeDictionary`] holds every lineage
//! of a persistence domain and is shared, read-mostly, by every load and
//! store of a session.
//!
//! # Invariants
//!
//! - Definitions are immutable values compared structurally: the same
//!   ordered member list means the same version.
//! - A lineage only grows by appending; an old shape never reappears at a
//!   later position.
//! - A type name maps to exactly one type id and vice versa (renames add an
//!   alias name to an existing id).

pub mod definition;
pub mod dictionary;
pub mod error;
pub mod lineage;
pub mod member;

pub use definition::TypeDefinition;
pub use dictionary::{DictionarySnapshot, TypeDictionary};
pub use error::{DictionaryError, DictionaryResult};
pub use lineage::TypeLineage;
pub use member::Member;
