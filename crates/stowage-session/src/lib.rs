//! Persistence sessions for stowage.
//!
//! A [`PersistenceSession`] owns the state one persistence domain needs:
//! the identity registry, the handler cache, the id provider and the set of
//! objects already written. Nothing is process-wide; two sessions never
//! share identities, even over the same storage.
//!
//! # Design Rules
//!
//! 1. A session is created by [`PersistenceSession::open`] and torn down on
//!    drop.
//! 2. Ids seen in storage or the dictionary are never handed out again.
//! 3. Every load and store either completes or leaves the identity registry
//!    as it found it.

pub mod config;
pub mod error;
pub mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::PersistenceSession;

pub use stowage_graph::{InMemoryStorage, Source, Storage, Target};
pub use stowage_handler::{RuntimeType, RuntimeTypeCatalog};
pub use stowage_types::{Instance, ObjectId, TypeId, Value, ValueKind};
