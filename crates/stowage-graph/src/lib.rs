//! Object graph transfer for stowage.
//!
//! The [`GraphBuilder`] turns an unordered set of [`RawRecord`](stowage_types::RawRecord)s
//! into live, possibly cyclic, instance graphs; the [`GraphStorer`] does the
//! reverse. Both talk to storage through the [`Source`] and [`Target`]
//! traits and never see bytes.
//!
//! # Loading
//!
//! Each batch of records runs through three phases in strict order:
//!
//! 1. **Collecting**: resolve the handler of every record, skip object ids
//!    that are already materialized.
//! 2. **Instantiating**: create a bare instance per record and register it
//!    under its object id.
//! 3. **Populating**: fill every instance. A record referencing an object
//!    that is not registered yet first fetches the missing objects and
//!    builds them as a nested batch.
//!
//! Every instance of a batch is registered before any of them is
//! populated, so cycles resolve to the one instance per object id. A failed
//! load unregisters everything it registered.
//!
//! Registered instances stay in flight until their load completes. A load
//! that reaches another load's in-flight objects returns only once that load
//! has settled them.

pub mod builder;
pub mod error;
pub mod memory;
pub mod source;
pub mod storer;

pub use builder::{BuildPhase, GraphBuilder, LoadedGraph, LoaderConfig};
pub use error::{GraphError, GraphResult, TransferError, TransferResult};
pub use memory::InMemoryStorage;
pub use source::{Source, Storage, Target};
pub use storer::{GraphStorer, StoreSummary};
