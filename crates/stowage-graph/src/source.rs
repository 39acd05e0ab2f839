use std::collections::BTreeSet;

use stowage_types::{ObjectId, RawRecord};

use crate::error::TransferResult;

/// Read side of a storage medium.
///
/// Implementations may fail any read; the loader treats a failure as fatal
/// for the load in flight.
pub trait Source: Send + Sync {
    /// Records of the root objects, in root order.
    fn read_initial(&self) -> TransferResult<Vec<RawRecord>>;

    /// Records for the requested object ids.
    ///
    /// Each set is an independent request; a source may answer them in one
    /// round trip. Ids it does not know are omitted from the result.
    fn read_by_object_ids(&self, ids: &[BTreeSet<ObjectId>]) -> TransferResult<Vec<RawRecord>>;

    /// Highest object id in storage, if the source tracks it.
    fn highest_object_id(&self) -> TransferResult<Option<ObjectId>> {
        Ok(None)
    }
}

/// Write side of a storage medium.
pub trait Target: Send + Sync {
    /// Persist a batch of records, replacing earlier records of the same ids.
    fn write(&self, records: &[RawRecord]) -> TransferResult<()>;

    /// Replace the root object ids.
    fn write_roots(&self, roots: &[ObjectId]) -> TransferResult<()>;
}

/// A medium that is both [`Source`] and [`Target`].
pub trait Storage: Source + Target {}

impl<T: Source + Target + ?Sized> Storage for T {}
