use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use stowage_types::{ObjectId, RawRecord};

use crate::error::TransferResult;
use crate::source::{Source, Target};

/// In-memory record storage.
///
/// Intended for tests and embedding. Records are cloned on read and write.
/// Every read request is counted, which lets callers observe how many
/// round trips a load needed.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    records: RwLock<BTreeMap<ObjectId, RawRecord>>,
    roots: RwLock<Vec<ObjectId>>,
    reads: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one record.
    pub fn insert(&self, record: RawRecord) {
        self.records.write().insert(record.object_id, record);
    }

    /// Remove a record, returning it if present.
    pub fn remove(&self, object_id: ObjectId) -> Option<RawRecord> {
        self.records.write().remove(&object_id)
    }

    pub fn get(&self, object_id: ObjectId) -> Option<RawRecord> {
        self.records.read().get(&object_id).cloned()
    }

    pub fn set_roots(&self, roots: Vec<ObjectId>) {
        *self.roots.write() = roots;
    }

    pub fn roots(&self) -> Vec<ObjectId> {
        self.roots.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Stored object ids, ascending.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.records.read().keys().copied().collect()
    }

    /// Number of read requests served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }
}

impl Source for InMemoryStorage {
    fn read_initial(&self) -> TransferResult<Vec<RawRecord>> {
        self.reads.fetch_add(1, Ordering::AcqRel);
        let records = self.records.read();
        Ok(self
            .roots
            .read()
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }

    fn read_by_object_ids(&self, ids: &[BTreeSet<ObjectId>]) -> TransferResult<Vec<RawRecord>> {
        self.reads.fetch_add(1, Ordering::AcqRel);
        let records = self.records.read();
        let wanted: BTreeSet<ObjectId> = ids.iter().flatten().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| records.get(&id).cloned())
            .collect())
    }

    fn highest_object_id(&self) -> TransferResult<Option<ObjectId>> {
        Ok(self.records.read().keys().next_back().copied())
    }
}

impl Target for InMemoryStorage {
    fn write(&self, records: &[RawRecord]) -> TransferResult<()> {
        let mut map = self.records.write();
        for record in records {
            map.insert(record.object_id, record.clone());
        }
        Ok(())
    }

    fn write_roots(&self, roots: &[ObjectId]) -> TransferResult<()> {
        *self.roots.write() = roots.to_vec();
        Ok(())
    }
}
