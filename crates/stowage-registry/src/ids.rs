use std::sync::atomic::{AtomicU64, Ordering};

use stowage_types::{ObjectId, TypeId};

/// Supplier of fresh, domain-unique identifiers.
///
/// Implementations must be monotonic and never hand out the same value
/// twice within a persistence domain.
pub trait IdProvider: Send + Sync {
    fn next_object_id(&self) -> ObjectId;

    fn next_type_id(&self) -> TypeId;

    /// Report an object id already in use, so it is never handed out.
    fn observe_object_id(&self, _id: ObjectId) {}

    /// Report a type id already in use, so it is never handed out.
    fn observe_type_id(&self, _id: TypeId) {}
}

/// In-process [`IdProvider`] backed by two atomic counters.
///
/// Ids already used by stored data must be reported through
/// [`IdProvider::observe_object_id`] and
/// [`IdProvider::observe_type_id`] so they are skipped.
#[derive(Debug)]
pub struct MonotonicIdProvider {
    next_object: AtomicU64,
    next_type: AtomicU64,
}

impl MonotonicIdProvider {
    pub const DEFAULT_FIRST_OBJECT_ID: u64 = 1_000_000;
    pub const DEFAULT_FIRST_TYPE_ID: u64 = 1_000;

    /// Create a provider starting at the given raw values (0 is bumped to 1).
    pub fn new(first_object_id: u64, first_type_id: u64) -> Self {
        Self {
            next_object: AtomicU64::new(first_object_id.max(1)),
            next_type: AtomicU64::new(first_type_id.max(1)),
        }
    }

    /// The object id the next call to `next_object_id` returns.
    pub fn peek_object_id(&self) -> ObjectId {
        ObjectId::new(self.next_object.load(Ordering::Acquire))
    }
}

impl Default for MonotonicIdProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FIRST_OBJECT_ID, Self::DEFAULT_FIRST_TYPE_ID)
    }
}

impl IdProvider for MonotonicIdProvider {
    fn next_object_id(&self) -> ObjectId {
        ObjectId::new(self.next_object.fetch_add(1, Ordering::AcqRel))
    }

    fn next_type_id(&self) -> TypeId {
        TypeId::new(self.next_type.fetch_add(1, Ordering::AcqRel))
    }

    /// Skips `id` and every smaller value.
    fn observe_object_id(&self, id: ObjectId) {
        self.next_object
            .fetch_max(id.get().saturating_add(1), Ordering::AcqRel);
    }

    /// Skips `id` and every smaller value.
    fn observe_type_id(&self, id: TypeId) {
        self.next_type
            .fetch_max(id.get().saturating_add(1), Ordering::AcqRel);
    }
}
