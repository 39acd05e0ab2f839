use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use stowage_types::{Instance, InstanceKey, ObjectId};

use crate::error::{RegistryError, RegistryResult};

/// Outcome of [`IdentityRegistry::register_or_existing`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The passed instance is now bound to the object id.
    Registered,
    /// The object id was already bound; the bound instance must be used.
    Existing(Instance),
}

enum Bind {
    Bound,
    AlreadyBound,
    ObjectIdTaken(Instance),
    InstanceTaken(ObjectId),
}

/// Bidirectional oid <-> instance table.
///
/// Both directions live in sharded concurrent maps. Reads take a shard read
/// lock only. A registration holds the object id's shard entry while it
/// inserts the instance side, so two racing registrations for the same id or
/// the same instance are serialized on that key alone. Lock order is always
/// object id first, instance second.
///
/// A binding made with [`register_pending`](Self::register_pending) is in
/// flight until [`settle`](Self::settle) or
/// [`unregister`](Self::unregister): its instance exists but another loader
/// may still be filling it in.
#[derive(Default)]
pub struct IdentityRegistry {
    by_id: DashMap<ObjectId, Instance>,
    by_instance: DashMap<InstanceKey, ObjectId>,
    pending: DashSet<ObjectId>,
    settled: Mutex<()>,
    settled_signal: Condvar,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The object id bound to `instance`, if any.
    pub fn lookup_id(&self, instance: &Instance) -> Option<ObjectId> {
        self.by_instance.get(&instance.key()).map(|id| *id)
    }

    /// The instance bound to `object_id`, if any.
    pub fn lookup_object(&self, object_id: ObjectId) -> Option<Instance> {
        self.by_id.get(&object_id).map(|inst| inst.clone())
    }

    /// Returns `true` if `object_id` is bound.
    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.by_id.contains_key(&object_id)
    }

    /// Bind `object_id` to `instance`.
    ///
    /// Registering an existing pair again is a no-op. Fails with
    /// [`RegistryError::IdentityConflict`] if either side is bound to a
    /// different counterpart; the existing binding is left untouched.
    pub fn register(&self, object_id: ObjectId, instance: &Instance) -> RegistryResult<()> {
        match self.bind(object_id, instance, false)? {
            Bind::Bound | Bind::AlreadyBound => Ok(()),
            Bind::ObjectIdTaken(_) => Err(conflict_id_taken(object_id, instance)),
            Bind::InstanceTaken(bound) => Err(conflict_instance_taken(object_id, bound)),
        }
    }

    /// Bind `object_id` to `instance` unless the id is already bound, in
    /// which case the bound instance is returned for the caller to use.
    ///
    /// This lets concurrent loaders agree on one instance per object id:
    /// whoever registers first wins, later callers discard their own copy.
    pub fn register_or_existing(
        &self,
        object_id: ObjectId,
        instance: &Instance,
    ) -> RegistryResult<Registration> {
        self.registration(object_id, instance, false)
    }

    /// Like [`register_or_existing`](Self::register_or_existing), but a new
    /// binding is in flight until the caller settles or unregisters it.
    pub fn register_pending(
        &self,
        object_id: ObjectId,
        instance: &Instance,
    ) -> RegistryResult<Registration> {
        self.registration(object_id, instance, true)
    }

    fn registration(
        &self,
        object_id: ObjectId,
        instance: &Instance,
        pending: bool,
    ) -> RegistryResult<Registration> {
        match self.bind(object_id, instance, pending)? {
            Bind::Bound => Ok(Registration::Registered),
            Bind::AlreadyBound => Ok(Registration::Existing(instance.clone())),
            Bind::ObjectIdTaken(existing) => Ok(Registration::Existing(existing)),
            Bind::InstanceTaken(bound) => Err(conflict_instance_taken(object_id, bound)),
        }
    }

    /// Return the object id of `instance`, assigning one from `next_id` if
    /// the instance is not registered yet.
    ///
    /// If another thread registers the same instance concurrently, its id
    /// is returned and the freshly drawn id is simply left unused.
    pub fn ensure_id<F>(&self, instance: &Instance, next_id: F) -> RegistryResult<ObjectId>
    where
        F: FnOnce() -> ObjectId,
    {
        if let Some(id) = self.lookup_id(instance) {
            return Ok(id);
        }
        let object_id = next_id();
        match self.bind(object_id, instance, false)? {
            Bind::Bound | Bind::AlreadyBound => {
                debug!(object_id = %object_id, type_name = instance.type_name(), "assigned object id");
                Ok(object_id)
            }
            Bind::InstanceTaken(bound) => Ok(bound),
            Bind::ObjectIdTaken(_) => Err(conflict_id_taken(object_id, instance)),
        }
    }

    /// Remove the binding of `object_id` if it is bound to `instance`.
    ///
    /// Used to roll back registrations of a failed load. Returns `true` if a
    /// binding was removed. A removed binding is no longer in flight.
    pub fn unregister(&self, object_id: ObjectId, instance: &Instance) -> bool {
        let removed = self
            .by_id
            .remove_if(&object_id, |_, bound| bound.same(instance))
            .is_some();
        if removed {
            self.by_instance
                .remove_if(&instance.key(), |_, bound| *bound == object_id);
            self.settle(object_id);
        }
        removed
    }

    /// Returns `true` if `object_id` was registered pending and is not
    /// settled yet.
    pub fn is_pending(&self, object_id: ObjectId) -> bool {
        self.pending.contains(&object_id)
    }

    /// Mark the binding of `object_id` as complete and wake its waiters.
    pub fn settle(&self, object_id: ObjectId) {
        if self.pending.remove(&object_id).is_some() {
            let _guard = self.settled.lock();
            self.settled_signal.notify_all();
        }
    }

    /// Block until `object_id` is no longer in flight or `timeout` elapses.
    ///
    /// Returns `false` on timeout.
    pub fn wait_settled(&self, object_id: ObjectId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.settled.lock();
        while self.pending.contains(&object_id) {
            if self.settled_signal.wait_until(&mut guard, deadline).timed_out() {
                return !self.pending.contains(&object_id);
            }
        }
        true
    }

    /// Number of bound pairs.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Sorted snapshot of all bound object ids.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.by_id.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    fn bind(&self, object_id: ObjectId, instance: &Instance, pending: bool) -> RegistryResult<Bind> {
        if object_id.is_null() {
            return Err(RegistryError::NullObjectId);
        }
        match self.by_id.entry(object_id) {
            Entry::Occupied(slot) => {
                if slot.get().same(instance) {
                    Ok(Bind::AlreadyBound)
                } else {
                    Ok(Bind::ObjectIdTaken(slot.get().clone()))
                }
            }
            Entry::Vacant(slot) => match self.by_instance.entry(instance.key()) {
                Entry::Occupied(bound) => Ok(Bind::InstanceTaken(*bound.get())),
                Entry::Vacant(reverse) => {
                    if pending {
                        self.pending.insert(object_id);
                    }
                    reverse.insert(object_id);
                    slot.insert(instance.clone());
                    Ok(Bind::Bound)
                }
            },
        }
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("bound", &self.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn conflict_id_taken(object_id: ObjectId, instance: &Instance) -> RegistryError {
    warn!(object_id = %object_id, type_name = instance.type_name(), "object id already bound to another instance");
    RegistryError::IdentityConflict {
        object_id,
        reason: "object id is already bound to a different instance".into(),
    }
}

fn conflict_instance_taken(object_id: ObjectId, bound: ObjectId) -> RegistryError {
    warn!(object_id = %object_id, bound = %bound, "instance already bound to another object id");
    RegistryError::IdentityConflict {
        object_id,
        reason: format!("instance is already bound to object {bound}"),
    }
}
