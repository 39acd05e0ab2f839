//! Two-phase graph reconstruction.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stowage_handler::{HandlerError, TypeHandler, TypeHandlerRegistry};
use stowage_registry::{IdentityRegistry, Registration};
use stowage_types::{Instance, ObjectId, RawRecord};

use crate::error::{GraphError, GraphResult};
use crate::source::Source;

/// Loader configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Read requests issued for one set of missing objects before giving up.
    pub max_fetch_attempts: u32,
    /// Milliseconds to wait for objects another load is still building.
    pub settle_timeout_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_fetch_attempts: 2,
            settle_timeout_ms: 30_000,
        }
    }
}

/// Phase of the batch currently being built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    Collecting,
    Instantiating,
    Populating,
    Done,
}

/// Result of one load.
#[derive(Clone, Debug)]
pub struct LoadedGraph {
    /// The requested (or root) objects, in request order.
    pub roots: Vec<(ObjectId, Instance)>,
    /// Object ids materialized by this load, including the closure.
    pub loaded: Vec<ObjectId>,
}

impl LoadedGraph {
    pub fn root(&self, object_id: ObjectId) -> Option<&Instance> {
        self.roots
            .iter()
            .find(|(id, _)| *id == object_id)
            .map(|(_, instance)| instance)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.roots.iter().map(|(_, instance)| instance)
    }

    /// Number of instances this load created.
    pub fn materialized(&self) -> usize {
        self.loaded.len()
    }
}

struct BuildItem {
    handler: Arc<dyn TypeHandler>,
    record: RawRecord,
    instance: Instance,
}

/// Items of one batch and the next one to populate.
struct Batch {
    items: Vec<BuildItem>,
    cursor: usize,
}

/// Reconstructs object graphs from a [`Source`].
///
/// One builder serves one load operation at a time and is not shared
/// between threads; the identity registry it writes to may be. Objects a
/// builder registers stay in flight until its load completes. A load that
/// reaches objects another builder has in flight first completes its own
/// objects, then waits for the other builder before returning.
pub struct GraphBuilder<'a> {
    identities: &'a IdentityRegistry,
    handlers: &'a TypeHandlerRegistry,
    source: &'a dyn Source,
    config: LoaderConfig,
    phase: BuildPhase,
    skips: HashSet<ObjectId>,
    created: Vec<(ObjectId, Instance)>,
    awaited: BTreeSet<ObjectId>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        identities: &'a IdentityRegistry,
        handlers: &'a TypeHandlerRegistry,
        source: &'a dyn Source,
        config: LoaderConfig,
    ) -> Self {
        Self {
            identities,
            handlers,
            source,
            config,
            phase: BuildPhase::Done,
            skips: HashSet::new(),
            created: Vec::new(),
            awaited: BTreeSet::new(),
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Treat `object_id` as materialized: its record is never built and
    /// references to it are not fetched. Requesting a skipped id that has no
    /// registered instance as a root fails with [`GraphError::SkippedObject`].
    pub fn register_skip(&mut self, object_id: ObjectId) {
        self.skips.insert(object_id);
    }

    /// Load the root objects of the source and their closure.
    pub fn load_roots(&mut self) -> GraphResult<LoadedGraph> {
        self.awaited.clear();
        let records = self.source.read_initial()?;
        let requested: Vec<ObjectId> = records.iter().map(|r| r.object_id).collect();
        debug!(roots = requested.len(), "loading roots");
        self.run(&requested, records)
    }

    /// Load the given objects and their closure.
    ///
    /// Objects already registered are returned as they are.
    pub fn load(&mut self, object_ids: &[ObjectId]) -> GraphResult<LoadedGraph> {
        self.awaited.clear();
        let missing: BTreeSet<ObjectId> = object_ids
            .iter()
            .copied()
            .filter(|id| !self.is_materialized(*id))
            .collect();
        let records = if missing.is_empty() {
            Vec::new()
        } else {
            self.fetch(missing, None)?
        };
        self.run(object_ids, records)
    }

    fn run(&mut self, requested: &[ObjectId], records: Vec<RawRecord>) -> GraphResult<LoadedGraph> {
        self.created.clear();
        let result = self
            .build(records)
            .and_then(|()| self.await_concurrent())
            .and_then(|()| self.collect_roots(requested));
        self.phase = BuildPhase::Done;
        match result {
            Ok(roots) => {
                let loaded: Vec<ObjectId> = std::mem::take(&mut self.created)
                    .into_iter()
                    .map(|(object_id, _)| object_id)
                    .collect();
                info!(requested = requested.len(), materialized = loaded.len(), "graph loaded");
                Ok(LoadedGraph { roots, loaded })
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn collect_roots(&self, requested: &[ObjectId]) -> GraphResult<Vec<(ObjectId, Instance)>> {
        requested
            .iter()
            .map(|&id| {
                self.identities
                    .lookup_object(id)
                    .map(|instance| (id, instance))
                    .ok_or_else(|| {
                        if self.skips.contains(&id) {
                            GraphError::SkippedObject { object_id: id }
                        } else {
                            GraphError::UnresolvedReference {
                                object_id: id,
                                referenced_by: None,
                            }
                        }
                    })
            })
            .collect()
    }

    /// Bound objects still in flight are remembered so the load can wait
    /// for them before it returns.
    fn is_materialized(&mut self, object_id: ObjectId) -> bool {
        if object_id.is_null() || self.skips.contains(&object_id) {
            return true;
        }
        if !self.identities.contains(object_id) {
            return false;
        }
        if self.identities.is_pending(object_id) {
            self.awaited.insert(object_id);
        }
        true
    }

    /// Settle this load's objects, then wait for the in-flight objects of
    /// other loads it reached.
    fn await_concurrent(&mut self) -> GraphResult<()> {
        for (object_id, _) in &self.created {
            self.identities.settle(*object_id);
        }
        let timeout = Duration::from_millis(self.config.settle_timeout_ms);
        for &object_id in &self.awaited {
            if !self.identities.wait_settled(object_id, timeout) {
                warn!(%object_id, timeout_ms = self.config.settle_timeout_ms, "concurrent load did not settle");
                return Err(GraphError::ConcurrentLoad {
                    object_id,
                    reason: "timed out waiting for the other load".into(),
                });
            }
            if !self.identities.contains(object_id) {
                warn!(%object_id, "concurrent load rolled back");
                return Err(GraphError::ConcurrentLoad {
                    object_id,
                    reason: "the other load failed".into(),
                });
            }
        }
        Ok(())
    }

    /// Build `records` and, depth first, every batch their references need.
    fn build(&mut self, records: Vec<RawRecord>) -> GraphResult<()> {
        let mut stack = vec![self.instantiate_batch(records)?];

        loop {
            let Some(batch) = stack.last_mut() else { break };
            let Some(item) = batch.items.get(batch.cursor) else {
                stack.pop();
                continue;
            };

            let missing: BTreeSet<ObjectId> = item
                .handler
                .loadable_references(&item.record)
                .into_iter()
                .filter(|id| !self.is_materialized(*id))
                .collect();

            if missing.is_empty() {
                self.phase = BuildPhase::Populating;
                item.handler
                    .populate(&item.instance, &item.record)
                    .map_err(|e| record_error(&item.record, e))?;
                batch.cursor += 1;
                continue;
            }

            let referrer = item.record.object_id;
            debug!(object_id = %referrer, missing = missing.len(), "fetching referenced objects");
            let records = self.fetch(missing, Some(referrer))?;
            let nested = self.instantiate_batch(records)?;
            stack.push(nested);
        }
        Ok(())
    }

    /// Collecting and Instantiating for one batch.
    fn instantiate_batch(&mut self, records: Vec<RawRecord>) -> GraphResult<Batch> {
        self.phase = BuildPhase::Collecting;
        let mut seen = HashSet::new();
        let mut collected = Vec::with_capacity(records.len());
        for record in records {
            if self.is_materialized(record.object_id) || !seen.insert(record.object_id) {
                debug!(object_id = %record.object_id, "skipping materialized object");
                continue;
            }
            let handler = self
                .handlers
                .ensure_handler_for_type_id(record.type_id)
                .map_err(|e| record_error(&record, e))?;
            handler
                .validate_record(&record)
                .map_err(|e| record_error(&record, e))?;
            collected.push((handler, record));
        }

        self.phase = BuildPhase::Instantiating;
        let mut items = Vec::with_capacity(collected.len());
        for (handler, record) in collected {
            let instance = handler
                .create(&record)
                .map_err(|e| record_error(&record, e))?;
            match self.identities.register_pending(record.object_id, &instance)? {
                Registration::Registered => {
                    self.created.push((record.object_id, instance.clone()));
                    items.push(BuildItem {
                        handler,
                        record,
                        instance,
                    });
                }
                Registration::Existing(_) => {
                    debug!(object_id = %record.object_id, "materialized concurrently, reusing");
                    if self.identities.is_pending(record.object_id) {
                        self.awaited.insert(record.object_id);
                    }
                }
            }
        }
        debug!(items = items.len(), "batch instantiated");
        Ok(Batch { items, cursor: 0 })
    }

    /// Read `wanted` from the source, re-requesting omitted ids.
    fn fetch(
        &self,
        mut wanted: BTreeSet<ObjectId>,
        referenced_by: Option<ObjectId>,
    ) -> GraphResult<Vec<RawRecord>> {
        let attempts = self.config.max_fetch_attempts.max(1);
        let mut found = Vec::with_capacity(wanted.len());
        for attempt in 1..=attempts {
            let records = self
                .source
                .read_by_object_ids(std::slice::from_ref(&wanted))?;
            for record in records {
                if wanted.remove(&record.object_id) {
                    found.push(record);
                }
            }
            if wanted.is_empty() {
                return Ok(found);
            }
            debug!(attempt, missing = wanted.len(), "source omitted requested objects");
        }
        let object_id = wanted.first().copied().unwrap_or(ObjectId::NULL);
        warn!(%object_id, ?referenced_by, attempts, "unresolved reference");
        Err(GraphError::UnresolvedReference {
            object_id,
            referenced_by,
        })
    }

    /// Undo every registration made by the failed load.
    fn rollback(&mut self) {
        let created = std::mem::take(&mut self.created);
        let count = created.len();
        for (object_id, instance) in created {
            self.identities.unregister(object_id, &instance);
        }
        if count > 0 {
            warn!(count, "load failed, registrations rolled back");
        }
    }
}

fn record_error(record: &RawRecord, source: HandlerError) -> GraphError {
    GraphError::Record {
        object_id: record.object_id,
        type_id: record.type_id,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransferError, TransferResult};
    use crate::memory::InMemoryStorage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use stowage_dictionary::{Member, TypeDefinition, TypeDictionary};
    use stowage_handler::{RuntimeType, RuntimeTypeCatalog};
    use stowage_registry::MonotonicIdProvider;
    use stowage_types::{TypeId, Value, ValueKind};

    const NODE: TypeId = TypeId::new(100);
    const POINT: TypeId = TypeId::new(200);

    fn node_runtime() -> RuntimeType {
        RuntimeType::new("Node")
            .with_value("id", ValueKind::I64)
            .with_reference("next", "Node")
    }

    fn node_definition() -> TypeDefinition {
        TypeDefinition::new(
            "Node",
            NODE,
            vec![Member::value("id", ValueKind::I64), Member::reference("next", "Node")],
        )
        .unwrap()
    }

    fn point_v1() -> TypeDefinition {
        TypeDefinition::new(
            "Point",
            POINT,
            vec![Member::value("x", ValueKind::I32), Member::value("y", ValueKind::I32)],
        )
        .unwrap()
    }

    fn handlers(runtime: Vec<RuntimeType>) -> TypeHandlerRegistry {
        let dictionary = Arc::new(TypeDictionary::new());
        dictionary.register_definition(node_definition()).unwrap();
        dictionary.register_definition(point_v1()).unwrap();
        let catalog: RuntimeTypeCatalog = runtime.into_iter().collect();
        TypeHandlerRegistry::new(
            dictionary,
            Arc::new(catalog),
            Arc::new(MonotonicIdProvider::default()),
        )
    }

    fn node(id: u64, next: u64) -> RawRecord {
        RawRecord::new(
            ObjectId::new(id),
            NODE,
            vec![Value::I64(id as i64), Value::Reference(ObjectId::new(next))],
        )
    }

    fn oid(id: u64) -> ObjectId {
        ObjectId::new(id)
    }

    /// Source that drops the ids in `withheld` from the first `misses` reads returning them.
    struct FlakySource {
        inner: InMemoryStorage,
        withheld: BTreeSet<ObjectId>,
        misses: AtomicUsize,
    }

    impl Source for FlakySource {
        fn read_initial(&self) -> TransferResult<Vec<RawRecord>> {
            self.inner.read_initial()
        }

        fn read_by_object_ids(&self, ids: &[BTreeSet<ObjectId>]) -> TransferResult<Vec<RawRecord>> {
            let records = self.inner.read_by_object_ids(ids)?;
            let hit = records.iter().any(|r| self.withheld.contains(&r.object_id));
            let omit = hit
                && self
                    .misses
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok();
            Ok(records
                .into_iter()
                .filter(|r| !(omit && self.withheld.contains(&r.object_id)))
                .collect())
        }
    }

    /// Source whose first read of `gate` meets the test thread at `reached`,
    /// then holds until `release`. With `fail` set that read errors.
    struct GatedSource {
        inner: InMemoryStorage,
        gate: ObjectId,
        armed: AtomicBool,
        fail: bool,
        reached: Barrier,
        release: Barrier,
    }

    impl GatedSource {
        fn new(inner: InMemoryStorage, gate: ObjectId, fail: bool) -> Self {
            Self {
                inner,
                gate,
                armed: AtomicBool::new(true),
                fail,
                reached: Barrier::new(2),
                release: Barrier::new(2),
            }
        }
    }

    impl Source for GatedSource {
        fn read_initial(&self) -> TransferResult<Vec<RawRecord>> {
            self.inner.read_initial()
        }

        fn read_by_object_ids(&self, ids: &[BTreeSet<ObjectId>]) -> TransferResult<Vec<RawRecord>> {
            let gated = ids.iter().any(|set| set.contains(&self.gate));
            if gated && self.armed.swap(false, Ordering::AcqRel) {
                self.reached.wait();
                self.release.wait();
                if self.fail {
                    return Err(TransferError::Unavailable("connection reset".into()));
                }
            }
            self.inner.read_by_object_ids(ids)
        }
    }

    struct BrokenSource;

    impl Source for BrokenSource {
        fn read_initial(&self) -> TransferResult<Vec<RawRecord>> {
            Err(TransferError::Unavailable("disk gone".into()))
        }

        fn read_by_object_ids(&self, _ids: &[BTreeSet<ObjectId>]) -> TransferResult<Vec<RawRecord>> {
            Err(TransferError::Io("read failed".into()))
        }
    }

    // ----------------------------------------------------------------
    // Graph shapes
    // ----------------------------------------------------------------

    #[test]
    fn cycle_resolves_to_one_instance_per_object() {
        let storage = InMemoryStorage::new();
        storage.insert(node(1, 2));
        storage.insert(node(2, 1));
        storage.set_roots(vec![oid(1)]);

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let graph = builder.load_roots().unwrap();

        assert_eq!(graph.materialized(), 2);
        assert_eq!(builder.phase(), BuildPhase::Done);
        let a = graph.root(oid(1)).unwrap();
        assert_eq!(a.get(1), Some(Value::Reference(oid(2))));
        let b = identities.lookup_object(oid(2)).unwrap();
        assert_eq!(b.get(0), Some(Value::I64(2)));
        assert_eq!(b.get(1), Some(Value::Reference(oid(1))));
        assert!(identities.lookup_object(oid(1)).unwrap().same(a));
        // initial read plus one fetch for node 2
        assert_eq!(storage.read_count(), 2);
    }

    #[test]
    fn chain_is_loaded_depth_first() {
        let storage = InMemoryStorage::new();
        for id in 1..=5 {
            storage.insert(node(id, if id == 5 { 0 } else { id + 1 }));
        }

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let graph = builder.load(&[oid(1)]).unwrap();

        assert_eq!(graph.materialized(), 5);
        for id in 1..=5 {
            let instance = identities.lookup_object(oid(id)).unwrap();
            assert_eq!(instance.get(0), Some(Value::I64(id as i64)));
        }
    }

    #[test]
    fn registered_and_skipped_objects_are_not_rebuilt() {
        let storage = InMemoryStorage::new();
        storage.insert(node(1, 2));
        storage.insert(node(2, 3));
        storage.insert(node(3, 0));

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        builder.register_skip(oid(2));
        let graph = builder.load(&[oid(1)]).unwrap();
        assert_eq!(graph.materialized(), 1);
        assert!(!identities.contains(oid(2)));
        assert!(!identities.contains(oid(3)));

        let first = graph.root(oid(1)).unwrap().clone();
        let again = builder.load(&[oid(1)]).unwrap();
        assert_eq!(again.materialized(), 0);
        assert!(again.root(oid(1)).unwrap().same(&first));
    }

    #[test]
    fn skipped_root_is_reported_as_skipped() {
        let storage = InMemoryStorage::new();
        storage.insert(node(2, 0));

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        builder.register_skip(oid(2));
        let err = builder.load(&[oid(2)]).unwrap_err();
        assert!(matches!(err, GraphError::SkippedObject { object_id } if object_id == oid(2)));
        assert_eq!(storage.read_count(), 0);

        // An unknown id is still an unresolved reference.
        let err = builder.load(&[oid(8)]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvedReference { object_id, referenced_by: None } if object_id == oid(8)
        ));
    }

    #[test]
    fn duplicate_records_build_once() {
        let storage = InMemoryStorage::new();
        storage.insert(node(1, 0));
        storage.set_roots(vec![oid(1), oid(1)]);

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let graph = builder.load_roots().unwrap();
        assert_eq!(graph.materialized(), 1);
        assert_eq!(graph.roots.len(), 2);
        assert!(graph.roots[0].1.same(&graph.roots[1].1));
    }

    // ----------------------------------------------------------------
    // Evolution
    // ----------------------------------------------------------------

    #[test]
    fn old_layout_is_mapped_to_current_shape() {
        let storage = InMemoryStorage::new();
        storage.insert(RawRecord::new(oid(7), POINT, vec![Value::I32(3), Value::I32(4)]));

        let point_v2 = RuntimeType::new("Point")
            .with_value("x", ValueKind::I32)
            .with_value("y", ValueKind::I32)
            .with_value("label", ValueKind::Text);
        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime(), point_v2]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let graph = builder.load(&[oid(7)]).unwrap();

        let point = graph.root(oid(7)).unwrap();
        assert_eq!(
            point.values(),
            vec![Value::I32(3), Value::I32(4), Value::Text(String::new())]
        );
    }

    // ----------------------------------------------------------------
    // Failures and rollback
    // ----------------------------------------------------------------

    #[test]
    fn deleted_type_fails_and_rolls_back() {
        let storage = InMemoryStorage::new();
        storage.insert(RawRecord::new(
            oid(1),
            NODE,
            vec![Value::I64(1), Value::Reference(oid(2))],
        ));
        storage.insert(RawRecord::new(oid(2), POINT, vec![Value::I32(1), Value::I32(2)]));

        let identities = IdentityRegistry::new();
        // Point has no runtime type anymore.
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let err = builder.load(&[oid(1)]).unwrap_err();

        match err {
            GraphError::Record { object_id, type_id, source } => {
                assert_eq!(object_id, oid(2));
                assert_eq!(type_id, POINT);
                assert!(matches!(source, HandlerError::DeletedType { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(identities.is_empty());
    }

    #[test]
    fn malformed_record_fails_before_registration() {
        let storage = InMemoryStorage::new();
        storage.insert(RawRecord::new(oid(1), NODE, vec![Value::Text("x".into())]));

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let err = builder.load(&[oid(1)]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Record { source: HandlerError::RecordShape { .. }, .. }
        ));
        assert!(identities.is_empty());
    }

    #[test]
    fn transfer_failure_is_propagated() {
        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &BrokenSource, LoaderConfig::default());
        assert!(matches!(
            builder.load_roots(),
            Err(GraphError::Transfer(TransferError::Unavailable(_)))
        ));
        assert!(matches!(
            builder.load(&[oid(1)]),
            Err(GraphError::Transfer(TransferError::Io(_)))
        ));
    }

    #[test]
    fn conflicting_identity_is_reported() {
        let storage = InMemoryStorage::new();
        storage.insert(node(1, 0));

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, LoaderConfig::default());
        let instance = builder.load(&[oid(1)]).unwrap().roots[0].1.clone();

        // The same instance cannot be bound to a second id.
        assert!(identities.register(oid(5), &instance).is_err());
        assert_eq!(identities.lookup_id(&instance), Some(oid(1)));
    }

    // ----------------------------------------------------------------
    // Concurrent loads
    // ----------------------------------------------------------------

    #[test]
    fn load_waits_for_objects_another_load_is_building() {
        let inner = InMemoryStorage::new();
        inner.insert(node(1, 2));
        inner.insert(node(2, 0));
        let source = GatedSource::new(inner, oid(2), false);
        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);

        let (first, second) = thread::scope(|scope| {
            let first = scope.spawn(|| {
                GraphBuilder::new(&identities, &handlers, &source, LoaderConfig::default()).load(&[oid(1)])
            });
            // Node 1 is registered and waits for node 2.
            source.reached.wait();
            assert!(identities.is_pending(oid(1)));
            let second = scope.spawn(|| {
                GraphBuilder::new(&identities, &handlers, &source, LoaderConfig::default()).load(&[oid(1)])
            });
            thread::sleep(std::time::Duration::from_millis(20));
            source.release.wait();
            (
                first.join().expect("thread should not panic").unwrap(),
                second.join().expect("thread should not panic").unwrap(),
            )
        });

        let node = second.root(oid(1)).unwrap();
        assert!(node.same(first.root(oid(1)).unwrap()));
        assert_eq!(node.values(), vec![Value::I64(1), Value::Reference(oid(2))]);
        assert_eq!(second.materialized(), 0);
        assert!(!identities.is_pending(oid(1)));
        assert!(!identities.is_pending(oid(2)));
    }

    #[test]
    fn load_fails_when_the_other_load_rolls_back() {
        let inner = InMemoryStorage::new();
        inner.insert(node(1, 2));
        inner.insert(node(2, 0));
        let source = GatedSource::new(inner, oid(2), true);
        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);

        let (first, second) = thread::scope(|scope| {
            let first = scope.spawn(|| {
                GraphBuilder::new(&identities, &handlers, &source, LoaderConfig::default()).load(&[oid(1)])
            });
            source.reached.wait();
            let second = scope.spawn(|| {
                GraphBuilder::new(&identities, &handlers, &source, LoaderConfig::default()).load(&[oid(1)])
            });
            thread::sleep(std::time::Duration::from_millis(20));
            source.release.wait();
            (
                first.join().expect("thread should not panic"),
                second.join().expect("thread should not panic"),
            )
        });

        assert!(matches!(first, Err(GraphError::Transfer(_))));
        // The second load either saw node 1 in flight or found it gone and
        // fetched it itself.
        match second {
            Err(GraphError::ConcurrentLoad { object_id, .. }) => {
                assert_eq!(object_id, oid(1));
                assert!(identities.is_empty());
            }
            Ok(graph) => {
                assert_eq!(
                    graph.root(oid(1)).unwrap().values(),
                    vec![Value::I64(1), Value::Reference(oid(2))]
                );
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stalled_concurrent_load_times_out() {
        let storage = InMemoryStorage::new();
        storage.insert(node(1, 0));
        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        identities
            .register_pending(oid(1), &Instance::new("Node", vec![Value::I64(0), Value::Reference(ObjectId::NULL)]))
            .unwrap();

        let config = LoaderConfig {
            settle_timeout_ms: 10,
            ..LoaderConfig::default()
        };
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, config);
        let err = builder.load(&[oid(1)]).unwrap_err();
        assert!(matches!(err, GraphError::ConcurrentLoad { object_id, .. } if object_id == oid(1)));
        assert_eq!(storage.read_count(), 0);

        identities.settle(oid(1));
        assert!(builder.load(&[oid(1)]).is_ok());
    }

    // ----------------------------------------------------------------
    // Fetch retry
    // ----------------------------------------------------------------

    #[test]
    fn omitted_objects_are_requested_again() {
        let inner = InMemoryStorage::new();
        inner.insert(node(1, 2));
        inner.insert(node(2, 0));
        let source = FlakySource {
            inner,
            withheld: BTreeSet::from([oid(2)]),
            misses: AtomicUsize::new(1),
        };

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let mut builder = GraphBuilder::new(&identities, &handlers, &source, LoaderConfig::default());
        let graph = builder.load(&[oid(1)]).unwrap();
        assert_eq!(graph.materialized(), 2);
        // one read for node 1, two for node 2
        assert_eq!(source.inner.read_count(), 3);
    }

    #[test]
    fn missing_objects_fail_after_the_last_attempt() {
        let storage = InMemoryStorage::new();
        storage.insert(node(1, 9));

        let identities = IdentityRegistry::new();
        let handlers = handlers(vec![node_runtime()]);
        let config = LoaderConfig {
            max_fetch_attempts: 3,
            ..LoaderConfig::default()
        };
        let mut builder = GraphBuilder::new(&identities, &handlers, &storage, config);
        let err = builder.load(&[oid(1)]).unwrap_err();

        assert!(matches!(
            err,
            GraphError::UnresolvedReference { object_id, referenced_by: Some(by) }
                if object_id == oid(9) && by == oid(1)
        ));
        assert_eq!(storage.read_count(), 4);
        assert!(identities.is_empty());
    }

    #[test]
    fn loader_config_defaults() {
        let config: LoaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.max_fetch_attempts, 2);
        assert_eq!(config.settle_timeout_ms, 30_000);
    }
}
