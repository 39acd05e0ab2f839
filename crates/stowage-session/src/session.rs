use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, info};
use uuid::Uuid;

use stowage_dictionary::TypeDictionary;
use stowage_graph::{GraphBuilder, GraphStorer, LoadedGraph, Source, Storage, Target};
use stowage_handler::{
    FieldFilter, HandlerError, RuntimeType, RuntimeTypeCatalog, TypeFilter, TypeHandler,
    TypeHandlerRegistry,
};
use stowage_mapping::MemberCorrespondenceResolver;
use stowage_registry::{IdProvider, IdentityRegistry, MonotonicIdProvider};
use stowage_types::{Instance, ObjectId, TypeError, TypeId, Value, ValueKind};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Session-scoped persistence state over one storage medium.
///
/// Loads and stores share the session's identity registry, so an object
/// id maps to one instance for the lifetime of the session.
pub struct PersistenceSession {
    id: Uuid,
    config: SessionConfig,
    source: Arc<dyn Source>,
    target: Arc<dyn Target>,
    ids: Arc<MonotonicIdProvider>,
    identities: IdentityRegistry,
    handlers: TypeHandlerRegistry,
    persisted: DashSet<ObjectId>,
}

impl PersistenceSession {
    /// Open a session over `storage`, describing stored types with
    /// `dictionary` and live types with `catalog`.
    pub fn open<S>(
        config: SessionConfig,
        catalog: Arc<RuntimeTypeCatalog>,
        dictionary: Arc<TypeDictionary>,
        storage: Arc<S>,
    ) -> SessionResult<Self>
    where
        S: Storage + 'static,
    {
        let id = Uuid::now_v7();

        let ids = Arc::new(MonotonicIdProvider::new(
            config.first_object_id,
            config.first_type_id,
        ));
        if let Some(highest) = storage.highest_object_id()? {
            ids.observe_object_id(highest);
        }
        if let Some(highest) = dictionary.max_type_id() {
            ids.observe_type_id(highest);
        }

        let resolver = MemberCorrespondenceResolver::new(
            Arc::new(config.refactoring_mapping()?),
            config.resolver_config(),
        );
        let handlers = TypeHandlerRegistry::new(
            dictionary,
            catalog,
            Arc::clone(&ids) as Arc<dyn IdProvider>,
        )
        .with_resolver(resolver)
        .with_type_evaluator(Arc::new(TypeFilter::new(config.excluded_types.iter().cloned())))
        .with_field_evaluator(Arc::new(FieldFilter::new(
            config.transient_fields.iter().cloned(),
            config.eager_fields.iter().cloned(),
        )));

        if !config.root_types.is_empty() {
            let unreachable = handlers.classify_unreachable(&config.root_types);
            debug!(session_id = %id, unreachable = unreachable.len(), "classified unreachable types");
        }

        let source: Arc<dyn Source> = storage.clone();
        let target: Arc<dyn Target> = storage;
        info!(
            session_id = %id,
            next_object_id = %ids.peek_object_id(),
            types = handlers.dictionary().len(),
            "session opened"
        );

        Ok(Self {
            id,
            config,
            source,
            target,
            ids,
            identities: IdentityRegistry::new(),
            handlers,
            persisted: DashSet::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn handlers(&self) -> &TypeHandlerRegistry {
        &self.handlers
    }

    // ---- Loading ----

    /// Load the root objects of the storage and everything they reference.
    pub fn load_roots(&self) -> SessionResult<Vec<Instance>> {
        let graph = self.builder().load_roots()?;
        Ok(self.finish_load(graph))
    }

    /// Load the given objects and everything they reference, in order.
    pub fn load(&self, object_ids: &[ObjectId]) -> SessionResult<Vec<Instance>> {
        let graph = self.builder().load(object_ids)?;
        Ok(self.finish_load(graph))
    }

    /// Bind `instance` to `object_id` as if it had been loaded.
    ///
    /// Later loads reuse the instance instead of reading the object.
    pub fn register_skip(&self, object_id: ObjectId, instance: &Instance) -> SessionResult<()> {
        self.identities.register(object_id, instance)?;
        self.ids.observe_object_id(object_id);
        self.persisted.insert(object_id);
        debug!(session_id = %self.id, %object_id, "registered skip");
        Ok(())
    }

    fn builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(
            &self.identities,
            &self.handlers,
            self.source.as_ref(),
            self.config.loader_config(),
        )
    }

    fn finish_load(&self, graph: LoadedGraph) -> Vec<Instance> {
        for object_id in &graph.loaded {
            self.persisted.insert(*object_id);
        }
        debug!(session_id = %self.id, materialized = graph.materialized(), "load finished");
        graph.roots.into_iter().map(|(_, instance)| instance).collect()
    }

    // ---- Storing ----

    /// Store `instance` and every object it reaches that this session has
    /// not persisted yet.
    pub fn store(&self, instance: &Instance) -> SessionResult<ObjectId> {
        let mut storer = self.storer();
        let object_id = storer.store(instance)?;
        storer.commit(self.target.as_ref())?;
        Ok(object_id)
    }

    /// Store `instance` and make it the only root of the storage.
    pub fn store_root(&self, instance: &Instance) -> SessionResult<ObjectId> {
        let mut storer = self.storer();
        let object_id = storer.store_root(instance)?;
        storer.commit(self.target.as_ref())?;
        Ok(object_id)
    }

    /// Store `roots` and make them the root set of the storage.
    pub fn store_roots(&self, roots: &[Instance]) -> SessionResult<Vec<ObjectId>> {
        let mut storer = self.storer();
        let ids = roots
            .iter()
            .map(|root| storer.store_root(root))
            .collect::<Result<Vec<_>, _>>()?;
        storer.commit(self.target.as_ref())?;
        Ok(ids)
    }

    fn storer(&self) -> GraphStorer<'_> {
        GraphStorer::new(
            &self.identities,
            &self.handlers,
            self.ids.as_ref(),
            &self.persisted,
        )
    }

    // ---- Identities ----

    /// Object id of `instance`, assigning a fresh one if it has none.
    pub fn ensure_id(&self, instance: &Instance) -> SessionResult<ObjectId> {
        Ok(self
            .identities
            .ensure_id(instance, || self.ids.next_object_id())?)
    }

    pub fn lookup_id(&self, instance: &Instance) -> Option<ObjectId> {
        self.identities.lookup_id(instance)
    }

    pub fn lookup_object(&self, object_id: ObjectId) -> Option<Instance> {
        self.identities.lookup_object(object_id)
    }

    // ---- Instances ----

    /// A new instance of the runtime type `type_name` with default values.
    pub fn new_instance(&self, type_name: &str) -> SessionResult<Instance> {
        Ok(self.runtime(type_name)?.instantiate())
    }

    pub fn get(&self, instance: &Instance, field: &str) -> SessionResult<Value> {
        let index = self.field_index(instance, field)?;
        instance.get(index).ok_or_else(|| unknown_field(instance, field))
    }

    pub fn set(&self, instance: &Instance, field: &str, value: Value) -> SessionResult<()> {
        let index = self.field_index(instance, field)?;
        instance.set(index, value)?;
        Ok(())
    }

    /// Point the reference `field` at `target`, assigning it an id if
    /// needed. `None` clears the reference.
    pub fn set_reference(
        &self,
        instance: &Instance,
        field: &str,
        target: Option<&Instance>,
    ) -> SessionResult<()> {
        let object_id = match target {
            Some(target) => self.ensure_id(target)?,
            None => ObjectId::NULL,
        };
        self.set(instance, field, Value::Reference(object_id))
    }

    /// Follow the reference `field`, loading the target if it is not
    /// materialized yet.
    pub fn resolve(&self, instance: &Instance, field: &str) -> SessionResult<Option<Instance>> {
        let object_id = match self.get(instance, field)? {
            Value::Reference(object_id) if !object_id.is_null() => object_id,
            Value::Reference(_) => return Ok(None),
            other => {
                return Err(SessionError::Type(TypeError::KindMismatch {
                    expected: ValueKind::Reference,
                    actual: other.kind(),
                }))
            }
        };
        if let Some(target) = self.identities.lookup_object(object_id) {
            return Ok(Some(target));
        }
        let loaded = self.load(&[object_id])?;
        loaded
            .into_iter()
            .next()
            .map(Some)
            .ok_or(SessionError::UnknownObject(object_id))
    }

    fn runtime(&self, type_name: &str) -> SessionResult<Arc<RuntimeType>> {
        self.handlers
            .catalog()
            .get(type_name)
            .ok_or_else(|| HandlerError::UnknownRuntimeType(type_name.to_string()).into())
    }

    fn field_index(&self, instance: &Instance, field: &str) -> SessionResult<usize> {
        self.runtime(instance.type_name())?
            .field_index(field)
            .ok_or_else(|| unknown_field(instance, field))
    }

    // ---- Types ----

    /// Handler for the runtime type `type_name`, creating it on first use.
    pub fn ensure_type_handler(&self, type_name: &str) -> SessionResult<Arc<dyn TypeHandler>> {
        Ok(self.handlers.ensure_handler_for_type_name(type_name)?)
    }

    pub fn lookup_type_handler(&self, type_id: TypeId) -> Option<Arc<dyn TypeHandler>> {
        self.handlers.lookup_type_handler(type_id)
    }

    pub fn lookup_type_handler_by_name(&self, type_name: &str) -> Option<Arc<dyn TypeHandler>> {
        self.handlers.lookup_type_handler_by_name(type_name)
    }

    /// Install unreachable handlers for dictionary types no root reaches.
    pub fn classify_unreachable(&self, root_types: &[String]) -> Vec<TypeId> {
        self.handlers.classify_unreachable(root_types)
    }

    /// JSON snapshot of the type dictionary, including lineages this
    /// session appended to.
    pub fn export_dictionary(&self) -> SessionResult<String> {
        Ok(self.handlers.dictionary().to_json()?)
    }
}

impl Drop for PersistenceSession {
    fn drop(&mut self) {
        info!(
            session_id = %self.id,
            objects = self.identities.len(),
            handlers = self.handlers.len(),
            "session closed"
        );
    }
}

impl std::fmt::Debug for PersistenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSession")
            .field("id", &self.id)
            .field("objects", &self.identities.len())
            .field("handlers", &self.handlers.len())
            .field("persisted", &self.persisted.len())
            .finish()
    }
}

fn unknown_field(instance: &Instance, field: &str) -> SessionError {
    SessionError::UnknownField {
        type_name: instance.type_name().to_string(),
        field: field.to_string(),
    }
}
