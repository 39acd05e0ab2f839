//! Resolve, create and cache one handler per type id.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use stowage_dictionary::{DictionaryError, TypeDefinition, TypeDictionary};
use stowage_mapping::{MemberCorrespondenceResolver, RefactoringMapping, ResolverConfig, TypeRename};
use stowage_registry::IdProvider;
use stowage_types::{TypeId, ValueKind};

use crate::error::{HandlerError, HandlerResult};
use crate::evaluator::{FieldEvaluator, FieldFilter, TypeEvaluator, TypeFilter};
use crate::handler::{HandlerKind, TypeHandler};
use crate::legacy::LegacyTypeHandler;
use crate::reflective::ReflectiveTypeHandler;
use crate::runtime::{RuntimeType, RuntimeTypeCatalog};
use crate::special::{DeletedTypeHandler, UnreachableTypeHandler};

/// Session-scoped cache of type handlers.
///
/// Handlers are created under the cache entry of their type id, so two
/// concurrent callers for the same id observe one handler. Lock order is
/// handler entry before name entry, never the reverse.
pub struct TypeHandlerRegistry {
    dictionary: Arc<TypeDictionary>,
    catalog: Arc<RuntimeTypeCatalog>,
    resolver: MemberCorrespondenceResolver,
    ids: Arc<dyn IdProvider>,
    types: Arc<dyn TypeEvaluator>,
    fields: Arc<dyn FieldEvaluator>,
    handlers: DashMap<TypeId, Arc<dyn TypeHandler>>,
    by_name: DashMap<String, TypeId>,
    persistable: DashMap<String, bool>,
}

impl TypeHandlerRegistry {
    /// A registry with no refactorings and permissive evaluators.
    pub fn new(
        dictionary: Arc<TypeDictionary>,
        catalog: Arc<RuntimeTypeCatalog>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            dictionary,
            catalog,
            resolver: MemberCorrespondenceResolver::new(
                Arc::new(RefactoringMapping::new()),
                ResolverConfig::default(),
            ),
            ids,
            types: Arc::new(TypeFilter::default()),
            fields: Arc::new(FieldFilter::default()),
            handlers: DashMap::new(),
            by_name: DashMap::new(),
            persistable: DashMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: MemberCorrespondenceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_type_evaluator(mut self, types: Arc<dyn TypeEvaluator>) -> Self {
        self.types = types;
        self
    }

    pub fn with_field_evaluator(mut self, fields: Arc<dyn FieldEvaluator>) -> Self {
        self.fields = fields;
        self
    }

    pub fn dictionary(&self) -> &Arc<TypeDictionary> {
        &self.dictionary
    }

    pub fn catalog(&self) -> &Arc<RuntimeTypeCatalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &MemberCorrespondenceResolver {
        &self.resolver
    }

    /// Cached handler for `runtime` under `type_id`, creating it if absent.
    ///
    /// A runtime shape equal to the only stored shape yields a reflective
    /// handler; older differing shapes yield a legacy handler. The current
    /// shape is appended to the type's lineage once the handler is built.
    /// An unreachable handler cached for the id is replaced, since the type
    /// is live after all. A type id already bound to another type name is a
    /// [`DictionaryError::TypeInconsistency`].
    pub fn ensure_type_handler(
        &self,
        runtime: &Arc<RuntimeType>,
        type_id: TypeId,
    ) -> HandlerResult<Arc<dyn TypeHandler>> {
        self.check_persistable(runtime)?;

        let cached = self.handlers.get(&type_id).map(|h| Arc::clone(h.value()));
        let handler = match cached {
            Some(handler) if handler.kind() != HandlerKind::Unreachable => {
                self.check_binding(handler.type_name(), runtime, type_id)?;
                handler
            }
            _ => match self.handlers.entry(type_id) {
                Entry::Occupied(mut entry) => {
                    let existing = Arc::clone(entry.get());
                    self.check_binding(existing.type_name(), runtime, type_id)?;
                    if existing.kind() == HandlerKind::Unreachable {
                        let handler = self.create_handler(runtime, type_id)?;
                        info!(type_name = %runtime.name(), %type_id, "unreachable type is live, handler replaced");
                        entry.insert(Arc::clone(&handler));
                        handler
                    } else {
                        existing
                    }
                }
                Entry::Vacant(entry) => {
                    if let Some(lineage) = self.dictionary.lineage(type_id) {
                        if !lineage.is_known_as(runtime.name()) {
                            self.check_binding(lineage.latest_name(), runtime, type_id)?;
                        }
                    }
                    let handler = self.create_handler(runtime, type_id)?;
                    entry.insert(Arc::clone(&handler));
                    handler
                }
            },
        };
        self.by_name.insert(runtime.name().to_string(), type_id);
        Ok(handler)
    }

    /// Handler for a stored type id; dead types get a deleted handler.
    pub fn ensure_handler_for_type_id(&self, type_id: TypeId) -> HandlerResult<Arc<dyn TypeHandler>> {
        if let Some(handler) = self.lookup_type_handler(type_id) {
            return Ok(handler);
        }
        let lineage = self
            .dictionary
            .lineage(type_id)
            .ok_or(HandlerError::UnknownTypeId(type_id))?;
        let stored_name = lineage.latest_name().to_string();
        let runtime_name = match self.resolver.mapping().resolve_type_name(type_id, &stored_name) {
            TypeRename::Unchanged => Some(stored_name.clone()),
            TypeRename::Renamed(name) => Some(name),
            TypeRename::Removed => None,
        };

        if let Some(runtime) = runtime_name.and_then(|name| self.catalog.get(&name)) {
            return self.ensure_type_handler(&runtime, type_id);
        }

        match self.handlers.entry(type_id) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let handler: Arc<dyn TypeHandler> = Arc::new(
                    DeletedTypeHandler::new(lineage).ok_or(HandlerError::UnknownTypeId(type_id))?,
                );
                info!(type_name = %stored_name, %type_id, "type no longer exists at runtime");
                entry.insert(Arc::clone(&handler));
                Ok(handler)
            }
        }
    }

    /// Handler for a runtime type name, assigning a type id on first use.
    pub fn ensure_handler_for_type_name(&self, type_name: &str) -> HandlerResult<Arc<dyn TypeHandler>> {
        if let Some(handler) = self.lookup_type_handler_by_name(type_name) {
            return Ok(handler);
        }
        let runtime = self
            .catalog
            .get(type_name)
            .ok_or_else(|| HandlerError::UnknownRuntimeType(type_name.to_string()))?;
        self.check_persistable(&runtime)?;

        let type_id = match self.by_name.entry(type_name.to_string()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let type_id = self.resolve_type_id(type_name);
                entry.insert(type_id);
                type_id
            }
        };
        let result = self.ensure_type_handler(&runtime, type_id);
        if result.is_err() && !self.handlers.contains_key(&type_id) {
            self.by_name.remove_if(type_name, |_, bound| *bound == type_id);
        }
        result
    }

    /// Read-only lookup by type id.
    pub fn lookup_type_handler(&self, type_id: TypeId) -> Option<Arc<dyn TypeHandler>> {
        self.handlers.get(&type_id).map(|h| Arc::clone(h.value()))
    }

    /// Read-only lookup by runtime type name.
    pub fn lookup_type_handler_by_name(&self, type_name: &str) -> Option<Arc<dyn TypeHandler>> {
        let type_id = *self.by_name.get(type_name)?;
        self.lookup_type_handler(type_id)
    }

    /// Install an application handler for its type id.
    pub fn register_custom(&self, handler: Arc<dyn TypeHandler>) -> HandlerResult<()> {
        let type_id = handler.type_id();
        match self.handlers.entry(type_id) {
            Entry::Occupied(_) => Err(HandlerError::DuplicateHandler(type_id)),
            Entry::Vacant(entry) => {
                if let Some(definition) = handler.current_definition() {
                    self.dictionary.register_definition(definition.clone())?;
                }
                self.ids.observe_type_id(type_id);
                self.by_name.insert(handler.type_name().to_string(), type_id);
                info!(type_name = %handler.type_name(), %type_id, "custom type handler installed");
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Install unreachable handlers for stored types no root can reach.
    ///
    /// Reachability follows reference members of every stored shape and of
    /// the runtime types. Any untyped reference makes every type reachable.
    /// Returns the classified type ids.
    pub fn classify_unreachable(&self, roots: &[String]) -> Vec<TypeId> {
        let Some(reachable) = self.reachable_names(roots) else {
            debug!("untyped reference reachable, no type classified unreachable");
            return Vec::new();
        };

        let mut classified = Vec::new();
        for type_id in self.dictionary.type_ids() {
            let Some(lineage) = self.dictionary.lineage(type_id) else {
                continue;
            };
            if lineage
                .definitions()
                .iter()
                .any(|d| reachable.contains(d.type_name()))
                || reachable.contains(lineage.type_name())
            {
                continue;
            }
            if let Entry::Vacant(entry) = self.handlers.entry(type_id) {
                if let Some(handler) = UnreachableTypeHandler::new(lineage) {
                    entry.insert(Arc::new(handler));
                    classified.push(type_id);
                }
            }
        }
        info!(count = classified.len(), "unreachable types classified");
        classified
    }

    /// Every cached handler, ordered by type id.
    pub fn handlers(&self) -> Vec<Arc<dyn TypeHandler>> {
        let mut handlers: Vec<_> = self.handlers.iter().map(|h| Arc::clone(h.value())).collect();
        handlers.sort_by_key(|h| h.type_id());
        handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn check_persistable(&self, runtime: &RuntimeType) -> HandlerResult<()> {
        let persistable = *self
            .persistable
            .entry(runtime.name().to_string())
            .or_insert_with(|| self.types.is_persistable(runtime));
        if persistable {
            Ok(())
        } else {
            Err(HandlerError::TypeNotPersistable {
                type_name: runtime.name().to_string(),
            })
        }
    }

    /// Fails unless `bound_name`, the type name `type_id` already stands
    /// for, is the runtime type's name or is renamed to it.
    fn check_binding(&self, bound_name: &str, runtime: &RuntimeType, type_id: TypeId) -> HandlerResult<()> {
        if bound_name == runtime.name() {
            return Ok(());
        }
        if let TypeRename::Renamed(name) = self.resolver.mapping().resolve_type_name(type_id, bound_name) {
            if name == runtime.name() {
                return Ok(());
            }
        }
        Err(DictionaryError::TypeInconsistency {
            type_id,
            type_name: runtime.name().to_string(),
            reason: format!("type id already stands for {bound_name}"),
        }
        .into())
    }

    /// Stored id of `type_name` (directly or through a rename), else a new one.
    fn resolve_type_id(&self, type_name: &str) -> TypeId {
        if let Some(type_id) = self.dictionary.type_id_of(type_name) {
            return type_id;
        }
        let renamed = self
            .resolver
            .mapping()
            .previous_type_names(type_name)
            .into_iter()
            .find_map(|old| self.dictionary.type_id_of(&old));
        match renamed {
            Some(type_id) => type_id,
            None => {
                let type_id = self.ids.next_type_id();
                debug!(type_name, %type_id, "assigned new type id");
                type_id
            }
        }
    }

    fn create_handler(
        &self,
        runtime: &Arc<RuntimeType>,
        type_id: TypeId,
    ) -> HandlerResult<Arc<dyn TypeHandler>> {
        self.ids.observe_type_id(type_id);
        let current = runtime.definition(type_id, self.fields.as_ref())?;

        // Validate the append up front; the dictionary is only touched once
        // the handler is fully built.
        let (layout, older) = match self.dictionary.lineage(type_id) {
            None => (0, Vec::new()),
            Some(mut lineage) => {
                lineage.append(current.clone())?;
                let layout = lineage.position_of(&current).unwrap_or(lineage.len() - 1);
                let older: Vec<(u32, TypeDefinition)> = lineage
                    .definitions()
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| *pos != layout)
                    .map(|(pos, def)| (pos as u32, def.clone()))
                    .collect();
                (layout, older)
            }
        };

        let reflective =
            ReflectiveTypeHandler::new(Arc::clone(runtime), type_id, layout as u32, self.fields.as_ref())?;

        let handler: Arc<dyn TypeHandler> = if older.is_empty() {
            info!(
                type_name = %runtime.name(),
                %type_id,
                fingerprint = %current.short_fingerprint(),
                "reflective type handler created"
            );
            Arc::new(reflective)
        } else {
            let mut layouts = Vec::with_capacity(older.len());
            for (pos, definition) in older {
                let correspondence = self.resolver.resolve(&definition, reflective.definition())?;
                info!(
                    type_name = %runtime.name(),
                    %type_id,
                    layout = pos,
                    "legacy member mapping\n{correspondence}"
                );
                layouts.push((pos, definition, correspondence));
            }
            Arc::new(LegacyTypeHandler::new(reflective, layouts)?)
        };

        self.dictionary.register_definition(current)?;
        Ok(handler)
    }

    /// Stored and runtime type names reachable from `roots`.
    fn reachable_names(&self, roots: &[String]) -> Option<BTreeSet<String>> {
        let mut frontier: Vec<String> = roots.to_vec();
        loop {
            let mut reached = self.dictionary.reachable_type_names(&frontier)?;
            let before = reached.len();

            let mut added = Vec::new();
            for name in &reached {
                if let Some(runtime) = self.catalog.get(name) {
                    for field in runtime.fields().iter().filter(|f| f.is_reference()) {
                        if field.declared_type() == ValueKind::ANY_REFERENCE {
                            return None;
                        }
                        added.push(field.declared_type().to_string());
                    }
                }
                added.extend(self.resolver.mapping().previous_type_names(name));
            }
            reached.extend(added);

            if reached.len() == before {
                return Some(reached);
            }
            frontier = reached.into_iter().collect();
        }
    }
}

impl std::fmt::Debug for TypeHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeHandlerRegistry")
            .field("handlers", &self.handlers.len())
            .field("dictionary", &self.dictionary)
            .field("resolver", &self.resolver)
            .finish()
    }
}
