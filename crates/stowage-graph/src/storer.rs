//! Decomposition of instance graphs into records.

use std::collections::HashSet;

use dashmap::DashSet;
use tracing::{debug, info};

use stowage_handler::TypeHandlerRegistry;
use stowage_registry::{IdProvider, IdentityRegistry};
use stowage_types::{Instance, ObjectId, RawRecord, Value};

use crate::error::{GraphError, GraphResult};
use crate::source::Target;

/// What a [`GraphStorer::commit`] wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub records: usize,
    pub roots: usize,
}

/// Collects the records of one store operation.
///
/// Objects in `persisted` are only written again when reached through an
/// eager member. Records are buffered until [`commit`](Self::commit).
pub struct GraphStorer<'a> {
    identities: &'a IdentityRegistry,
    handlers: &'a TypeHandlerRegistry,
    ids: &'a dyn IdProvider,
    persisted: &'a DashSet<ObjectId>,
    records: Vec<RawRecord>,
    roots: Vec<ObjectId>,
    visited: HashSet<ObjectId>,
}

impl<'a> GraphStorer<'a> {
    pub fn new(
        identities: &'a IdentityRegistry,
        handlers: &'a TypeHandlerRegistry,
        ids: &'a dyn IdProvider,
        persisted: &'a DashSet<ObjectId>,
    ) -> Self {
        Self {
            identities,
            handlers,
            ids,
            persisted,
            records: Vec::new(),
            roots: Vec::new(),
            visited: HashSet::new(),
        }
    }

    /// Store `instance` and every unpersisted object reachable from it.
    ///
    /// The instance itself is always written. Returns its object id.
    pub fn store(&mut self, instance: &Instance) -> GraphResult<ObjectId> {
        let object_id = self
            .identities
            .ensure_id(instance, || self.ids.next_object_id())?;
        if !self.visited.insert(object_id) {
            return Ok(object_id);
        }

        let mut stack = vec![(object_id, instance.clone())];
        while let Some((object_id, instance)) = stack.pop() {
            let handler = self.handlers.ensure_handler_for_type_name(instance.type_name())?;
            let record = handler
                .decompose(object_id, &instance)
                .map_err(|source| GraphError::Record {
                    object_id,
                    type_id: handler.type_id(),
                    source,
                })?;

            for (index, value) in record.values.iter().enumerate() {
                let Value::Reference(target) = value else { continue };
                if target.is_null() || self.visited.contains(target) {
                    continue;
                }
                let persisted = self.persisted.contains(target);
                if persisted && !handler.is_eager(index) {
                    continue;
                }
                match self.identities.lookup_object(*target) {
                    Some(next) => {
                        self.visited.insert(*target);
                        stack.push((*target, next));
                    }
                    None if persisted => {}
                    None => {
                        return Err(GraphError::UnresolvedReference {
                            object_id: *target,
                            referenced_by: Some(object_id),
                        })
                    }
                }
            }
            debug!(%object_id, type_id = %record.type_id, "decomposed");
            self.records.push(record);
        }
        Ok(object_id)
    }

    /// Store `instance` and record it as a root.
    pub fn store_root(&mut self, instance: &Instance) -> GraphResult<ObjectId> {
        let object_id = self.store(instance)?;
        if !self.roots.contains(&object_id) {
            self.roots.push(object_id);
        }
        Ok(object_id)
    }

    /// Records collected so far, in decomposition order.
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Write the collected records and roots, then mark them persisted.
    pub fn commit(self, target: &dyn Target) -> GraphResult<StoreSummary> {
        target.write(&self.records)?;
        if !self.roots.is_empty() {
            target.write_roots(&self.roots)?;
        }
        for record in &self.records {
            self.persisted.insert(record.object_id);
        }
        let summary = StoreSummary {
            records: self.records.len(),
            roots: self.roots.len(),
        };
        info!(records = summary.records, roots = summary.roots, "graph stored");
        Ok(summary)
    }
}
