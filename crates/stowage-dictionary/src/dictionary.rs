//! The type dictionary of a persistence domain.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stowage_types::TypeId;

use crate::definition::TypeDefinition;
use crate::error::{DictionaryError, DictionaryResult};
use crate::lineage::TypeLineage;

/// Serializable contents of a [`TypeDictionary`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionarySnapshot {
    pub lineages: Vec<TypeLineage>,
}

#[derive(Default)]
struct DictionaryState {
    lineages: BTreeMap<TypeId, TypeLineage>,
    names: BTreeMap<String, TypeId>,
}

/// All type lineages known to a persistence domain.
///
/// Many readers, rare writers: lookups take a shared lock, registration an
/// exclusive one. Returned lineages and definitions are clones.
#[derive(Default)]
pub struct TypeDictionary {
    state: RwLock<DictionaryState>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `definition` as the newest version of its type.
    ///
    /// Returns `Ok(true)` if the dictionary changed. Fails when the
    /// definition's name is already bound to another type id, or when the
    /// lineage rejects it.
    pub fn register_definition(&self, definition: TypeDefinition) -> DictionaryResult<bool> {
        definition.validate()?;
        let mut state = self.state.write();

        let type_id = definition.type_id();
        if let Some(&bound) = state.names.get(definition.type_name()) {
            if bound != type_id {
                return Err(DictionaryError::TypeInconsistency {
                    type_id,
                    type_name: definition.type_name().to_string(),
                    reason: format!("type name is already bound to type id {bound}"),
                });
            }
        }

        let name = definition.type_name().to_string();
        let fingerprint = definition.short_fingerprint();
        let changed = match state.lineages.get_mut(&type_id) {
            Some(lineage) => lineage.append(definition)?,
            None => {
                state
                    .lineages
                    .insert(type_id, TypeLineage::from_definition(definition));
                true
            }
        };
        state.names.insert(name.clone(), type_id);

        if changed {
            debug!(type_name = %name, %type_id, %fingerprint, "registered type definition");
        }
        Ok(changed)
    }

    /// Clone of the lineage for `type_id`.
    pub fn lineage(&self, type_id: TypeId) -> Option<TypeLineage> {
        self.state.read().lineages.get(&type_id).cloned()
    }

    /// Clone of the lineage a type name is bound to.
    pub fn lineage_by_name(&self, type_name: &str) -> Option<TypeLineage> {
        let state = self.state.read();
        let type_id = state.names.get(type_name)?;
        state.lineages.get(type_id).cloned()
    }

    /// Latest definition of `type_id`.
    pub fn latest(&self, type_id: TypeId) -> Option<TypeDefinition> {
        self.state
            .read()
            .lineages
            .get(&type_id)
            .and_then(|l| l.latest().cloned())
    }

    /// Lineage position of the version structurally equal to `definition`.
    pub fn position_of(&self, type_id: TypeId, definition: &TypeDefinition) -> Option<usize> {
        self.state
            .read()
            .lineages
            .get(&type_id)
            .and_then(|l| l.position_of(definition))
    }

    pub fn type_id_of(&self, type_name: &str) -> Option<TypeId> {
        self.state.read().names.get(type_name).copied()
    }

    /// Name of the latest definition of `type_id`.
    pub fn type_name_of(&self, type_id: TypeId) -> Option<String> {
        self.state
            .read()
            .lineages
            .get(&type_id)
            .map(|l| l.latest_name().to_string())
    }

    /// Known type ids, ascending.
    pub fn type_ids(&self) -> Vec<TypeId> {
        self.state.read().lineages.keys().copied().collect()
    }

    pub fn max_type_id(&self) -> Option<TypeId> {
        self.state.read().lineages.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.state.read().lineages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().lineages.is_empty()
    }

    /// Every lineage, ordered by type id.
    pub fn snapshot(&self) -> DictionarySnapshot {
        DictionarySnapshot {
            lineages: self.state.read().lineages.values().cloned().collect(),
        }
    }

    /// Rebuild a dictionary, replaying every definition in lineage order so
    /// the usual consistency checks apply.
    pub fn from_snapshot(snapshot: DictionarySnapshot) -> DictionaryResult<Self> {
        let dictionary = Self::new();
        for lineage in snapshot.lineages {
            for definition in lineage.definitions() {
                if definition.type_id() != lineage.type_id() {
                    return Err(DictionaryError::TypeInconsistency {
                        type_id: lineage.type_id(),
                        type_name: definition.type_name().to_string(),
                        reason: format!("definition carries type id {}", definition.type_id()),
                    });
                }
                dictionary.register_definition(definition.clone())?;
            }
            // Keep the name the lineage was created under as an alias.
            let mut state = dictionary.state.write();
            match state.names.get(lineage.type_name()) {
                Some(&bound) if bound != lineage.type_id() => {
                    return Err(DictionaryError::TypeInconsistency {
                        type_id: lineage.type_id(),
                        type_name: lineage.type_name().to_string(),
                        reason: format!("type name is already bound to type id {bound}"),
                    });
                }
                Some(_) => {}
                None if lineage.is_empty() => {
                    state
                        .lineages
                        .insert(lineage.type_id(), lineage.clone());
                    state
                        .names
                        .insert(lineage.type_name().to_string(), lineage.type_id());
                }
                None => {
                    state
                        .names
                        .insert(lineage.type_name().to_string(), lineage.type_id());
                }
            }
        }
        info!(types = dictionary.len(), "type dictionary loaded");
        Ok(dictionary)
    }

    /// Pretty JSON form of [`snapshot`](Self::snapshot).
    pub fn to_json(&self) -> DictionaryResult<String> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| DictionaryError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> DictionaryResult<Self> {
        let snapshot: DictionarySnapshot = serde_json::from_str(json)
            .map_err(|e| DictionaryError::Serialization(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Names of every type reachable from `roots` by following typed
    /// reference members through all versions of each lineage.
    ///
    /// Returns `None` when an untyped reference is reached: any type may
    /// then be reachable.
    pub fn reachable_type_names(&self, roots: &[String]) -> Option<BTreeSet<String>> {
        let state = self.state.read();
        let mut reached: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();

        while let Some(name) = queue.pop_front() {
            if !reached.insert(name.clone()) {
                continue;
            }
            let Some(lineage) = state.names.get(&name).and_then(|id| state.lineages.get(id)) else {
                continue;
            };
            for alias in lineage.definitions().iter().map(TypeDefinition::type_name) {
                if !reached.contains(alias) {
                    queue.push_back(alias.to_string());
                }
            }
            for definition in lineage.definitions() {
                if definition.has_untyped_reference() {
                    return None;
                }
                for target in definition.referenced_type_names() {
                    if !reached.contains(target) {
                        queue.push_back(target.to_string());
                    }
                }
            }
        }
        Some(reached)
    }
}

impl std::fmt::Debug for TypeDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TypeDictionary")
            .field("types", &state.lineages.len())
            .field("names", &state.names.len())
            .finish()
    }
}
