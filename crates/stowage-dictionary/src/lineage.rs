//! Append-only version history of one type.

use serde::{Deserialize, Serialize};

use stowage_types::TypeId;

use crate::definition::TypeDefinition;
use crate::error::{DictionaryError, DictionaryResult};

/// Every definition ever persisted for one type id, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLineage {
    type_name: String,
    type_id: TypeId,
    definitions: Vec<TypeDefinition>,
}

impl TypeLineage {
    /// An empty lineage for `type_name` under `type_id`.
    pub fn new(type_name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            type_name: type_name.into(),
            type_id,
            definitions: Vec::new(),
        }
    }

    /// A lineage holding a single definition.
    pub fn from_definition(definition: TypeDefinition) -> Self {
        Self {
            type_name: definition.type_name().to_string(),
            type_id: definition.type_id(),
            definitions: vec![definition],
        }
    }

    /// Name the lineage was created under.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn definitions(&self) -> &[TypeDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The most recent definition.
    pub fn latest(&self) -> Option<&TypeDefinition> {
        self.definitions.last()
    }

    /// Name of the most recent definition, or the lineage name when empty.
    pub fn latest_name(&self) -> &str {
        self.latest()
            .map(TypeDefinition::type_name)
            .unwrap_or(self.type_name.as_str())
    }

    /// Position of a definition with the same ordered member list.
    pub fn position_of(&self, definition: &TypeDefinition) -> Option<usize> {
        self.definitions
            .iter()
            .position(|d| d.same_structure(definition))
    }

    /// Returns `true` if any definition was persisted under `name`.
    pub fn is_known_as(&self, name: &str) -> bool {
        self.type_name == name || self.definitions.iter().any(|d| d.type_name() == name)
    }

    /// Append `definition` as the newest version.
    ///
    /// Returns `Ok(false)` when it already is the latest version. A
    /// definition equal to an older, superseded version is rejected, as is
    /// one carrying a different type id.
    pub fn append(&mut self, definition: TypeDefinition) -> DictionaryResult<bool> {
        if definition.type_id() != self.type_id {
            return Err(DictionaryError::TypeInconsistency {
                type_id: self.type_id,
                type_name: definition.type_name().to_string(),
                reason: format!(
                    "definition carries type id {} but the lineage is {}",
                    definition.type_id(),
                    self.type_id
                ),
            });
        }
        match self.position_of(&definition) {
            Some(pos) if pos + 1 == self.definitions.len() => Ok(false),
            Some(pos) => Err(DictionaryError::TypeInconsistency {
                type_id: self.type_id,
                type_name: definition.type_name().to_string(),
                reason: format!(
                    "definition repeats version {} of {} after it was superseded",
                    pos,
                    self.definitions.len()
                ),
            }),
            None => {
                self.definitions.push(definition);
                Ok(true)
            }
        }
    }
}
