//! One persisted shape of a type.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use stowage_types::{TypeId, Value};

use crate::error::{DictionaryError, DictionaryResult};
use crate::member::Member;

/// An immutable persisted shape: type name, type id and ordered members.
///
/// Two definitions are equal when their name, id and member lists are
/// equal. [`same_structure`](TypeDefinition::same_structure) ignores the
/// name and id and compares only the member list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDefinition {
    type_name: String,
    type_id: TypeId,
    members: Vec<Member>,
}

impl TypeDefinition {
    /// Create a definition, rejecting empty names and duplicate member names.
    pub fn new(
        type_name: impl Into<String>,
        type_id: TypeId,
        members: Vec<Member>,
    ) -> DictionaryResult<Self> {
        let definition = Self {
            type_name: type_name.into(),
            type_id,
            members,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Check the structural rules that a deserialized definition may violate.
    pub fn validate(&self) -> DictionaryResult<()> {
        if self.type_name.is_empty() {
            return Err(DictionaryError::InvalidDefinition {
                type_name: self.type_name.clone(),
                reason: "empty type name".into(),
            });
        }
        if self.type_id.is_null() {
            return Err(DictionaryError::InvalidDefinition {
                type_name: self.type_name.clone(),
                reason: "null type id".into(),
            });
        }
        let mut seen = HashSet::with_capacity(self.members.len());
        for member in &self.members {
            if member.name().is_empty() {
                return Err(DictionaryError::InvalidDefinition {
                    type_name: self.type_name.clone(),
                    reason: "empty member name".into(),
                });
            }
            if !seen.insert(member.name()) {
                return Err(DictionaryError::InvalidDefinition {
                    type_name: self.type_name.clone(),
                    reason: format!("duplicate member {}", member.name()),
                });
            }
        }
        Ok(())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Position of the member called `name`.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name() == name)
    }

    /// `Type#member` for the member at `index`.
    pub fn qualified_member_name(&self, index: usize) -> Option<String> {
        self.member(index)
            .map(|m| format!("{}#{}", self.type_name, m.name()))
    }

    /// Same ordered member list, regardless of type name and id.
    pub fn same_structure(&self, other: &TypeDefinition) -> bool {
        self.members == other.members
    }

    /// Returns `true` if `values` has one value per member and each value's
    /// kind is the member's kind.
    pub fn matches_values(&self, values: &[Value]) -> bool {
        values.len() == self.members.len()
            && self
                .members
                .iter()
                .zip(values)
                .all(|(member, value)| member.kind() == value.kind())
    }

    /// One default value per member.
    pub fn default_values(&self) -> Vec<Value> {
        self.members.iter().map(|m| m.kind().default_value()).collect()
    }

    /// Declared target type names of the typed reference members.
    pub fn referenced_type_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members
            .iter()
            .filter(|m| m.is_reference() && !m.is_untyped_reference())
            .map(|m| m.declared_type())
    }

    /// Returns `true` if any reference member is untyped.
    pub fn has_untyped_reference(&self) -> bool {
        self.members.iter().any(Member::is_untyped_reference)
    }

    /// BLAKE3 digest of the member list.
    ///
    /// Equal fingerprints identify the same structure across type names.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for member in &self.members {
            hasher.update(member.name().as_bytes());
            hasher.update(&[0]);
            hasher.update(member.declared_type().as_bytes());
            hasher.update(&[0, u8::from(member.is_reference())]);
            hasher.update(&member.min_length().to_le_bytes());
            hasher.update(&member.max_length().to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// First 8 hex characters of the fingerprint, for logs.
    pub fn short_fingerprint(&self) -> String {
        hex::encode(&self.fingerprint()[..4])
    }
}

impl fmt::Display for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {{", self.type_name, self.type_id)?;
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let marker = if member.is_reference() { "&" } else { "" };
            write!(f, " {}: {}{}", member.name(), marker, member.declared_type())?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_types::ValueKind;

    fn point(members: Vec<Member>) -> TypeDefinition {
        TypeDefinition::new("Point", TypeId::new(1000), members).unwrap()
    }

    // ----------------------------------------------------------------
    // Construction
    // ----------------------------------------------------------------

    #[test]
    fn rejects_duplicate_members() {
        let err = TypeDefinition::new(
            "Point",
            TypeId::new(1000),
            vec![
                Member::value("x", ValueKind::I32),
                Member::value("x", ValueKind::I64),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DictionaryError::InvalidDefinition { .. }));
    }

    #[test]
    fn rejects_empty_name_and_null_id() {
        assert!(TypeDefinition::new("", TypeId::new(1), vec![]).is_err());
        assert!(TypeDefinition::new("T", TypeId::NULL, vec![]).is_err());
    }

    #[test]
    fn empty_member_list_is_allowed() {
        let marker = TypeDefinition::new("Marker", TypeId::new(7), vec![]).unwrap();
        assert_eq!(marker.member_count(), 0);
        assert!(marker.matches_values(&[]));
    }

    // ----------------------------------------------------------------
    // Structure
    // ----------------------------------------------------------------

    #[test]
    fn same_structure_ignores_name() {
        let a = point(vec![Member::value("x", ValueKind::I32)]);
        let b = TypeDefinition::new("Vertex", TypeId::new(2000), vec![Member::value("x", ValueKind::I32)])
            .unwrap();
        assert!(a.same_structure(&b));
        assert_ne!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn member_order_matters() {
        let a = point(vec![
            Member::value("x", ValueKind::I32),
            Member::value("y", ValueKind::I32),
        ]);
        let b = point(vec![
            Member::value("y", ValueKind::I32),
            Member::value("x", ValueKind::I32),
        ]);
        assert!(!a.same_structure(&b));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.short_fingerprint().len(), 8);
    }

    #[test]
    fn matches_values_checks_kinds() {
        let def = point(vec![
            Member::value("x", ValueKind::I32),
            Member::reference("next", "Point"),
        ]);
        assert!(def.matches_values(&def.default_values()));
        assert!(!def.matches_values(&[Value::I32(1)]));
        assert!(!def.matches_values(&[Value::I64(1), Value::I64(2)]));
        assert_eq!(def.member_index("next"), Some(1));
        assert_eq!(def.qualified_member_name(0).as_deref(), Some("Point#x"));
        assert_eq!(def.referenced_type_names().collect::<Vec<_>>(), vec!["Point"]);
    }

    #[test]
    fn display_lists_members() {
        let def = point(vec![
            Member::value("x", ValueKind::I32),
            Member::reference("next", "Point"),
        ]);
        assert_eq!(def.to_string(), "Point (1000) { x: i32, next: &Point }");
    }
}
