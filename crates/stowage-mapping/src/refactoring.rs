//! User supplied rename/removal table for types and members.
//!
//! Identifiers are looked up most specific first:
//!
//! | Kind   | Identifiers tried, in order                               |
//! |--------|-----------------------------------------------------------|
//! | member | `1000:Point#x`, `Point#x`, `#x`                           |
//! | type   | `1000:Point`, `Point`                                     |
//!
//! An empty target marks the source as removed. A TOML document looks
//! like:
//!
//! ```toml
//! new_members = ["Point#label"]
//!
//! [mappings]
//! "Point#name" = "Point#label"
//! "Point#tmp" = ""
//! "OldName" = "NewName"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use stowage_types::TypeId;

use crate::error::{MappingError, MappingResult};

/// Where a refactoring entry sends a stored member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberTarget {
    /// The member was explicitly removed.
    Removed,
    /// The member now lives under this current member name.
    Member(String),
}

/// Refactoring outcome for a stored type name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRename {
    Unchanged,
    Renamed(String),
    Removed,
}

/// Static old identifier to new identifier table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactoringMapping {
    mappings: BTreeMap<String, String>,
    new_members: BTreeSet<String>,
}

impl RefactoringMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(old, new)` identifier pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            mappings: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            new_members: BTreeSet::new(),
        }
    }

    /// Mark a current member identifier as explicitly new.
    pub fn with_new_member(mut self, identifier: impl Into<String>) -> Self {
        self.new_members.insert(identifier.into());
        self
    }

    /// Add or replace one entry.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.mappings.insert(old.into(), new.into());
    }

    /// Merge `other` into `self`; entries of `other` win.
    pub fn extend(&mut self, other: RefactoringMapping) {
        self.mappings.extend(other.mappings);
        self.new_members.extend(other.new_members);
    }

    pub fn from_toml_str(s: &str) -> MappingResult<Self> {
        toml::from_str(s).map_err(|e| MappingError::InvalidRefactoring(e.to_string()))
    }

    /// Read a TOML mapping file.
    pub fn load(path: &Path) -> MappingResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MappingError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn len(&self) -> usize {
        self.mappings.len() + self.new_members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty() && self.new_members.is_empty()
    }

    /// Member identifiers for `type_name#member`, most specific first.
    pub fn member_identifiers(type_id: TypeId, type_name: &str, member: &str) -> [String; 3] {
        [
            format!("{type_id}:{type_name}#{member}"),
            format!("{type_name}#{member}"),
            format!("#{member}"),
        ]
    }

    /// Type identifiers for `type_name`, most specific first.
    pub fn type_identifiers(type_id: TypeId, type_name: &str) -> [String; 2] {
        [format!("{type_id}:{type_name}"), type_name.to_string()]
    }

    /// Target of the stored member `type_name#member`, if any entry names it.
    pub fn resolve_member(&self, type_id: TypeId, type_name: &str, member: &str) -> Option<MemberTarget> {
        let target = Self::member_identifiers(type_id, type_name, member)
            .iter()
            .find_map(|id| self.mappings.get(id))?;
        if target.is_empty() {
            return Some(MemberTarget::Removed);
        }
        let name = target.rsplit_once('#').map_or(target.as_str(), |(_, m)| m);
        Some(MemberTarget::Member(name.to_string()))
    }

    /// Returns `true` if the current member was declared new.
    pub fn is_new_member(&self, type_id: TypeId, type_name: &str, member: &str) -> bool {
        Self::member_identifiers(type_id, type_name, member)
            .iter()
            .any(|id| self.new_members.contains(id))
    }

    /// Rename or removal of a stored type.
    pub fn resolve_type_name(&self, type_id: TypeId, type_name: &str) -> TypeRename {
        let target = Self::type_identifiers(type_id, type_name)
            .iter()
            .find_map(|id| self.mappings.get(id))
            .cloned();
        match target {
            None => TypeRename::Unchanged,
            Some(t) if t.is_empty() => TypeRename::Removed,
            Some(t) => TypeRename::Renamed(strip_type_id(&t).to_string()),
        }
    }

    /// Stored type names that type-level entries rename to `current_name`.
    pub fn previous_type_names(&self, current_name: &str) -> Vec<String> {
        self.mappings
            .iter()
            .filter(|(old, new)| !old.contains('#') && strip_type_id(new) == current_name)
            .map(|(old, _)| strip_type_id(old).to_string())
            .collect()
    }
}

/// `"1000:Point"` becomes `"Point"`.
fn strip_type_id(identifier: &str) -> &str {
    match identifier.split_once(':') {
        Some((id, name)) if id.chars().all(|c| c.is_ascii_digit()) => name,
        _ => identifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: TypeId = TypeId::new(1000);

    #[test]
    fn most_specific_identifier_wins() {
        let mapping = RefactoringMapping::from_entries([
            ("#name", "title"),
            ("Point#name", "Point#label"),
            ("1000:Point#name", "1000:Point#caption"),
        ]);
        assert_eq!(
            mapping.resolve_member(TID, "Point", "name"),
            Some(MemberTarget::Member("caption".into()))
        );
        assert_eq!(
            mapping.resolve_member(TypeId::new(7), "Point", "name"),
            Some(MemberTarget::Member("label".into()))
        );
        assert_eq!(
            mapping.resolve_member(TypeId::new(7), "Line", "name"),
            Some(MemberTarget::Member("title".into()))
        );
        assert_eq!(mapping.resolve_member(TID, "Point", "x"), None);
    }

    #[test]
    fn empty_target_removes() {
        let mapping = RefactoringMapping::from_entries([("Point#tmp", ""), ("Legacy", "")]);
        assert_eq!(mapping.resolve_member(TID, "Point", "tmp"), Some(MemberTarget::Removed));
        assert_eq!(mapping.resolve_type_name(TID, "Legacy"), TypeRename::Removed);
    }

    #[test]
    fn type_renames() {
        let mapping = RefactoringMapping::from_entries([("1000:Vertex", "Point")]);
        assert_eq!(
            mapping.resolve_type_name(TID, "Vertex"),
            TypeRename::Renamed("Point".into())
        );
        assert_eq!(mapping.resolve_type_name(TypeId::new(1), "Vertex"), TypeRename::Unchanged);
        assert_eq!(mapping.previous_type_names("Point"), vec!["Vertex".to_string()]);
    }

    #[test]
    fn new_members_are_flagged() {
        let mapping = RefactoringMapping::new().with_new_member("Point#label");
        assert!(mapping.is_new_member(TID, "Point", "label"));
        assert!(!mapping.is_new_member(TID, "Point", "x"));
    }

    #[test]
    fn parse_toml() {
        let mapping = RefactoringMapping::from_toml_str(
            r#"
new_members = ["Point#label"]

[mappings]
"Point#name" = "Point#label"
"Point#tmp" = ""
"#,
        )
        .unwrap();
        assert_eq!(mapping.len(), 3);
        assert!(mapping.is_new_member(TID, "Point", "label"));
        assert_eq!(mapping.resolve_member(TID, "Point", "tmp"), Some(MemberTarget::Removed));

        let err = RefactoringMapping::from_toml_str("mappings = 3").unwrap_err();
        assert!(matches!(err, MappingError::InvalidRefactoring(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refactorings.toml");
        std::fs::write(&path, "[mappings]\n\"Point#x\" = \"Point#left\"\n").unwrap();
        let mapping = RefactoringMapping::load(&path).unwrap();
        assert_eq!(
            mapping.resolve_member(TID, "Point", "x"),
            Some(MemberTarget::Member("left".into()))
        );
        assert!(matches!(
            RefactoringMapping::load(&dir.path().join("missing.toml")),
            Err(MappingError::Io(_))
        ));
    }
}
