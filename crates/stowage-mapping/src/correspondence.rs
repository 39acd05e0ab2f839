//! Result of member resolution.

use std::fmt;

use stowage_types::TypeId;

/// How a stored member was bound.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Exact,
    Refactored,
    Similar { score: f64 },
    Deleted,
}

/// Binding of one stored member.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberBinding {
    pub obsolete_index: usize,
    pub obsolete_name: String,
    /// Current member index, `None` when deleted.
    pub target: Option<usize>,
    pub resolution: Resolution,
}

/// Mapping from every stored member to at most one current member.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberCorrespondence {
    type_id: TypeId,
    type_name: String,
    bindings: Vec<MemberBinding>,
    current_names: Vec<String>,
    sources: Vec<Option<usize>>,
}

impl MemberCorrespondence {
    /// Assemble a correspondence; `bindings` must be in stored member order.
    pub(crate) fn new(
        type_id: TypeId,
        type_name: impl Into<String>,
        bindings: Vec<MemberBinding>,
        current_names: Vec<String>,
    ) -> Self {
        let mut sources = vec![None; current_names.len()];
        for binding in &bindings {
            if let Some(target) = binding.target {
                sources[target] = Some(binding.obsolete_index);
            }
        }
        Self {
            type_id,
            type_name: type_name.into(),
            bindings,
            current_names,
            sources,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn bindings(&self) -> &[MemberBinding] {
        &self.bindings
    }

    pub fn binding(&self, obsolete_index: usize) -> Option<&MemberBinding> {
        self.bindings.get(obsolete_index)
    }

    /// Current member fed by stored member `obsolete_index`.
    pub fn target_of(&self, obsolete_index: usize) -> Option<usize> {
        self.bindings.get(obsolete_index).and_then(|b| b.target)
    }

    /// Stored member feeding current member `current_index`.
    pub fn source_of(&self, current_index: usize) -> Option<usize> {
        self.sources.get(current_index).copied().flatten()
    }

    /// Current members without a stored counterpart.
    pub fn new_members(&self) -> impl Iterator<Item = usize> + '_ {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
    }

    /// Stored members that feed nothing.
    pub fn deleted_members(&self) -> impl Iterator<Item = &MemberBinding> + '_ {
        self.bindings.iter().filter(|b| b.target.is_none())
    }

    pub fn current_len(&self) -> usize {
        self.current_names.len()
    }

    /// Returns `true` if every member maps to the same position by exact match.
    pub fn is_identity(&self) -> bool {
        self.bindings.len() == self.current_names.len()
            && self.bindings.iter().all(|b| {
                b.resolution == Resolution::Exact && b.target == Some(b.obsolete_index)
            })
    }
}

impl fmt::Display for MemberCorrespondence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.type_name, self.type_id)?;
        let width = self
            .bindings
            .iter()
            .map(|b| b.obsolete_name.len())
            .max()
            .unwrap_or(0);
        for binding in &self.bindings {
            let target = binding
                .target
                .and_then(|t| self.current_names.get(t))
                .map(String::as_str)
                .unwrap_or("");
            let arrow = match &binding.resolution {
                Resolution::Exact | Resolution::Refactored => "-mapped->".to_string(),
                Resolution::Similar { score } => format!("-{score:.3}->"),
                Resolution::Deleted => " REMOVED ".to_string(),
            };
            writeln!(f, "  {:<width$} {:<9} {}", binding.obsolete_name, arrow, target)?;
        }
        for index in self.new_members() {
            writeln!(f, "  {:<width$} {:<9} {}", "", " NEW    >", self.current_names[index])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemberCorrespondence {
        MemberCorrespondence::new(
            TypeId::new(1000),
            "Point",
            vec![
                MemberBinding {
                    obsolete_index: 0,
                    obsolete_name: "x".into(),
                    target: Some(0),
                    resolution: Resolution::Exact,
                },
                MemberBinding {
                    obsolete_index: 1,
                    obsolete_name: "yy".into(),
                    target: Some(1),
                    resolution: Resolution::Similar { score: 0.75 },
                },
                MemberBinding {
                    obsolete_index: 2,
                    obsolete_name: "tmp".into(),
                    target: None,
                    resolution: Resolution::Deleted,
                },
            ],
            vec!["x".into(), "y".into(), "label".into()],
        )
    }

    #[test]
    fn lookups() {
        let c = sample();
        assert_eq!(c.target_of(1), Some(1));
        assert_eq!(c.target_of(2), None);
        assert_eq!(c.source_of(0), Some(0));
        assert_eq!(c.source_of(2), None);
        assert_eq!(c.new_members().collect::<Vec<_>>(), vec![2]);
        assert_eq!(c.deleted_members().count(), 1);
        assert!(!c.is_identity());
    }

    #[test]
    fn report() {
        let report = sample().to_string();
        assert!(report.starts_with("Point (1000)\n"));
        assert!(report.contains("x   -mapped-> x"));
        assert!(report.contains("yy  -0.750->  y"));
        assert!(report.contains("tmp  REMOVED "));
        assert!(report.contains(" NEW    > label"));
    }
}
