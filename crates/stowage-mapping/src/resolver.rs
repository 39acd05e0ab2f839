//! Three-tier member correspondence resolution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stowage_dictionary::TypeDefinition;

use crate::assignment::{assign, WeightMatrix};
use crate::correspondence::{MemberBinding, MemberCorrespondence, Resolution};
use crate::error::{MappingError, MappingResult};
use crate::matcher::{DefaultMemberMatcher, MemberMatcher};
use crate::refactoring::{MemberTarget, RefactoringMapping};

/// Similarity scores are compared in thousandths.
const SCORE_QUANTUM: f64 = 1000.0;

/// Resolver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Refuse similarity results that have an equally good alternative.
    pub strict: bool,
    /// Minimum similarity score for a pairing.
    pub similarity_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strict: false,
            similarity_threshold: 0.5,
        }
    }
}

/// Computes [`MemberCorrespondence`]s between stored and current shapes.
#[derive(Clone)]
pub struct MemberCorrespondenceResolver {
    mapping: Arc<RefactoringMapping>,
    matcher: Arc<dyn MemberMatcher>,
    config: ResolverConfig,
}

/// Working state of one resolution.
struct Pass<'a> {
    obsolete: &'a TypeDefinition,
    current: &'a TypeDefinition,
    targets: Vec<Option<(usize, Resolution)>>,
    removed: Vec<bool>,
    taken: Vec<bool>,
}

impl Pass<'_> {
    fn open_rows(&self) -> Vec<usize> {
        (0..self.targets.len())
            .filter(|&i| self.targets[i].is_none() && !self.removed[i])
            .collect()
    }

    fn open_cols(&self) -> Vec<usize> {
        (0..self.taken.len()).filter(|&j| !self.taken[j]).collect()
    }

    fn bind(&mut self, obsolete: usize, current: usize, resolution: Resolution) {
        self.targets[obsolete] = Some((current, resolution));
        self.taken[current] = true;
    }
}

impl MemberCorrespondenceResolver {
    pub fn new(mapping: Arc<RefactoringMapping>, config: ResolverConfig) -> Self {
        Self {
            mapping,
            matcher: Arc::new(DefaultMemberMatcher),
            config,
        }
    }

    /// Replace the member matching policy.
    pub fn with_matcher(mut self, matcher: Arc<dyn MemberMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn mapping(&self) -> &RefactoringMapping {
        &self.mapping
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Map every member of `obsolete` to at most one member of `current`.
    pub fn resolve(
        &self,
        obsolete: &TypeDefinition,
        current: &TypeDefinition,
    ) -> MappingResult<MemberCorrespondence> {
        let mut pass = Pass {
            obsolete,
            current,
            targets: vec![None; obsolete.member_count()],
            removed: vec![false; obsolete.member_count()],
            taken: vec![false; current.member_count()],
        };

        self.mark_explicit(&mut pass);
        self.match_exact(&mut pass);
        self.match_refactored(&mut pass);
        self.match_similar(&mut pass)?;

        let bindings = obsolete
            .members()
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let (target, resolution) = match pass.targets[i].take() {
                    Some((j, resolution)) => (Some(j), resolution),
                    None => (None, Resolution::Deleted),
                };
                MemberBinding {
                    obsolete_index: i,
                    obsolete_name: member.name().to_string(),
                    target,
                    resolution,
                }
            })
            .collect();
        let current_names = current
            .members()
            .iter()
            .map(|m| m.name().to_string())
            .collect();

        Ok(MemberCorrespondence::new(
            current.type_id(),
            current.type_name(),
            bindings,
            current_names,
        ))
    }

    /// Explicit removals and explicitly new members take no part in matching.
    fn mark_explicit(&self, pass: &mut Pass<'_>) {
        let obsolete = pass.obsolete;
        for (i, member) in obsolete.members().iter().enumerate() {
            if let Some(MemberTarget::Removed) =
                self.mapping
                    .resolve_member(obsolete.type_id(), obsolete.type_name(), member.name())
            {
                pass.removed[i] = true;
            }
        }
        let current = pass.current;
        for (j, member) in current.members().iter().enumerate() {
            if self
                .mapping
                .is_new_member(current.type_id(), current.type_name(), member.name())
            {
                pass.taken[j] = true;
            }
        }
    }

    fn match_exact(&self, pass: &mut Pass<'_>) {
        for i in pass.open_rows() {
            let member = &pass.obsolete.members()[i];
            let found = pass
                .open_cols()
                .into_iter()
                .find(|&j| self.matcher.equal(member, &pass.current.members()[j]));
            if let Some(j) = found {
                pass.bind(i, j, Resolution::Exact);
            }
        }
    }

    fn match_refactored(&self, pass: &mut Pass<'_>) {
        let obsolete = pass.obsolete;
        let current = pass.current;
        for i in pass.open_rows() {
            let member = &obsolete.members()[i];
            let Some(MemberTarget::Member(target)) =
                self.mapping
                    .resolve_member(obsolete.type_id(), obsolete.type_name(), member.name())
            else {
                continue;
            };
            match current.member_index(&target) {
                Some(j) if !pass.taken[j] => pass.bind(i, j, Resolution::Refactored),
                Some(_) => warn!(
                    type_name = %current.type_name(),
                    member = %member.name(),
                    target = %target,
                    "refactoring target already bound, entry ignored"
                ),
                None => warn!(
                    type_name = %current.type_name(),
                    member = %member.name(),
                    target = %target,
                    "refactoring target is not a current member, entry ignored"
                ),
            }
        }
    }

    fn match_similar(&self, pass: &mut Pass<'_>) -> MappingResult<()> {
        let rows = pass.open_rows();
        let cols = pass.open_cols();
        if rows.is_empty() || cols.is_empty() {
            return Ok(());
        }

        let mut matrix = WeightMatrix::new(rows.len(), cols.len());
        for (r, &i) in rows.iter().enumerate() {
            let old = &pass.obsolete.members()[i];
            for (c, &j) in cols.iter().enumerate() {
                let new = &pass.current.members()[j];
                if !self.matcher.is_valid_pairing(old, new) {
                    continue;
                }
                let score = self.matcher.similarity(old, new);
                if score < self.config.similarity_threshold {
                    continue;
                }
                let weight = (score * SCORE_QUANTUM).round() as i64;
                if weight > 0 {
                    matrix.set(r, c, weight);
                }
            }
        }

        let result = assign(&matrix, self.config.strict);
        if let Some(tie) = result.ties.first() {
            let name_of = |c: Option<usize>| match c {
                Some(c) => pass.current.members()[cols[c]].name().to_string(),
                None => "<none>".to_string(),
            };
            let mut candidates = vec![name_of(tie.chosen)];
            candidates.extend(tie.alternatives.iter().map(|&c| name_of(c)));
            return Err(MappingError::AmbiguousMemberMapping {
                type_id: pass.current.type_id(),
                type_name: pass.current.type_name().to_string(),
                member: pass.obsolete.members()[rows[tie.row]].name().to_string(),
                candidates,
            });
        }

        for (r, assigned) in result.pairs.iter().enumerate() {
            let Some(c) = *assigned else { continue };
            let (i, j) = (rows[r], cols[c]);
            let score = matrix.get(r, c).unwrap_or(0) as f64 / SCORE_QUANTUM;
            debug!(
                type_name = %pass.current.type_name(),
                from = %pass.obsolete.members()[i].name(),
                to = %pass.current.members()[j].name(),
                score,
                "similarity binding"
            );
            pass.bind(i, j, Resolution::Similar { score });
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemberCorrespondenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberCorrespondenceResolver")
            .field("mapping_entries", &self.mapping.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stowage_dictionary::Member;
    use stowage_types::{TypeId, ValueKind};

    fn def(members: Vec<Member>) -> TypeDefinition {
        TypeDefinition::new("Point", TypeId::new(100), members).unwrap()
    }

    fn resolver() -> MemberCorrespondenceResolver {
        MemberCorrespondenceResolver::new(Arc::default(), ResolverConfig::default())
    }

    fn strict(mapping: RefactoringMapping) -> MemberCorrespondenceResolver {
        MemberCorrespondenceResolver::new(
            Arc::new(mapping),
            ResolverConfig {
                strict: true,
                ..ResolverConfig::default()
            },
        )
    }

    // ----------------------------------------------------------------
    // Exact tier
    // ----------------------------------------------------------------

    #[test]
    fn added_member_is_new_without_ambiguity() {
        let v1 = def(vec![
            Member::value("x", ValueKind::I32),
            Member::value("y", ValueKind::I32),
        ]);
        let v2 = def(vec![
            Member::value("x", ValueKind::I32),
            Member::value("y", ValueKind::I32),
            Member::value("label", ValueKind::Text),
        ]);
        let c = strict(RefactoringMapping::new()).resolve(&v1, &v2).unwrap();
        assert_eq!(c.target_of(0), Some(0));
        assert_eq!(c.target_of(1), Some(1));
        assert_eq!(c.new_members().collect::<Vec<_>>(), vec![2]);
        assert_eq!(c.binding(0).unwrap().resolution, Resolution::Exact);
    }

    #[test]
    fn exact_match_takes_precedence_over_similarity() {
        // "count" would score well against "counter", but the exact pair wins.
        let old = def(vec![
            Member::value("counter", ValueKind::I64),
            Member::value("count", ValueKind::I64),
        ]);
        let new = def(vec![Member::value("count", ValueKind::I64)]);
        let c = resolver().resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(1), Some(0));
        assert_eq!(c.target_of(0), None);
        assert_eq!(c.binding(0).unwrap().resolution, Resolution::Deleted);
    }

    #[test]
    fn reordered_members_map_by_name() {
        let old = def(vec![
            Member::value("a", ValueKind::I32),
            Member::value("b", ValueKind::Text),
        ]);
        let new = def(vec![
            Member::value("b", ValueKind::Text),
            Member::value("a", ValueKind::I32),
        ]);
        let c = resolver().resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), Some(1));
        assert_eq!(c.target_of(1), Some(0));
        assert!(!c.is_identity());
    }

    // ----------------------------------------------------------------
    // Refactoring tier
    // ----------------------------------------------------------------

    #[test]
    fn refactoring_entry_binds_renamed_member() {
        let old = def(vec![Member::value("name", ValueKind::Text)]);
        let new = def(vec![Member::value("title", ValueKind::Text)]);
        let mapping = RefactoringMapping::from_entries([("Point#name", "Point#title")]);
        let c = strict(mapping).resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), Some(0));
        assert_eq!(c.binding(0).unwrap().resolution, Resolution::Refactored);
    }

    #[test]
    fn refactoring_to_missing_member_is_ignored() {
        let old = def(vec![Member::value("name", ValueKind::Text)]);
        let new = def(vec![Member::value("zzz", ValueKind::I32)]);
        let mapping = RefactoringMapping::from_entries([("Point#name", "Point#nope")]);
        let c = strict(mapping).resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), None);
    }

    #[test]
    fn explicit_removal_and_new_member() {
        let old = def(vec![
            Member::value("x", ValueKind::I32),
            Member::value("legacy", ValueKind::Text),
        ]);
        let new = def(vec![
            Member::value("x", ValueKind::I32),
            Member::value("legacyNote", ValueKind::Text),
        ]);
        let mapping =
            RefactoringMapping::from_entries([("Point#legacy", "")]).with_new_member("Point#legacyNote");
        let c = strict(mapping).resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(1), None);
        assert_eq!(c.source_of(1), None);

        // Without the entries similarity would bind them.
        let c = resolver().resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(1), Some(1));
    }

    // ----------------------------------------------------------------
    // Similarity tier
    // ----------------------------------------------------------------

    #[test]
    fn similarity_binds_widened_rename() {
        let old = def(vec![Member::value("firstName", ValueKind::Text)]);
        let new = def(vec![Member::value("first_name", ValueKind::Text)]);
        let c = resolver().resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), Some(0));
        assert!(matches!(c.binding(0).unwrap().resolution, Resolution::Similar { score } if score > 0.9));
    }

    #[test]
    fn validator_blocks_unsafe_pairs() {
        let old = def(vec![
            Member::value("amount", ValueKind::I64),
            Member::reference("owner", "Person"),
        ]);
        let new = def(vec![
            Member::value("amount2", ValueKind::I32),
            Member::value("owner2", ValueKind::Text),
        ]);
        let c = resolver().resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), None);
        assert_eq!(c.target_of(1), None);
    }

    #[test]
    fn below_threshold_is_deleted() {
        let old = def(vec![Member::value("x", ValueKind::I32)]);
        let new = def(vec![Member::value("label", ValueKind::Text)]);
        let c = resolver().resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), None);
        assert_eq!(c.new_members().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn strict_mode_rejects_ties() {
        let old = def(vec![Member::value("value", ValueKind::I32)]);
        let new = def(vec![
            Member::value("value1", ValueKind::I32),
            Member::value("value2", ValueKind::I32),
        ]);
        let lenient = resolver().resolve(&old, &new).unwrap();
        assert_eq!(lenient.target_of(0), Some(0));

        let err = strict(RefactoringMapping::new()).resolve(&old, &new).unwrap_err();
        match err {
            MappingError::AmbiguousMemberMapping { member, candidates, .. } => {
                assert_eq!(member, "value");
                assert_eq!(candidates, vec!["value1".to_string(), "value2".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }

        // An explicit entry resolves the ambiguity.
        let mapping = RefactoringMapping::from_entries([("Point#value", "Point#value2")]);
        let c = strict(mapping).resolve(&old, &new).unwrap();
        assert_eq!(c.target_of(0), Some(1));
    }

    // ----------------------------------------------------------------
    // Properties
    // ----------------------------------------------------------------

    fn arb_member() -> impl Strategy<Value = Member> {
        let names = prop::sample::select(vec!["a", "ab", "abc", "b", "count", "counter", "name", "title"]);
        let kinds = prop::sample::select(vec![
            ValueKind::I32,
            ValueKind::I64,
            ValueKind::F64,
            ValueKind::Text,
            ValueKind::Reference,
        ]);
        (names, kinds).prop_map(|(n, k)| Member::value(n, k))
    }

    fn arb_definition() -> impl Strategy<Value = TypeDefinition> {
        prop::collection::vec(arb_member(), 0..6).prop_map(|members| {
            let mut seen = std::collections::HashSet::new();
            let unique = members
                .into_iter()
                .filter(|m| seen.insert(m.name().to_string()))
                .collect();
            def(unique)
        })
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic_and_injective(old in arb_definition(), new in arb_definition()) {
            let r = resolver();
            let first = r.resolve(&old, &new).unwrap();
            let second = r.resolve(&old, &new).unwrap();
            prop_assert_eq!(&first, &second);

            let mut used = std::collections::HashSet::new();
            for binding in first.bindings() {
                if let Some(t) = binding.target {
                    prop_assert!(used.insert(t));
                }
            }
        }

        #[test]
        fn identical_shapes_map_identically(shape in arb_definition()) {
            let c = strict(RefactoringMapping::new()).resolve(&shape, &shape).unwrap();
            prop_assert_eq!(c.bindings().len(), shape.member_count());
            prop_assert!(c.is_identity());
        }
    }
}
