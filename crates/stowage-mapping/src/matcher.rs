//! Pluggable member equality, similarity and pairing validation.

use similar::TextDiff;

use stowage_dictionary::Member;

/// Policy used by the resolver to compare stored and current members.
pub trait MemberMatcher: Send + Sync {
    /// Exact-match equality.
    fn equal(&self, obsolete: &Member, current: &Member) -> bool {
        obsolete.same_shape(current)
    }

    /// Similarity in `[0, 1]`.
    fn similarity(&self, obsolete: &Member, current: &Member) -> f64;

    /// Returns `false` for pairings that would corrupt data.
    fn is_valid_pairing(&self, obsolete: &Member, current: &Member) -> bool;
}

/// Name and type based matcher.
///
/// Score is `0.6 * name + 0.4 * type`. Reference/value pairs and value
/// pairs that do not widen are rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMemberMatcher;

const NAME_WEIGHT: f64 = 0.6;
const TYPE_WEIGHT: f64 = 0.4;

impl MemberMatcher for DefaultMemberMatcher {
    fn similarity(&self, obsolete: &Member, current: &Member) -> f64 {
        NAME_WEIGHT * name_similarity(obsolete.name(), current.name())
            + TYPE_WEIGHT * type_similarity(obsolete, current)
    }

    fn is_valid_pairing(&self, obsolete: &Member, current: &Member) -> bool {
        match (obsolete.is_reference(), current.is_reference()) {
            (true, true) => true,
            (false, false) => obsolete.kind().widens_to(current.kind()),
            _ => false,
        }
    }
}

/// Case-insensitive name similarity in `[0, 1]`.
///
/// The best of a character diff ratio and, when one name contains the
/// other, `0.5 + 0.5 * shorter / longer`.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    let ratio = f64::from(TextDiff::from_chars(a.as_str(), b.as_str()).ratio());
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let containment = if !shorter.is_empty() && longer.contains(shorter.as_str()) {
        0.5 + 0.5 * shorter.chars().count() as f64 / longer.chars().count() as f64
    } else {
        0.0
    };
    ratio.max(containment)
}

/// Declared type compatibility in `[0, 1]`.
pub fn type_similarity(obsolete: &Member, current: &Member) -> f64 {
    if obsolete.declared_type() == current.declared_type()
        && obsolete.is_reference() == current.is_reference()
    {
        return 1.0;
    }
    match (obsolete.is_reference(), current.is_reference()) {
        (true, true) => 0.5,
        (false, false) if obsolete.kind().widens_to(current.kind()) => 0.75,
        (false, false) if obsolete.kind().narrows_to(current.kind()) => 0.25,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_types::ValueKind;

    #[test]
    fn names() {
        assert_eq!(name_similarity("count", "Count"), 1.0);
        assert!(name_similarity("count", "itemCount") >= 0.5 + 0.5 * 5.0 / 9.0 - 1e-9);
        assert!(name_similarity("firstName", "first_name") > 0.8);
        assert!(name_similarity("x", "label") < 0.3);
        assert_eq!(name_similarity("", ""), 1.0);
    }

    #[test]
    fn types() {
        let i32_ = Member::value("a", ValueKind::I32);
        let i64_ = Member::value("b", ValueKind::I64);
        let text = Member::value("c", ValueKind::Text);
        let node = Member::reference("d", "Node");
        let leaf = Member::reference("e", "Leaf");

        assert_eq!(type_similarity(&i32_, &i32_), 1.0);
        assert_eq!(type_similarity(&i32_, &i64_), 0.75);
        assert_eq!(type_similarity(&i64_, &i32_), 0.25);
        assert_eq!(type_similarity(&node, &leaf), 0.5);
        assert_eq!(type_similarity(&node, &text), 0.0);
        assert_eq!(type_similarity(&i32_, &text), 0.0);
    }

    #[test]
    fn validator() {
        let m = DefaultMemberMatcher;
        let i32_ = Member::value("a", ValueKind::I32);
        let i64_ = Member::value("b", ValueKind::I64);
        let node = Member::reference("d", "Node");
        assert!(m.is_valid_pairing(&i32_, &i64_));
        assert!(!m.is_valid_pairing(&i64_, &i32_));
        assert!(!m.is_valid_pairing(&i32_, &node));
        assert!(m.is_valid_pairing(&node, &Member::reference("e", "Leaf")));
    }

    #[test]
    fn default_equality_is_shape() {
        let m = DefaultMemberMatcher;
        assert!(m.equal(&Member::value("x", ValueKind::I32), &Member::value("x", ValueKind::I32)));
        assert!(!m.equal(&Member::value("x", ValueKind::I32), &Member::value("x", ValueKind::I64)));
    }
}
