use serde::{Deserialize, Serialize};

use stowage_types::{TypeError, ValueKind};

/// One persisted member (field) of a type definition.
///
/// The value kind is derived from the declared type name and the reference
/// flag when the member is constructed, so a `Member` always has a
/// resolvable kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MemberSpec", into = "MemberSpec")]
pub struct Member {
    name: String,
    declared_type: String,
    reference: bool,
    min_length: u64,
    max_length: u64,
    kind: ValueKind,
}

/// Serialized form of a [`Member`].
#[derive(Clone, Debug, Serialize, Deserialize)]
struct MemberSpec {
    name: String,
    declared_type: String,
    reference: bool,
    min_length: u64,
    max_length: u64,
}

impl Member {
    /// Create a member from its declared type name and reference flag.
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        reference: bool,
    ) -> Result<Self, TypeError> {
        let declared_type = declared_type.into();
        let kind = ValueKind::from_declared_type(&declared_type, reference)?;
        let (min_length, max_length) = kind.persisted_length();
        Ok(Self {
            name: name.into(),
            declared_type,
            reference,
            min_length,
            max_length,
            kind,
        })
    }

    /// A value (non-reference) member of the given kind.
    ///
    /// Passing [`ValueKind::Reference`] yields an untyped reference member.
    pub fn value(name: impl Into<String>, kind: ValueKind) -> Self {
        let (min_length, max_length) = kind.persisted_length();
        Self {
            name: name.into(),
            declared_type: kind.declared_name().to_string(),
            reference: kind.is_reference(),
            min_length,
            max_length,
            kind,
        }
    }

    /// A reference member pointing at instances of `target_type`.
    pub fn reference(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        let (min_length, max_length) = ValueKind::Reference.persisted_length();
        Self {
            name: name.into(),
            declared_type: target_type.into(),
            reference: true,
            min_length,
            max_length,
            kind: ValueKind::Reference,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn min_length(&self) -> u64 {
        self.min_length
    }

    pub fn max_length(&self) -> u64 {
        self.max_length
    }

    /// Returns `true` if the reference points at an untyped target.
    pub fn is_untyped_reference(&self) -> bool {
        self.reference && self.declared_type == ValueKind::ANY_REFERENCE
    }

    /// Same (name, declared type, reference flag) tuple.
    pub fn same_shape(&self, other: &Member) -> bool {
        self.name == other.name
            && self.declared_type == other.declared_type
            && self.reference == other.reference
    }
}

impl TryFrom<MemberSpec> for Member {
    type Error = TypeError;

    fn try_from(spec: MemberSpec) -> Result<Self, Self::Error> {
        let kind = ValueKind::from_declared_type(&spec.declared_type, spec.reference)?;
        Ok(Self {
            name: spec.name,
            declared_type: spec.declared_type,
            reference: spec.reference,
            min_length: spec.min_length,
            max_length: spec.max_length,
            kind,
        })
    }
}

impl From<Member> for MemberSpec {
    fn from(member: Member) -> Self {
        Self {
            name: member.name,
            declared_type: member.declared_type,
            reference: member.reference,
            min_length: member.min_length,
            max_length: member.max_length,
        }
    }
}
