//! Member value model.
//!
//! A [`Value`] is the decoded content of one member of one persisted object.
//! Every value has a [`ValueKind`], derived from the member's declared type
//! name. Reference members carry an [`ObjectId`], never a native pointer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::ObjectId;

/// The kind of a member value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    Text,
    Bytes,
    Reference,
}

impl ValueKind {
    /// Declared type name of an untyped reference member.
    pub const ANY_REFERENCE: &'static str = "any";

    /// Upper bound of a variable-length persisted value.
    pub const UNBOUNDED: u64 = u64::MAX;

    /// Resolve the kind of a member from its declared type name.
    ///
    /// Reference members may name any type (the referenced type name), but
    /// not one of the value type names.
    pub fn from_declared_type(declared: &str, reference: bool) -> Result<Self, TypeError> {
        let value_kind = match declared {
            "bool" => Some(Self::Bool),
            "i8" => Some(Self::I8),
            "i16" => Some(Self::I16),
            "i32" => Some(Self::I32),
            "i64" => Some(Self::I64),
            "f32" => Some(Self::F32),
            "f64" => Some(Self::F64),
            "char" => Some(Self::Char),
            "string" => Some(Self::Text),
            "bytes" => Some(Self::Bytes),
            _ => None,
        };
        match (value_kind, reference) {
            (Some(kind), false) => Ok(kind),
            (None, true) if !declared.is_empty() => Ok(Self::Reference),
            _ => Err(TypeError::UnknownDeclaredType(declared.to_string())),
        }
    }

    /// Canonical declared type name of this kind.
    pub fn declared_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::Text => "string",
            Self::Bytes => "bytes",
            Self::Reference => Self::ANY_REFERENCE,
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(self, Self::Reference)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Persisted (min, max) byte length of a value of this kind.
    ///
    /// Variable-length kinds carry an 8-byte length header.
    pub fn persisted_length(self) -> (u64, u64) {
        match self {
            Self::Bool | Self::I8 => (1, 1),
            Self::I16 => (2, 2),
            Self::I32 | Self::F32 | Self::Char => (4, 4),
            Self::I64 | Self::F64 | Self::Reference => (8, 8),
            Self::Text | Self::Bytes => (8, Self::UNBOUNDED),
        }
    }

    /// The value a member of this kind has when nothing was stored for it.
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::I8 => Value::I8(0),
            Self::I16 => Value::I16(0),
            Self::I32 => Value::I32(0),
            Self::I64 => Value::I64(0),
            Self::F32 => Value::F32(0.0),
            Self::F64 => Value::F64(0.0),
            Self::Char => Value::Char('\0'),
            Self::Text => Value::Text(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::Reference => Value::Reference(ObjectId::NULL),
        }
    }

    /// Returns `true` if every value of `self` converts to `target` without
    /// loss. Every kind widens to itself.
    pub fn widens_to(self, target: ValueKind) -> bool {
        use ValueKind::*;
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (I8, I16 | I32 | I64 | F32 | F64)
                | (I16, I32 | I64 | F32 | F64)
                | (I32, I64 | F64)
                | (F32, F64)
                | (Char, Text)
        )
    }

    /// Returns `true` for numeric pairs that only convert with loss.
    pub fn narrows_to(self, target: ValueKind) -> bool {
        self.is_numeric() && target.is_numeric() && !self.widens_to(target)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.declared_name())
    }
}

/// One decoded member value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    Text(String),
    Bytes(Vec<u8>),
    Reference(ObjectId),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::I8(_) => ValueKind::I8,
            Self::I16(_) => ValueKind::I16,
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::Char(_) => ValueKind::Char,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Reference(_) => ValueKind::Reference,
        }
    }

    /// The referenced object id, if this is a non-null reference.
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Self::Reference(id) if !id.is_null() => Some(*id),
            _ => None,
        }
    }

    /// Integer content widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v.into()),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Convert this value to `target` if the conversion is a widening one.
    ///
    /// Returns `None` for narrowing or incompatible conversions.
    pub fn convert_to(&self, target: ValueKind) -> Option<Value> {
        if self.kind() == target {
            return Some(self.clone());
        }
        if !self.kind().widens_to(target) {
            return None;
        }
        let converted = match (self, target) {
            (Self::I8(v), ValueKind::I16) => Self::I16((*v).into()),
            (Self::I8(v), ValueKind::I32) => Self::I32((*v).into()),
            (Self::I8(v), ValueKind::I64) => Self::I64((*v).into()),
            (Self::I8(v), ValueKind::F32) => Self::F32((*v).into()),
            (Self::I8(v), ValueKind::F64) => Self::F64((*v).into()),
            (Self::I16(v), ValueKind::I32) => Self::I32((*v).into()),
            (Self::I16(v), ValueKind::I64) => Self::I64((*v).into()),
            (Self::I16(v), ValueKind::F32) => Self::F32((*v).into()),
            (Self::I16(v), ValueKind::F64) => Self::F64((*v).into()),
            (Self::I32(v), ValueKind::I64) => Self::I64((*v).into()),
            (Self::I32(v), ValueKind::F64) => Self::F64((*v).into()),
            (Self::F32(v), ValueKind::F64) => Self::F64((*v).into()),
            (Self::Char(v), ValueKind::Text) => Self::Text(v.to_string()),
            _ => return None,
        };
        Some(converted)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Self::Reference(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_resolution() {
        assert_eq!(ValueKind::from_declared_type("i32", false).unwrap(), ValueKind::I32);
        assert_eq!(ValueKind::from_declared_type("string", false).unwrap(), ValueKind::Text);
        assert_eq!(
            ValueKind::from_declared_type("Address", true).unwrap(),
            ValueKind::Reference
        );
    }

    #[test]
    fn reference_flag_must_agree_with_declared_type() {
        assert!(ValueKind::from_declared_type("i32", true).is_err());
        assert!(ValueKind::from_declared_type("Address", false).is_err());
        assert!(ValueKind::from_declared_type("", true).is_err());
    }

    #[test]
    fn defaults_are_zero_like() {
        assert_eq!(ValueKind::I32.default_value(), Value::I32(0));
        assert_eq!(ValueKind::Text.default_value(), Value::Text(String::new()));
        assert_eq!(
            ValueKind::Reference.default_value(),
            Value::Reference(ObjectId::NULL)
        );
    }

    #[test]
    fn widening_is_one_directional() {
        assert!(ValueKind::I32.widens_to(ValueKind::I64));
        assert!(!ValueKind::I64.widens_to(ValueKind::I32));
        assert!(ValueKind::I64.narrows_to(ValueKind::I32));
        assert!(!ValueKind::I64.widens_to(ValueKind::F64));
        assert!(ValueKind::Char.widens_to(ValueKind::Text));
        assert!(!ValueKind::Text.widens_to(ValueKind::Reference));
    }

    #[test]
    fn convert_widens_values() {
        assert_eq!(Value::I32(3).convert_to(ValueKind::I64), Some(Value::I64(3)));
        assert_eq!(Value::F32(1.5).convert_to(ValueKind::F64), Some(Value::F64(1.5)));
        assert_eq!(
            Value::Char('x').convert_to(ValueKind::Text),
            Some(Value::Text("x".into()))
        );
    }

    #[test]
    fn convert_rejects_narrowing() {
        assert_eq!(Value::I64(3).convert_to(ValueKind::I32), None);
        assert_eq!(Value::Text("1".into()).convert_to(ValueKind::I32), None);
    }

    #[test]
    fn null_reference_is_not_a_reference_target() {
        assert_eq!(Value::Reference(ObjectId::NULL).as_reference(), None);
        assert_eq!(
            Value::Reference(ObjectId::new(9)).as_reference(),
            Some(ObjectId::new(9))
        );
    }

    #[test]
    fn persisted_lengths() {
        assert_eq!(ValueKind::I32.persisted_length(), (4, 4));
        assert_eq!(ValueKind::Text.persisted_length(), (8, ValueKind::UNBOUNDED));
    }

    #[test]
    fn serde_roundtrip_tagged() {
        let value = Value::Reference(ObjectId::new(12));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"kind":"reference","value":12}"#);
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn widening_preserves_integer_content(v in any::<i16>()) {
                let value = Value::I16(v);
                for target in [ValueKind::I32, ValueKind::I64] {
                    let widened = value.convert_to(target).unwrap();
                    prop_assert_eq!(widened.kind(), target);
                    prop_assert_eq!(widened.as_i64(), Some(i64::from(v)));
                }
                prop_assert_eq!(value.convert_to(ValueKind::F64), Some(Value::F64(f64::from(v))));
            }
        }
    }
}
