use serde::{Deserialize, Serialize};

use crate::id::{ObjectId, TypeId};
use crate::value::Value;

/// Decoded member data of one persisted object.
///
/// The values are in the member order of the type definition the record
/// was written with, which is not necessarily the current runtime shape.
/// `layout` is the position of that definition in the type's lineage.
/// The byte-level encoding of a record belongs to the storage layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub object_id: ObjectId,
    pub type_id: TypeId,
    #[serde(default)]
    pub layout: u32,
    pub values: Vec<Value>,
}

impl RawRecord {
    /// A record written with the first layout of its type.
    pub fn new(object_id: ObjectId, type_id: TypeId, values: Vec<Value>) -> Self {
        Self {
            object_id,
            type_id,
            layout: 0,
            values,
        }
    }

    pub fn with_layout(mut self, layout: u32) -> Self {
        self.layout = layout;
        self
    }

    /// Non-null object ids referenced by this record, in member order.
    pub fn references(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.values.iter().filter_map(Value::as_reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_in_member_order() {
        let record = RawRecord::new(
            ObjectId::new(1),
            TypeId::new(10),
            vec![
                Value::Reference(ObjectId::new(3)),
                Value::I32(7),
                Value::Reference(ObjectId::NULL),
                Value::Reference(ObjectId::new(2)),
            ],
        );
        let refs: Vec<_> = record.references().collect();
        assert_eq!(refs, vec![ObjectId::new(3), ObjectId::new(2)]);
    }

    #[test]
    fn serde_roundtrip() {
        let record = RawRecord::new(
            ObjectId::new(1),
            TypeId::new(100),
            vec![Value::I32(3), Value::I32(4)],
        );
        let json = serde_json::to_string(&record).unwrap();
        let parsed: RawRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);

        let evolved = record.with_layout(2);
        let json = serde_json::to_string(&evolved).unwrap();
        let parsed: RawRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.layout, 2);
    }

    #[test]
    fn layout_defaults_to_first() {
        let json = r#"{"object_id":1,"type_id":100,"values":[]}"#;
        let parsed: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.layout, 0);
    }
}
