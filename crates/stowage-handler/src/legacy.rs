//! Handler translating records of older stored layouts.

use std::collections::BTreeMap;

use stowage_dictionary::TypeDefinition;
use stowage_mapping::MemberCorrespondence;
use stowage_types::{Instance, ObjectId, RawRecord, TypeId, Value};

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerKind, TypeHandler};
use crate::reflective::ReflectiveTypeHandler;

/// One older layout and how its members feed the current layout.
#[derive(Debug, Clone)]
struct ObsoleteLayout {
    definition: TypeDefinition,
    correspondence: MemberCorrespondence,
}

/// Reads every stored layout of a type, writes the current one.
#[derive(Debug)]
pub struct LegacyTypeHandler {
    current: ReflectiveTypeHandler,
    layouts: BTreeMap<u32, ObsoleteLayout>,
}

impl LegacyTypeHandler {
    /// Wrap `current` with a correspondence for each older layout.
    ///
    /// Fails when a binding pairs members whose stored values cannot be
    /// converted to the current member's kind.
    pub fn new(
        current: ReflectiveTypeHandler,
        obsolete: impl IntoIterator<Item = (u32, TypeDefinition, MemberCorrespondence)>,
    ) -> HandlerResult<Self> {
        let mut layouts = BTreeMap::new();
        for (layout, definition, correspondence) in obsolete {
            check_conversions(current.definition(), &definition, &correspondence)?;
            layouts.insert(
                layout,
                ObsoleteLayout {
                    definition,
                    correspondence,
                },
            );
        }
        Ok(Self { current, layouts })
    }

    /// Correspondence used for records of `layout`.
    pub fn correspondence(&self, layout: u32) -> Option<&MemberCorrespondence> {
        self.layouts.get(&layout).map(|l| &l.correspondence)
    }

    /// Stored layouts translated by this handler, ascending.
    pub fn obsolete_layouts(&self) -> impl Iterator<Item = u32> + '_ {
        self.layouts.keys().copied()
    }

    fn obsolete_layout(&self, record: &RawRecord) -> HandlerResult<Option<&ObsoleteLayout>> {
        if record.layout == self.current.layout() {
            return Ok(None);
        }
        self.layouts
            .get(&record.layout)
            .map(Some)
            .ok_or_else(|| {
                self.current
                    .shape_error(record, format!("unknown layout {}", record.layout))
            })
    }

    /// Current-layout member values built from an older record.
    fn translate(&self, layout: &ObsoleteLayout, record: &RawRecord) -> HandlerResult<Vec<Value>> {
        let current = self.current.definition();
        current
            .members()
            .iter()
            .enumerate()
            .map(|(j, member)| match layout.correspondence.source_of(j) {
                Some(i) => record.values[i].convert_to(member.kind()).ok_or_else(|| {
                    self.current.shape_error(
                        record,
                        format!("member {} cannot convert to {}", member.name(), member.kind()),
                    )
                }),
                None => Ok(member.kind().default_value()),
            })
            .collect()
    }
}

fn check_conversions(
    current: &TypeDefinition,
    obsolete: &TypeDefinition,
    correspondence: &MemberCorrespondence,
) -> HandlerResult<()> {
    for binding in correspondence.bindings() {
        let Some(target) = binding.target else { continue };
        let (Some(from), Some(to)) = (obsolete.member(binding.obsolete_index), current.member(target))
        else {
            continue;
        };
        let compatible = match (from.is_reference(), to.is_reference()) {
            (true, true) => true,
            (false, false) => from.kind().widens_to(to.kind()),
            _ => false,
        };
        if !compatible {
            return Err(HandlerError::IncompatibleMapping {
                type_id: current.type_id(),
                type_name: current.type_name().to_string(),
                member: from.name().to_string(),
                from: from.kind(),
                to: to.kind(),
            });
        }
    }
    Ok(())
}

impl TypeHandler for LegacyTypeHandler {
    fn type_id(&self) -> TypeId {
        self.current.type_id()
    }

    fn type_name(&self) -> &str {
        self.current.type_name()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Legacy
    }

    fn stored_definition(&self) -> &TypeDefinition {
        self.layouts
            .values()
            .next_back()
            .map(|l| &l.definition)
            .unwrap_or_else(|| self.current.definition())
    }

    fn current_definition(&self) -> Option<&TypeDefinition> {
        Some(self.current.definition())
    }

    fn current_layout(&self) -> Option<u32> {
        Some(self.current.layout())
    }

    fn validate_record(&self, record: &RawRecord) -> HandlerResult<()> {
        match self.obsolete_layout(record)? {
            None => self.current.validate_record(record),
            Some(layout) => {
                if record.type_id != self.type_id() {
                    return Err(self
                        .current
                        .shape_error(record, format!("record carries type id {}", record.type_id)));
                }
                if !layout.definition.matches_values(&record.values) {
                    return Err(self.current.shape_error(
                        record,
                        format!("values do not match layout {}", record.layout),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Only references held by mapped members are followed.
    fn loadable_references(&self, record: &RawRecord) -> Vec<ObjectId> {
        match self.layouts.get(&record.layout) {
            Some(layout) if record.layout != self.current.layout() => record
                .values
                .iter()
                .enumerate()
                .filter(|(i, _)| layout.correspondence.target_of(*i).is_some())
                .filter_map(|(_, v)| v.as_reference())
                .collect(),
            _ => record.references().collect(),
        }
    }

    fn create(&self, record: &RawRecord) -> HandlerResult<Instance> {
        self.current.create(record)
    }

    fn populate(&self, instance: &Instance, record: &RawRecord) -> HandlerResult<()> {
        self.validate_record(record)?;
        match self.obsolete_layout(record)? {
            None => self.current.apply(instance, record.values.clone()),
            Some(layout) => {
                let values = self.translate(layout, record)?;
                self.current.apply(instance, values)
            }
        }
    }

    fn decompose(&self, object_id: ObjectId, instance: &Instance) -> HandlerResult<RawRecord> {
        self.current.decompose(object_id, instance)
    }

    fn is_eager(&self, member_index: usize) -> bool {
        self.current.is_eager(member_index)
    }
}
