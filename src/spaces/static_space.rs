//! The leaf of the field-space chain: a fixed, already-resolved
//! `StructDef` (a table source, a named source, a join's own schema).
//! Lookups never mutate it — this is the space a `DynamicSpace` is built
//! on top of (§4.2).

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::{FieldSpace, LookupReference, LookupResult, ReferenceKind, SpaceEntry};
use crate::ast::FieldPath;
use crate::model::{FieldDef, JoinKind, StructDef};

/// Memoises the struct's name→field index (§4.2 "memoises a name→SpaceEntry
/// map"), so repeated path-walked lookups against the same base struct
/// (common when a pipeline chains many segments over one source) don't pay
/// a linear scan per segment.
pub struct StaticSpace {
    def: StructDef,
    field_index: IndexMap<SmolStr, usize>,
}

impl StaticSpace {
    pub fn new(def: StructDef) -> Self {
        let field_index = def
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().clone(), i))
            .collect();
        Self { def, field_index }
    }
}

impl FieldSpace for StaticSpace {
    fn lookup(&self, path: &FieldPath) -> LookupResult {
        let Some(head) = path.segments.first() else {
            return LookupResult::NotFound;
        };
        if let Some(param) = self.def.parameter_named(head.as_str()) {
            return LookupResult::Found(LookupReference {
                kind: ReferenceKind::Parameter,
                entry: SpaceEntry::Parameter {
                    name: head.clone(),
                    param: param.clone(),
                },
                remainder: path.segments[1..].to_vec(),
            });
        }
        match self.field_index.get(head.as_str()).map(|&i| &self.def.fields[i]) {
            Some(f @ FieldDef::Atomic { name, .. }) => LookupResult::Found(LookupReference {
                kind: ReferenceKind::Column,
                entry: SpaceEntry::Column {
                    name: name.clone(),
                    def: f.clone(),
                },
                remainder: path.segments[1..].to_vec(),
            }),
            Some(FieldDef::Struct { name, def, join_kind, .. }) => {
                LookupResult::Found(LookupReference {
                    kind: if join_kind.is_some() {
                        ReferenceKind::Join
                    } else {
                        ReferenceKind::Column
                    },
                    entry: SpaceEntry::Join {
                        name: name.clone(),
                        def: def.clone(),
                        join_kind: join_kind.unwrap_or(JoinKind::One),
                    },
                    remainder: path.segments[1..].to_vec(),
                })
            }
            Some(FieldDef::Turtle { name, pipeline, .. }) => LookupResult::Found(LookupReference {
                kind: ReferenceKind::Turtle,
                entry: SpaceEntry::Turtle {
                    name: name.clone(),
                    pipeline: pipeline.clone(),
                },
                remainder: path.segments[1..].to_vec(),
            }),
            None => LookupResult::NotFound,
        }
    }

    fn struct_def(&self) -> &StructDef {
        &self.def
    }
}

impl StaticSpace {
    pub fn field_names(&self) -> Vec<SmolStr> {
        self.def.fields.iter().map(|f| f.name().clone()).collect()
    }
}
