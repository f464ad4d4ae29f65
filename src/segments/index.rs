//! `index:` segment execution — builds a sampled set of field/wildcard
//! references plus an optional weight measure, for Malloy's index/search
//! queries (§4.4 IndexExecutor rules).

use super::SegmentExecutor;
use crate::ast::{FieldReference, QOPDesc, QueryProperty as QP};
use crate::diag::Diag;
use crate::model::{FieldDef, IndexSegment, PipeSegment, StructDef};
use crate::spaces::{FieldSpace, IndexFieldSpace};

pub struct IndexExecutor;

impl SegmentExecutor for IndexExecutor {
    fn execute(
        &self,
        input: &StructDef,
        desc: &QOPDesc,
        _nest_parent: Option<&StructDef>,
        diagnostics: &mut Vec<Diag>,
    ) -> (PipeSegment, StructDef) {
        let mut space = IndexFieldSpace::new(input.clone());
        let mut segment = IndexSegment::default();

        for prop in &desc.properties {
            match prop {
                QP::Index(entry) => {
                    for field in &entry.fields {
                        push_indexed(&mut space, field, diagnostics);
                    }
                }
                QP::WeightBy(weight) => match &weight.field {
                    FieldReference::Name(name, _) => space.set_weight_measure(name.clone()),
                    _ => diagnostics.push(Diag::error("weight_by requires a plain field reference")),
                },
                QP::Sample(sample) => segment.sample = Some(sample.0),
                QP::Filter(filter) => {
                    let value = crate::eval::evaluate(&filter.condition, space.input_space(), diagnostics);
                    segment.filter_list.push(value);
                }
                QP::Limit(limit) => {
                    if segment.limit.is_some() {
                        diagnostics.push(Diag::warning(
                            "segment already has a limit; this 'limit' overrides the earlier one",
                        ));
                    }
                    segment.limit = Some(limit.limit);
                }
                QP::Top(top) => {
                    if segment.limit.is_some() {
                        diagnostics.push(Diag::warning(
                            "segment already has a limit; this 'top' overrides the earlier one",
                        ));
                    }
                    segment.limit = Some(top.limit);
                }
                _ => diagnostics.push(Diag::error("this property is not valid in an index segment")),
            }
        }

        segment.fields = space.indexed().to_vec();
        segment.weight_measure = space.weight_measure().cloned();

        let output_struct = StructDef::new(input.name.clone(), input.dialect.clone()).with_fields(vec![
            FieldDef::Atomic {
                name: "field_name".into(),
                data_type: crate::model::AtomicFieldType::String,
                location: None,
            },
            FieldDef::Atomic {
                name: "field_value".into(),
                data_type: crate::model::AtomicFieldType::String,
                location: None,
            },
            FieldDef::Atomic {
                name: "weight".into(),
                data_type: crate::model::AtomicFieldType::Number,
                location: None,
            },
        ]);

        (PipeSegment::Index(segment), output_struct)
    }
}

fn push_indexed(space: &mut IndexFieldSpace, field: &FieldReference, diagnostics: &mut Vec<Diag>) {
    match field {
        FieldReference::Name(name, span) => {
            let path = crate::ast::FieldPath::single(name.clone());
            if matches!(space.input_space().lookup(&path), crate::spaces::LookupResult::NotFound) {
                diagnostics.push(
                    Diag::error(format!("'{name}' is not defined")).with_primary_label(span.clone(), "here"),
                );
                return;
            }
            space.push_indexed(name.clone());
        }
        FieldReference::Wildcard { .. } => {
            for f in space.input_space().struct_def().fields.iter() {
                space.push_indexed(f.name().clone());
            }
        }
        FieldReference::Named { name, span, .. } => {
            diagnostics.push(
                Diag::error("index fields must be plain references, not expressions")
                    .with_primary_label(span.clone(), format!("'{name}' here")),
            );
        }
    }
}
