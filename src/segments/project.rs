//! `project:` segment execution — like reduce, but rejects aggregate,
//! analytic, and nest members; every output is a plain input reference or
//! scalar expression (§4.4 ProjectExecutor rules).

use super::SegmentExecutor;
use crate::ast::{FieldReference, QOPDesc, QueryProperty as QP};
use crate::diag::Diag;
use crate::model::{
    ExpressionKind, ExtendSource, FieldDef, OrderBySpec, OutputField, PipeSegment, ProjectSegment,
    StructDef,
};
use crate::spaces::{DefSpace, FieldSpace, ProjectFieldSpace, SpaceEntry};

pub struct ProjectExecutor;

impl SegmentExecutor for ProjectExecutor {
    fn execute(
        &self,
        input: &StructDef,
        desc: &QOPDesc,
        nest_parent: Option<&StructDef>,
        diagnostics: &mut Vec<Diag>,
    ) -> (PipeSegment, StructDef) {
        let mut space = ProjectFieldSpace::new(input.clone());
        if let Some(parent) = nest_parent {
            space = space.with_nest_parent(parent.clone());
        }
        let mut segment = ProjectSegment::default();

        for prop in &desc.properties {
            match prop {
                QP::Join(join) => apply_join(space.input_space_mut(), join, diagnostics),
                QP::Declare(declare) => apply_declare(space.input_space_mut(), declare, diagnostics),
                QP::ProjectField(field) => push_field_output(&mut space, field, diagnostics),
                QP::Filter(filter) => push_filter(&mut segment, filter, space.input_space(), diagnostics),
                QP::Top(top) => {
                    if segment.limit.is_some() {
                        diagnostics.push(Diag::warning(
                            "segment already has a limit; this 'top' overrides the earlier one",
                        ));
                    }
                    segment.limit = Some(top.limit);
                    if let Some(by) = &top.by {
                        segment.by = super::order_by_target_from_expr(by, diagnostics);
                    }
                }
                QP::Limit(limit) => {
                    if segment.limit.is_some() {
                        diagnostics.push(Diag::warning(
                            "segment already has a limit; this 'limit' overrides the earlier one",
                        ));
                    }
                    segment.limit = Some(limit.limit);
                }
                QP::Ordering(ordering) => {
                    if !segment.order_by.is_empty() {
                        diagnostics.push(Diag::warning(
                            "segment is already sorted; this 'order_by' overrides the earlier ordering",
                        ));
                    }
                    segment.order_by = ordering
                        .keys
                        .iter()
                        .map(|(target, direction)| OrderBySpec {
                            field: target.clone(),
                            direction: *direction,
                        })
                        .collect();
                }
                QP::GroupBy(_) | QP::Aggregate(_) | QP::Nest(_) | QP::NestedQueryRef(_) => {
                    diagnostics.push(Diag::error(
                        "group_by, aggregate, and nest are not valid in a project segment",
                    ));
                }
                QP::Index(_) | QP::WeightBy(_) | QP::Sample(_) => {
                    diagnostics.push(Diag::error("this property is not valid in a project segment"));
                }
            }
        }

        for field in &space.outputs().to_vec() {
            if field.value.expression_type != ExpressionKind::Scalar {
                diagnostics.push(
                    Diag::error(format!("'{}' is not a scalar value, which project requires", field.name))
                        .with_primary_label(field.location.clone().unwrap_or(0..0), "here"),
                );
            }
        }

        segment.fields = space.outputs().to_vec();

        let original_names: std::collections::HashSet<&str> =
            input.fields.iter().map(|f| f.name().as_str()).collect();
        let finalized_input = space.input_space_mut().finalize().clone();
        segment.extend_source = ExtendSource {
            fields: finalized_input
                .fields
                .iter()
                .filter(|f| !original_names.contains(f.name().as_str()))
                .cloned()
                .collect(),
        };

        let output_struct = StructDef::new(input.name.clone(), input.dialect.clone()).with_fields(
            segment
                .fields
                .iter()
                .map(|f| FieldDef::Atomic {
                    name: f.name.clone(),
                    data_type: f.value.data_type,
                    location: f.location.clone(),
                })
                .collect(),
        );

        (PipeSegment::Project(segment), output_struct)
    }
}

/// Evaluates a `filter:`/`where:`/`having:` condition and enforces which
/// side of the aggregation boundary it belongs on, mirroring
/// `reduce::push_filter` (§4.4 ProjectExecutor rules).
fn push_filter(segment: &mut ProjectSegment, filter: &crate::ast::FilterEntry, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) {
    let value = crate::eval::evaluate(&filter.condition, space, diagnostics);
    if filter.having {
        if value.expression_type == ExpressionKind::Scalar {
            diagnostics.push(Diag::error(
                "'having' requires an aggregate calculation, not a plain scalar condition",
            ));
        }
    } else if value.expression_type != ExpressionKind::Scalar {
        diagnostics.push(Diag::error(
            "'where' can only filter on a scalar condition; aggregate calculations belong in 'having'",
        ));
    }
    segment.filter_list.push(value);
}

fn apply_join(space: &mut DefSpace, join: &crate::ast::JoinEntry, diagnostics: &mut Vec<Diag>) {
    let target_def = std::sync::Arc::new(StructDef::new(join.name.clone(), "standardsql"));
    let join_kind = match join.cardinality {
        crate::ast::JoinCardinality::One => crate::model::JoinKind::One,
        crate::ast::JoinCardinality::Many => crate::model::JoinKind::Many,
        crate::ast::JoinCardinality::Cross => crate::model::JoinKind::Cross,
    };
    space.add_entry(
        SpaceEntry::Join {
            name: join.name.clone(),
            def: target_def,
            join_kind,
        },
        diagnostics,
    );
    if let Some(on) = &join.on {
        if !on.references_name(join.name.as_str()) {
            diagnostics.push(Diag::warning(format!(
                "join '{}' has an 'on' condition that never references it; this is probably a cross join",
                join.name
            )));
        }
        let _ = crate::eval::evaluate(on, &*space, diagnostics);
    }
}

fn apply_declare(space: &mut DefSpace, declare: &crate::ast::DeclareEntry, diagnostics: &mut Vec<Diag>) {
    if let Err(err) = space.enter(declare.name.clone()) {
        diagnostics.push(err);
        return;
    }
    // See the matching comment in `reduce::apply_declare`: a direct
    // self-reference has to be caught before evaluation, since the
    // declared name isn't in the space yet for a lookup to catch it.
    if declare.expr.references_name(declare.name.as_str()) {
        diagnostics.push(Diag::error(format!(
            "circular reference: '{}' depends on itself in its own definition",
            declare.name
        )));
        space.leave();
        return;
    }
    let value = crate::eval::evaluate(&declare.expr, &*space, diagnostics);
    space.leave();
    space.add_entry(
        SpaceEntry::Column {
            name: declare.name.clone(),
            def: FieldDef::Atomic {
                name: declare.name.clone(),
                data_type: value.data_type,
                location: None,
            },
        },
        diagnostics,
    );
}

fn push_field_output(space: &mut ProjectFieldSpace, field: &FieldReference, diagnostics: &mut Vec<Diag>) {
    match field {
        FieldReference::Name(name, span) => {
            let path = crate::ast::FieldPath::single(name.clone());
            let value = crate::eval::evaluate(
                &crate::ast::Expr::FieldRef(path, span.clone()),
                space.input_space(),
                diagnostics,
            );
            space.push_output(
                OutputField {
                    name: name.clone(),
                    value,
                    location: Some(span.clone()),
                },
                diagnostics,
            );
        }
        FieldReference::Named { name, expr, span } => {
            let value = crate::eval::evaluate(expr, space.input_space(), diagnostics);
            space.push_output(
                OutputField {
                    name: name.clone(),
                    value,
                    location: Some(span.clone()),
                },
                diagnostics,
            );
        }
        FieldReference::Wildcard { span, .. } => {
            for f in space.input_space().struct_def().fields.iter() {
                if let FieldDef::Atomic { name, data_type, .. } = f {
                    space.push_output(
                        OutputField {
                            name: name.clone(),
                            value: crate::model::ExprValue::new(
                                *data_type,
                                ExpressionKind::Scalar,
                                crate::model::EvalSpace::Input,
                                crate::model::PlanFragment::field([name.as_str()]),
                            ),
                            location: Some(span.clone()),
                        },
                        diagnostics,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AtomicFieldType;

    fn base() -> StructDef {
        StructDef::new("orders", "standardsql").with_fields(vec![FieldDef::Atomic {
            name: "amount".into(),
            data_type: AtomicFieldType::Number,
            location: None,
        }])
    }

    #[test]
    fn aggregate_is_rejected_in_project() {
        let desc = QOPDesc {
            properties: vec![QP::Aggregate(crate::ast::AggregateEntry {
                field: FieldReference::Name("amount".into(), 0..6),
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let _ = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn plain_field_reference_projects_cleanly() {
        let desc = QOPDesc {
            properties: vec![QP::ProjectField(FieldReference::Name("amount".into(), 0..6))],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (segment, output) = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(diags.is_empty());
        match segment {
            PipeSegment::Project(p) => assert_eq!(p.fields.len(), 1),
            _ => panic!("expected project"),
        }
        assert_eq!(output.fields.len(), 1);
    }

    #[test]
    fn where_on_an_aggregate_condition_is_rejected() {
        let desc = QOPDesc {
            properties: vec![QP::Filter(crate::ast::FilterEntry {
                condition: crate::ast::Expr::Aggregate(
                    crate::ast::AggregateCall {
                        name: "sum".into(),
                        arg: Some(Box::new(crate::ast::Expr::FieldRef(
                            crate::ast::FieldPath::single("amount"),
                            0..6,
                        ))),
                    },
                    0..10,
                ),
                having: false,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let _ = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'where'"));
    }

    #[test]
    fn having_on_a_scalar_condition_is_rejected() {
        let desc = QOPDesc {
            properties: vec![QP::Filter(crate::ast::FilterEntry {
                condition: crate::ast::Expr::FieldRef(crate::ast::FieldPath::single("amount"), 0..6),
                having: true,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let _ = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'having'"));
    }

    #[test]
    fn a_second_limit_overrides_the_first_with_a_warning() {
        let desc = QOPDesc {
            properties: vec![
                QP::Limit(crate::ast::LimitEntry { limit: 5, span: 0..1 }),
                QP::Limit(crate::ast::LimitEntry { limit: 10, span: 1..2 }),
            ],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (segment, _) = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        match segment {
            PipeSegment::Project(p) => assert_eq!(p.limit, Some(10)),
            _ => panic!("expected project"),
        }
    }

    #[test]
    fn top_with_by_bridges_into_the_segments_order_target() {
        let desc = QOPDesc {
            properties: vec![QP::Top(crate::ast::TopEntry {
                limit: 10,
                by: Some(crate::ast::Expr::FieldRef(crate::ast::FieldPath::single("amount"), 0..6)),
                span: 0..10,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (segment, _) = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(diags.is_empty());
        match segment {
            PipeSegment::Project(p) => {
                assert_eq!(p.limit, Some(10));
                assert_eq!(p.by, Some(crate::model::OrderByTarget::Name("amount".into())));
            }
            _ => panic!("expected project"),
        }
    }

    #[test]
    fn a_second_ordering_overrides_the_first_with_a_warning() {
        let desc = QOPDesc {
            properties: vec![
                QP::Ordering(crate::ast::OrderingEntry {
                    keys: vec![(crate::model::OrderByTarget::Name("amount".into()), None)],
                    span: 0..1,
                }),
                QP::Ordering(crate::ast::OrderingEntry {
                    keys: vec![(crate::model::OrderByTarget::Ordinal(1), None)],
                    span: 1..2,
                }),
            ],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (segment, _) = ProjectExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        match segment {
            PipeSegment::Project(p) => assert_eq!(p.order_by.len(), 1),
            _ => panic!("expected project"),
        }
    }
}
