//! `reduce:` segment execution — the group_by/aggregate/nest workhorse
//! (§4.4 ReduceExecutor rules).

use super::SegmentExecutor;
use crate::ast::{FieldReference, QOPDesc, QueryProperty as QP};
use crate::diag::Diag;
use crate::model::{
    ExtendSource, FieldDef, OrderBySpec, OutputField, PipeSegment, ReduceSegment, StructDef,
};
use crate::spaces::{DefSpace, FieldSpace, ReduceFieldSpace, SpaceEntry};

pub struct ReduceExecutor;

impl SegmentExecutor for ReduceExecutor {
    fn execute(
        &self,
        input: &StructDef,
        desc: &QOPDesc,
        nest_parent: Option<&StructDef>,
        diagnostics: &mut Vec<Diag>,
    ) -> (PipeSegment, StructDef) {
        let mut space = ReduceFieldSpace::new(input.clone());
        if let Some(parent) = nest_parent {
            space = space.with_nest_parent(parent.clone());
        }
        let mut segment = ReduceSegment::default();

        for prop in &desc.properties {
            match prop {
                QP::Join(join) => apply_join(space.input_space_mut(), join, diagnostics),
                QP::Declare(declare) => apply_declare(space.input_space_mut(), declare, diagnostics),
                QP::GroupBy(entry) => push_field_output(&mut space, &entry.field, diagnostics),
                QP::Aggregate(entry) => push_field_output(&mut space, &entry.field, diagnostics),
                QP::Nest(nest) => push_nest(&mut space, nest, diagnostics),
                QP::NestedQueryRef(turtle_ref) => push_turtle_ref(&mut space, turtle_ref, diagnostics),
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
                QP::ProjectField(_) | QP::Index(_) | QP::WeightBy(_) | QP::Sample(_) => {
                    diagnostics.push(Diag::error("this property is not valid in a reduce segment"));
                }
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

        let output_struct = StructDef::new(input.name.clone(), input.dialect.clone())
            .with_fields(
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

        (PipeSegment::Reduce(segment), output_struct)
    }
}

fn apply_join(space: &mut DefSpace, join: &crate::ast::JoinEntry, diagnostics: &mut Vec<Diag>) {
    let target_def = match &join.target {
        crate::ast::JoinTarget::Named(_name) => {
            // Resolution against a model environment happens in `sources`;
            // here we record an opaque placeholder struct so the field
            // space at least knows the join exists by name.
            std::sync::Arc::new(StructDef::new(join.name.clone(), "standardsql"))
        }
        crate::ast::JoinTarget::Inline(_source_ast) => {
            std::sync::Arc::new(StructDef::new(join.name.clone(), "standardsql"))
        }
    };
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
    // A declared field can't yet be looked up by name (it isn't added to
    // the space until after it resolves), so a direct self-reference like
    // `x is x + 1` would otherwise read as "undefined field" rather than
    // a cycle. Catch it here instead of relying on the lookup path.
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

/// Evaluates a `filter:`/`where:`/`having:` condition and enforces which
/// side of the aggregation boundary it belongs on: `where` filters the
/// input rows, so its condition must be scalar; `having` filters the
/// aggregated result, so its condition must itself be a calculation (§4.4
/// ReduceExecutor rules).
fn push_filter(segment: &mut ReduceSegment, filter: &crate::ast::FilterEntry, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) {
    let value = crate::eval::evaluate(&filter.condition, space, diagnostics);
    if filter.having {
        if value.expression_type == crate::model::ExpressionKind::Scalar {
            diagnostics.push(Diag::error(
                "'having' requires an aggregate calculation, not a plain scalar condition",
            ));
        }
    } else if value.expression_type != crate::model::ExpressionKind::Scalar {
        diagnostics.push(Diag::error(
            "'where' can only filter on a scalar condition; aggregate calculations belong in 'having'",
        ));
    }
    segment.filter_list.push(value);
}

fn push_field_output(space: &mut ReduceFieldSpace, field: &FieldReference, diagnostics: &mut Vec<Diag>) {
    match field {
        FieldReference::Name(name, span) => {
            let path = crate::ast::FieldPath::single(name.clone());
            let value = crate::eval::evaluate(&crate::ast::Expr::FieldRef(path, span.clone()), space.input_space(), diagnostics);
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
                                crate::model::ExpressionKind::Scalar,
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

fn push_nest(space: &mut ReduceFieldSpace, nest: &crate::ast::NestEntry, diagnostics: &mut Vec<Diag>) {
    let base = space.input_space().struct_def().clone();
    let (pipeline, _output) = crate::pipeline::compose_pipeline(&nest.pipeline, &base, Some(&base), diagnostics);
    space.push_output(
        OutputField {
            name: nest.name.clone(),
            value: crate::model::ExprValue::new(
                crate::model::AtomicFieldType::Unsupported,
                crate::model::ExpressionKind::Scalar,
                crate::model::EvalSpace::Output,
                crate::model::PlanFragment::field([nest.name.as_str()]),
            ),
            location: Some(nest.span.clone()),
        },
        diagnostics,
    );
    space.extend(FieldDef::Turtle {
        name: nest.name.clone(),
        pipeline,
        location: Some(nest.span.clone()),
    });
}

fn push_turtle_ref(space: &mut ReduceFieldSpace, turtle_ref: &crate::ast::NestedQueryRef, diagnostics: &mut Vec<Diag>) {
    let path = crate::ast::FieldPath::single(turtle_ref.name.clone());
    match space.lookup(&path) {
        crate::spaces::LookupResult::Found(r) if r.kind == crate::spaces::ReferenceKind::Turtle => {
            space.push_output(
                OutputField {
                    name: turtle_ref.name.clone(),
                    value: crate::model::ExprValue::new(
                        crate::model::AtomicFieldType::Unsupported,
                        crate::model::ExpressionKind::Scalar,
                        crate::model::EvalSpace::Output,
                        crate::model::PlanFragment::field([turtle_ref.name.as_str()]),
                    ),
                    location: Some(turtle_ref.span.clone()),
                },
                diagnostics,
            );
        }
        _ => diagnostics.push(
            Diag::error(format!("'{}' is not a defined turtle", turtle_ref.name))
                .with_primary_label(turtle_ref.span.clone(), "here"),
        ),
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
    fn group_by_produces_one_output_field() {
        let desc = QOPDesc {
            properties: vec![QP::GroupBy(crate::ast::GroupByEntry {
                field: FieldReference::Name("amount".into(), 0..6),
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (segment, output) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(diags.is_empty());
        match segment {
            PipeSegment::Reduce(r) => assert_eq!(r.fields.len(), 1),
            _ => panic!("expected reduce"),
        }
        assert_eq!(output.fields.len(), 1);
    }

    #[test]
    fn unsupported_property_is_rejected() {
        let desc = QOPDesc {
            properties: vec![QP::Sample(crate::ast::SamplePropertyAst(crate::model::SampleSpec::Rows(10)))],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (_, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn join_on_clause_not_referencing_the_join_warns() {
        let desc = QOPDesc {
            properties: vec![QP::Join(crate::ast::JoinEntry {
                name: "customers".into(),
                cardinality: crate::ast::JoinCardinality::One,
                target: crate::ast::JoinTarget::Named("customers".into()),
                on: Some(crate::ast::Expr::Literal(crate::ast::Literal::Boolean(true), 0..4)),
                span: 0..10,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (_, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(diags.iter().any(|d| d.message.contains("cross join")));
    }

    #[test]
    fn self_referencing_declare_is_a_circular_reference_not_an_unknown_field() {
        let desc = QOPDesc {
            properties: vec![QP::Declare(crate::ast::DeclareEntry {
                name: "x".into(),
                expr: crate::ast::Expr::Binary(
                    crate::ast::BinaryOp::Add,
                    Box::new(crate::ast::Expr::FieldRef(crate::ast::FieldPath::single("x"), 0..1)),
                    Box::new(crate::ast::Expr::Literal(crate::ast::Literal::Number("1".into()), 4..5)),
                    0..5,
                ),
                span: 0..5,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (_, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("circular reference"));
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
        let _ = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
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
        let _ = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'having'"));
    }

    #[test]
    fn having_on_an_aggregate_condition_is_accepted() {
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
                having: true,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (segment, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(diags.is_empty());
        match segment {
            PipeSegment::Reduce(r) => assert_eq!(r.filter_list.len(), 1),
            _ => panic!("expected reduce"),
        }
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
        let (segment, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        match segment {
            PipeSegment::Reduce(r) => assert_eq!(r.limit, Some(10)),
            _ => panic!("expected reduce"),
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
        let (segment, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(diags.is_empty());
        match segment {
            PipeSegment::Reduce(r) => {
                assert_eq!(r.limit, Some(10));
                assert_eq!(r.by, Some(crate::model::OrderByTarget::Name("amount".into())));
            }
            _ => panic!("expected reduce"),
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
        let (segment, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert_eq!(diags.len(), 1);
        match segment {
            PipeSegment::Reduce(r) => assert_eq!(r.order_by.len(), 1),
            _ => panic!("expected reduce"),
        }
    }

    #[test]
    fn join_on_clause_referencing_the_join_is_silent() {
        let desc = QOPDesc {
            properties: vec![QP::Join(crate::ast::JoinEntry {
                name: "customers".into(),
                cardinality: crate::ast::JoinCardinality::One,
                target: crate::ast::JoinTarget::Named("customers".into()),
                on: Some(crate::ast::Expr::FieldRef(
                    crate::ast::FieldPath { segments: vec!["customers".into(), "id".into()] },
                    0..10,
                )),
                span: 0..10,
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        let (_, _) = ReduceExecutor.execute(&base(), &desc, None, &mut diags);
        assert!(!diags.iter().any(|d| d.message.contains("cross join")));
    }
}
