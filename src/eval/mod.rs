//! Expression Evaluator (§4.3): walks an `Expr` AST node against a field
//! space, producing an `ExprValue`. Binary operator dispatch, including
//! granularity/morphing rules, lives in `binary`.

pub mod binary;

use crate::ast::{AggregateCall, AnalyticCall, Applyable, BinaryOp, DurationExpr, Expr, Literal};
use crate::diag::Diag;
use crate::model::{
    max_expression_type, merge_eval_spaces, AtomicFieldType, EvalSpace, ExprValue, ExpressionKind,
    PlanFragment,
};
use crate::spaces::{FieldSpace, LookupResult, ReferenceKind};

/// Evaluates `expr` against `space`, pushing any diagnostics produced
/// along the way. Never panics: every failure path returns an error
/// sentinel `ExprValue` instead (§4.7 error cascade).
pub fn evaluate(expr: &Expr, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    match expr {
        Expr::Literal(lit, _span) => evaluate_literal(lit),
        Expr::FieldRef(path, span) => evaluate_field_ref(path, *span, space, diagnostics),
        Expr::Binary(op, left, right, span) => {
            let l = evaluate(left, space, diagnostics);
            // A `Partial`/`Alternation` right-hand operand rewrites how the
            // operator applies instead of evaluating directly (§4.3, §9).
            if let Some(rewritten) = right.rewrite_application(*op, left) {
                return evaluate(&rewritten, space, diagnostics);
            }
            let r = evaluate(right, space, diagnostics);
            binary::apply_binary_op(*op, l, r, span.clone(), diagnostics)
        }
        Expr::Not(inner, span) => evaluate_not(inner, *span, space, diagnostics),
        Expr::Duration(duration, _span) => evaluate_duration(duration, space, diagnostics),
        Expr::Aggregate(call, span) => evaluate_aggregate(call, *span, space, diagnostics),
        Expr::Analytic(call, span) => evaluate_analytic(call, *span, space, diagnostics),
        Expr::Ungroup(call, span) => evaluate_ungroup(call, *span, space, diagnostics),
        Expr::Partial(_, _, span) => {
            diagnostics.push(
                Diag::error("a partial comparison must be combined with a value on its left")
                    .with_primary_label(span.clone(), "here"),
            );
            ExprValue::error(ExpressionKind::Scalar, EvalSpace::Constant)
        }
        Expr::Alternation(members, span) => evaluate_alternation(members, *span, space, diagnostics),
        Expr::Cast { expr, target, span } => evaluate_cast(expr, *target, *span, space, diagnostics),
    }
}

fn evaluate_literal(lit: &Literal) -> ExprValue {
    match lit {
        Literal::String(s) => ExprValue::literal(AtomicFieldType::String, format!("'{s}'")),
        Literal::Number(n) => ExprValue::literal(AtomicFieldType::Number, n.clone()),
        Literal::Boolean(b) => ExprValue::literal(AtomicFieldType::Boolean, b.to_string()),
        Literal::Null => ExprValue::literal(AtomicFieldType::Null, "null"),
        Literal::Date(d) => ExprValue::literal(AtomicFieldType::Date, format!("@{d}")),
        Literal::Timestamp(t) => ExprValue::literal(AtomicFieldType::Timestamp, format!("@{t}")),
        Literal::Regex(r) => ExprValue::literal(AtomicFieldType::RegularExpression, format!("r'{r}'")),
    }
}

fn evaluate_field_ref(path: &crate::ast::FieldPath, span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    match space.lookup(path) {
        LookupResult::Found(reference) => match reference.kind {
            ReferenceKind::Column => {
                let data_type = match &reference.entry {
                    crate::spaces::SpaceEntry::Column {
                        def: crate::model::FieldDef::Atomic { data_type, .. },
                        ..
                    } => *data_type,
                    _ => AtomicFieldType::Unknown,
                };
                ExprValue::new(
                    data_type,
                    ExpressionKind::Scalar,
                    EvalSpace::Input,
                    PlanFragment::field(path.segments.iter().map(|s| s.as_str())),
                )
            }
            ReferenceKind::Parameter => {
                if let crate::spaces::SpaceEntry::Parameter { param, .. } = &reference.entry {
                    param_value(param, path, span, diagnostics)
                } else {
                    ExprValue::error(ExpressionKind::Scalar, EvalSpace::Constant)
                }
            }
            ReferenceKind::Join | ReferenceKind::Turtle | ReferenceKind::Wild | ReferenceKind::Rename => {
                diagnostics.push(
                    Diag::error(format!("'{}' is not a scalar value", path.segments.join(".")))
                        .with_primary_label(span, "here"),
                );
                ExprValue::error(ExpressionKind::Scalar, EvalSpace::Constant)
            }
        },
        LookupResult::NotFound => {
            diagnostics.push(
                Diag::error(format!("'{}' is not defined", path.segments.join(".")))
                    .with_primary_label(span, "here"),
            );
            ExprValue::error(ExpressionKind::Scalar, EvalSpace::Constant)
        }
    }
}

fn param_value(param: &crate::model::Parameter, path: &crate::ast::FieldPath, span: crate::ast::Span, diagnostics: &mut Vec<Diag>) -> ExprValue {
    match param {
        crate::model::Parameter::Value { value: Some(v), .. } => v.clone(),
        crate::model::Parameter::Condition { condition: Some(c), .. } => c.clone(),
        _ => {
            diagnostics.push(
                Diag::error(format!("parameter '{}' has no value bound", path.segments.join(".")))
                    .with_primary_label(span, "here"),
            );
            ExprValue::error(ExpressionKind::Scalar, EvalSpace::Constant)
        }
    }
}

fn evaluate_not(inner: &Expr, span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    let value = evaluate(inner, space, diagnostics);
    if value.is_error() {
        return value;
    }
    if value.data_type != AtomicFieldType::Boolean {
        diagnostics.push(Diag::error("'not' requires a boolean operand").with_primary_label(span, "here"));
        return ExprValue::error(value.expression_type, value.eval_space);
    }
    ExprValue::new(
        AtomicFieldType::Boolean,
        value.expression_type,
        value.eval_space,
        PlanFragment::unary("not", value.value),
    )
}

fn evaluate_duration(duration: &DurationExpr, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    let count = evaluate(&duration.count, space, diagnostics);
    if count.is_error() {
        return count;
    }
    if !count.data_type.is_numeric() {
        diagnostics.push(Diag::error("a duration count must be numeric"));
        return ExprValue::error(count.expression_type, count.eval_space);
    }
    ExprValue::new(
        AtomicFieldType::Duration,
        count.expression_type,
        count.eval_space,
        PlanFragment::dialect_call(format!("interval_{}", duration.unit), vec![count.value]),
    )
    // A duration's own unit rides in the `granularity` sidecar so additive
    // dispatch (§4.3 "Granularity propagation") can compare it against the
    // left operand's truncation unit without a separate field.
    .with_granularity(crate::model::Granularity { timeframe: duration.unit })
}

const AGGREGATE_FUNCTIONS: &[&str] = &["sum", "count", "avg", "min", "max"];

fn evaluate_aggregate(call: &AggregateCall, span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    if !AGGREGATE_FUNCTIONS.contains(&call.name.as_str()) {
        diagnostics.push(Diag::error(format!("'{}' is not a known aggregate function", call.name)).with_primary_label(span.clone(), "here"));
        return ExprValue::error(ExpressionKind::Aggregate, EvalSpace::Constant);
    }
    let arg = call.arg.as_ref().map(|a| evaluate(a, space, diagnostics));
    if let Some(arg) = &arg {
        if arg.is_error() {
            return ExprValue::error(ExpressionKind::Aggregate, arg.eval_space);
        }
    }
    let data_type = match (call.name.as_str(), &arg) {
        ("count", _) => AtomicFieldType::Number,
        ("min" | "max", Some(a)) => a.data_type,
        (_, Some(a)) => {
            if !a.data_type.is_numeric() {
                diagnostics.push(
                    Diag::error(format!("'{}' requires a numeric argument", call.name)).with_primary_label(span, "here"),
                );
                return ExprValue::error(ExpressionKind::Aggregate, EvalSpace::Output);
            }
            AtomicFieldType::Number
        }
        (_, None) => AtomicFieldType::Number,
    };
    let args = arg.map(|a| vec![a.value]).unwrap_or_default();
    ExprValue::new(
        data_type,
        ExpressionKind::Aggregate,
        EvalSpace::Output,
        PlanFragment::dialect_call(call.name.to_string(), args),
    )
}

const ANALYTIC_FUNCTIONS: &[&str] = &["lag", "lead", "rank", "row_number", "avg_moving"];

fn evaluate_analytic(call: &AnalyticCall, span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    if !ANALYTIC_FUNCTIONS.contains(&call.name.as_str()) {
        diagnostics.push(Diag::error(format!("'{}' is not a known analytic function", call.name)).with_primary_label(span, "here"));
        return ExprValue::error(ExpressionKind::Analytic, EvalSpace::Constant);
    }
    let args: Vec<ExprValue> = call.args.iter().map(|a| evaluate(a, space, diagnostics)).collect();
    if args.iter().any(|a| a.is_error()) {
        return ExprValue::error(ExpressionKind::Analytic, EvalSpace::Output);
    }
    let data_type = if call.name == "rank" || call.name == "row_number" {
        AtomicFieldType::Number
    } else {
        args.first().map(|a| a.data_type).unwrap_or(AtomicFieldType::Number)
    };
    ExprValue::new(
        data_type,
        ExpressionKind::Analytic,
        EvalSpace::Output,
        PlanFragment::dialect_call(call.name.to_string(), args.into_iter().map(|a| a.value).collect()),
    )
}

fn evaluate_ungroup(call: &crate::ast::UngroupCall, span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    let inner = evaluate(&call.expr, space, diagnostics);
    if inner.is_error() {
        return inner;
    }
    if inner.expression_type != ExpressionKind::Aggregate {
        diagnostics.push(
            Diag::error("exclude()/all() can only wrap an aggregate expression").with_primary_label(span, "here"),
        );
        return ExprValue::error(ExpressionKind::UngroupedAggregate, inner.eval_space);
    }
    let name = if call.all { "all" } else { "exclude" };
    let mut args = vec![inner.value];
    for field in &call.exclude_fields {
        if let Some(parent) = space.nest_parent() {
            if parent.field_named(field.as_str()).is_none() {
                diagnostics.push(
                    Diag::error(format!("exclude() '{field}' is missing from query output"))
                        .with_primary_label(span.clone(), "here"),
                );
            }
        }
        args.push(PlanFragment::field([field.as_str()]));
    }
    ExprValue::new(inner.data_type, ExpressionKind::UngroupedAggregate, inner.eval_space, PlanFragment::dialect_call(name, args))
}

fn evaluate_alternation(members: &[Expr], span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    diagnostics.push(
        Diag::error("an alternation must be combined with a value on its left")
            .with_primary_label(span, "here"),
    );
    let kinds = members.iter().map(|_| ExpressionKind::Scalar);
    ExprValue::error(max_expression_type(
        crate::model::max_of_expression_types(kinds),
        ExpressionKind::Scalar,
    ), merge_eval_spaces(EvalSpace::Constant, EvalSpace::Constant))
}

fn evaluate_cast(inner: &Expr, target: crate::ast::TypeName, _span: crate::ast::Span, space: &dyn FieldSpace, diagnostics: &mut Vec<Diag>) -> ExprValue {
    let value = evaluate(inner, space, diagnostics);
    if value.is_error() {
        return value;
    }
    cast_value(value, target.to_atomic())
}

/// Morphs (or, failing that, wraps in an explicit `cast` dialect call) an
/// already-evaluated value onto `target_type`. Used both by `cast(x as t)`
/// source syntax and by parameter binding, where a supplied value whose
/// type differs from the parameter's declared type is cast rather than
/// rejected (§4.6 `NamedSource`: "assign (casting if the source value type
/// differs)").
pub fn cast_value(value: ExprValue, target_type: AtomicFieldType) -> ExprValue {
    if value.data_type == target_type {
        return value;
    }
    let fragment = value
        .morph_to(target_type)
        .unwrap_or_else(|| PlanFragment::dialect_call("cast", vec![value.value.clone()]));
    ExprValue::new(target_type, value.expression_type, value.eval_space, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FieldPath, Literal};
    use crate::model::{FieldDef, StructDef};
    use crate::spaces::StaticSpace;

    fn sample_space() -> StaticSpace {
        StaticSpace::new(StructDef::new("orders", "standardsql").with_fields(vec![FieldDef::Atomic {
            name: "amount".into(),
            data_type: AtomicFieldType::Number,
            location: None,
        }]))
    }

    #[test]
    fn literal_number_evaluates_to_number() {
        let mut diags = Vec::new();
        let v = evaluate(&Expr::Literal(Literal::Number("3".into()), 0..1), &StaticSpace::new(StructDef::new("t", "standardsql")), &mut diags);
        assert_eq!(v.data_type, AtomicFieldType::Number);
        assert!(diags.is_empty());
    }

    #[test]
    fn field_ref_resolves_against_space() {
        let mut diags = Vec::new();
        let space = sample_space();
        let v = evaluate(&Expr::FieldRef(FieldPath::single("amount"), 0..6), &space, &mut diags);
        assert_eq!(v.data_type, AtomicFieldType::Number);
        assert!(diags.is_empty());
    }

    #[test]
    fn unknown_field_ref_is_error_with_diagnostic() {
        let mut diags = Vec::new();
        let space = sample_space();
        let v = evaluate(&Expr::FieldRef(FieldPath::single("missing"), 0..7), &space, &mut diags);
        assert!(v.is_error());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn sum_aggregate_is_output_space_number() {
        let mut diags = Vec::new();
        let space = sample_space();
        let call = AggregateCall {
            name: "sum".into(),
            arg: Some(Box::new(Expr::FieldRef(FieldPath::single("amount"), 0..6))),
        };
        let v = evaluate_aggregate(&call, 0..10, &space, &mut diags);
        assert_eq!(v.expression_type, ExpressionKind::Aggregate);
        assert_eq!(v.eval_space, EvalSpace::Output);
        assert!(diags.is_empty());
    }

    #[test]
    fn ungroup_requires_aggregate_operand() {
        let mut diags = Vec::new();
        let space = sample_space();
        let call = crate::ast::UngroupCall {
            all: true,
            expr: Box::new(Expr::FieldRef(FieldPath::single("amount"), 0..6)),
            exclude_fields: vec![],
        };
        let v = evaluate_ungroup(&call, 0..10, &space, &mut diags);
        assert!(v.is_error());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn exclude_rejects_a_field_missing_from_the_nest_parent() {
        let mut diags = Vec::new();
        let space = crate::spaces::ReduceFieldSpace::new(sample_space().struct_def().clone())
            .with_nest_parent(sample_space().struct_def().clone());
        let call = crate::ast::UngroupCall {
            all: false,
            expr: Box::new(Expr::Aggregate(
                AggregateCall {
                    name: "sum".into(),
                    arg: Some(Box::new(Expr::FieldRef(FieldPath::single("amount"), 0..6))),
                },
                0..10,
            )),
            exclude_fields: vec!["missing".into()],
        };
        let v = evaluate_ungroup(&call, 0..10, &space, &mut diags);
        assert!(!v.is_error());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("missing from query output"));
    }

    #[test]
    fn exclude_accepts_a_field_present_on_the_nest_parent() {
        let mut diags = Vec::new();
        let space = crate::spaces::ReduceFieldSpace::new(sample_space().struct_def().clone())
            .with_nest_parent(sample_space().struct_def().clone());
        let call = crate::ast::UngroupCall {
            all: false,
            expr: Box::new(Expr::Aggregate(
                AggregateCall {
                    name: "sum".into(),
                    arg: Some(Box::new(Expr::FieldRef(FieldPath::single("amount"), 0..6))),
                },
                0..10,
            )),
            exclude_fields: vec!["amount".into()],
        };
        let v = evaluate_ungroup(&call, 0..10, &space, &mut diags);
        assert!(!v.is_error());
        assert!(diags.is_empty());
    }

    #[test]
    fn bare_partial_is_an_error() {
        let mut diags = Vec::new();
        let space = sample_space();
        let partial = Expr::Partial(BinaryOp::Gt, Box::new(Expr::Literal(Literal::Number("3".into()), 0..1)), 0..3);
        let v = evaluate(&partial, &space, &mut diags);
        assert!(v.is_error());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn comparison_against_partial_right_operand_rewrites() {
        let mut diags = Vec::new();
        let space = sample_space();
        let left = Expr::FieldRef(FieldPath::single("amount"), 0..6);
        let partial = Expr::Partial(BinaryOp::Gt, Box::new(Expr::Literal(Literal::Number("3".into()), 9..10)), 7..10);
        let expr = Expr::Binary(BinaryOp::Eq, Box::new(left), Box::new(partial), 0..10);
        let v = evaluate(&expr, &space, &mut diags);
        assert_eq!(v.data_type, AtomicFieldType::Boolean);
        assert!(diags.is_empty());
    }
}
