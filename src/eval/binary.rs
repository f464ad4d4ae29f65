//! Binary operator dispatch table (§4.3). One function per operator
//! family instead of the original's per-operator `ExpressionDef`
//! subclass, grouped the way `BinaryOp::is_equality`/`is_comparison`/etc.
//! group them.

use crate::ast::BinaryOp;
use crate::diag::Diag;
use crate::model::{
    max_expression_type, merge_eval_spaces, AtomicFieldType, ExprValue, PlanFragment,
};

/// Applies `op` to already-evaluated operands, producing the resulting
/// `ExprValue`. Error operands are absorbed per §4.7's cascade rule:
/// no new diagnostic is raised for an operation whose operand is already
/// an error sentinel.
pub fn apply_binary_op(op: BinaryOp, left: ExprValue, right: ExprValue, span: crate::ast::Span, diagnostics: &mut Vec<Diag>) -> ExprValue {
    let expression_type = max_expression_type(left.expression_type, right.expression_type);
    let eval_space = merge_eval_spaces(left.eval_space, right.eval_space);

    if left.is_error() || right.is_error() {
        return ExprValue::error(expression_type, eval_space);
    }

    if op.is_equality() {
        return apply_equality(op, left, right, expression_type, eval_space, span, diagnostics);
    }
    if op.is_comparison() {
        return apply_comparison(op, left, right, expression_type, eval_space, span, diagnostics);
    }
    if op.is_additive() {
        return apply_additive(op, left, right, expression_type, eval_space, span, diagnostics);
    }
    apply_multiplicative(op, left, right, expression_type, eval_space, span, diagnostics)
}

fn types_comparable(a: AtomicFieldType, b: AtomicFieldType) -> bool {
    a.type_eq(&b) || a == AtomicFieldType::Null || b == AtomicFieldType::Null
}

/// Null-safe equality/regex dispatch (§4.3 table, row "equality"). Either
/// side being `null` always short-circuits to an `IS [NOT] NULL` fragment
/// before any of the regex/LIKE/morph rules below get a chance to run,
/// since comparing anything to `null` is never a type error.
fn apply_equality(
    op: BinaryOp,
    left: ExprValue,
    right: ExprValue,
    expression_type: crate::model::ExpressionKind,
    eval_space: crate::model::EvalSpace,
    span: crate::ast::Span,
    diagnostics: &mut Vec<Diag>,
) -> ExprValue {
    let negate = matches!(op, BinaryOp::Ne | BinaryOp::NotMatchRegex);
    if right.data_type == AtomicFieldType::Null || left.data_type == AtomicFieldType::Null {
        let subject = if left.data_type == AtomicFieldType::Null { right.value } else { left.value };
        let null_check = PlanFragment::unary(if negate { "is not null" } else { "is null" }, subject);
        return ExprValue::new(AtomicFieldType::Boolean, expression_type, eval_space, null_check);
    }

    if matches!(op, BinaryOp::MatchRegex | BinaryOp::NotMatchRegex) {
        if left.data_type != AtomicFieldType::String {
            diagnostics.push(
                Diag::error("left-hand side of a regular expression match must be a string")
                    .with_primary_label(span, "expected string"),
            );
            return ExprValue::error(expression_type, eval_space);
        }
        let fragment = match right.data_type {
            AtomicFieldType::RegularExpression => {
                let call = PlanFragment::dialect_call("regexp_match", vec![left.value, right.value]);
                if negate { PlanFragment::unary("not", call) } else { call }
            }
            AtomicFieldType::String => {
                let call = PlanFragment::binary("like", left.value, right.value);
                if negate { PlanFragment::unary("not", call) } else { call }
            }
            _ => {
                diagnostics.push(
                    Diag::error("right-hand side of a regular expression match must be a string or regular expression")
                        .with_primary_label(span, "here"),
                );
                return ExprValue::error(expression_type, eval_space);
            }
        };
        return ExprValue::new(AtomicFieldType::Boolean, expression_type, eval_space, fragment);
    }

    if !types_comparable(left.data_type, right.data_type) {
        if left.data_type.is_unsupported() || right.data_type.is_unsupported() {
            if left.data_type == right.data_type {
                return ExprValue::new(
                    AtomicFieldType::Boolean,
                    expression_type,
                    eval_space,
                    PlanFragment::binary(op_symbol(op), left.value, right.value),
                );
            }
            diagnostics.push(
                Diag::error("an unsupported-type value can only be compared to one of the same raw type")
                    .with_primary_label(span, "here"),
            );
            return ExprValue::error(expression_type, eval_space);
        }
        diagnostics.push(
            Diag::error(format!(
                "cannot compare {} to {}",
                left.data_type.inspect(),
                right.data_type.inspect()
            ))
            .with_primary_label(span, "here"),
        );
        return ExprValue::error(expression_type, eval_space);
    }

    let (left_value, right_value) = morph_temporal_pair(&left, &right);
    ExprValue::new(
        AtomicFieldType::Boolean,
        expression_type,
        eval_space,
        PlanFragment::binary(op_symbol(op), left_value, right_value),
    )
}

/// When both operands are temporal but disagree (a `date` against a
/// `timestamp`), morph the coarser one up to `timestamp` before emitting
/// the comparison fragment (§4.3 "Morphing").
fn morph_temporal_pair(left: &ExprValue, right: &ExprValue) -> (PlanFragment, PlanFragment) {
    if left.data_type.is_temporal() && right.data_type.is_temporal() && left.data_type != right.data_type {
        let l = left.morph_to(AtomicFieldType::Timestamp).unwrap_or_else(|| left.value.clone());
        let r = right.morph_to(AtomicFieldType::Timestamp).unwrap_or_else(|| right.value.clone());
        return (l, r);
    }
    (left.value.clone(), right.value.clone())
}

fn apply_comparison(
    op: BinaryOp,
    left: ExprValue,
    right: ExprValue,
    expression_type: crate::model::ExpressionKind,
    eval_space: crate::model::EvalSpace,
    span: crate::ast::Span,
    diagnostics: &mut Vec<Diag>,
) -> ExprValue {
    if right.data_type == AtomicFieldType::Null || left.data_type == AtomicFieldType::Null {
        let subject = if left.data_type == AtomicFieldType::Null { right.value } else { left.value };
        return ExprValue::new(
            AtomicFieldType::Boolean,
            expression_type,
            eval_space,
            PlanFragment::unary("is null", subject),
        );
    }

    let orderable = left.data_type.is_numeric() || left.data_type.is_temporal() || left.data_type == AtomicFieldType::String;
    // Time compared to a non-time, non-null operand is a diagnosed mismatch
    // that still folds to a well-formed `false` rather than an error
    // sentinel (§9 "comparison": the result is known statically, not
    // merely unrepresentable).
    if left.data_type.is_temporal() != right.data_type.is_temporal() && (left.data_type.is_temporal() || right.data_type.is_temporal()) {
        diagnostics.push(
            Diag::error(format!("cannot compare a time value to {}", {
                if left.data_type.is_temporal() { right.data_type.inspect() } else { left.data_type.inspect() }
            }))
            .with_primary_label(span, "here"),
        );
        return ExprValue::new(AtomicFieldType::Boolean, expression_type, eval_space, PlanFragment::literal("false"));
    }
    if !orderable || !types_comparable(left.data_type, right.data_type) {
        diagnostics.push(
            Diag::error(format!("'{}' is not valid between {} and {}", op_symbol(op), left.data_type.inspect(), right.data_type.inspect()))
                .with_primary_label(span, "here"),
        );
        return ExprValue::error(expression_type, eval_space);
    }
    let (left_value, right_value) = morph_temporal_pair(&left, &right);
    ExprValue::new(
        AtomicFieldType::Boolean,
        expression_type,
        eval_space,
        PlanFragment::binary(op_symbol(op), left_value, right_value),
    )
}

fn apply_additive(
    op: BinaryOp,
    left: ExprValue,
    right: ExprValue,
    expression_type: crate::model::ExpressionKind,
    eval_space: crate::model::EvalSpace,
    span: crate::ast::Span,
    diagnostics: &mut Vec<Diag>,
) -> ExprValue {
    // date/timestamp +/- duration: result keeps the temporal type. Left's
    // granularity survives only if the duration's own unit matches it
    // exactly (§4.3 "Granularity propagation"); otherwise the result is
    // non-granular, even though it is still a valid date/timestamp.
    if left.data_type.is_temporal() && right.data_type == AtomicFieldType::Duration {
        let mut result = ExprValue::new(
            left.data_type,
            expression_type,
            eval_space,
            PlanFragment::binary(op_symbol(op), left.value, right.value),
        );
        if let Some(unit) = right.granularity.map(|g| g.timeframe) {
            if let Some(g) = left.granularity_survives(unit) {
                result = result.with_granularity(g);
            }
        }
        return result;
    }
    if !left.data_type.is_numeric() || !right.data_type.is_numeric() {
        diagnostics.push(
            Diag::error(format!("'{}' requires numeric operands, found {} and {}", op_symbol(op), left.data_type.inspect(), right.data_type.inspect()))
                .with_primary_label(span, "here"),
        );
        return ExprValue::error(expression_type, eval_space);
    }
    ExprValue::new(
        AtomicFieldType::Number,
        expression_type,
        eval_space,
        PlanFragment::binary(op_symbol(op), left.value, right.value),
    )
}

fn apply_multiplicative(
    op: BinaryOp,
    left: ExprValue,
    right: ExprValue,
    expression_type: crate::model::ExpressionKind,
    eval_space: crate::model::EvalSpace,
    span: crate::ast::Span,
    diagnostics: &mut Vec<Diag>,
) -> ExprValue {
    if !left.data_type.is_numeric() || !right.data_type.is_numeric() {
        diagnostics.push(
            Diag::error(format!("'{}' requires numeric operands, found {} and {}", op_symbol(op), left.data_type.inspect(), right.data_type.inspect()))
                .with_primary_label(span, "here"),
        );
        return ExprValue::error(expression_type, eval_space);
    }
    let value = if op == BinaryOp::Div {
        // Division goes through a dialect call so the SQL writer can apply
        // its own divide-by-zero guard (§4.3 "div" dialect escape).
        PlanFragment::dialect_call("safe_divide", vec![left.value, right.value])
    } else {
        PlanFragment::binary(op_symbol(op), left.value, right.value)
    };
    ExprValue::new(AtomicFieldType::Number, expression_type, eval_space, value)
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "!=",
        BinaryOp::MatchRegex => "~",
        BinaryOp::NotMatchRegex => "!~",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Mod => "%",
        BinaryOp::Div => "/",
    }
}
