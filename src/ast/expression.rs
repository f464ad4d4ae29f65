//! The expression AST vocabulary the evaluator (`eval`) consumes. This is
//! the "Expression" sum type called for in §9's class-hierarchy guidance:
//! one flat enum per category instead of the original's deep `ExpressionDef`
//! inheritance chain, with `ExpressionDef.apply`'s override hook modeled as
//! the `Applyable` trait at the bottom of this file.

use smol_str::SmolStr;

use super::span::Span;
use crate::model::TimeframeUnit;

/// A binary operator, grouped the way §4.3's dispatcher table groups them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    MatchRegex,
    NotMatchRegex,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Mod,
    Div,
}

impl BinaryOp {
    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::MatchRegex | BinaryOp::NotMatchRegex)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_additive(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub)
    }

    pub fn is_multiplicative(&self) -> bool {
        matches!(self, BinaryOp::Mul | BinaryOp::Mod | BinaryOp::Div)
    }

    /// The negated form used by `nullsafeNot` (§4.3).
    pub fn negate(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::MatchRegex => Some(BinaryOp::NotMatchRegex),
            BinaryOp::NotMatchRegex => Some(BinaryOp::MatchRegex),
            _ => None,
        }
    }
}

/// A literal value as written in source, before type-checking assigns it an
/// `AtomicFieldType`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(String),
    Boolean(bool),
    Null,
    Date(String),
    Timestamp(String),
    Regex(String),
}

/// A dotted path, e.g. `orders.customer.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub segments: Vec<SmolStr>,
}

impl FieldPath {
    pub fn single(name: impl Into<SmolStr>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }
}

/// A duration literal/expression, e.g. `3 days`. Modeled as its own node
/// (mirroring the original's `ExprDuration`) so the `+`/`-` dispatcher can
/// special-case it instead of treating it as a generic scalar (§4.3
/// additive rule).
#[derive(Debug, Clone, PartialEq)]
pub struct DurationExpr {
    pub count: Box<Expr>,
    pub unit: TimeframeUnit,
}

/// An aggregate function call, e.g. `sum(amount)`, `count()`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub name: SmolStr,
    pub arg: Option<Box<Expr>>,
}

/// An analytic (window) function call, e.g. `lag(x)`, `rank()`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticCall {
    pub name: SmolStr,
    pub args: Vec<Expr>,
}

/// `exclude()`/`all()` ungrouping: a back-reference from a nested query to
/// the enclosing query's output (§4.2 `nestParent`, §8 scenario 6).
/// `all(sum(amount), region)` wraps the aggregate it ungroups in `expr` and
/// names the grouping fields that survive the ungroup in `exclude_fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct UngroupCall {
    pub all: bool,
    pub expr: Box<Expr>,
    pub exclude_fields: Vec<SmolStr>,
}

/// An expression AST node. Grouped as one flat enum per §9's guidance
/// instead of a class hierarchy; `ExpressionDef.apply`-style overrides are
/// modeled by the `Applyable` trait below for the handful of node kinds
/// that need to rewrite operator application (alternation trees, duration
/// literals).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal, Span),
    FieldRef(FieldPath, Span),
    Binary(BinaryOp, Box<Expr>, Box<Expr>, Span),
    Not(Box<Expr>, Span),
    Duration(DurationExpr, Span),
    Aggregate(AggregateCall, Span),
    Analytic(AnalyticCall, Span),
    Ungroup(UngroupCall, Span),
    /// `x > 3 or x < 1` alternation sugar; partial comparisons (`> 3`, `< 1`)
    /// are represented as `Partial` nodes whose `apply` rewrites them once
    /// the left-hand operand is known (§4.3 `ExpressionDef.apply`).
    Partial(BinaryOp, Box<Expr>, Span),
    Alternation(Vec<Expr>, Span),
    Cast {
        expr: Box<Expr>,
        target: super::types::TypeName,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, s)
            | Expr::FieldRef(_, s)
            | Expr::Binary(_, _, _, s)
            | Expr::Not(_, s)
            | Expr::Duration(_, s)
            | Expr::Aggregate(_, s)
            | Expr::Analytic(_, s)
            | Expr::Ungroup(_, s)
            | Expr::Partial(_, _, s)
            | Expr::Alternation(_, s)
            | Expr::Cast { span: s, .. } => s.clone(),
        }
    }

    /// Whether any `FieldRef` in this expression's tree leads with `name`,
    /// e.g. `customers.id = orders.customer_id` references both `customers`
    /// and `orders`. Used by the join `on`-clause disconnected-join lint.
    pub fn references_name(&self, name: &str) -> bool {
        match self {
            Expr::FieldRef(path, _) => path.segments.first().is_some_and(|s| s == name),
            Expr::Binary(_, l, r, _) => l.references_name(name) || r.references_name(name),
            Expr::Not(e, _) | Expr::Cast { expr: e, .. } => e.references_name(name),
            Expr::Partial(_, e, _) => e.references_name(name),
            Expr::Alternation(members, _) => members.iter().any(|m| m.references_name(name)),
            Expr::Aggregate(call, _) => call.arg.as_ref().is_some_and(|a| a.references_name(name)),
            Expr::Analytic(call, _) => call.args.iter().any(|a| a.references_name(name)),
            Expr::Ungroup(call, _) => call.expr.references_name(name),
            Expr::Duration(d, _) => d.count.references_name(name),
            Expr::Literal(..) => false,
        }
    }
}

/// Overridable hook mirroring the original `ExpressionDef.apply`: given a
/// left-hand `ExprValue` already evaluated and an operator, a node may
/// rewrite how that operator is applied instead of going through the
/// generic binary dispatcher (§4.3, §9).
pub trait Applyable {
    /// Returns `Some(rewritten)` if this node overrides default operator
    /// application; `None` to fall through to the generic dispatcher.
    fn rewrite_application(&self, _op: BinaryOp, _left: &Expr) -> Option<Expr> {
        None
    }
}

impl Applyable for Expr {
    fn rewrite_application(&self, op: BinaryOp, left: &Expr) -> Option<Expr> {
        match self {
            // `x > (3 or 5)` applies `x > _` across every alternation member.
            Expr::Alternation(members, span) => Some(Expr::Alternation(
                members
                    .iter()
                    .map(|m| Expr::Binary(op, Box::new(left.clone()), Box::new(m.clone()), span.clone()))
                    .collect(),
                span.clone(),
            )),
            // A partial comparison `> 3` composed onto `x` becomes `x > 3`.
            Expr::Partial(inner_op, rhs, span) => Some(Expr::Binary(
                *inner_op,
                Box::new(left.clone()),
                rhs.clone(),
                span.clone(),
            )),
            _ => None,
        }
    }
}
