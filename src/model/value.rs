//! `ExprValue` — the typed plan fragment threaded through expression
//! evaluation (§3, §4.1, §4.3, §9 "morphic/granular hints").

use std::collections::BTreeMap;

use super::types::{AtomicFieldType, EvalSpace, ExpressionKind, TimeframeUnit};

/// An opaque, dialect-independent plan fragment. The real SQL writer lives
/// outside this crate's scope (§1 Non-goals); here a fragment is just enough
/// structure for the evaluator to build up composite fragments and for
/// tests to assert on shape without depending on a SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanFragment {
    /// A field reference, as a dotted path into the input/output struct.
    FieldRef(Vec<String>),
    /// A literal value rendered as source text (e.g. `"abc"`, `42`, `true`).
    Literal(String),
    /// A unary-tagged fragment, e.g. `IS NULL`, `NOT (...)`.
    Unary { op: String, operand: Box<PlanFragment> },
    /// A binary-tagged fragment, e.g. `a = b`, `a LIKE b`.
    Binary {
        op: String,
        left: Box<PlanFragment>,
        right: Box<PlanFragment>,
    },
    /// A dialect-aware function-shaped fragment (e.g. the `div` escape hatch
    /// for division, or a `regexp_match` call); the downstream SQL writer
    /// resolves `name` per dialect.
    DialectCall {
        name: String,
        args: Vec<PlanFragment>,
    },
    /// The error sentinel: a well-formed, empty shape that participates in
    /// no further diagnostics (§4.7 error cascade).
    ErrorSentinel,
}

impl PlanFragment {
    pub fn field(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        PlanFragment::FieldRef(path.into_iter().map(Into::into).collect())
    }

    pub fn literal(text: impl Into<String>) -> Self {
        PlanFragment::Literal(text.into())
    }

    pub fn unary(op: impl Into<String>, operand: PlanFragment) -> Self {
        PlanFragment::Unary {
            op: op.into(),
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: impl Into<String>, left: PlanFragment, right: PlanFragment) -> Self {
        PlanFragment::Binary {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn dialect_call(name: impl Into<String>, args: Vec<PlanFragment>) -> Self {
        PlanFragment::DialectCall {
            name: name.into(),
            args,
        }
    }

    /// True for the error sentinel.
    pub fn is_error_sentinel(&self) -> bool {
        matches!(self, PlanFragment::ErrorSentinel)
    }
}

/// A granular result: a time value truncated to a timeframe, e.g.
/// `now.month`. Carried as an optional sidecar on `ExprValue` rather than
/// dynamically attached (§9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granularity {
    pub timeframe: TimeframeUnit,
}

/// Alternate renderings of a value under other atomic types, keyed by the
/// target type. A `date` value's morphic map typically carries a `timestamp`
/// rendering so it can satisfy comparisons against timestamp operands
/// without the caller re-deriving the cast (§4.3 "Morphing").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphicMap(BTreeMap<AtomicFieldType, PlanFragment>);

impl MorphicMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ty: AtomicFieldType, fragment: PlanFragment) -> Self {
        self.0.insert(ty, fragment);
        self
    }

    pub fn get(&self, ty: AtomicFieldType) -> Option<&PlanFragment> {
        self.0.get(&ty)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The typed plan fragment produced for every expression AST node (§3,
/// §4.1). This is the single value type threaded through the evaluator: no
/// part of the crate represents "an expression's meaning" any other way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprValue {
    pub data_type: AtomicFieldType,
    pub expression_type: ExpressionKind,
    pub eval_space: EvalSpace,
    pub value: PlanFragment,
    pub morphic: Option<MorphicMap>,
    pub granularity: Option<Granularity>,
}

impl ExprValue {
    /// Constructs a plain, non-granular, non-morphic value.
    pub fn new(
        data_type: AtomicFieldType,
        expression_type: ExpressionKind,
        eval_space: EvalSpace,
        value: PlanFragment,
    ) -> Self {
        Self {
            data_type,
            expression_type,
            eval_space,
            value,
            morphic: None,
            granularity: None,
        }
    }

    /// A literal (constant, scalar) value — the common case for numeric and
    /// string literals parsed straight from source.
    pub fn literal(data_type: AtomicFieldType, text: impl Into<String>) -> Self {
        Self::new(
            data_type,
            ExpressionKind::Scalar,
            EvalSpace::Literal,
            PlanFragment::literal(text),
        )
    }

    /// The error-typed sentinel value used by the error cascade (§4.3, §4.7):
    /// `expression_type` is taken from the caller because an error value
    /// still carries the max expression-kind of its failed operands, so a
    /// `sum(bad_field)` remains aggregate-kinded even though it errors.
    pub fn error(expression_type: ExpressionKind, eval_space: EvalSpace) -> Self {
        Self::new(
            AtomicFieldType::Error,
            expression_type,
            eval_space,
            PlanFragment::ErrorSentinel,
        )
    }

    pub fn is_error(&self) -> bool {
        self.data_type == AtomicFieldType::Error
    }

    pub fn with_morphic(mut self, morphic: MorphicMap) -> Self {
        self.morphic = Some(morphic);
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Returns a rendering of this value as `target`, either directly (if
    /// `data_type` already matches) or via the morphic map. `None` if
    /// neither applies — the caller is then responsible for a diagnostic.
    pub fn morph_to(&self, target: AtomicFieldType) -> Option<PlanFragment> {
        if self.data_type.type_eq(&target) {
            return Some(self.value.clone());
        }
        self.morphic.as_ref().and_then(|m| m.get(target)).cloned()
    }

    /// A granular result only remains granular across an operation if the
    /// other operand's timeframe (e.g. a duration's unit) matches exactly
    /// (§4.3 "Granularity propagation").
    pub fn granularity_survives(&self, other_unit: TimeframeUnit) -> Option<Granularity> {
        self.granularity
            .filter(|g| g.timeframe == other_unit)
            .copied()
    }
}
