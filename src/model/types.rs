//! Type & Value Model — §4.1 of the spec.
//!
//! The vocabulary every other module builds on: atomic field types,
//! expression kinds (with their max-lattice), and the eval-space lattice.

use std::cmp::Ordering;

/// An atomic field type, as carried by a `FieldDef` or the `dataType` of an
/// `ExprValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicFieldType {
    String,
    Number,
    Boolean,
    Date,
    Timestamp,
    RegularExpression,
    Null,
    Unsupported,
    /// Internal sentinel: the result of subtracting two temporal values.
    Duration,
    /// Internal sentinel: not yet resolved (e.g. a parameter before binding).
    Unknown,
    /// Internal sentinel: type-checking already failed for this value: the
    /// error cascade (§4.3) consults this to suppress follow-on diagnostics.
    Error,
}

impl AtomicFieldType {
    /// Checks whether two types count as equal for type-checking purposes.
    /// `Error` compares equal to everything so cascading comparisons don't
    /// themselves produce spurious mismatches.
    pub fn type_eq(&self, other: &AtomicFieldType) -> bool {
        matches!(self, AtomicFieldType::Error) || matches!(other, AtomicFieldType::Error) || self == other
    }

    /// True if `self` is one of `allowed`. Mirrors the spec's `in(value,
    /// allowed[])` helper.
    pub fn is_in(&self, allowed: &[AtomicFieldType]) -> bool {
        allowed.iter().any(|t| self.type_eq(t))
    }

    /// True for `date` or `timestamp`.
    pub fn is_temporal(&self) -> bool {
        matches!(self, AtomicFieldType::Date | AtomicFieldType::Timestamp)
    }

    /// True for `number`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, AtomicFieldType::Number)
    }

    /// True for `unsupported` (§4.3 "Unsupported operands": may only
    /// participate in a null-compare or a same-raw-type equality).
    pub fn is_unsupported(&self) -> bool {
        matches!(self, AtomicFieldType::Unsupported)
    }

    /// A short, stable name used in diagnostic messages.
    pub fn inspect(&self) -> &'static str {
        match self {
            AtomicFieldType::String => "string",
            AtomicFieldType::Number => "number",
            AtomicFieldType::Boolean => "boolean",
            AtomicFieldType::Date => "date",
            AtomicFieldType::Timestamp => "timestamp",
            AtomicFieldType::RegularExpression => "regular expression",
            AtomicFieldType::Null => "null",
            AtomicFieldType::Unsupported => "unsupported",
            AtomicFieldType::Duration => "duration",
            AtomicFieldType::Unknown => "unknown",
            AtomicFieldType::Error => "error",
        }
    }
}

/// The kind of computation an expression performs. Combines via a
/// max-lattice: `scalar < aggregate|analytic < ungrouped_aggregate`, with
/// `aggregate` and `analytic` incomparable to each other except that mixing
/// them yields `analytic` (an analytic function may wrap an aggregate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpressionKind {
    Scalar,
    Aggregate,
    Analytic,
    UngroupedAggregate,
}

impl ExpressionKind {
    fn rank(self) -> u8 {
        match self {
            ExpressionKind::Scalar => 0,
            ExpressionKind::Aggregate => 1,
            ExpressionKind::Analytic => 2,
            ExpressionKind::UngroupedAggregate => 3,
        }
    }
}

/// Returns the more-derived of two expression kinds. `ungrouped_aggregate`
/// dominates everything; `analytic` dominates `aggregate`; any
/// calculation-kind dominates `scalar`.
pub fn max_expression_type(a: ExpressionKind, b: ExpressionKind) -> ExpressionKind {
    if a.rank() >= b.rank() { a } else { b }
}

/// Folds `max_expression_type` over a slice, defaulting to `Scalar` for an
/// empty slice (an expression with no operands, e.g. a bare literal).
pub fn max_of_expression_types(kinds: impl IntoIterator<Item = ExpressionKind>) -> ExpressionKind {
    kinds
        .into_iter()
        .fold(ExpressionKind::Scalar, max_expression_type)
}

/// The scope in which a value can be evaluated. Ordered `constant < literal
/// < input < output`; `merge_eval_spaces` takes the max (most-derived wins),
/// since a composite expression can only be evaluated where its
/// least-constant operand can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvalSpace {
    Constant,
    Literal,
    Input,
    Output,
}

/// Returns the max (most-derived) of two eval spaces. Commutative by
/// construction (§8 property test).
pub fn merge_eval_spaces(a: EvalSpace, b: EvalSpace) -> EvalSpace {
    a.max(b)
}

/// Folds `merge_eval_spaces` over a slice, defaulting to `Constant` for an
/// empty slice.
pub fn merge_all_eval_spaces(spaces: impl IntoIterator<Item = EvalSpace>) -> EvalSpace {
    spaces
        .into_iter()
        .fold(EvalSpace::Constant, merge_eval_spaces)
}

/// A timeframe unit used both for temporal truncation (`now.month`) and for
/// duration arithmetic (`now + 3 days`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeframeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeframeUnit {
    /// Ordering from finest to coarsest granularity, used to decide whether
    /// truncating to a coarser unit loses a granular result's precision.
    pub fn rank(self) -> u8 {
        match self {
            TimeframeUnit::Second => 0,
            TimeframeUnit::Minute => 1,
            TimeframeUnit::Hour => 2,
            TimeframeUnit::Day => 3,
            TimeframeUnit::Week => 4,
            TimeframeUnit::Month => 5,
            TimeframeUnit::Quarter => 6,
            TimeframeUnit::Year => 7,
        }
    }
}

impl std::fmt::Display for TimeframeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimeframeUnit::Second => "second",
            TimeframeUnit::Minute => "minute",
            TimeframeUnit::Hour => "hour",
            TimeframeUnit::Day => "day",
            TimeframeUnit::Week => "week",
            TimeframeUnit::Month => "month",
            TimeframeUnit::Quarter => "quarter",
            TimeframeUnit::Year => "year",
        };
        write!(f, "{name}")
    }
}

/// Orders two expression kinds without going through `Ord` directly, kept
/// as a named helper so callers reads like the spec's `maxExpressionType`.
pub fn compare_expression_kinds(a: ExpressionKind, b: ExpressionKind) -> Ordering {
    a.rank().cmp(&b.rank())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_eq_basic() {
        assert!(AtomicFieldType::Number.type_eq(&AtomicFieldType::Number));
        assert!(!AtomicFieldType::Number.type_eq(&AtomicFieldType::String));
    }

    #[test]
    fn type_eq_error_absorbs() {
        assert!(AtomicFieldType::Error.type_eq(&AtomicFieldType::String));
        assert!(AtomicFieldType::Boolean.type_eq(&AtomicFieldType::Error));
    }

    #[test]
    fn is_in_checks_membership() {
        let allowed = [AtomicFieldType::Date, AtomicFieldType::Timestamp];
        assert!(AtomicFieldType::Date.is_in(&allowed));
        assert!(!AtomicFieldType::String.is_in(&allowed));
    }

    #[test]
    fn max_expression_type_scalar_identity() {
        // property test from spec §8: maxExpressionType(kind(e), 'scalar') = kind(e)
        for kind in [
            ExpressionKind::Scalar,
            ExpressionKind::Aggregate,
            ExpressionKind::Analytic,
            ExpressionKind::UngroupedAggregate,
        ] {
            assert_eq!(max_expression_type(kind, ExpressionKind::Scalar), kind);
            assert_eq!(max_expression_type(ExpressionKind::Scalar, kind), kind);
        }
    }

    #[test]
    fn max_expression_type_ungrouped_dominates() {
        assert_eq!(
            max_expression_type(ExpressionKind::Analytic, ExpressionKind::UngroupedAggregate),
            ExpressionKind::UngroupedAggregate
        );
    }

    #[test]
    fn max_expression_type_aggregate_then_analytic_gives_analytic() {
        assert_eq!(
            max_expression_type(ExpressionKind::Aggregate, ExpressionKind::Analytic),
            ExpressionKind::Analytic
        );
    }

    #[test]
    fn merge_eval_spaces_commutative() {
        // property test from spec §8
        let spaces = [
            EvalSpace::Constant,
            EvalSpace::Literal,
            EvalSpace::Input,
            EvalSpace::Output,
        ];
        for &a in &spaces {
            for &b in &spaces {
                assert_eq!(merge_eval_spaces(a, b), merge_eval_spaces(b, a));
            }
        }
    }

    #[test]
    fn merge_eval_spaces_takes_most_derived() {
        assert_eq!(
            merge_eval_spaces(EvalSpace::Constant, EvalSpace::Output),
            EvalSpace::Output
        );
        assert_eq!(
            merge_eval_spaces(EvalSpace::Input, EvalSpace::Literal),
            EvalSpace::Input
        );
    }

    #[test]
    fn timeframe_rank_orders_coarseness() {
        assert!(TimeframeUnit::Day.rank() < TimeframeUnit::Month.rank());
        assert!(TimeframeUnit::Month.rank() < TimeframeUnit::Year.rank());
    }

    #[test]
    fn compare_expression_kinds_matches_max() {
        assert_eq!(
            compare_expression_kinds(ExpressionKind::Scalar, ExpressionKind::Aggregate),
            Ordering::Less
        );
    }
}
