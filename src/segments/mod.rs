//! Segment Executors (§4.4): turn an AST `QOPDesc` bag of properties into
//! a concrete `PipeSegment`, enforcing which `QueryProperty` members each
//! segment kind accepts.

pub mod index;
pub mod project;
pub mod reduce;

pub use index::IndexExecutor;
pub use project::ProjectExecutor;
pub use reduce::ReduceExecutor;

use crate::ast::{QOPDesc, SegmentKindHint};
use crate::diag::Diag;
use crate::model::{PipeSegment, StructDef};

/// The kind a segment resolves to, once `compute_type` has looked at its
/// property bag (mirrors the original's `QOPDesc.computeType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Reduce,
    Project,
    Index,
}

/// An in-progress classification while scanning a segment's properties in
/// order. `Aggregate` is provisional: a `group_by` seen later promotes it
/// to `Grouping`, but nothing demotes a `Grouping` back down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TentativeKind {
    Index,
    Grouping,
    Aggregate,
    Project,
}

impl TentativeKind {
    fn into_segment_kind(self) -> SegmentKind {
        match self {
            TentativeKind::Index => SegmentKind::Index,
            TentativeKind::Grouping | TentativeKind::Aggregate => SegmentKind::Reduce,
            TentativeKind::Project => SegmentKind::Project,
        }
    }
}

/// Looks at a segment's properties, in source order, to decide what kind
/// it is when the source didn't spell one out explicitly (§4.4
/// `QOPDesc.computeType`). The first property that fixes a kind wins:
/// `index:` ⇒ index; `group_by`/`nest`/a nested-query reference ⇒
/// grouping; a bare `aggregate` ⇒ aggregate, promoted to grouping if a
/// `group_by` appears later; a plain field/wildcard reference ⇒ project.
/// Any later property that contradicts the chosen kind is individually
/// diagnosed rather than aborting the classification. An empty bag with
/// no disambiguating property defaults to grouping, with a diagnostic.
pub fn compute_type(desc: &QOPDesc, diagnostics: &mut Vec<Diag>) -> SegmentKind {
    if let Some(hint) = desc.explicit_kind {
        return match hint {
            SegmentKindHint::Reduce => SegmentKind::Reduce,
            SegmentKindHint::Project => SegmentKind::Project,
            SegmentKindHint::Index => SegmentKind::Index,
        };
    }

    use crate::ast::QueryProperty as QP;
    let mut kind: Option<TentativeKind> = None;

    for prop in &desc.properties {
        let shape = match prop {
            QP::Index(_) => Some(TentativeKind::Index),
            QP::GroupBy(_) | QP::Nest(_) | QP::NestedQueryRef(_) => Some(TentativeKind::Grouping),
            QP::Aggregate(_) => Some(TentativeKind::Aggregate),
            QP::ProjectField(_) => Some(TentativeKind::Project),
            // Neutral across every segment kind: filters, ordering,
            // limits, joins, and declared fields don't by themselves say
            // anything about reduce vs. project vs. index.
            QP::Filter(_) | QP::Top(_) | QP::Limit(_) | QP::Ordering(_) | QP::Join(_)
            | QP::Declare(_) | QP::WeightBy(_) | QP::Sample(_) => None,
        };
        let Some(shape) = shape else { continue };

        match (kind, shape) {
            (None, shape) => kind = Some(shape),
            (Some(TentativeKind::Aggregate), TentativeKind::Grouping) => kind = Some(TentativeKind::Grouping),
            (Some(TentativeKind::Aggregate), TentativeKind::Aggregate) => {}
            (Some(existing), shape) if existing == shape => {}
            (Some(existing), shape) => {
                diagnostics.push(Diag::error(format!(
                    "'{}' is not valid in a {} segment",
                    property_label(prop),
                    kind_label(existing.into_segment_kind())
                )));
            }
        }
    }

    match kind {
        Some(k) => k.into_segment_kind(),
        None => {
            diagnostics.push(Diag::warning(
                "an empty segment has no grouping, aggregate, or project fields; defaulting to grouping",
            ));
            SegmentKind::Reduce
        }
    }
}

fn kind_label(kind: SegmentKind) -> &'static str {
    match kind {
        SegmentKind::Reduce => "reduce",
        SegmentKind::Project => "project",
        SegmentKind::Index => "index",
    }
}

fn property_label(prop: &crate::ast::QueryProperty) -> &'static str {
    use crate::ast::QueryProperty as QP;
    match prop {
        QP::GroupBy(_) => "group_by",
        QP::Aggregate(_) => "aggregate",
        QP::Nest(_) => "nest",
        QP::NestedQueryRef(_) => "nested query reference",
        QP::ProjectField(_) => "field reference",
        QP::Index(_) => "index",
        QP::Filter(_) => "filter",
        QP::Top(_) => "top",
        QP::Limit(_) => "limit",
        QP::Ordering(_) => "order_by",
        QP::Join(_) => "join",
        QP::Declare(_) => "declare",
        QP::WeightBy(_) => "weight_by",
        QP::Sample(_) => "sample",
    }
}

/// Resolves a `top: N by <expr>` clause's `by` expression into an
/// `OrderByTarget`: a bare field reference becomes `Name`, a bare integer
/// literal becomes a 1-based `Ordinal`. Anything else (`top: 10 by x + 1`)
/// isn't a valid sort target and is diagnosed instead.
pub(crate) fn order_by_target_from_expr(
    expr: &crate::ast::Expr,
    diagnostics: &mut Vec<Diag>,
) -> Option<crate::model::OrderByTarget> {
    use crate::ast::{Expr, Literal};
    match expr {
        Expr::FieldRef(path, _) if path.segments.len() == 1 => {
            Some(crate::model::OrderByTarget::Name(path.segments[0].clone()))
        }
        Expr::Literal(Literal::Number(n), span) => match n.parse::<u32>() {
            Ok(ordinal) => Some(crate::model::OrderByTarget::Ordinal(ordinal)),
            Err(_) => {
                diagnostics.push(
                    Diag::error("'top ... by' must be a field name or a positional ordinal")
                        .with_primary_label(span.clone(), "here"),
                );
                None
            }
        },
        _ => {
            diagnostics.push(Diag::error("'top ... by' must be a field name or a positional ordinal"));
            None
        }
    }
}

/// The shared contract every segment executor implements: given a
/// finalized input struct and a property bag, produce the finalized
/// `PipeSegment` plus the `StructDef` this segment outputs. Diagnostics
/// accumulate rather than aborting, per the crate-wide error cascade
/// policy (§4.7).
pub trait SegmentExecutor {
    /// `nest_parent` carries the enclosing query's input struct when this
    /// segment is part of a `nest:` pipeline (§4.2 `nestParent`), so
    /// `exclude()`/`all()` inside it can validate against the right
    /// struct; `None` at the top level. `IndexExecutor` ignores it, since
    /// an index segment can't itself be nested.
    fn execute(
        &self,
        input: &StructDef,
        desc: &QOPDesc,
        nest_parent: Option<&StructDef>,
        diagnostics: &mut Vec<Diag>,
    ) -> (PipeSegment, StructDef);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{GroupByEntry, FieldReference, QueryProperty as QP};

    #[test]
    fn empty_bag_defaults_to_grouping_with_a_diagnostic() {
        let desc = QOPDesc::default();
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Reduce);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn group_by_forces_reduce() {
        let desc = QOPDesc {
            properties: vec![QP::GroupBy(GroupByEntry {
                field: FieldReference::Name("state".into(), 0..5),
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Reduce);
        assert!(diags.is_empty());
    }

    #[test]
    fn bare_field_reference_is_project() {
        let desc = QOPDesc {
            properties: vec![QP::ProjectField(FieldReference::Name("state".into(), 0..5))],
            ..Default::default()
        };
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Project);
        assert!(diags.is_empty());
    }

    #[test]
    fn index_property_forces_index() {
        let desc = QOPDesc {
            properties: vec![QP::Index(crate::ast::IndexEntry { fields: vec![] })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Index);
        assert!(diags.is_empty());
    }

    #[test]
    fn explicit_kind_overrides_inference() {
        let desc = QOPDesc {
            explicit_kind: Some(SegmentKindHint::Project),
            properties: vec![QP::GroupBy(GroupByEntry {
                field: FieldReference::Name("state".into(), 0..5),
            })],
            ..Default::default()
        };
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Project);
    }

    #[test]
    fn bare_aggregate_promotes_to_grouping_when_group_by_follows() {
        let desc = QOPDesc {
            properties: vec![
                QP::Aggregate(crate::ast::AggregateEntry {
                    field: FieldReference::Name("total".into(), 0..5),
                }),
                QP::GroupBy(GroupByEntry {
                    field: FieldReference::Name("state".into(), 6..11),
                }),
            ],
            ..Default::default()
        };
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Reduce);
        assert!(diags.is_empty());
    }

    #[test]
    fn project_field_after_group_by_is_diagnosed() {
        let desc = QOPDesc {
            properties: vec![
                QP::GroupBy(GroupByEntry {
                    field: FieldReference::Name("state".into(), 0..5),
                }),
                QP::ProjectField(FieldReference::Name("amount".into(), 6..12)),
            ],
            ..Default::default()
        };
        let mut diags = Vec::new();
        assert_eq!(compute_type(&desc, &mut diags), SegmentKind::Reduce);
        assert_eq!(diags.len(), 1);
    }
}
