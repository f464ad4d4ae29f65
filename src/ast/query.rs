//! AST vocabulary for pipeline segments, explores, and sources — the
//! `QueryProperty`/`ExploreProperty`/`Source` sum types called for by §9.

use smol_str::SmolStr;

use super::expression::Expr;
use super::span::Span;
use crate::model::{OrderByTarget, SampleSpec, SortDirection};

/// A single reference used in `group_by`, `project`, `accept`/`except`, an
/// index's `fields:`, or a wildcard.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldReference {
    Name(SmolStr, Span),
    /// `a.b.c` — a defined field whose value is an expression, given an
    /// explicit output name.
    Named {
        name: SmolStr,
        expr: Expr,
        span: Span,
    },
    /// `*` (this struct's fields only) or `**` (recursive through joins).
    Wildcard { recursive: bool, span: Span },
}

impl FieldReference {
    pub fn span(&self) -> Span {
        match self {
            FieldReference::Name(_, s) => s.clone(),
            FieldReference::Named { span, .. } => span.clone(),
            FieldReference::Wildcard { span, .. } => span.clone(),
        }
    }
}

/// One `group_by:` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByEntry {
    pub field: FieldReference,
}

/// One `aggregate:`/`project:` entry (same shape; legality differs by
/// segment executor, per §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
    pub field: FieldReference,
}

/// A `nest:` entry: a named sub-pipeline whose output becomes a nested
/// relation per outer group (§ glossary "Nest").
#[derive(Debug, Clone, PartialEq)]
pub struct NestEntry {
    pub name: SmolStr,
    pub pipeline: Box<QueryPipelineAst>,
    pub span: Span,
}

/// A bare reference to another turtle/query used as a nested-query member
/// of a reduce segment (distinct from `nest:` in that it names an existing
/// turtle rather than defining an inline pipeline).
#[derive(Debug, Clone, PartialEq)]
pub struct NestedQueryRef {
    pub name: SmolStr,
    pub span: Span,
}

/// A `filter:`/`where:`/`having:` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub condition: Expr,
    /// `true` for `having:`; `false` (the default) for `where:`-style
    /// filtering on the input space (§4.4 ReduceExecutor rules).
    pub having: bool,
}

/// `top: N [by expr]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopEntry {
    pub limit: u64,
    pub by: Option<Expr>,
    pub span: Span,
}

/// `limit: N`.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitEntry {
    pub limit: u64,
    pub span: Span,
}

/// `order_by: a, b desc`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingEntry {
    pub keys: Vec<(OrderByTarget, Option<SortDirection>)>,
    pub span: Span,
}

/// A join target: either an existing named source or an inline pipeline
/// producing a struct (`join_one`/`join_many`/`join_cross`).
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    Named(SmolStr),
    Inline(Box<SourceAst>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinCardinality {
    One,
    Many,
    Cross,
}

/// A `join_one`/`join_many`/`join_cross:` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEntry {
    pub name: SmolStr,
    pub cardinality: JoinCardinality,
    pub target: JoinTarget,
    pub on: Option<Expr>,
    pub span: Span,
}

/// A `declare:`/`dimension:`/`measure:` entry defining a new field by
/// expression.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareEntry {
    pub name: SmolStr,
    pub expr: Expr,
    pub span: Span,
}

/// An `index:` entry — one or more field/wildcard references to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub fields: Vec<FieldReference>,
}

/// `weight_by:` on an index segment.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightByEntry {
    pub field: FieldReference,
}

/// `sample:` on an index segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePropertyAst(pub SampleSpec);

/// One property that may occur in a segment's bag (reduce/project/index
/// all accept a subset of these; legality is the executor's job, not the
/// AST's — see §4.4). Matches the spec's `QueryProperty` sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryProperty {
    GroupBy(GroupByEntry),
    Aggregate(AggregateEntry),
    Nest(NestEntry),
    NestedQueryRef(NestedQueryRef),
    Filter(FilterEntry),
    Top(TopEntry),
    Limit(LimitEntry),
    Ordering(OrderingEntry),
    Join(JoinEntry),
    Declare(DeclareEntry),
    ProjectField(FieldReference),
    Index(IndexEntry),
    WeightBy(WeightByEntry),
    Sample(SamplePropertyAst),
}

/// An unlabeled bag of properties for one segment, before
/// `segments::compute_type` (§4.4) determines its kind from the order its
/// properties appear in (or `explicit_kind`, when the source spelled out
/// `reduce:`/`project:`/`index:`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QOPDesc {
    pub properties: Vec<QueryProperty>,
    pub explicit_kind: Option<SegmentKindHint>,
    pub span: Span,
}

/// An explicit segment-kind keyword (`reduce:`, `project:`, `index:`) when
/// the source spells it out, vs. letting `compute_type` infer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKindHint {
    Reduce,
    Project,
    Index,
}

/// The AST shape of a pipeline: an optional named head (turtle reference or
/// `from(query)`-style) followed by a list of unlabeled segment bags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPipelineAst {
    pub head: Option<PipelineHeadAst>,
    pub segments: Vec<QOPDesc>,
}

/// How a pipeline AST names its starting point.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineHeadAst {
    /// `-> { ... }` against an inline/explicit source.
    Explicit(Box<SourceAst>),
    /// A bare turtle name used as `source -> turtleName + { refinement }`.
    Turtle(SmolStr),
}

/// `accept: a, b` / `except: a, b`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldListEdit {
    Accept(Vec<SmolStr>),
    Except(Vec<SmolStr>),
}

/// A rename entry: `rename: new_name is old_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameEntry {
    pub new_name: SmolStr,
    pub old_name: SmolStr,
    pub span: Span,
}

/// One property of an explore/source refinement block (§4.6
/// `RefinedExplore`).
#[derive(Debug, Clone, PartialEq)]
pub enum ExploreProperty {
    PrimaryKey(SmolStr, Span),
    FieldList(FieldListEdit),
    Join(JoinEntry),
    Declare(DeclareEntry),
    Turtle { name: SmolStr, pipeline: QueryPipelineAst, span: Span },
    Rename(RenameEntry),
    Filter(FilterEntry),
}

/// A parameter value supplied at a `NamedSource` call site, e.g.
/// `s(p is @2020-01-01)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamBinding {
    pub name: SmolStr,
    pub value: Expr,
    pub span: Span,
}

/// The AST shape of a source expression (§4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum SourceAst {
    Table { name: SmolStr, span: Span },
    Sql { name: SmolStr, span: Span },
    Named {
        ref_name: SmolStr,
        param_values: Vec<ParamBinding>,
        span: Span,
    },
    Query(Box<QueryPipelineAst>),
    Refined {
        base: Box<SourceAst>,
        properties: Vec<ExploreProperty>,
        span: Span,
    },
}

impl SourceAst {
    pub fn span(&self) -> Span {
        match self {
            SourceAst::Table { span, .. }
            | SourceAst::Sql { span, .. }
            | SourceAst::Named { span, .. }
            | SourceAst::Refined { span, .. } => span.clone(),
            SourceAst::Query(q) => q
                .segments
                .first()
                .map(|s| s.span.clone())
                .unwrap_or(0..0),
        }
    }
}

/// A top-level `query:` statement: `query: name is <source> -> <pipeline>`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatement {
    pub name: Option<SmolStr>,
    pub source: SourceAst,
    pub pipeline: QueryPipelineAst,
    pub span: Span,
}

/// A top-level `source:` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatement {
    pub name: SmolStr,
    pub source: SourceAst,
    pub span: Span,
}

/// A top-level statement in a Malloy document.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Source(SourceStatement),
    Query(QueryStatement),
}

/// A parsed Malloy document: the top-level AST this crate's compiler
/// consumes (§6 "Consumed").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub statements: Vec<Statement>,
}
