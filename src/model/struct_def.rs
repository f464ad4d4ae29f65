//! Relational schema and plan shapes — §3 data model.
//!
//! `StructDef` is the table-like schema threaded through every field space;
//! `PipeSegment`/`Pipeline`/`Query` are the canonical plan shapes this crate
//! hands to the downstream SQL writer.

use std::sync::Arc;

use smol_str::SmolStr;

use super::types::AtomicFieldType;
use super::value::ExprValue;
use crate::ast::Span;

/// Where a `StructDef`'s rows ultimately come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructSource {
    Table { name: SmolStr },
    Sql { name: SmolStr },
    Query { query: Box<Query> },
    /// A struct nested inside another (a join's embedded schema, or a
    /// turtle's output schema before it is materialized as a segment).
    Nested,
}

/// How a `StructDef` relates to its enclosing struct, when it is itself a
/// field of another struct (a join or a nest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructRelationship {
    /// A root, standalone schema (a source by itself).
    BaseTable,
    /// Joined in via a join condition; `Vec<String>` below carries the
    /// fan-out/one-to-many distinction isn't modeled at this layer (left to
    /// the SQL writer) but the join kind (inner/left/right) is on the field.
    Join,
    /// Produced by a `nest:` inside a reduce segment.
    Nested,
    /// An inline explore reference (`join_one: x is table('t')`), where the
    /// struct is defined in place rather than by reference.
    Inline,
}

/// A join's logical kind, carried on `StructRelationship::Join` fields via
/// the owning `FieldDef::Join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    One,
    Many,
    Cross,
}

/// A source location, kept optional because synthesized structs (error
/// sentinels, refinement-produced structs) have none.
pub type Location = Span;

/// A single field of a `StructDef`. Tagged by what kind of thing it is, per
/// §9's "tagged variant" guidance.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDef {
    /// A plain atomic column.
    Atomic {
        name: SmolStr,
        data_type: AtomicFieldType,
        location: Option<Location>,
    },
    /// A nested struct: either a join or a literal nest.
    Struct {
        name: SmolStr,
        def: Arc<StructDef>,
        join_kind: Option<JoinKind>,
        location: Option<Location>,
    },
    /// A turtle: a named query attached as a field of a source.
    Turtle {
        name: SmolStr,
        pipeline: Pipeline,
        location: Option<Location>,
    },
}

impl FieldDef {
    pub fn name(&self) -> &SmolStr {
        match self {
            FieldDef::Atomic { name, .. } => name,
            FieldDef::Struct { name, .. } => name,
            FieldDef::Turtle { name, .. } => name,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            FieldDef::Atomic { location, .. } => location.as_ref(),
            FieldDef::Struct { location, .. } => location.as_ref(),
            FieldDef::Turtle { location, .. } => location.as_ref(),
        }
    }

    pub fn is_turtle(&self) -> bool {
        matches!(self, FieldDef::Turtle { .. })
    }

    pub fn is_join(&self) -> bool {
        matches!(self, FieldDef::Struct { join_kind: Some(_), .. })
    }
}

/// A source/explore parameter (§3 "Parameter").
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// A value parameter: bound to a concrete `ExprValue` at resolution
    /// time, either from a default or from caller-supplied binding.
    Value {
        name: SmolStr,
        data_type: AtomicFieldType,
        value: Option<ExprValue>,
        /// `constant: true` parameters reject caller overrides entirely.
        constant: bool,
    },
    /// A condition parameter: bound to a filter condition rather than a
    /// value (Malloy's `is` conditions, e.g. `param is > 10`).
    Condition {
        name: SmolStr,
        data_type: AtomicFieldType,
        condition: Option<ExprValue>,
    },
}

impl Parameter {
    pub fn name(&self) -> &SmolStr {
        match self {
            Parameter::Value { name, .. } => name,
            Parameter::Condition { name, .. } => name,
        }
    }

    pub fn data_type(&self) -> AtomicFieldType {
        match self {
            Parameter::Value { data_type, .. } => *data_type,
            Parameter::Condition { data_type, .. } => *data_type,
        }
    }

    /// True when this parameter has no default and must be supplied by the
    /// caller before the source's `StructDef` can be used (§3 invariant).
    pub fn is_required(&self) -> bool {
        match self {
            Parameter::Value { value, .. } => value.is_none(),
            Parameter::Condition { condition, .. } => condition.is_none(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Parameter::Value { constant: true, .. })
    }
}

/// A relational schema: the "table-like" shape threaded through name/field
/// spaces. Cheap to clone (wraps `Arc` fields where the data is shared
/// across a compilation, e.g. the filter list and field list of a named
/// source referenced from many queries).
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: SmolStr,
    pub dialect: SmolStr,
    pub fields: Arc<Vec<FieldDef>>,
    pub parameters: Vec<Parameter>,
    pub filter_list: Vec<ExprValue>,
    pub primary_key: Option<SmolStr>,
    pub struct_source: StructSource,
    pub struct_relationship: StructRelationship,
    pub location: Option<Location>,
}

impl StructDef {
    pub fn new(name: impl Into<SmolStr>, dialect: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            dialect: dialect.into(),
            fields: Arc::new(Vec::new()),
            parameters: Vec::new(),
            filter_list: Vec::new(),
            primary_key: None,
            struct_source: StructSource::Nested,
            struct_relationship: StructRelationship::BaseTable,
            location: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldDef>) -> Self {
        self.fields = Arc::new(fields);
        self
    }

    pub fn with_struct_source(mut self, source: StructSource) -> Self {
        self.struct_source = source;
        self
    }

    pub fn with_struct_relationship(mut self, rel: StructRelationship) -> Self {
        self.struct_relationship = rel;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name().as_str() == name)
    }

    pub fn parameter_named(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name().as_str() == name)
    }
}

/// Sort direction for `ORDER BY`/`top ... by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One entry of an `order_by:`/`top ... by` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBySpec {
    /// Either a field name or a positional ordinal (1-based, as Malloy
    /// source allows `order_by: 1 desc`).
    pub field: OrderByTarget,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByTarget {
    Name(SmolStr),
    Ordinal(u32),
}

/// A `limit:`/`top: N` cap.
pub type Limit = u64;

/// Additions made to the input space via inline `join`/`declare` within a
/// segment, carried on the finalized segment in insertion order (§6 "Plan
/// format").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtendSource {
    pub fields: Vec<FieldDef>,
}

/// One output field of a segment: either a bare reference to an input
/// field, or a field defined by an expression computed in this segment.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputField {
    pub name: SmolStr,
    pub value: ExprValue,
    pub location: Option<Location>,
}

/// A single stage of a pipeline (§3 "PipeSegment").
#[derive(Debug, Clone, PartialEq)]
pub enum PipeSegment {
    Reduce(ReduceSegment),
    Project(ProjectSegment),
    Index(IndexSegment),
}

impl PipeSegment {
    pub fn filter_list(&self) -> &[ExprValue] {
        match self {
            PipeSegment::Reduce(s) => &s.filter_list,
            PipeSegment::Project(s) => &s.filter_list,
            PipeSegment::Index(s) => &s.filter_list,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PipeSegment::Reduce(_) => "reduce",
            PipeSegment::Project(_) => "project",
            PipeSegment::Index(_) => "index",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReduceSegment {
    pub fields: Vec<OutputField>,
    pub order_by: Vec<OrderBySpec>,
    pub by: Option<OrderByTarget>,
    pub limit: Option<Limit>,
    pub filter_list: Vec<ExprValue>,
    pub extend_source: ExtendSource,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectSegment {
    pub fields: Vec<OutputField>,
    pub order_by: Vec<OrderBySpec>,
    pub by: Option<OrderByTarget>,
    pub limit: Option<Limit>,
    pub filter_list: Vec<ExprValue>,
    pub extend_source: ExtendSource,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexSegment {
    /// Deduplicated, insertion-ordered set of indexed column/wildcard
    /// references (§3 invariant, §6 "Plan format").
    pub fields: Vec<SmolStr>,
    pub weight_measure: Option<SmolStr>,
    pub sample: Option<SampleSpec>,
    pub filter_list: Vec<ExprValue>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleSpec {
    Rows(u64),
    Percent(f64),
}

/// A reference to a turtle, used as a pipeline's head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeHead {
    pub name: SmolStr,
}

/// A pipeline: an optional turtle head followed by one or more segments
/// (§3 "Pipeline"). A `pipe_head` is mutually exclusive with inline head
/// refinement — refinement materializes the turtle into `pipeline[0]`
/// instead (§3 invariant).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    pub pipe_head: Option<PipeHead>,
    pub pipeline: Vec<PipeSegment>,
}

impl Pipeline {
    pub fn single(segment: PipeSegment) -> Self {
        Self {
            pipe_head: None,
            pipeline: vec![segment],
        }
    }
}

/// The input source of a `Query`: either a named reference (resolved
/// lazily) or an inline `StructDef`.
#[derive(Debug, Clone, PartialEq)]
pub enum StructRef {
    Name(SmolStr),
    Inline(Arc<StructDef>),
}

/// A fully resolved query: a pipeline plus the struct it runs against
/// (§3 "Query").
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub struct_ref: StructRef,
    pub pipeline: Pipeline,
    pub location: Option<Location>,
}
