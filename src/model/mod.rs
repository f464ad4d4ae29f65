//! Type & Value Model (§4.1) plus the relational-schema and plan shapes of
//! §3. Everything downstream — field spaces, the evaluator, segment
//! executors, the pipeline composer — builds on the vocabulary defined here.

pub mod struct_def;
pub mod types;
pub mod value;

pub use struct_def::{
    ExtendSource, FieldDef, IndexSegment, JoinKind, Limit, Location, OrderBySpec, OrderByTarget,
    OutputField, Parameter, PipeHead, PipeSegment, Pipeline, ProjectSegment, Query, ReduceSegment,
    SampleSpec, SortDirection, StructDef, StructRef, StructRelationship, StructSource,
};
pub use types::{
    compare_expression_kinds, max_expression_type, max_of_expression_types, merge_all_eval_spaces,
    merge_eval_spaces, AtomicFieldType, EvalSpace, ExpressionKind, TimeframeUnit,
};
pub use value::{ExprValue, Granularity, MorphicMap, PlanFragment};
