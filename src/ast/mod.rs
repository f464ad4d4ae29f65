//! Surface syntax tree consumed by this crate's compiler (§6 "Consumed").
//! Produced upstream by a parser that is outside this crate's scope; the
//! types here are the contract between that parser and everything in
//! `spaces`, `eval`, `segments`, `pipeline`, and `sources`.

pub mod expression;
pub mod query;
pub mod span;
pub mod types;

pub use expression::{
    AggregateCall, AnalyticCall, Applyable, BinaryOp, DurationExpr, Expr, FieldPath, Literal,
    UngroupCall,
};
pub use query::{
    AggregateEntry, DeclareEntry, Document, ExploreProperty, FieldListEdit, FieldReference,
    GroupByEntry, IndexEntry, JoinCardinality, JoinEntry, JoinTarget, LimitEntry, NestEntry,
    NestedQueryRef, OrderingEntry, ParamBinding, PipelineHeadAst, QOPDesc, QueryPipelineAst,
    QueryProperty, QueryStatement, RenameEntry, SamplePropertyAst, SegmentKindHint, SourceAst,
    SourceStatement, Statement, TopEntry, WeightByEntry,
};
pub use span::{synthetic_span, Span, Spanned};
pub use types::TypeName;
