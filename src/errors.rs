//! Error sentinel constructors (§4.7): every stage of compilation that
//! must still hand back *something* of the right shape after a fatal
//! failure goes through one of these, instead of improvising an ad hoc
//! placeholder inline. Centralizing them also makes `is_error_struct_def`
//! a single source of truth for "was this thing already reported".

use smol_str::SmolStr;

use crate::model::{
    EvalSpace, ExprValue, ExpressionKind, IndexSegment, PipeSegment, ProjectSegment, Query,
    ReduceSegment, StructDef, StructRef, StructRelationship, StructSource,
};

const ERROR_STRUCT_NAME: &str = "<error>";

/// An error-sentinel `StructDef`: no fields, no parameters, tagged by
/// name so `is_error_struct_def` can recognize it downstream without
/// threading a separate "ok/error" flag through every call site.
pub fn struct_def(dialect: impl Into<SmolStr>) -> StructDef {
    StructDef::new(ERROR_STRUCT_NAME, dialect.into()).with_struct_source(StructSource::Nested)
}

pub fn is_error_struct_def(def: &StructDef) -> bool {
    def.name.as_str() == ERROR_STRUCT_NAME
}

pub fn reduce_segment() -> PipeSegment {
    PipeSegment::Reduce(ReduceSegment::default())
}

pub fn project_segment() -> PipeSegment {
    PipeSegment::Project(ProjectSegment::default())
}

pub fn index_segment() -> PipeSegment {
    PipeSegment::Index(IndexSegment::default())
}

pub fn query(dialect: impl Into<SmolStr>) -> Query {
    Query {
        struct_ref: StructRef::Inline(std::sync::Arc::new(struct_def(dialect))),
        pipeline: crate::model::Pipeline::default(),
        location: None,
    }
}

/// An error-sentinel `ExprValue`, for call sites that already have an
/// `ExpressionKind`/`EvalSpace` in hand and just need the error-typed
/// value itself (most callers use `ExprValue::error` directly; this
/// wrapper exists for symmetry with the other sentinel constructors and
/// for callers outside `model` that don't want to depend on it by name).
pub fn expr_value(expression_type: ExpressionKind, eval_space: EvalSpace) -> ExprValue {
    ExprValue::error(expression_type, eval_space)
}
