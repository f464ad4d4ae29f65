//! Pipeline Composer (§4.5): chains segment executors front to back,
//! threading each segment's output struct into the next, and handles
//! refinement of an existing pipeline with a trailing `{ ... }` block.

use crate::ast::{PipelineHeadAst, QOPDesc, QueryPipelineAst};
use crate::diag::Diag;
use crate::model::{
    ExtendSource, FieldDef, IndexSegment, OutputField, PipeHead, PipeSegment, Pipeline,
    ProjectSegment, ReduceSegment, StructDef,
};
use crate::segments::{compute_type, IndexExecutor, ProjectExecutor, ReduceExecutor, SegmentExecutor, SegmentKind};

/// Executes a single `QOPDesc` bag against `input`, dispatching to the
/// segment executor `compute_type` selects. `nest_parent` is the enclosing
/// query's input struct when this segment is part of a `nest:` pipeline
/// (§4.2 `nestParent`), or `None` at the top level.
pub fn execute_segment(
    input: &StructDef,
    desc: &QOPDesc,
    nest_parent: Option<&StructDef>,
    diagnostics: &mut Vec<Diag>,
) -> (PipeSegment, StructDef) {
    match compute_type(desc, diagnostics) {
        SegmentKind::Reduce => ReduceExecutor.execute(input, desc, nest_parent, diagnostics),
        SegmentKind::Project => ProjectExecutor.execute(input, desc, nest_parent, diagnostics),
        SegmentKind::Index => IndexExecutor.execute(input, desc, nest_parent, diagnostics),
    }
}

/// Builds a full `Pipeline` from its AST shape, starting from `input` and
/// threading each segment's output struct into the next (§4.5
/// `appendOps`). Returns the pipeline plus the struct its last segment
/// produces. `nest_parent` is threaded into every segment the same way
/// (§4.2 `nestParent`); pass `None` for a top-level query.
pub fn compose_pipeline(
    ast: &QueryPipelineAst,
    input: &StructDef,
    nest_parent: Option<&StructDef>,
    diagnostics: &mut Vec<Diag>,
) -> (Pipeline, StructDef) {
    let mut current = input.clone();
    let mut segments = Vec::new();
    let mut pipe_head = None;

    if let Some(head) = &ast.head {
        match head {
            PipelineHeadAst::Turtle(name) => pipe_head = Some(PipeHead { name: name.clone() }),
            PipelineHeadAst::Explicit(_source) => {
                // An explicit inline source for a nested pipeline's head is
                // resolved by `sources` before this point; here we simply
                // continue from whatever struct the caller already
                // determined (§4.5 invariant: `input` already reflects it).
            }
        }
    }

    for desc in &ast.segments {
        let (segment, output) = execute_segment(&current, desc, nest_parent, diagnostics);
        segments.push(segment);
        current = output;
    }

    (
        Pipeline {
            pipe_head,
            pipeline: segments,
        },
        current,
    )
}

/// Refines an existing pipeline with a trailing `{ ... }` block (§4.5
/// "refine_pipeline": `query + { filter... }`-style refinement). The
/// refinement's first segment merges *into* the base pipeline's last
/// segment — inheriting its `order_by`/`by`/`limit`/fields unless the
/// refinement overrides them, and concatenating filters — rather than
/// appending as a brand new stage; refining is monotone, so a refinement
/// with no properties (`query + {}`) leaves the base pipeline unchanged.
/// Any segments beyond the refinement's first are genuinely new stages
/// and are appended normally. Returns the combined pipeline and its final
/// output struct.
pub fn refine_pipeline(
    base: &Pipeline,
    base_output: &StructDef,
    refinement: &QueryPipelineAst,
    diagnostics: &mut Vec<Diag>,
) -> (Pipeline, StructDef) {
    let mut combined = base.clone();
    let mut current = base_output.clone();
    let mut rest = refinement.segments.iter();

    if let Some(first) = rest.next() {
        if first.properties.is_empty() && first.explicit_kind.is_none() {
            // `query + {}`: nothing to refine with, base pipeline stands.
        } else if let Some(base_last) = combined.pipeline.last().cloned() {
            let (refine_segment, refine_output) = execute_segment(&current, first, None, diagnostics);
            match merge_segment(&base_last, &refine_segment, diagnostics) {
                Some(merged) => {
                    current = merged_output_struct(&current, &merged, &refine_output);
                    let last = combined.pipeline.len() - 1;
                    combined.pipeline[last] = merged;
                }
                None => {
                    // Kind mismatch already diagnosed by `merge_segment`;
                    // keep the refinement as its own stage instead of
                    // silently dropping it.
                    combined.pipeline.push(refine_segment);
                    current = refine_output;
                }
            }
        } else {
            let (segment, output) = execute_segment(&current, first, None, diagnostics);
            combined.pipeline.push(segment);
            current = output;
        }
    }

    for desc in rest {
        let (segment, output) = execute_segment(&current, desc, None, diagnostics);
        combined.pipeline.push(segment);
        current = output;
    }

    (combined, current)
}

/// Merges a refinement segment into the segment it refines, or reports the
/// mismatch and refuses to merge when the two are different kinds (a
/// project refining a reduce, etc. — §4.5 invariant: refinement can't
/// change a segment's kind).
fn merge_segment(base: &PipeSegment, refine: &PipeSegment, diagnostics: &mut Vec<Diag>) -> Option<PipeSegment> {
    match (base, refine) {
        (PipeSegment::Reduce(b), PipeSegment::Reduce(r)) => Some(PipeSegment::Reduce(merge_reduce(b, r, diagnostics))),
        (PipeSegment::Project(b), PipeSegment::Project(r)) => {
            Some(PipeSegment::Project(merge_project(b, r, diagnostics)))
        }
        (PipeSegment::Index(b), PipeSegment::Index(r)) => Some(PipeSegment::Index(merge_index(b, r))),
        _ => {
            diagnostics.push(Diag::error(format!(
                "a {} segment cannot refine a {} segment",
                refine.kind_name(),
                base.kind_name()
            )));
            None
        }
    }
}

fn merge_reduce(base: &ReduceSegment, refine: &ReduceSegment, diagnostics: &mut Vec<Diag>) -> ReduceSegment {
    ReduceSegment {
        fields: merge_output_fields(&base.fields, &refine.fields, diagnostics),
        order_by: if refine.order_by.is_empty() { base.order_by.clone() } else { refine.order_by.clone() },
        by: refine.by.clone().or_else(|| base.by.clone()),
        limit: refine.limit.or(base.limit),
        filter_list: base.filter_list.iter().chain(refine.filter_list.iter()).cloned().collect(),
        extend_source: merge_extend_source(&base.extend_source, &refine.extend_source),
    }
}

fn merge_project(base: &ProjectSegment, refine: &ProjectSegment, diagnostics: &mut Vec<Diag>) -> ProjectSegment {
    ProjectSegment {
        fields: merge_output_fields(&base.fields, &refine.fields, diagnostics),
        order_by: if refine.order_by.is_empty() { base.order_by.clone() } else { refine.order_by.clone() },
        by: refine.by.clone().or_else(|| base.by.clone()),
        limit: refine.limit.or(base.limit),
        filter_list: base.filter_list.iter().chain(refine.filter_list.iter()).cloned().collect(),
        extend_source: merge_extend_source(&base.extend_source, &refine.extend_source),
    }
}

fn merge_index(base: &IndexSegment, refine: &IndexSegment) -> IndexSegment {
    let mut fields = base.fields.clone();
    for f in &refine.fields {
        if !fields.contains(f) {
            fields.push(f.clone());
        }
    }
    IndexSegment {
        fields,
        weight_measure: refine.weight_measure.clone().or_else(|| base.weight_measure.clone()),
        sample: refine.sample.or(base.sample),
        filter_list: base.filter_list.iter().chain(refine.filter_list.iter()).cloned().collect(),
        limit: refine.limit.or(base.limit),
    }
}

/// Merges a refinement's new output fields onto the base segment's, in
/// order. A refinement redefining an existing output name shadows it
/// (warned, not an error — same stance as declare-shadowing elsewhere).
fn merge_output_fields(base: &[OutputField], refine: &[OutputField], diagnostics: &mut Vec<Diag>) -> Vec<OutputField> {
    let mut merged = base.to_vec();
    for field in refine {
        if let Some(pos) = merged.iter().position(|existing| existing.name == field.name) {
            diagnostics.push(Diag::warning(format!("refinement redefines output field '{}'", field.name)));
            merged[pos] = field.clone();
        } else {
            merged.push(field.clone());
        }
    }
    merged
}

fn merge_extend_source(base: &ExtendSource, refine: &ExtendSource) -> ExtendSource {
    let mut fields = base.fields.clone();
    for field in &refine.fields {
        if !fields.iter().any(|existing| existing.name() == field.name()) {
            fields.push(field.clone());
        }
    }
    ExtendSource { fields }
}

/// The struct downstream stages (or the caller) see after a merge. Index
/// segments always produce the same fixed `field_name`/`field_value`/
/// `weight` shape, so `refine_output` already has it; reduce/project
/// segments need their struct rebuilt from the merged field list.
fn merged_output_struct(current: &StructDef, merged: &PipeSegment, refine_output: &StructDef) -> StructDef {
    match merged {
        PipeSegment::Reduce(r) => struct_from_output_fields(current, &r.fields),
        PipeSegment::Project(p) => struct_from_output_fields(current, &p.fields),
        PipeSegment::Index(_) => refine_output.clone(),
    }
}

fn struct_from_output_fields(base: &StructDef, fields: &[OutputField]) -> StructDef {
    StructDef::new(base.name.clone(), base.dialect.clone()).with_fields(
        fields
            .iter()
            .map(|f| FieldDef::Atomic {
                name: f.name.clone(),
                data_type: f.value.data_type,
                location: f.location.clone(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FieldReference, GroupByEntry, QueryProperty as QP};
    use crate::model::{AtomicFieldType, FieldDef};

    fn base() -> StructDef {
        StructDef::new("orders", "standardsql").with_fields(vec![FieldDef::Atomic {
            name: "state".into(),
            data_type: AtomicFieldType::String,
            location: None,
        }])
    }

    #[test]
    fn compose_pipeline_chains_segments() {
        let ast = QueryPipelineAst {
            head: None,
            segments: vec![QOPDesc {
                properties: vec![QP::GroupBy(GroupByEntry {
                    field: FieldReference::Name("state".into(), 0..5),
                })],
                ..Default::default()
            }],
        };
        let mut diags = Vec::new();
        let (pipeline, output) = compose_pipeline(&ast, &base(), None, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(pipeline.pipeline.len(), 1);
        assert_eq!(output.fields.len(), 1);
    }

    fn reduce_ast() -> QueryPipelineAst {
        QueryPipelineAst {
            head: None,
            segments: vec![QOPDesc {
                properties: vec![QP::GroupBy(GroupByEntry {
                    field: FieldReference::Name("state".into(), 0..5),
                })],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn refine_pipeline_merges_into_the_existing_segment() {
        let mut diags = Vec::new();
        let (pipeline, output) = compose_pipeline(&reduce_ast(), &base(), None, &mut diags);

        let refinement = QueryPipelineAst {
            head: None,
            segments: vec![QOPDesc {
                properties: vec![QP::Limit(crate::ast::LimitEntry { limit: 10 })],
                ..Default::default()
            }],
        };
        let (combined, final_output) = refine_pipeline(&pipeline, &output, &refinement, &mut diags);
        // A bag with only a `limit:` has no group_by/aggregate/project-field
        // to reveal its kind, so `compute_type` falls back to its
        // empty-segment default (reduce, with a warning) before the merge
        // ever runs — same as it would for any other kind-neutral bag.
        assert_eq!(diags.len(), 1);
        assert_eq!(combined.pipeline.len(), 1);
        assert_eq!(final_output.fields.len(), 1);
        match &combined.pipeline[0] {
            PipeSegment::Reduce(r) => assert_eq!(r.limit, Some(10)),
            _ => panic!("expected reduce"),
        }
    }

    #[test]
    fn refine_pipeline_with_an_empty_refinement_is_a_no_op() {
        let mut diags = Vec::new();
        let (pipeline, output) = compose_pipeline(&reduce_ast(), &base(), None, &mut diags);

        let refinement = QueryPipelineAst {
            head: None,
            segments: vec![QOPDesc::default()],
        };
        let (combined, final_output) = refine_pipeline(&pipeline, &output, &refinement, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(combined, pipeline);
        assert_eq!(final_output, output);
    }

    #[test]
    fn refine_pipeline_rejects_a_kind_mismatch() {
        let mut diags = Vec::new();
        let (pipeline, output) = compose_pipeline(&reduce_ast(), &base(), None, &mut diags);

        let refinement = QueryPipelineAst {
            head: None,
            segments: vec![QOPDesc {
                properties: vec![QP::ProjectField(FieldReference::Name("state".into(), 0..5))],
                explicit_kind: Some(crate::ast::SegmentKindHint::Project),
                span: 0..0,
            }],
        };
        let (combined, _) = refine_pipeline(&pipeline, &output, &refinement, &mut diags);
        assert!(diags.iter().any(|d| d.message.contains("cannot refine")));
        assert_eq!(combined.pipeline.len(), 2);
    }
}
