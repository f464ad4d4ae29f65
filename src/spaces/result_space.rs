//! Output-side field spaces: one variant per segment kind, each building
//! the list of `OutputField`s a reduce/project/index segment produces
//! while carrying the parent-query reference a nested query's `exclude()`
//! needs to reach the enclosing query's grouping (§4.2 `nestParent`, §8
//! scenario 6).

use smol_str::SmolStr;

use super::{DefSpace, FieldSpace};
use crate::ast::FieldPath;
use crate::diag::Diag;
use crate::model::{ExprValue, FieldDef, OutputField, StructDef};

/// Shared state for all three result-space kinds.
struct ResultCore {
    input: DefSpace,
    outputs: Vec<OutputField>,
    /// Fields added to the input space via inline `join`/`declare` local to
    /// this segment (as opposed to ones inherited from the source).
    extend_list: Vec<FieldDef>,
}

impl ResultCore {
    fn new(input: StructDef) -> Self {
        Self {
            input: DefSpace::new(input),
            outputs: Vec::new(),
            extend_list: Vec::new(),
        }
    }

    /// Adds an output field, rejecting a second field under a name this
    /// segment already produced (two columns can't share an output name).
    fn push_output(&mut self, field: OutputField, diagnostics: &mut Vec<Diag>) {
        if self.outputs.iter().any(|existing| existing.name == field.name) {
            diagnostics.push(
                Diag::error(format!("'{}' is already defined in this segment", field.name)).with_primary_label(
                    field.location.clone().unwrap_or(0..0),
                    "duplicate output name",
                ),
            );
            return;
        }
        self.outputs.push(field);
    }

    fn extend(&mut self, field: FieldDef) {
        self.extend_list.push(field);
    }
}

/// A `reduce:` segment's field space — accepts `group_by`/`aggregate`/
/// `nest` members (legality enforced by `segments::reduce`, not here).
pub struct ReduceFieldSpace {
    core: ResultCore,
}

impl ReduceFieldSpace {
    pub fn new(input: StructDef) -> Self {
        Self {
            core: ResultCore::new(input),
        }
    }

    /// Attaches the enclosing query's input struct, for a `nest:`
    /// segment's own field space (§4.2 `nestParent`, §8 scenario 6). Lives
    /// on the input-side `DefSpace`, not here, so `exclude()`/`all()` can
    /// reach it the same way regardless of which result-space kind wraps
    /// the input space.
    pub fn with_nest_parent(mut self, parent: StructDef) -> Self {
        self.core.input.set_nest_parent(parent);
        self
    }

    pub fn push_output(&mut self, field: OutputField, diagnostics: &mut Vec<Diag>) {
        self.core.push_output(field, diagnostics);
    }

    pub fn extend(&mut self, field: FieldDef) {
        self.core.extend(field);
    }

    pub fn outputs(&self) -> &[OutputField] {
        &self.core.outputs
    }

    pub fn input_space(&self) -> &DefSpace {
        &self.core.input
    }

    pub fn input_space_mut(&mut self) -> &mut DefSpace {
        &mut self.core.input
    }
}

impl FieldSpace for ReduceFieldSpace {
    fn lookup(&self, path: &FieldPath) -> super::LookupResult {
        self.core.input.lookup(path)
    }

    fn struct_def(&self) -> &StructDef {
        self.core.input.struct_def()
    }

    fn nest_parent(&self) -> Option<&StructDef> {
        self.core.input.nest_parent()
    }
}

/// A `project:` segment's field space — same shape as reduce, but the
/// executor rejects aggregate/analytic members (§4.4).
pub struct ProjectFieldSpace {
    core: ResultCore,
}

impl ProjectFieldSpace {
    pub fn new(input: StructDef) -> Self {
        Self {
            core: ResultCore::new(input),
        }
    }

    pub fn with_nest_parent(mut self, parent: StructDef) -> Self {
        self.core.input.set_nest_parent(parent);
        self
    }

    pub fn push_output(&mut self, field: OutputField, diagnostics: &mut Vec<Diag>) {
        self.core.push_output(field, diagnostics);
    }

    pub fn extend(&mut self, field: FieldDef) {
        self.core.extend(field);
    }

    pub fn outputs(&self) -> &[OutputField] {
        &self.core.outputs
    }

    pub fn input_space(&self) -> &DefSpace {
        &self.core.input
    }

    pub fn input_space_mut(&mut self) -> &mut DefSpace {
        &mut self.core.input
    }
}

impl FieldSpace for ProjectFieldSpace {
    fn lookup(&self, path: &FieldPath) -> super::LookupResult {
        self.core.input.lookup(path)
    }

    fn struct_def(&self) -> &StructDef {
        self.core.input.struct_def()
    }

    fn nest_parent(&self) -> Option<&StructDef> {
        self.core.input.nest_parent()
    }
}

/// An `index:` segment's field space — accepts only field/wildcard
/// references plus an optional `weight_by:` measure (§4.4).
pub struct IndexFieldSpace {
    core: ResultCore,
    indexed: Vec<SmolStr>,
    weight_measure: Option<SmolStr>,
}

impl IndexFieldSpace {
    pub fn new(input: StructDef) -> Self {
        Self {
            core: ResultCore::new(input),
            indexed: Vec::new(),
            weight_measure: None,
        }
    }

    /// Adds a field/wildcard reference to the index, deduplicating by
    /// name (§3 invariant: the index field list is a set).
    pub fn push_indexed(&mut self, name: SmolStr) {
        if !self.indexed.contains(&name) {
            self.indexed.push(name);
        }
    }

    pub fn set_weight_measure(&mut self, name: SmolStr) {
        self.weight_measure = Some(name);
    }

    pub fn indexed(&self) -> &[SmolStr] {
        &self.indexed
    }

    pub fn weight_measure(&self) -> Option<&SmolStr> {
        self.weight_measure.as_ref()
    }

    pub fn input_space(&self) -> &DefSpace {
        &self.core.input
    }

    pub fn input_space_mut(&mut self) -> &mut DefSpace {
        &mut self.core.input
    }
}

impl FieldSpace for IndexFieldSpace {
    fn lookup(&self, path: &FieldPath) -> super::LookupResult {
        self.core.input.lookup(path)
    }

    fn struct_def(&self) -> &StructDef {
        self.core.input.struct_def()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AtomicFieldType, EvalSpace, ExpressionKind, PlanFragment};

    fn base() -> StructDef {
        StructDef::new("orders", "standardsql").with_fields(vec![FieldDef::Atomic {
            name: "amount".into(),
            data_type: AtomicFieldType::Number,
            location: None,
        }])
    }

    #[test]
    fn reduce_space_collects_outputs() {
        let mut space = ReduceFieldSpace::new(base());
        let mut diags = Vec::new();
        space.push_output(
            OutputField {
                name: "total".into(),
                value: ExprValue::new(
                    AtomicFieldType::Number,
                    ExpressionKind::Aggregate,
                    EvalSpace::Output,
                    PlanFragment::literal("sum(amount)"),
                ),
                location: None,
            },
            &mut diags,
        );
        assert!(diags.is_empty());
        assert_eq!(space.outputs().len(), 1);
    }

    #[test]
    fn reduce_space_rejects_a_duplicate_output_name() {
        let mut space = ReduceFieldSpace::new(base());
        let mut diags = Vec::new();
        let field = || OutputField {
            name: "total".into(),
            value: ExprValue::new(
                AtomicFieldType::Number,
                ExpressionKind::Aggregate,
                EvalSpace::Output,
                PlanFragment::literal("sum(amount)"),
            ),
            location: None,
        };
        space.push_output(field(), &mut diags);
        space.push_output(field(), &mut diags);
        assert_eq!(space.outputs().len(), 1);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn index_space_dedups_fields() {
        let mut space = IndexFieldSpace::new(base());
        space.push_indexed("amount".into());
        space.push_indexed("amount".into());
        assert_eq!(space.indexed().len(), 1);
    }

    #[test]
    fn reduce_space_exposes_nest_parent() {
        let outer = base();
        let space = ReduceFieldSpace::new(base()).with_nest_parent(outer.clone());
        assert_eq!(space.nest_parent(), Some(&outer));
    }
}
