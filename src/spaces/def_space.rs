//! A `DynamicSpace` that also tracks which named field is currently being
//! resolved, so that a field whose expression refers back to itself
//! (directly or through a chain of other declared fields) is caught as a
//! circular reference instead of recursing forever (§4.2, §8 scenario 5).

use smol_str::SmolStr;

use super::{DynamicSpace, FieldSpace, LookupResult, SpaceEntry};
use crate::ast::FieldPath;
use crate::diag::Diag;
use crate::model::StructDef;

pub struct DefSpace {
    inner: DynamicSpace,
    /// Names currently being resolved, innermost last. `declare: a is a + 1`
    /// pushes `a` before evaluating the right-hand side and pops it after.
    resolving: Vec<SmolStr>,
    /// The enclosing query's input struct, set only while this space backs
    /// a `nest:` segment (§4.2 `nestParent`).
    nest_parent: Option<StructDef>,
}

impl DefSpace {
    pub fn new(base: StructDef) -> Self {
        Self {
            inner: DynamicSpace::new(base),
            resolving: Vec::new(),
            nest_parent: None,
        }
    }

    pub fn set_nest_parent(&mut self, parent: StructDef) {
        self.nest_parent = Some(parent);
    }

    /// Begins resolving `name`'s defining expression. Returns an error
    /// diagnostic instead of pushing if `name` is already on the
    /// resolution stack (a cycle).
    pub fn enter(&mut self, name: SmolStr) -> Result<(), Diag> {
        if self.resolving.contains(&name) {
            let chain = self
                .resolving
                .iter()
                .map(SmolStr::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Diag::error(format!(
                "circular reference: '{name}' depends on itself via {chain} -> {name}"
            )));
        }
        self.resolving.push(name);
        Ok(())
    }

    pub fn leave(&mut self) {
        self.resolving.pop();
    }

    pub fn add_entry(&mut self, entry: SpaceEntry, diagnostics: &mut Vec<Diag>) {
        self.inner.add_entry(entry, diagnostics);
    }

    pub fn finalize(&mut self) -> &StructDef {
        self.inner.finalize()
    }
}

impl FieldSpace for DefSpace {
    fn lookup(&self, path: &FieldPath) -> LookupResult {
        self.inner.lookup(path)
    }

    fn struct_def(&self) -> &StructDef {
        self.inner.struct_def()
    }

    fn empty_struct_def(&self) -> StructDef {
        self.inner.empty_struct_def()
    }

    fn nest_parent(&self) -> Option<&StructDef> {
        self.nest_parent.as_ref()
    }
}
