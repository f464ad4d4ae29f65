//! Name & Field Spaces (§4.2): the lookup machinery that turns a dotted
//! `FieldPath` from the AST into a concrete column, join, turtle, or
//! parameter, and that accumulates newly declared fields into a
//! `StructDef` as a segment or refined explore is built up.
//!
//! Mirrors the original's `FieldSpace` interface hierarchy
//! (`StaticSpace` -> `DynamicSpace` -> `DefSpace` -> `QuerySpace` ->
//! `ResultSpace`) as a shared trait plus one struct per stage, rather than
//! a class chain (§9).

mod def_space;
mod dynamic_space;
mod result_space;
mod static_space;

pub use def_space::DefSpace;
pub use dynamic_space::DynamicSpace;
pub use result_space::{IndexFieldSpace, ProjectFieldSpace, ReduceFieldSpace};
pub use static_space::StaticSpace;

use std::sync::Arc;

use smol_str::SmolStr;

use crate::ast::FieldPath;
use crate::model::{FieldDef, JoinKind, Parameter, Pipeline, StructDef};

/// What kind of thing a successful lookup resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Column,
    Join,
    Turtle,
    Parameter,
    Wild,
    Rename,
}

/// A single named thing a field space knows about. Distinct from
/// `model::FieldDef` because a space also carries parameters, wildcard
/// markers, and renames, none of which survive into the finalized
/// `StructDef` under their space-local shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceEntry {
    Column {
        name: SmolStr,
        def: FieldDef,
    },
    Join {
        name: SmolStr,
        def: Arc<StructDef>,
        join_kind: JoinKind,
    },
    Turtle {
        name: SmolStr,
        pipeline: Pipeline,
    },
    Parameter {
        name: SmolStr,
        param: Parameter,
    },
    /// `*` / `**` — expands to every column (and, if recursive, every
    /// joined struct's columns) at finalize time.
    Wild { recursive: bool },
    /// `rename: new is old` — resolves lookups of `new` to the entry
    /// already known under `old`, and removes `old` from the finalized
    /// field list (§4.6 `RefinedExplore`).
    Rename { new_name: SmolStr, old_name: SmolStr },
}

impl SpaceEntry {
    pub fn name(&self) -> Option<&SmolStr> {
        match self {
            SpaceEntry::Column { name, .. }
            | SpaceEntry::Join { name, .. }
            | SpaceEntry::Turtle { name, .. }
            | SpaceEntry::Parameter { name, .. } => Some(name),
            SpaceEntry::Rename { new_name, .. } => Some(new_name),
            SpaceEntry::Wild { .. } => None,
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        match self {
            SpaceEntry::Column { .. } => ReferenceKind::Column,
            SpaceEntry::Join { .. } => ReferenceKind::Join,
            SpaceEntry::Turtle { .. } => ReferenceKind::Turtle,
            SpaceEntry::Parameter { .. } => ReferenceKind::Parameter,
            SpaceEntry::Wild { .. } => ReferenceKind::Wild,
            SpaceEntry::Rename { .. } => ReferenceKind::Rename,
        }
    }
}

/// A resolved reference returned by `FieldSpace::lookup`.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupReference {
    pub kind: ReferenceKind,
    pub entry: SpaceEntry,
    /// The remaining path segments after the leading one was resolved,
    /// e.g. looking up `orders.customer.name` against a space that owns
    /// `orders` leaves `["customer", "name"]` to resolve against the
    /// join's own space.
    pub remainder: Vec<SmolStr>,
}

/// The outcome of a `FieldSpace::lookup` call.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Found(LookupReference),
    NotFound,
}

/// The shared interface every stage of field-space construction
/// implements (§4.2). `whenComplete`-style finalization is modeled as an
/// explicit `finalize` call on the concrete types rather than a callback,
/// since this crate evaluates everything eagerly rather than lazily.
pub trait FieldSpace {
    /// Resolve the leading segment of `path` against this space's own
    /// entries (not recursing into joins — that is the caller's job once
    /// it has a `Join` reference back).
    fn lookup(&self, path: &FieldPath) -> LookupResult;

    /// The struct this space is building toward. Before `finalize` this
    /// reflects only the entries accumulated so far.
    fn struct_def(&self) -> &StructDef;

    /// A struct with no computed fields, used as the wildcard-expansion
    /// baseline so `*` only ever pulls in base columns and joins, never
    /// fields declared later in the same space (§4.2 invariant).
    fn empty_struct_def(&self) -> StructDef {
        let base = self.struct_def();
        StructDef::new(base.name.clone(), base.dialect.clone())
            .with_struct_source(base.struct_source.clone())
            .with_struct_relationship(base.struct_relationship)
    }

    fn dialect(&self) -> &str {
        &self.struct_def().dialect
    }

    /// The enclosing query's input struct, when this space is building a
    /// `nest:` segment (§4.2 `nestParent`, §8 scenario 6). `exclude()`/
    /// `all()` validate their field list against this. `None` for every
    /// space that isn't nested inside another query.
    fn nest_parent(&self) -> Option<&StructDef> {
        None
    }
}
