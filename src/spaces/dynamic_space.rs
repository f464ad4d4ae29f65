//! A field space under construction: starts from a `StaticSpace` (or
//! another `DynamicSpace`) and accumulates newly declared columns, joins,
//! turtles, renames, and wildcard markers as a refined explore or a
//! pipeline segment is built up. Finalizes exactly once into a
//! `StructDef` with a deterministic field order (§4.2, §6 "Plan format").

use std::sync::Arc;

use smol_str::SmolStr;

use super::{FieldSpace, LookupReference, LookupResult, ReferenceKind, SpaceEntry, StaticSpace};
use crate::ast::FieldPath;
use crate::diag::Diag;
use crate::model::{FieldDef, StructDef};

pub struct DynamicSpace {
    parent: StaticSpace,
    /// Newly declared entries, in declaration order. Finalization reorders
    /// them into atomic-then-join-then-turtle groups but preserves
    /// declaration order within each group.
    entries: Vec<SpaceEntry>,
    finalized: Option<StructDef>,
}

impl DynamicSpace {
    pub fn new(base: StructDef) -> Self {
        Self {
            parent: StaticSpace::new(base),
            entries: Vec::new(),
            finalized: None,
        }
    }

    /// Adds a new entry, reporting a shadowing warning (mirroring the
    /// original's `warnOnShadowing`-equivalent lint, supplemented per
    /// §SPEC_FULL) if it reuses a name already visible in this space.
    pub fn add_entry(&mut self, entry: SpaceEntry, diagnostics: &mut Vec<Diag>) {
        if let Some(name) = entry.name() {
            if matches!(self.lookup(&FieldPath::single(name.clone())), LookupResult::Found(_)) {
                diagnostics.push(Diag::warning(format!("'{name}' shadows a previously defined field")));
            }
        }
        self.finalized = None;
        self.entries.push(entry);
    }

    /// Restricts the eventual finalized field list to `keep`, preserving
    /// relative order (§4.6 `accept:`).
    pub fn accept(&mut self, keep: &[SmolStr]) {
        self.entries.retain(|e| match e.name() {
            Some(n) => keep.contains(n),
            None => true,
        });
        self.finalized = None;
    }

    /// Drops `drop` from the eventual finalized field list (§4.6
    /// `except:`).
    pub fn except(&mut self, drop: &[SmolStr]) {
        self.entries.retain(|e| match e.name() {
            Some(n) => !drop.contains(n),
            None => true,
        });
        self.finalized = None;
    }

    /// Builds the finalized `StructDef`, expanding wildcard markers
    /// against the pre-extension base struct and ordering fields atomic
    /// first, then joins, then turtles — the order the original's
    /// `DynamicSpace.fieldlist` getter produces. Idempotent: calling this
    /// twice without intervening `add_entry` returns the same struct.
    pub fn finalize(&mut self) -> &StructDef {
        if self.finalized.is_none() {
            let built = self.build();
            self.finalized = Some(built);
        }
        self.finalized.as_ref().unwrap()
    }

    fn resolve_renames(&self) -> Vec<(SmolStr, SmolStr)> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                SpaceEntry::Rename { new_name, old_name } => Some((new_name.clone(), old_name.clone())),
                _ => None,
            })
            .collect()
    }

    fn build(&self) -> StructDef {
        let renames = self.resolve_renames();
        let base = self.parent.struct_def();

        let mut atomic = Vec::new();
        let mut joins = Vec::new();
        let mut turtles = Vec::new();

        let mut push = |def: FieldDef| match &def {
            FieldDef::Atomic { .. } => atomic.push(def),
            FieldDef::Struct { .. } => joins.push(def),
            FieldDef::Turtle { .. } => turtles.push(def),
        };

        for entry in &self.entries {
            match entry {
                SpaceEntry::Column { def, .. } => push(def.clone()),
                SpaceEntry::Join { name, def, join_kind } => push(FieldDef::Struct {
                    name: name.clone(),
                    def: def.clone(),
                    join_kind: Some(*join_kind),
                    location: None,
                }),
                SpaceEntry::Turtle { name, pipeline } => push(FieldDef::Turtle {
                    name: name.clone(),
                    pipeline: pipeline.clone(),
                    location: None,
                }),
                SpaceEntry::Wild { recursive } => {
                    for f in base.fields.iter() {
                        if *recursive || !matches!(f, FieldDef::Struct { .. }) {
                            push(f.clone());
                        }
                    }
                }
                SpaceEntry::Parameter { .. } | SpaceEntry::Rename { .. } => {}
            }
        }

        let excluded: Vec<SmolStr> = renames.iter().map(|(_, old)| old.clone()).collect();
        let rename_fields = |fields: Vec<FieldDef>| -> Vec<FieldDef> {
            fields
                .into_iter()
                .filter(|f| !excluded.contains(f.name()))
                .map(|f| {
                    if let Some((new_name, _)) = renames.iter().find(|(_, old)| old == f.name()) {
                        match f {
                            FieldDef::Atomic { data_type, location, .. } => FieldDef::Atomic {
                                name: new_name.clone(),
                                data_type,
                                location,
                            },
                            other => other,
                        }
                    } else {
                        f
                    }
                })
                .collect()
        };

        let mut fields = rename_fields(atomic);
        fields.extend(rename_fields(joins));
        fields.extend(rename_fields(turtles));

        base.clone().with_fields(fields)
    }
}

impl FieldSpace for DynamicSpace {
    fn lookup(&self, path: &FieldPath) -> LookupResult {
        let Some(head) = path.segments.first() else {
            return LookupResult::NotFound;
        };
        for (new_name, old_name) in self.resolve_renames() {
            if head == &new_name {
                return self.lookup(&FieldPath {
                    segments: std::iter::once(old_name).chain(path.segments[1..].iter().cloned()).collect(),
                });
            }
        }
        for entry in self.entries.iter().rev() {
            if entry.name() == Some(head) {
                let kind = entry.kind();
                if kind != ReferenceKind::Rename {
                    return LookupResult::Found(LookupReference {
                        kind,
                        entry: entry.clone(),
                        remainder: path.segments[1..].to_vec(),
                    });
                }
            }
        }
        self.parent.lookup(path)
    }

    fn struct_def(&self) -> &StructDef {
        self.finalized.as_ref().unwrap_or_else(|| self.parent.struct_def())
    }

    fn empty_struct_def(&self) -> StructDef {
        self.parent.empty_struct_def()
    }
}

/// Mirrors the original `DynamicSpace.filteredFrom`: builds a `DynamicSpace`
/// that inherits another space's entries but layers `accept`/`except`
/// editing on top without disturbing the source space.
pub fn filtered_from(source: &DynamicSpace, accept: Option<&[SmolStr]>, except: Option<&[SmolStr]>) -> DynamicSpace {
    let mut copy = DynamicSpace {
        parent: StaticSpace::new(source.parent.struct_def().clone()),
        entries: source.entries.clone(),
        finalized: None,
    };
    if let Some(keep) = accept {
        copy.accept(keep);
    }
    if let Some(drop) = except {
        copy.except(drop);
    }
    copy
}
