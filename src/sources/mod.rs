//! Source Resolution (§4.6): turns a `SourceAst` into a `StructDef`,
//! delegating schema lookup and dialect selection to small collaborator
//! traits that stand in for the parts of the system genuinely outside
//! this crate's scope — fetching a table's actual column list, resolving
//! a named source from the surrounding model, and picking a SQL dialect
//! (§1 Non-goals).

use std::sync::Arc;

use smol_str::SmolStr;

use crate::ast::{ExploreProperty, FieldListEdit, JoinCardinality, ParamBinding, SourceAst};
use crate::diag::Diag;
use crate::model::{FieldDef, JoinKind, Parameter, StructDef, StructRelationship, StructSource};
use crate::spaces::{DynamicSpace, FieldSpace, SpaceEntry};

/// Looks up the column list and dialect for a physical table. Implemented
/// by the host application, typically backed by a database connection or
/// a cached schema catalog (§1 Non-goals: schema-fetch plumbing).
pub trait SchemaZone {
    fn table_schema(&self, table_name: &str) -> Option<StructDef>;
    fn sql_block_schema(&self, sql_name: &str) -> Option<StructDef>;
}

/// Resolves a named source reference (`source: orders is table(...)`-style
/// declarations elsewhere in the model) to its `StructDef`. Implemented by
/// the host application's model/document registry (§1 Non-goals: import
/// loader, document registry).
pub trait ModelEnvironment {
    fn named_source(&self, name: &str) -> Option<StructDef>;
    fn named_query(&self, name: &str) -> Option<crate::model::Query>;
}

/// Maps a source's declared dialect name to dialect-specific behavior the
/// evaluator or SQL writer needs (e.g. how `div` or date truncation
/// render). This crate only needs the name itself to stamp onto
/// `StructDef::dialect`; the dialect's actual behavior lives downstream
/// (§1 Non-goals: SQL writer).
pub trait DialectMap {
    fn default_dialect(&self) -> SmolStr;
}

/// Resolves a `SourceAst` into a `StructDef`, threading through the
/// collaborator traits above. This is the single entry point `compiler`
/// calls for every `source:`/inline-source AST node (§4.6).
pub fn resolve_source(
    source: &SourceAst,
    schema: &dyn SchemaZone,
    env: &dyn ModelEnvironment,
    dialect: &dyn DialectMap,
    diagnostics: &mut Vec<Diag>,
) -> StructDef {
    match source {
        SourceAst::Table { name, span } => schema.table_schema(name).unwrap_or_else(|| {
            diagnostics.push(Diag::error(format!("table '{name}' could not be found")).with_primary_label(span.clone(), "here"));
            error_struct(dialect)
        }),
        SourceAst::Sql { name, span } => schema.sql_block_schema(name).unwrap_or_else(|| {
            diagnostics.push(Diag::error(format!("sql block '{name}' could not be found")).with_primary_label(span.clone(), "here"));
            error_struct(dialect)
        }),
        SourceAst::Named { ref_name, param_values, span } => {
            let base = env.named_source(ref_name).unwrap_or_else(|| {
                diagnostics.push(Diag::error(format!("'{ref_name}' is not a defined source")).with_primary_label(span.clone(), "here"));
                error_struct(dialect)
            });
            bind_parameters(base, param_values, diagnostics)
        }
        SourceAst::Query(pipeline_ast) => resolve_query_source(pipeline_ast, schema, env, dialect, diagnostics),
        SourceAst::Refined { base, properties, span } => {
            let base_struct = resolve_source(base, schema, env, dialect, diagnostics);
            resolve_refined_explore(base_struct, properties, span.clone(), schema, env, dialect, diagnostics)
        }
    }
}

fn error_struct(dialect: &dyn DialectMap) -> StructDef {
    crate::errors::struct_def(dialect.default_dialect())
}

/// Binds caller-supplied parameter values onto a named source's
/// parameters, evaluating each binding against the (parameterless) base
/// struct and rejecting bindings for constant or unknown parameters
/// (§3 invariant: `Parameter::constant` rejects overrides).
fn bind_parameters(base: StructDef, bindings: &[ParamBinding], diagnostics: &mut Vec<Diag>) -> StructDef {
    let static_space = crate::spaces::StaticSpace::new(base.clone());
    let mut parameters = base.parameters.clone();

    for binding in bindings {
        let Some(index) = parameters.iter().position(|p| p.name().as_str() == binding.name.as_str()) else {
            diagnostics.push(
                Diag::error(format!("'{}' is not a parameter of this source", binding.name))
                    .with_primary_label(binding.span.clone(), "here"),
            );
            continue;
        };
        if parameters[index].is_constant() {
            diagnostics.push(
                Diag::error(format!("'{}' is a constant parameter and cannot be overridden", binding.name))
                    .with_primary_label(binding.span.clone(), "here"),
            );
            continue;
        }
        let value = crate::eval::evaluate(&binding.value, &static_space, diagnostics);
        let value = crate::eval::cast_value(value, parameters[index].data_type());
        parameters[index] = match &parameters[index] {
            Parameter::Value { name, data_type, constant, .. } => Parameter::Value {
                name: name.clone(),
                data_type: *data_type,
                value: Some(value),
                constant: *constant,
            },
            Parameter::Condition { name, data_type, .. } => Parameter::Condition {
                name: name.clone(),
                data_type: *data_type,
                condition: Some(value),
            },
        };
    }

    for param in &parameters {
        if param.is_required() {
            diagnostics.push(Diag::error(format!(
                "missing required parameter '{}'; it has no default and was not supplied",
                param.name()
            )));
        }
    }

    let mut result = base;
    result.parameters = parameters;
    result
}

fn resolve_query_source(
    pipeline_ast: &crate::ast::QueryPipelineAst,
    schema: &dyn SchemaZone,
    env: &dyn ModelEnvironment,
    dialect: &dyn DialectMap,
    diagnostics: &mut Vec<Diag>,
) -> StructDef {
    let start = match &pipeline_ast.head {
        Some(crate::ast::PipelineHeadAst::Explicit(source)) => resolve_source(source, schema, env, dialect, diagnostics),
        Some(crate::ast::PipelineHeadAst::Turtle(name)) => env.named_source(name.as_str()).unwrap_or_else(|| error_struct(dialect)),
        None => error_struct(dialect),
    };
    let (_pipeline, output) = crate::pipeline::compose_pipeline(pipeline_ast, &start, None, diagnostics);
    StructDef::new(output.name.clone(), output.dialect.clone())
        .with_fields(output.fields.as_ref().clone())
        .with_struct_source(StructSource::Query {
            query: Box::new(crate::model::Query {
                struct_ref: crate::model::StructRef::Inline(Arc::new(start)),
                pipeline: _pipeline,
                location: None,
            }),
        })
        .with_struct_relationship(StructRelationship::BaseTable)
}

/// Applies a `RefinedExplore`'s properties on top of a resolved base
/// struct: primary key, accept/except, joins, declares, turtles, renames,
/// and filters (§4.6).
#[allow(clippy::too_many_arguments)]
fn resolve_refined_explore(
    base: StructDef,
    properties: &[ExploreProperty],
    _span: crate::ast::Span,
    schema: &dyn SchemaZone,
    env: &dyn ModelEnvironment,
    dialect: &dyn DialectMap,
    diagnostics: &mut Vec<Diag>,
) -> StructDef {
    let mut space = DynamicSpace::new(base.clone());
    let mut primary_key = base.primary_key.clone();
    let mut filter_list = base.filter_list.clone();
    let mut accept: Option<Vec<SmolStr>> = None;
    let mut except: Vec<SmolStr> = Vec::new();
    let mut saw_primary_key = false;
    let mut saw_accept = false;
    let mut saw_except = false;

    for prop in properties {
        match prop {
            ExploreProperty::PrimaryKey(name, span) => {
                if saw_primary_key {
                    diagnostics.push(
                        Diag::warning("this source already has a primary key; the later one overrides it")
                            .with_primary_label(span.clone(), "here"),
                    );
                }
                saw_primary_key = true;
                if space.lookup(&crate::ast::FieldPath::single(name.clone())) == crate::spaces::LookupResult::NotFound {
                    diagnostics.push(Diag::error(format!("'{name}' is not a field of this source")).with_primary_label(span.clone(), "here"));
                } else {
                    primary_key = Some(name.clone());
                }
            }
            ExploreProperty::FieldList(FieldListEdit::Accept(names)) => {
                if saw_accept {
                    diagnostics.push(Diag::warning(
                        "this source already has an 'accept' list; the later one overrides it",
                    ));
                }
                saw_accept = true;
                accept = Some(names.clone());
            }
            ExploreProperty::FieldList(FieldListEdit::Except(names)) => {
                if saw_except {
                    diagnostics.push(Diag::warning(
                        "this source already has an 'except' list; the names accumulate",
                    ));
                }
                saw_except = true;
                except.extend(names.iter().cloned());
            }
            ExploreProperty::Join(join) => {
                let target = match &join.target {
                    crate::ast::JoinTarget::Named(name) => env.named_source(name.as_str()).map(Arc::new),
                    crate::ast::JoinTarget::Inline(source) => {
                        Some(Arc::new(resolve_source(source, schema, env, dialect, diagnostics)))
                    }
                };
                let Some(def) = target else {
                    diagnostics.push(Diag::error(format!("'{}' is not a defined source to join", join.name)).with_primary_label(join.span.clone(), "here"));
                    continue;
                };
                let join_kind = match join.cardinality {
                    JoinCardinality::One => JoinKind::One,
                    JoinCardinality::Many => JoinKind::Many,
                    JoinCardinality::Cross => JoinKind::Cross,
                };
                space.add_entry(
                    SpaceEntry::Join {
                        name: join.name.clone(),
                        def,
                        join_kind,
                    },
                    diagnostics,
                );
                if let Some(on) = &join.on {
                    let _ = crate::eval::evaluate(on, &space, diagnostics);
                }
            }
            ExploreProperty::Declare(declare) => {
                let value = crate::eval::evaluate(&declare.expr, &space, diagnostics);
                space.add_entry(
                    SpaceEntry::Column {
                        name: declare.name.clone(),
                        def: FieldDef::Atomic {
                            name: declare.name.clone(),
                            data_type: value.data_type,
                            location: None,
                        },
                    },
                    diagnostics,
                );
            }
            ExploreProperty::Turtle { name, pipeline, span } => {
                let (compiled, _) = crate::pipeline::compose_pipeline(pipeline, space.struct_def(), None, diagnostics);
                space.add_entry(
                    SpaceEntry::Turtle {
                        name: name.clone(),
                        pipeline: compiled,
                    },
                    diagnostics,
                );
                let _ = span;
            }
            ExploreProperty::Rename(rename) => {
                if rename.new_name == rename.old_name {
                    diagnostics.push(
                        Diag::error(format!("'{}' is renamed to itself", rename.old_name))
                            .with_primary_label(rename.span.clone(), "here"),
                    );
                    continue;
                }
                space.add_entry(
                    SpaceEntry::Rename {
                        new_name: rename.new_name.clone(),
                        old_name: rename.old_name.clone(),
                    },
                    diagnostics,
                );
            }
            ExploreProperty::Filter(filter) => {
                let value = crate::eval::evaluate(&filter.condition, &space, diagnostics);
                filter_list.push(value);
            }
        }
    }

    if let Some(keep) = &accept {
        space.accept(keep);
    }
    if !except.is_empty() {
        space.except(&except);
    }

    let finalized = space.finalize().clone();
    let mut result = finalized;
    result.primary_key = primary_key;
    result.filter_list = filter_list;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AtomicFieldType, Parameter};

    struct FakeSchema;
    impl SchemaZone for FakeSchema {
        fn table_schema(&self, name: &str) -> Option<StructDef> {
            if name == "orders" {
                Some(StructDef::new("orders", "standardsql").with_fields(vec![FieldDef::Atomic {
                    name: "amount".into(),
                    data_type: AtomicFieldType::Number,
                    location: None,
                }]))
            } else {
                None
            }
        }
        fn sql_block_schema(&self, _name: &str) -> Option<StructDef> {
            None
        }
    }

    struct FakeEnv;
    impl ModelEnvironment for FakeEnv {
        fn named_source(&self, _name: &str) -> Option<StructDef> {
            None
        }
        fn named_query(&self, _name: &str) -> Option<crate::model::Query> {
            None
        }
    }

    struct FakeDialect;
    impl DialectMap for FakeDialect {
        fn default_dialect(&self) -> SmolStr {
            "standardsql".into()
        }
    }

    #[test]
    fn resolves_known_table() {
        let mut diags = Vec::new();
        let source = SourceAst::Table { name: "orders".into(), span: 0..6 };
        let def = resolve_source(&source, &FakeSchema, &FakeEnv, &FakeDialect, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(def.name.as_str(), "orders");
    }

    #[test]
    fn unknown_table_reports_error() {
        let mut diags = Vec::new();
        let source = SourceAst::Table { name: "missing".into(), span: 0..7 };
        let _ = resolve_source(&source, &FakeSchema, &FakeEnv, &FakeDialect, &mut diags);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn named_source_casts_mismatched_parameter_value() {
        struct ParamEnv;
        impl ModelEnvironment for ParamEnv {
            fn named_source(&self, name: &str) -> Option<StructDef> {
                if name == "s" {
                    let mut def = StructDef::new("s", "standardsql");
                    def.parameters = vec![Parameter::Value {
                        name: "p".into(),
                        data_type: AtomicFieldType::Number,
                        value: None,
                        constant: false,
                    }];
                    Some(def)
                } else {
                    None
                }
            }
            fn named_query(&self, _name: &str) -> Option<crate::model::Query> {
                None
            }
        }

        let mut diags = Vec::new();
        let source = SourceAst::Named {
            ref_name: "s".into(),
            param_values: vec![ParamBinding {
                name: "p".into(),
                value: crate::ast::Expr::Literal(crate::ast::Literal::Date("2020-01-01".into()), 0..10),
                span: 0..10,
            }],
            span: 0..10,
        };
        let def = resolve_source(&source, &FakeSchema, &ParamEnv, &FakeDialect, &mut diags);
        match def.parameter_named("p") {
            Some(Parameter::Value { value: Some(v), .. }) => assert_eq!(v.data_type, AtomicFieldType::Number),
            other => panic!("expected a cast number value, got {other:?}"),
        }
    }

    #[test]
    fn refined_explore_applies_primary_key() {
        let mut diags = Vec::new();
        let base = SourceAst::Table { name: "orders".into(), span: 0..6 };
        let refined = SourceAst::Refined {
            base: Box::new(base),
            properties: vec![ExploreProperty::PrimaryKey("amount".into(), 0..6)],
            span: 0..10,
        };
        let def = resolve_source(&refined, &FakeSchema, &FakeEnv, &FakeDialect, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(def.primary_key.as_deref(), Some("amount"));
    }

    #[test]
    fn missing_required_parameter_is_diagnosed() {
        let mut base = StructDef::new("s", "standardsql");
        base.parameters = vec![Parameter::Value {
            name: "p".into(),
            data_type: AtomicFieldType::Number,
            value: None,
            constant: false,
        }];
        let mut diags = Vec::new();
        let def = bind_parameters(base, &[], &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("missing required parameter"));
        assert!(def.parameter_named("p").unwrap().is_required());
    }

    #[test]
    fn supplied_parameter_is_not_flagged_as_missing() {
        let mut base = StructDef::new("s", "standardsql");
        base.parameters = vec![Parameter::Value {
            name: "p".into(),
            data_type: AtomicFieldType::Number,
            value: None,
            constant: false,
        }];
        let bindings = vec![ParamBinding {
            name: "p".into(),
            value: crate::ast::Expr::Literal(crate::ast::Literal::Number("1".into()), 0..1),
            span: 0..1,
        }];
        let mut diags = Vec::new();
        let _ = bind_parameters(base, &bindings, &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn renaming_a_field_to_itself_is_rejected() {
        let mut diags = Vec::new();
        let base = SourceAst::Table { name: "orders".into(), span: 0..6 };
        let refined = SourceAst::Refined {
            base: Box::new(base),
            properties: vec![ExploreProperty::Rename(crate::ast::RenameEntry {
                new_name: "amount".into(),
                old_name: "amount".into(),
                span: 0..6,
            })],
            span: 0..10,
        };
        let _ = resolve_source(&refined, &FakeSchema, &FakeEnv, &FakeDialect, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("renamed to itself"));
    }

    #[test]
    fn repeated_primary_key_is_diagnosed() {
        let mut diags = Vec::new();
        let base = SourceAst::Table { name: "orders".into(), span: 0..6 };
        let refined = SourceAst::Refined {
            base: Box::new(base),
            properties: vec![
                ExploreProperty::PrimaryKey("amount".into(), 0..6),
                ExploreProperty::PrimaryKey("amount".into(), 0..6),
            ],
            span: 0..10,
        };
        let def = resolve_source(&refined, &FakeSchema, &FakeEnv, &FakeDialect, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(def.primary_key.as_deref(), Some("amount"));
    }

    #[test]
    fn repeated_accept_is_diagnosed() {
        let mut diags = Vec::new();
        let base = SourceAst::Table { name: "orders".into(), span: 0..6 };
        let refined = SourceAst::Refined {
            base: Box::new(base),
            properties: vec![
                ExploreProperty::FieldList(FieldListEdit::Accept(vec!["amount".into()])),
                ExploreProperty::FieldList(FieldListEdit::Accept(vec!["amount".into()])),
            ],
            span: 0..10,
        };
        let _ = resolve_source(&refined, &FakeSchema, &FakeEnv, &FakeDialect, &mut diags);
        assert_eq!(diags.len(), 1);
    }
}
