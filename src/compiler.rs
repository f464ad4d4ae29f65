//! Top-level compiler driver (§5, §7): walks a `Document`, resolves every
//! `source:`/`query:` statement, and either returns a finished
//! `CompileOutcome` or a `ModelDataRequest` describing what external
//! schema is still needed before compilation can proceed.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::ast::{Document, SourceAst, Statement};
use crate::diag::Diag;
use crate::model::{Query, StructDef};
use crate::sources::{resolve_source, DialectMap, ModelEnvironment, SchemaZone};

/// Schema this compiler still needs before it can finish a document: every
/// physical table and SQL block named by a `table()`/`sql()` source that
/// the supplied `SchemaZone` didn't already have on hand. The host
/// application is expected to fetch these and retry (§5 concurrency
/// model), rather than the compiler blocking on I/O itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDataRequest {
    pub tables: Vec<SmolStr>,
    pub sql_blocks: Vec<SmolStr>,
}

impl ModelDataRequest {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.sql_blocks.is_empty()
    }
}

/// The result of compiling one document.
pub enum CompileOutcome {
    /// Every source in the document resolved; here are the named sources
    /// and queries it produced, plus any diagnostics (warnings/notes never
    /// block a plan — §7 policy).
    Complete {
        sources: HashMap<SmolStr, StructDef>,
        queries: HashMap<SmolStr, Query>,
        anonymous_queries: Vec<Query>,
        diagnostics: Vec<Diag>,
    },
    /// At least one `table()`/`sql()` source's schema wasn't available from
    /// the `SchemaZone`; compilation did not proceed.
    Pending(ModelDataRequest),
}

impl CompileOutcome {
    pub fn has_errors(&self) -> bool {
        match self {
            CompileOutcome::Complete { diagnostics, .. } => diagnostics.iter().any(Diag::is_error),
            CompileOutcome::Pending(_) => false,
        }
    }
}

/// An environment that layers a document's own `source:`/`query:`
/// statements, resolved so far, on top of whatever the host's
/// `ModelEnvironment` already knows — so a later statement in the same
/// document can refer to an earlier one by name (§4.6, §6 "Consumed").
struct DocumentEnvironment<'a> {
    resolved_sources: HashMap<SmolStr, StructDef>,
    resolved_queries: HashMap<SmolStr, Query>,
    host: &'a dyn ModelEnvironment,
}

impl<'a> ModelEnvironment for DocumentEnvironment<'a> {
    fn named_source(&self, name: &str) -> Option<StructDef> {
        self.resolved_sources
            .get(name)
            .cloned()
            .or_else(|| self.host.named_source(name))
    }

    fn named_query(&self, name: &str) -> Option<Query> {
        self.resolved_queries
            .get(name)
            .cloned()
            .or_else(|| self.host.named_query(name))
    }
}

/// The compiler entry point. Holds no state of its own beyond the three
/// collaborator traits; `compile` is reentrant and side-effect-free aside
/// from the diagnostics it returns.
pub struct ModelCompiler<'a> {
    pub schema: &'a dyn SchemaZone,
    pub env: &'a dyn ModelEnvironment,
    pub dialect: &'a dyn DialectMap,
}

impl<'a> ModelCompiler<'a> {
    pub fn new(schema: &'a dyn SchemaZone, env: &'a dyn ModelEnvironment, dialect: &'a dyn DialectMap) -> Self {
        Self { schema, env, dialect }
    }

    pub fn compile(&self, document: &Document) -> CompileOutcome {
        let request = self.collect_pending(document);
        if !request.is_empty() {
            return CompileOutcome::Pending(request);
        }

        let mut diagnostics = Vec::new();
        let mut doc_env = DocumentEnvironment {
            resolved_sources: HashMap::new(),
            resolved_queries: HashMap::new(),
            host: self.env,
        };
        let mut anonymous_queries = Vec::new();

        for statement in &document.statements {
            match statement {
                Statement::Source(decl) => {
                    let def = resolve_source(&decl.source, self.schema, &doc_env, self.dialect, &mut diagnostics);
                    doc_env.resolved_sources.insert(decl.name.clone(), def);
                }
                Statement::Query(decl) => {
                    let base = resolve_source(&decl.source, self.schema, &doc_env, self.dialect, &mut diagnostics);
                    let (pipeline, _output) =
                        crate::pipeline::compose_pipeline(&decl.pipeline, &base, None, &mut diagnostics);
                    let query = Query {
                        struct_ref: crate::model::StructRef::Inline(std::sync::Arc::new(base)),
                        pipeline,
                        location: Some(decl.span.clone()),
                    };
                    match &decl.name {
                        Some(name) => {
                            doc_env.resolved_queries.insert(name.clone(), query);
                        }
                        None => anonymous_queries.push(query),
                    }
                }
            }
        }

        CompileOutcome::Complete {
            sources: doc_env.resolved_sources,
            queries: doc_env.resolved_queries,
            anonymous_queries,
            diagnostics,
        }
    }

    /// Walks every source expression in the document (not recursing into
    /// join/turtle sub-sources — those resolve lazily once their owning
    /// statement is reached) and reports which `table()`/`sql()` names the
    /// schema zone doesn't already have (§5).
    fn collect_pending(&self, document: &Document) -> ModelDataRequest {
        let mut request = ModelDataRequest::default();
        for statement in &document.statements {
            let source = match statement {
                Statement::Source(decl) => &decl.source,
                Statement::Query(decl) => &decl.source,
            };
            collect_source_refs(source, self.schema, &mut request);
        }
        request
    }
}

fn collect_source_refs(source: &SourceAst, schema: &dyn SchemaZone, request: &mut ModelDataRequest) {
    match source {
        SourceAst::Table { name, .. } => {
            if schema.table_schema(name).is_none() && !request.tables.contains(name) {
                request.tables.push(name.clone());
            }
        }
        SourceAst::Sql { name, .. } => {
            if schema.sql_block_schema(name).is_none() && !request.sql_blocks.contains(name) {
                request.sql_blocks.push(name.clone());
            }
        }
        SourceAst::Named { .. } | SourceAst::Query(_) => {}
        SourceAst::Refined { base, .. } => collect_source_refs(base, schema, request),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Document, QueryPipelineAst, SourceStatement, Statement};
    use crate::model::{AtomicFieldType, FieldDef};

    struct FakeSchema {
        known: Vec<&'static str>,
    }
    impl SchemaZone for FakeSchema {
        fn table_schema(&self, name: &str) -> Option<StructDef> {
            if self.known.contains(&name) {
                Some(StructDef::new(name, "standardsql").with_fields(vec![FieldDef::Atomic {
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

    struct NoEnv;
    impl ModelEnvironment for NoEnv {
        fn named_source(&self, _name: &str) -> Option<StructDef> {
            None
        }
        fn named_query(&self, _name: &str) -> Option<Query> {
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
    fn missing_table_yields_pending_request() {
        let schema = FakeSchema { known: vec![] };
        let env = NoEnv;
        let dialect = FakeDialect;
        let compiler = ModelCompiler::new(&schema, &env, &dialect);
        let doc = Document {
            statements: vec![Statement::Source(SourceStatement {
                name: "orders".into(),
                source: SourceAst::Table { name: "orders".into(), span: 0..6 },
                span: 0..6,
            })],
        };
        match compiler.compile(&doc) {
            CompileOutcome::Pending(req) => assert_eq!(req.tables, vec![SmolStr::from("orders")]),
            CompileOutcome::Complete { .. } => panic!("expected pending"),
        }
    }

    #[test]
    fn known_table_compiles_to_completion() {
        let schema = FakeSchema { known: vec!["orders"] };
        let env = NoEnv;
        let dialect = FakeDialect;
        let compiler = ModelCompiler::new(&schema, &env, &dialect);
        let doc = Document {
            statements: vec![Statement::Source(SourceStatement {
                name: "orders".into(),
                source: SourceAst::Table { name: "orders".into(), span: 0..6 },
                span: 0..6,
            })],
        };
        match compiler.compile(&doc) {
            CompileOutcome::Complete { sources, diagnostics, .. } => {
                assert!(diagnostics.is_empty());
                assert!(sources.contains_key("orders"));
            }
            CompileOutcome::Pending(_) => panic!("expected complete"),
        }
    }

    #[test]
    fn later_statement_can_reference_earlier_named_source() {
        let schema = FakeSchema { known: vec!["orders"] };
        let env = NoEnv;
        let dialect = FakeDialect;
        let compiler = ModelCompiler::new(&schema, &env, &dialect);
        let doc = Document {
            statements: vec![
                Statement::Source(SourceStatement {
                    name: "orders_base".into(),
                    source: SourceAst::Table { name: "orders".into(), span: 0..6 },
                    span: 0..6,
                }),
                Statement::Query(crate::ast::QueryStatement {
                    name: Some("q".into()),
                    source: SourceAst::Named {
                        ref_name: "orders_base".into(),
                        param_values: vec![],
                        span: 7..18,
                    },
                    pipeline: QueryPipelineAst::default(),
                    span: 0..20,
                }),
            ],
        };
        match compiler.compile(&doc) {
            CompileOutcome::Complete { queries, diagnostics, .. } => {
                assert!(diagnostics.is_empty());
                assert!(queries.contains_key("q"));
            }
            CompileOutcome::Pending(_) => panic!("expected complete"),
        }
    }
}
