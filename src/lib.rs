//! A semantic-analysis and query-plan construction engine for a Malloy-style
//! analytics query language: given a parsed document, resolves sources,
//! evaluates expressions, and composes pipelines into finished query plans.
//!
//! What this crate does NOT do (by design — see `SPEC_FULL.md`'s Non-goals):
//! lexing and parsing source text (consumes an already-built `ast::Document`),
//! writing SQL (produces dialect-neutral `model::PlanFragment` shapes for a
//! downstream writer), fetching schema from a live database (delegates to
//! `sources::SchemaZone`), and resolving imports across files (delegates to
//! `sources::ModelEnvironment`).

pub mod ast;
pub mod compiler;
pub mod diag;
pub mod errors;
pub mod eval;
pub mod model;
pub mod pipeline;
pub mod segments;
pub mod sources;
pub mod spaces;

pub use compiler::{CompileOutcome, ModelCompiler, ModelDataRequest};
pub use diag::{Diag, DiagSeverity, SourceFile};
