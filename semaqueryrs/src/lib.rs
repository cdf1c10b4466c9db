pub mod artifact;
pub mod compiler;
pub mod config;
pub mod definitions;
pub mod dialect;
pub mod error;
pub mod expr_parser;
pub mod registry;
pub mod request;
pub mod sql_ast;
pub mod telemetry;
pub mod validation;

use std::path::Path;

use crate::error::Result;

/// Load definitions from disk and compile one request with the given config.
pub fn compile_from_dir<P: AsRef<Path>>(
    definitions_dir: P,
    config: &SemaqueryConfig,
    request: &QueryRequest,
) -> Result<GeneratedSqlQueryParts> {
    let registry = DefinitionRegistry::load_from_dir(definitions_dir)?;
    QueryCompiler::from_config(config).compile(&registry, request)
}

pub use artifact::{GeneratedSqlQueryParts, IncompatibilityReason, IncompatibleItem};
pub use compiler::{CancellationFlag, QueryCompiler};
pub use config::{CompilerConfig, SemaqueryConfig};
pub use definitions::DefinitionBatch;
pub use dialect::{BigQueryDialect, Dialect, DialectKind, DuckDbDialect};
pub use error::SemaqueryError;
pub use registry::{DefinitionRegistry, RegistryHandle};
pub use request::QueryRequest;
