//! Request compilation pipeline.
//!
//! resolve -> mega table -> metric expressions -> clauses -> artifact.
//! Every stage is a pure function of the registry snapshot and the request,
//! so one `QueryCompiler` can serve any number of threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::artifact::GeneratedSqlQueryParts;
use crate::config::{CompilerConfig, SemaqueryConfig};
use crate::dialect::Dialect;
use crate::error::{Result, SemaqueryError};
use crate::registry::DefinitionRegistry;
use crate::request::QueryRequest;
use crate::sql_ast::SqlRenderer;

pub mod clauses;
pub mod emit;
mod filters;
pub mod mega_table;
pub mod metrics;
mod naming;
pub mod resolve;

pub use resolve::GRAIN_SEPARATOR;

/// Shared cancel switch for one in-flight compilation.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            tracing::debug!(stage, "compilation cancelled");
            return Err(SemaqueryError::Cancelled { stage });
        }
        Ok(())
    }
}

pub struct QueryCompiler {
    config: CompilerConfig,
    dialect: Box<dyn Dialect>,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        let dialect = config.dialect.build();
        Self { config, dialect }
    }

    /// Compile with an explicit dialect (useful for tests).
    pub fn with_dialect(config: CompilerConfig, dialect: Box<dyn Dialect>) -> Self {
        Self { config, dialect }
    }

    pub fn from_config(config: &SemaqueryConfig) -> Self {
        Self::new(config.compiler.clone())
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn compile(
        &self,
        registry: &DefinitionRegistry,
        request: &QueryRequest,
    ) -> Result<GeneratedSqlQueryParts> {
        self.compile_with_cancel(registry, request, &CancellationFlag::default())
    }

    pub fn compile_with_cancel(
        &self,
        registry: &DefinitionRegistry,
        request: &QueryRequest,
        cancel: &CancellationFlag,
    ) -> Result<GeneratedSqlQueryParts> {
        request.check_shape(self.config.max_requested_items)?;
        tracing::debug!(
            dialect = self.dialect.name(),
            metrics = request.metrics.len(),
            dimensions = request.dimensions.len(),
            "compiling request"
        );

        cancel.check("resolve")?;
        let resolved = resolve::resolve(registry, request)?;

        cancel.check("mega_table")?;
        let mega = mega_table::build(registry, &resolved, &self.config)?;

        cancel.check("metrics")?;
        let renderer = SqlRenderer::new(self.dialect.as_ref());
        let compiled =
            metrics::MetricCompiler::new(registry, &resolved, &mega.columns, &renderer).compile_all()?;

        cancel.check("clauses")?;
        let assembled = clauses::assemble(&resolved, &mega, &compiled, request, &self.config)?;

        cancel.check("emit")?;
        Ok(emit::emit(
            &resolved,
            &mega,
            &compiled,
            &assembled,
            self.dialect.as_ref(),
        ))
    }
}
