//! Metric expression compilation over the aggregated mega table.

use serde_json::Value;

use crate::definitions::{Aggregation, CumulativePolicy, MetricKind};
use crate::error::{Result, SemaqueryError};
use crate::expr_parser::{rewrite_references, tokenize};
use crate::registry::DefinitionRegistry;
use crate::request::SortDirection;
use crate::sql_ast::{Function, OrderItem, SqlBinaryOperator, SqlExpr, SqlRenderer, WindowFrame};

use super::mega_table::MegaColumns;
use super::resolve::{ResolvedMetric, ResolvedRequest};

#[derive(Debug, Clone)]
pub struct CompiledMetric {
    /// Output alias; always the metric's name.
    pub name: String,
    pub expr: SqlExpr,
    /// Window expressions filter in QUALIFY, not HAVING.
    pub is_window: bool,
}

pub struct MetricCompiler<'a, 'r> {
    registry: &'r DefinitionRegistry,
    resolved: &'a ResolvedRequest<'r>,
    columns: &'a MegaColumns,
    renderer: &'a SqlRenderer<'a>,
}

impl<'a, 'r> MetricCompiler<'a, 'r> {
    pub fn new(
        registry: &'r DefinitionRegistry,
        resolved: &'a ResolvedRequest<'r>,
        columns: &'a MegaColumns,
        renderer: &'a SqlRenderer<'a>,
    ) -> Self {
        Self {
            registry,
            resolved,
            columns,
            renderer,
        }
    }

    pub fn compile_all(&self) -> Result<Vec<CompiledMetric>> {
        self.resolved.metrics.iter().map(|m| self.compile(m)).collect()
    }

    pub fn compile(&self, resolved: &ResolvedMetric<'_>) -> Result<CompiledMetric> {
        let metric = resolved.metric;
        let (expr, is_window) = match &metric.kind {
            MetricKind::MeasureProxy { measure } => (self.rollup(measure)?, false),
            MetricKind::Ratio {
                numerator,
                denominator,
            } => {
                let guarded = SqlExpr::Function {
                    func: Function::NullIf,
                    args: vec![self.rollup(denominator)?, SqlExpr::Literal(Value::from(0))],
                };
                (
                    SqlExpr::binary(SqlBinaryOperator::Divide, self.rollup(numerator)?, guarded),
                    false,
                )
            }
            MetricKind::Cumulative { measure, policy } => {
                (self.cumulative(&metric.name, measure, policy)?, true)
            }
            MetricKind::Derived {
                expression,
                measures,
            }
            | MetricKind::SqlExpression {
                expression,
                measures,
            } => (self.substitute(&metric.name, expression, measures)?, false),
        };
        tracing::debug!(metric = %metric.name, kind = metric.kind.type_name(), "metric compiled");
        Ok(CompiledMetric {
            name: metric.name.clone(),
            expr,
            is_window,
        })
    }

    /// Re-aggregate a measure column of the aggregated mega table.
    fn rollup(&self, measure: &str) -> Result<SqlExpr> {
        let info = self.registry.measure(measure)?;
        let column = self.columns.measure(measure).ok_or_else(|| {
            SemaqueryError::invalid_definition(measure, "measure has no mega-table column")
        })?;
        Ok(SqlExpr::aggregate(info.agg.rollup(), SqlExpr::column(column)))
    }

    fn cumulative(&self, metric: &str, measure: &str, policy: &CumulativePolicy) -> Result<SqlExpr> {
        let (axis_index, axis) = self
            .resolved
            .time_axis
            .zip(self.resolved.axis())
            .ok_or_else(|| {
                SemaqueryError::InvalidRequest(format!("{metric} needs the primary time dimension"))
            })?;
        let axis_grain = axis.grain.ok_or_else(|| {
            SemaqueryError::InvalidRequest(format!("{metric}: time axis has no granularity"))
        })?;
        let axis_column = SqlExpr::column(&self.columns.dimensions[axis_index]);

        let inner = self.rollup(measure)?;
        let outer = match self.registry.measure(measure)?.agg.rollup() {
            Aggregation::Min => Aggregation::Min,
            Aggregation::Max => Aggregation::Max,
            _ => Aggregation::Sum,
        };

        let mut partition_by: Vec<SqlExpr> = self
            .columns
            .dimensions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis_index)
            .map(|(_, column)| SqlExpr::column(column))
            .collect();

        // Rolling windows order by the period ordinal so the frame spans
        // calendar periods, not rows.
        let (order_key, frame) = match policy {
            CumulativePolicy::AllTime => (axis_column, WindowFrame::Unbounded),
            CumulativePolicy::GrainToDate(reset) => {
                partition_by.push(SqlExpr::truncate_time(axis_column.clone(), *reset));
                (axis_column, WindowFrame::Unbounded)
            }
            CumulativePolicy::Window(window) => {
                let periods = window.periods_on(axis_grain).ok_or_else(|| {
                    SemaqueryError::InvalidRequest(format!(
                        "{metric}: window does not fit {axis_grain} periods"
                    ))
                })?;
                let preceding = periods.saturating_sub(1) * axis_grain.ordinal_step();
                (
                    SqlExpr::period_ordinal(axis_column, axis_grain),
                    WindowFrame::Range { preceding },
                )
            }
        };

        Ok(SqlExpr::Window {
            func: Box::new(SqlExpr::aggregate(outer, inner)),
            partition_by,
            order_by: vec![OrderItem {
                expr: order_key,
                direction: SortDirection::Asc,
            }],
            frame,
        })
    }

    /// Replace each measure named in `expression` with its rolled-up column.
    fn substitute(&self, metric: &str, expression: &str, measures: &[String]) -> Result<SqlExpr> {
        let tokens = tokenize(expression)
            .map_err(|message| SemaqueryError::invalid_definition(metric, message))?;
        let rewritten = rewrite_references(&tokens, |token| {
            if !measures.iter().any(|m| m == token) {
                return Err(SemaqueryError::UnresolvedMeasureReference {
                    metric: metric.to_string(),
                    token: token.to_string(),
                });
            }
            Ok(self.renderer.render_expr(&self.rollup(token)?))
        })?;
        Ok(SqlExpr::Raw(format!("({})", rewritten.trim())))
    }
}
