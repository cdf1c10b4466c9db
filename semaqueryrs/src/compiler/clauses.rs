//! Clause assembly: WHERE, date range, GROUP BY, HAVING/QUALIFY, ORDER BY, LIMIT.

use crate::artifact::IncompatibleItem;
use crate::config::CompilerConfig;
use crate::definitions::TimeGranularity;
use crate::error::{Result, SemaqueryError};
use crate::request::QueryRequest;
use crate::sql_ast::{OrderItem, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, TableRef};

use super::filters::filter_predicate;
use super::mega_table::MegaTable;
use super::metrics::CompiledMetric;
use super::resolve::{DateColumn, ResolvedDateRange, ResolvedRequest};

#[derive(Debug, Clone, Default)]
pub struct Clauses {
    /// Applied inside the aggregated mega table.
    pub where_predicates: Vec<SqlExpr>,
    /// The full date range predicate, lower and upper bound.
    pub date_predicates: Vec<SqlExpr>,
    pub having: Vec<SqlExpr>,
    pub qualify: Vec<SqlExpr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AssembledQuery {
    pub clauses: Clauses,
    pub aggregated: SelectQuery,
    pub final_query: SelectQuery,
}

pub fn assemble(
    resolved: &ResolvedRequest<'_>,
    mega: &MegaTable,
    compiled: &[CompiledMetric],
    request: &QueryRequest,
    config: &CompilerConfig,
) -> Result<AssembledQuery> {
    let mut clauses = Clauses::default();

    for (filter, column) in resolved.filters.iter().zip(&mega.columns.filters) {
        clauses.where_predicates.push(filter_predicate(
            SqlExpr::column(column),
            &filter.filter,
            filter.target.grain,
        )?);
    }

    let has_window = compiled.iter().any(|m| m.is_window);
    if let Some(range) = &resolved.date_range {
        let (lower, upper) = date_bounds(range, resolved, mega)?;
        clauses.date_predicates = vec![lower.clone(), upper.clone()];
        // Windowed metrics need the rows before the range start to accumulate.
        if has_window && matches!(range.column, DateColumn::Axis(_)) {
            clauses.qualify.push(lower);
        } else {
            clauses.where_predicates.push(lower);
        }
        clauses.where_predicates.push(upper);
    }

    for having in &request.having {
        if is_excluded(&resolved.incompatible_metrics, &having.field) {
            tracing::debug!(field = %having.field, "dropping having on an incompatible metric");
            continue;
        }
        let metric = compiled
            .iter()
            .find(|m| m.name == having.field)
            .or_else(|| {
                resolved
                    .metrics
                    .iter()
                    .find(|m| m.requested == having.field)
                    .and_then(|m| compiled.iter().find(|c| c.name == m.metric.name))
            })
            .ok_or_else(|| SemaqueryError::InvalidFilterTarget {
                target: having.field.clone(),
            })?;
        let predicate = filter_predicate(metric.expr.clone(), having, None)?;
        if metric.is_window {
            clauses.qualify.push(predicate);
        } else {
            clauses.having.push(predicate);
        }
    }

    clauses.group_by = resolved.dimensions.iter().map(|d| d.alias.clone()).collect();

    let aliases: Vec<&str> = clauses
        .group_by
        .iter()
        .map(String::as_str)
        .chain(compiled.iter().map(|m| m.name.as_str()))
        .collect();
    for item in &request.order_by {
        if is_excluded(&resolved.incompatible_metrics, &item.column)
            || is_excluded(&resolved.incompatible_dimensions, &item.column)
        {
            tracing::debug!(column = %item.column, "dropping order by on an incompatible item");
            continue;
        }
        if !aliases.contains(&item.column.as_str()) {
            return Err(SemaqueryError::InvalidOrderByTarget {
                target: item.column.clone(),
            });
        }
        clauses.order_by.push(OrderItem {
            expr: SqlExpr::column(&item.column),
            direction: item.direction,
        });
    }

    clauses.limit = config.effective_limit(request.limit);

    let mut select = Vec::with_capacity(resolved.dimensions.len() + compiled.len());
    for (dim, column) in resolved.dimensions.iter().zip(&mega.columns.dimensions) {
        let alias = (*column != dim.alias).then(|| dim.alias.clone());
        select.push(SelectItem {
            expr: SqlExpr::column(column),
            alias,
        });
    }
    for metric in compiled {
        select.push(SelectItem::aliased(metric.expr.clone(), &metric.name));
    }

    let final_query = SelectQuery {
        select,
        from: TableRef::cte(&mega.aggregated_alias),
        filters: Vec::new(),
        group_by: mega.columns.dimensions.iter().map(SqlExpr::column).collect(),
        having: clauses.having.clone(),
        qualify: clauses.qualify.clone(),
        order_by: clauses.order_by.clone(),
        limit: clauses.limit,
    };

    let mut aggregated = mega.aggregated.clone();
    aggregated.filters = clauses.where_predicates.clone();

    tracing::debug!(
        where_predicates = clauses.where_predicates.len(),
        having = clauses.having.len(),
        qualify = clauses.qualify.len(),
        limit = ?clauses.limit,
        "clauses assembled"
    );

    Ok(AssembledQuery {
        clauses,
        aggregated,
        final_query,
    })
}

fn is_excluded(items: &[IncompatibleItem], name: &str) -> bool {
    items.iter().any(|item| item.name == name)
}

/// `>= start` and `<= end`, both sides truncated to the column's grain.
fn date_bounds(
    range: &ResolvedDateRange,
    resolved: &ResolvedRequest<'_>,
    mega: &MegaTable,
) -> Result<(SqlExpr, SqlExpr)> {
    let (column, grain) = match range.column {
        DateColumn::Axis(index) => (
            mega.columns.dimensions.get(index).cloned(),
            resolved
                .dimensions
                .get(index)
                .and_then(|d| d.grain)
                .unwrap_or(TimeGranularity::Day),
        ),
        DateColumn::Hidden { grain } => (mega.columns.primary_time.clone(), grain),
    };
    let column = column.ok_or_else(|| {
        SemaqueryError::InvalidRequest("date range has no time column to apply to".to_string())
    })?;
    let truncated = |expr: SqlExpr| SqlExpr::truncate_time(expr, grain);
    let lower = SqlExpr::binary(
        SqlBinaryOperator::Gte,
        truncated(SqlExpr::column(&column)),
        truncated(SqlExpr::string(range.range.start.to_string())),
    );
    let upper = SqlExpr::binary(
        SqlBinaryOperator::Lte,
        truncated(SqlExpr::column(&column)),
        truncated(SqlExpr::string(range.range.end.to_string())),
    );
    Ok((lower, upper))
}
