//! Mega-table construction.
//!
//! One SELECT branch per data source, stitched with `UNION ALL`, so every
//! branch exposes the same column list. A branch whose source lacks a
//! dimension or measure selects `NULL` in its place. The aggregated table
//! groups the raw rows by the requested dimensions, so its grain equals the
//! output grain of the final query.

use crate::config::CompilerConfig;
use crate::definitions::{DataSource, Dimension, TimeGranularity};
use crate::error::Result;
use crate::registry::DefinitionRegistry;
use crate::sql_ast::{SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, TableRef};

use super::naming::ColumnNamer;
use super::resolve::{DateColumn, ResolvedRequest};

/// Column names assigned in the mega table.
#[derive(Debug, Clone, Default)]
pub struct MegaColumns {
    /// One per resolved dimension, same order.
    pub dimensions: Vec<String>,
    /// One per resolved filter, same order. May repeat a dimension column.
    pub filters: Vec<String>,
    /// Hidden column carrying each branch's primary time, when the date
    /// range is not applied to a requested dimension.
    pub primary_time: Option<String>,
    /// `(measure, column)` in first-use order.
    pub measures: Vec<(String, String)>,
}

impl MegaColumns {
    pub fn measure(&self, name: &str) -> Option<&str> {
        self.measures
            .iter()
            .find(|(measure, _)| measure == name)
            .map(|(_, column)| column.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MegaTable {
    pub alias: String,
    pub aggregated_alias: String,
    pub branches: Vec<SelectQuery>,
    /// WHERE is left empty here; the clause assembler fills it in.
    pub aggregated: SelectQuery,
    pub columns: MegaColumns,
}

enum ColumnSpec<'r> {
    Dimension {
        dimension: &'r Dimension,
        grain: Option<TimeGranularity>,
    },
    PrimaryTime(TimeGranularity),
    Measure(&'r str),
}

pub fn build<'r>(
    registry: &'r DefinitionRegistry,
    resolved: &ResolvedRequest<'r>,
    config: &CompilerConfig,
) -> Result<MegaTable> {
    let mut namer = ColumnNamer::new();
    let mut specs: Vec<(String, ColumnSpec<'r>)> = Vec::new();
    let mut columns = MegaColumns::default();

    for dim in &resolved.dimensions {
        let name = namer.claim("dimension", &dim.alias);
        specs.push((
            name.clone(),
            ColumnSpec::Dimension {
                dimension: dim.dimension,
                grain: dim.grain,
            },
        ));
        columns.dimensions.push(name);
    }

    for (i, filter) in resolved.filters.iter().enumerate() {
        let existing = resolved
            .dimensions
            .iter()
            .position(|d| d.same_column(&filter.target))
            .map(|pos| columns.dimensions[pos].clone())
            .or_else(|| {
                resolved.filters[..i]
                    .iter()
                    .position(|f| f.target.same_column(&filter.target))
                    .map(|pos| columns.filters[pos].clone())
            });
        let name = match existing {
            Some(name) => name,
            None => {
                let name = namer.claim("filter", &filter.target.alias);
                specs.push((
                    name.clone(),
                    ColumnSpec::Dimension {
                        dimension: filter.target.dimension,
                        grain: filter.target.grain,
                    },
                ));
                name
            }
        };
        columns.filters.push(name);
    }

    if let Some(range) = &resolved.date_range {
        if let DateColumn::Hidden { grain } = range.column {
            let name = namer.claim("time", "primary_time");
            specs.push((name.clone(), ColumnSpec::PrimaryTime(grain)));
            columns.primary_time = Some(name);
        }
    }

    for metric in &resolved.metrics {
        for measure in metric.metric.kind.measure_names() {
            if columns.measure(measure).is_some() {
                continue;
            }
            let name = namer.claim("measure", measure);
            specs.push((name.clone(), ColumnSpec::Measure(measure)));
            columns.measures.push((measure.to_string(), name));
        }
    }

    let branches = resolved
        .sources
        .iter()
        .map(|source| branch(registry, source, &specs))
        .collect::<Vec<_>>();

    let dimension_refs: Vec<SqlExpr> = columns.dimensions.iter().map(SqlExpr::column).collect();
    let mut select: Vec<SelectItem> = dimension_refs
        .iter()
        .cloned()
        .map(|expr| SelectItem { expr, alias: None })
        .collect();
    for (measure, column) in &columns.measures {
        let info = registry.measure(measure)?;
        select.push(SelectItem::aliased(
            SqlExpr::aggregate(info.agg, SqlExpr::column(column)),
            column,
        ));
    }
    let aggregated = SelectQuery {
        select,
        from: TableRef::cte(&config.mega_table_alias),
        group_by: dimension_refs,
        ..Default::default()
    };

    tracing::debug!(
        branches = branches.len(),
        columns = specs.len(),
        "mega table built"
    );

    Ok(MegaTable {
        alias: config.mega_table_alias.clone(),
        aggregated_alias: config.aggregated_alias.clone(),
        branches,
        aggregated,
        columns,
    })
}

fn branch(registry: &DefinitionRegistry, source: &DataSource, specs: &[(String, ColumnSpec<'_>)]) -> SelectQuery {
    let select = specs
        .iter()
        .map(|(name, spec)| SelectItem::aliased(column_expr(registry, source, spec), name))
        .collect();
    let filters = source
        .property_scope()
        .map(|(column, id)| {
            vec![SqlExpr::binary(
                SqlBinaryOperator::Eq,
                SqlExpr::column(column),
                SqlExpr::string(id),
            )]
        })
        .unwrap_or_default();
    SelectQuery {
        select,
        from: TableRef::physical(&source.table),
        filters,
        ..Default::default()
    }
}

fn column_expr(registry: &DefinitionRegistry, source: &DataSource, spec: &ColumnSpec<'_>) -> SqlExpr {
    match spec {
        ColumnSpec::Dimension { dimension, grain } => {
            if !dimension.available_in(&source.name) {
                return SqlExpr::null();
            }
            let raw = SqlExpr::Raw(dimension.expr.clone());
            match grain {
                Some(grain) => SqlExpr::truncate_time(raw, *grain),
                None => raw,
            }
        }
        ColumnSpec::PrimaryTime(grain) => match registry.primary_time_dimension(&source.name) {
            Some(dimension) => SqlExpr::truncate_time(SqlExpr::Raw(dimension.expr.clone()), *grain),
            None => {
                tracing::warn!(
                    source = %source.name,
                    "no primary time dimension; date range excludes this branch"
                );
                SqlExpr::null()
            }
        },
        ColumnSpec::Measure(name) => match registry.measure_in(&source.name, name) {
            Some(measure) => SqlExpr::Raw(measure.expr.clone()),
            None => SqlExpr::null(),
        },
    }
}
