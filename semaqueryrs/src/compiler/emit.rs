//! Final artifact assembly. Renders the plan and fills in
//! `GeneratedSqlQueryParts`; no decisions are made here.

use crate::artifact::{
    fb_time_increment, FbAdsLevel, FbAdsParameters, GeneratedSqlQueryParts, MetricExpression,
};
use crate::definitions::{DimensionKind, SourceSystem};
use crate::dialect::Dialect;
use crate::sql_ast::SqlRenderer;

use super::clauses::AssembledQuery;
use super::mega_table::MegaTable;
use super::metrics::CompiledMetric;
use super::resolve::ResolvedRequest;

pub fn emit(
    resolved: &ResolvedRequest<'_>,
    mega: &MegaTable,
    compiled: &[CompiledMetric],
    assembled: &AssembledQuery,
    dialect: &dyn Dialect,
) -> GeneratedSqlQueryParts {
    let renderer = SqlRenderer::new(dialect);
    let clauses = &assembled.clauses;

    let mega_table_with_statement = format!(
        "{} AS ({})",
        dialect.quote_ident(&mega.alias),
        renderer.render_union_all(&mega.branches)
    );
    let mega_table_aggregated_with_statement = format!(
        "{} AS ({})",
        dialect.quote_ident(&mega.aggregated_alias),
        renderer.render_select(&assembled.aggregated)
    );
    let final_sql = renderer.render_select(&assembled.final_query);
    let generated_sql = format!(
        "WITH {mega_table_with_statement}, {mega_table_aggregated_with_statement} {final_sql}"
    );

    let metrics_expression = compiled
        .iter()
        .map(|m| MetricExpression {
            name: m.name.clone(),
            sql: renderer.render_expr(&m.expr),
        })
        .collect();

    let (level, time_increment, fb_ads) = fb_ads_parameters(resolved);

    let parts = GeneratedSqlQueryParts {
        mega_table_with_statement,
        mega_table_aggregated_with_statement,
        generated_sql,
        generated_sql_without_megatable_schema: final_sql,
        where_clause: renderer.render_predicates(&clauses.where_predicates),
        date_where_clause: renderer.render_predicates(&clauses.date_predicates),
        group_by_columns: clauses.group_by.clone(),
        having_clause: renderer.render_predicates(&clauses.having),
        qualify_clause: renderer.render_predicates(&clauses.qualify),
        order_by: (!clauses.order_by.is_empty())
            .then(|| renderer.render_order_by(&clauses.order_by)),
        limit: clauses.limit,
        metrics: resolved.requested_metrics.clone(),
        metrics_expression,
        date_ranges: resolved.date_range.iter().map(|r| r.range).collect(),
        incompatible_metrics: resolved.incompatible_metrics.clone(),
        incompatible_dimensions: resolved.incompatible_dimensions.clone(),
        sql_explanation: explain(resolved, compiled),
        final_summary_answer: None,
        level,
        time_increment,
        fb_ads,
    };

    tracing::debug!(sql_len = parts.generated_sql.len(), "artifact emitted");
    parts
}

fn fb_ads_parameters(
    resolved: &ResolvedRequest<'_>,
) -> (Option<FbAdsLevel>, Option<String>, Option<FbAdsParameters>) {
    if !resolved
        .sources
        .iter()
        .any(|s| s.system == SourceSystem::FbAds)
    {
        return (None, None, None);
    }

    let mut params = FbAdsParameters::default();
    for dim in &resolved.dimensions {
        let expr = dim.dimension.expr.clone();
        match dim.dimension.kind {
            DimensionKind::FbAdsField => params.fields.push(expr),
            DimensionKind::FbAdsBreakdown => params.breakdowns.push(expr),
            DimensionKind::FbAdsActionBreakdown => params.action_breakdowns.push(expr),
            DimensionKind::FbAdsSummaryActionBreakdown => {
                params.summary_action_breakdowns.push(expr)
            }
            DimensionKind::Categorical | DimensionKind::Time(_) => {}
        }
    }
    let level = params
        .fields
        .iter()
        .map(|f| FbAdsLevel::of_field(f))
        .max()
        .unwrap_or(FbAdsLevel::Account);
    let grain = resolved
        .dimensions
        .iter()
        .filter_map(|d| d.grain)
        .min();

    (
        Some(level),
        Some(fb_time_increment(grain).to_string()),
        Some(params),
    )
}

fn explain(resolved: &ResolvedRequest<'_>, compiled: &[CompiledMetric]) -> String {
    let names = |items: Vec<&str>| {
        if items.is_empty() {
            "nothing".to_string()
        } else {
            items.join(", ")
        }
    };
    let mut text = format!(
        "Computes {} by {} from {}.",
        names(compiled.iter().map(|m| m.name.as_str()).collect()),
        names(resolved.dimensions.iter().map(|d| d.alias.as_str()).collect()),
        names(resolved.sources.iter().map(|s| s.name.as_str()).collect()),
    );
    if !resolved.filters.is_empty() {
        let fields: Vec<&str> = resolved.filters.iter().map(|f| f.filter.field.as_str()).collect();
        text.push_str(&format!(" Filtered on {}.", fields.join(", ")));
    }
    if let Some(range) = &resolved.date_range {
        text.push_str(&format!(
            " Limited to {} through {}.",
            range.range.start, range.range.end
        ));
    }
    let excluded: Vec<String> = resolved
        .incompatible_metrics
        .iter()
        .chain(&resolved.incompatible_dimensions)
        .map(|item| format!("{} ({})", item.name, item.reason))
        .collect();
    if !excluded.is_empty() {
        text.push_str(&format!(" Left out: {}.", excluded.join("; ")));
    }
    text
}
