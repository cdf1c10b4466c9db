//! BigQuery dialect implementation.

use crate::definitions::{Aggregation, TimeGranularity};
use crate::sql_ast::Function;

use super::{is_plain_ident, Dialect};

#[derive(Debug, Default, Clone, Copy)]
pub struct BigQueryDialect;

impl Dialect for BigQueryDialect {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_ident(&self, ident: &str) -> String {
        if is_plain_ident(ident) {
            ident.to_string()
        } else {
            format!("`{}`", ident.replace('`', "\\`"))
        }
    }

    fn qualify_table(&self, table: &str) -> String {
        // A path with a hyphenated project id is quoted as a whole.
        if table.split('.').all(is_plain_ident) {
            table.to_string()
        } else {
            format!("`{}`", table.replace('`', "\\`"))
        }
    }

    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            Aggregation::Median => format!("APPROX_QUANTILES({expr}, 2)[OFFSET(1)]"),
            Aggregation::SumBoolean => format!("SUM(CAST({expr} AS INT64))"),
            Aggregation::Sum => format!("SUM({expr})"),
            Aggregation::Count => format!("COUNT({expr})"),
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            Aggregation::Min => format!("MIN({expr})"),
            Aggregation::Max => format!("MAX({expr})"),
            Aggregation::Average => format!("AVG({expr})"),
        }
    }

    fn render_ilike(&self, left: &str, right: &str) -> String {
        // No ILIKE in BigQuery
        format!("(LOWER({left}) LIKE LOWER({right}))")
    }

    fn render_literal(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => {
                format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => b.to_string().to_uppercase(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            serde_json::Value::Object(_) => self.render_literal(&serde_json::Value::String(
                value.to_string(),
            )),
        }
    }

    fn render_function(&self, func: &Function, args: Vec<String>) -> String {
        match func {
            // BigQuery: DATE_TRUNC(datetime, MONTH)
            Function::DateTrunc(grain) => match args.as_slice() {
                [expr] => format!("DATE_TRUNC({expr}, {})", bq_grain_to_str(grain)),
                _ => "NULL".to_string(),
            },
            Function::CastDatetime => match args.as_slice() {
                [expr] => format!("CAST({expr} AS DATETIME)"),
                _ => "NULL".to_string(),
            },
            Function::NullIf => match args.as_slice() {
                [expr1, expr2] => format!("NULLIF({expr1}, {expr2})"),
                _ => "NULL".to_string(),
            },
            // RANGE frames need a numeric order key
            Function::PeriodOrdinal(grain) => match args.as_slice() {
                [expr] if grain.has_day_ordinal() => format!("UNIX_DATE(CAST({expr} AS DATE))"),
                [expr] => format!(
                    "(EXTRACT(YEAR FROM {expr}) * 12 + EXTRACT(MONTH FROM {expr}))"
                ),
                _ => "NULL".to_string(),
            },
        }
    }
}

/// Convert a granularity to a BigQuery date part.
fn bq_grain_to_str(grain: &TimeGranularity) -> &'static str {
    match grain {
        TimeGranularity::Day => "DAY",
        TimeGranularity::Week => "WEEK",
        TimeGranularity::Month => "MONTH",
        TimeGranularity::Quarter => "QUARTER",
        TimeGranularity::Year => "YEAR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_ast::{SqlExpr, SqlRenderer};

    #[test]
    fn quotes_only_when_needed() {
        let d = BigQueryDialect;
        assert_eq!(d.quote_ident("revenue"), "revenue");
        assert_eq!(d.quote_ident("order"), "`order`");
        assert_eq!(d.qualify_table("shop.orders"), "shop.orders");
        assert_eq!(
            d.qualify_table("my-project.shop.orders"),
            "`my-project.shop.orders`"
        );
    }

    #[test]
    fn truncates_through_datetime() {
        let expr = SqlExpr::truncate_time(SqlExpr::Raw("created_at".into()), TimeGranularity::Month);
        assert_eq!(
            SqlRenderer::new(&BigQueryDialect).render_expr(&expr),
            "DATE_TRUNC(CAST(created_at AS DATETIME), MONTH)"
        );
    }

    #[test]
    fn escapes_string_literals_with_backslash() {
        let d = BigQueryDialect;
        assert_eq!(
            d.render_literal(&serde_json::Value::String("O'Hare".into())),
            "'O\\'Hare'"
        );
    }

    #[test]
    fn boolean_sums_cast_to_int64() {
        assert_eq!(
            BigQueryDialect.render_aggregation(&Aggregation::SumBoolean, "is_paid"),
            "SUM(CAST(is_paid AS INT64))"
        );
    }
}
