//! DuckDB dialect implementation.

use crate::sql_ast::Function;

use super::{grain_to_str, is_plain_ident, Dialect};

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_ident(&self, ident: &str) -> String {
        if is_plain_ident(ident) {
            ident.to_string()
        } else {
            format!("\"{}\"", ident.replace('"', "\"\""))
        }
    }

    fn render_function(&self, func: &Function, args: Vec<String>) -> String {
        match func {
            Function::DateTrunc(grain) => {
                let unit = grain_to_str(grain);
                format!("date_trunc('{unit}', {})", args.join(", "))
            }
            // DuckDB has no DATETIME type name; TIMESTAMP is the same thing
            Function::CastDatetime => match args.as_slice() {
                [expr] => format!("CAST({expr} AS TIMESTAMP)"),
                _ => "NULL".to_string(),
            },
            Function::NullIf => match args.as_slice() {
                [expr1, expr2] => format!("nullif({expr1}, {expr2})"),
                _ => "NULL".to_string(),
            },
            Function::PeriodOrdinal(grain) => match args.as_slice() {
                [expr] if grain.has_day_ordinal() => {
                    format!("date_diff('day', TIMESTAMP '1970-01-01', {expr})")
                }
                [expr] => format!("(year({expr}) * 12 + month({expr}))"),
                _ => "NULL".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{Aggregation, TimeGranularity};
    use crate::sql_ast::{SqlExpr, SqlRenderer};

    #[test]
    fn quotes_each_table_part() {
        let d = DuckDbDialect;
        assert_eq!(d.qualify_table("main.orders"), "main.orders");
        assert_eq!(d.qualify_table("main.order items"), "main.\"order items\"");
    }

    #[test]
    fn truncates_through_timestamp() {
        let expr = SqlExpr::truncate_time(SqlExpr::Raw("created_at".into()), TimeGranularity::Week);
        assert_eq!(
            SqlRenderer::new(&DuckDbDialect).render_expr(&expr),
            "date_trunc('week', CAST(created_at AS TIMESTAMP))"
        );
    }

    #[test]
    fn period_ordinals_count_days_or_months() {
        let renderer = SqlRenderer::new(&DuckDbDialect);
        let week = SqlExpr::period_ordinal(SqlExpr::column("d"), TimeGranularity::Week);
        assert_eq!(
            renderer.render_expr(&week),
            "date_diff('day', TIMESTAMP '1970-01-01', d)"
        );
        let quarter = SqlExpr::period_ordinal(SqlExpr::column("d"), TimeGranularity::Quarter);
        assert_eq!(renderer.render_expr(&quarter), "(year(d) * 12 + month(d))");
    }

    #[test]
    fn median_is_native() {
        assert_eq!(
            DuckDbDialect.render_aggregation(&Aggregation::Median, "basket"),
            "MEDIAN(basket)"
        );
    }
}
