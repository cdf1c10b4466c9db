//! SQL dialect abstractions for the warehouses the compiler targets.
//!
//! Each dialect lives in its own file. BigQuery is the production target;
//! DuckDB renders the same plan for local execution and tests.

use serde::{Deserialize, Serialize};

use crate::definitions::{Aggregation, TimeGranularity};
use crate::sql_ast::Function;

/// Dialects render identifiers and primitive expression pieces.
/// Expression tree walking lives in the renderer; the dialect
/// only maps logical constructs to SQL fragments.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;
    fn quote_ident(&self, ident: &str) -> String;
    fn qualify_table(&self, table: &str) -> String {
        table
            .split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }
    fn render_function(&self, func: &Function, args: Vec<String>) -> String;
    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            Aggregation::Sum => format!("SUM({expr})"),
            Aggregation::Count => format!("COUNT({expr})"),
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            Aggregation::Min => format!("MIN({expr})"),
            Aggregation::Max => format!("MAX({expr})"),
            Aggregation::Average => format!("AVG({expr})"),
            Aggregation::Median => format!("MEDIAN({expr})"),
            Aggregation::SumBoolean => format!("SUM(CAST({expr} AS INTEGER))"),
        }
    }
    fn render_ilike(&self, left: &str, right: &str) -> String {
        format!("({left} ILIKE {right})")
    }
    fn render_literal(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => b.to_string().to_uppercase(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            serde_json::Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            serde_json::Value::Object(_) => {
                format!("'{}'", value.to_string().replace('\'', "''"))
            }
        }
    }
}

/// Dialect selector used by configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Bigquery,
    Duckdb,
}

impl DialectKind {
    pub fn build(self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Bigquery => Box::new(BigQueryDialect),
            DialectKind::Duckdb => Box::new(DuckDbDialect),
        }
    }
}

const RESERVED: &[&str] = &[
    "ALL", "AND", "ANY", "ARRAY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CROSS",
    "CURRENT", "DATE", "DEFAULT", "DESC", "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS",
    "FALSE", "FETCH", "FOR", "FROM", "FULL", "GROUP", "GROUPING", "HAVING", "IN", "INNER",
    "INTERVAL", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OF", "ON", "OR",
    "ORDER", "OUTER", "OVER", "PARTITION", "QUALIFY", "RANGE", "RIGHT", "ROLLUP", "ROWS",
    "SELECT", "SET", "TABLE", "THEN", "TO", "TRUE", "UNION", "USING", "WHEN", "WHERE", "WINDOW",
    "WITH",
];

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`, not reserved) render bare.
pub(crate) fn is_plain_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !is_reserved(ident)
}

pub(crate) fn grain_to_str(grain: &TimeGranularity) -> &'static str {
    match grain {
        TimeGranularity::Day => "day",
        TimeGranularity::Week => "week",
        TimeGranularity::Month => "month",
        TimeGranularity::Quarter => "quarter",
        TimeGranularity::Year => "year",
    }
}

mod bigquery;
mod duckdb;

pub use bigquery::BigQueryDialect;
pub use duckdb::DuckDbDialect;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers() {
        assert!(is_plain_ident("order_date"));
        assert!(is_plain_ident("_hidden1"));
        assert!(!is_plain_ident("order date"));
        assert!(!is_plain_ident("1st"));
        assert!(!is_plain_ident("group"));
        assert!(!is_plain_ident(""));
    }

    #[test]
    fn dialect_kind_from_config_string() {
        let kind: DialectKind = serde_json::from_str("\"duckdb\"").unwrap();
        assert_eq!(kind.build().name(), "duckdb");
        assert_eq!(DialectKind::default().build().name(), "bigquery");
    }
}
