use serde_json::Value;

use crate::definitions::TimeGranularity;
use crate::error::{Result, SemaqueryError};
use crate::request::{Filter, FilterOp};
use crate::sql_ast::{SqlBinaryOperator, SqlExpr};

/// Translate one request filter into a predicate on `target`.
///
/// With a `grain`, both sides are truncated to it, so a TIME filter
/// compares calendar buckets rather than raw timestamps.
pub(crate) fn filter_predicate(
    target: SqlExpr,
    filter: &Filter,
    grain: Option<TimeGranularity>,
) -> Result<SqlExpr> {
    let literal = |value: &Value| {
        let lit = SqlExpr::Literal(value.clone());
        match grain {
            Some(grain) => SqlExpr::truncate_time(lit, grain),
            None => lit,
        }
    };
    let target = match grain {
        Some(grain) => SqlExpr::truncate_time(target, grain),
        None => target,
    };

    match filter.op {
        FilterOp::In | FilterOp::NotIn => {
            let items = match &filter.value {
                Value::Array(items) if !items.is_empty() => items,
                _ => return Err(invalid_value(filter, "a non-empty list")),
            };
            if items.iter().any(|v| v.is_array() || v.is_object() || v.is_null()) {
                return Err(invalid_value(filter, "a list of scalars"));
            }
            Ok(SqlExpr::InList {
                expr: Box::new(target),
                list: items.iter().map(literal).collect(),
                negated: matches!(filter.op, FilterOp::NotIn),
            })
        }
        FilterOp::Eq | FilterOp::Neq if filter.value.is_null() => Ok(SqlExpr::IsNull {
            expr: Box::new(target),
            negated: matches!(filter.op, FilterOp::Neq),
        }),
        FilterOp::Like | FilterOp::ILike => {
            if !filter.value.is_string() {
                return Err(invalid_value(filter, "a string pattern"));
            }
            let op = if filter.op == FilterOp::Like {
                SqlBinaryOperator::Like
            } else {
                SqlBinaryOperator::ILike
            };
            Ok(SqlExpr::binary(op, target, SqlExpr::Literal(filter.value.clone())))
        }
        _ => {
            if filter.value.is_array() || filter.value.is_object() || filter.value.is_null() {
                return Err(invalid_value(filter, "a scalar"));
            }
            let op = match filter.op {
                FilterOp::Eq => SqlBinaryOperator::Eq,
                FilterOp::Neq => SqlBinaryOperator::Neq,
                FilterOp::Gt => SqlBinaryOperator::Gt,
                FilterOp::Gte => SqlBinaryOperator::Gte,
                FilterOp::Lt => SqlBinaryOperator::Lt,
                _ => SqlBinaryOperator::Lte,
            };
            Ok(SqlExpr::binary(op, target, literal(&filter.value)))
        }
    }
}

fn invalid_value(filter: &Filter, expected: &str) -> SemaqueryError {
    SemaqueryError::InvalidRequest(format!(
        "filter on {} with {:?} expects {expected}, got {}",
        filter.field, filter.op, filter.value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::BigQueryDialect;
    use crate::sql_ast::SqlRenderer;
    use serde_json::json;

    fn render(expr: &SqlExpr) -> String {
        SqlRenderer::new(&BigQueryDialect).render_expr(expr)
    }

    fn filter(op: FilterOp, value: Value) -> Filter {
        Filter {
            field: "country".to_string(),
            op,
            value,
        }
    }

    #[test]
    fn in_list() {
        let expr = filter_predicate(
            SqlExpr::column("country"),
            &filter(FilterOp::NotIn, json!(["US", "CA"])),
            None,
        )
        .unwrap();
        assert_eq!(render(&expr), "country NOT IN ('US', 'CA')");
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let expr = filter_predicate(
            SqlExpr::column("country"),
            &filter(FilterOp::Neq, Value::Null),
            None,
        )
        .unwrap();
        assert_eq!(render(&expr), "country IS NOT NULL");
    }

    #[test]
    fn time_filters_truncate_both_sides() {
        let expr = filter_predicate(
            SqlExpr::column("order_date"),
            &filter(FilterOp::Gte, json!("2024-02-15")),
            Some(TimeGranularity::Month),
        )
        .unwrap();
        assert_eq!(
            render(&expr),
            "(DATE_TRUNC(CAST(order_date AS DATETIME), MONTH) >= DATE_TRUNC(CAST('2024-02-15' AS DATETIME), MONTH))"
        );
    }

    #[test]
    fn rejects_mismatched_values() {
        assert!(filter_predicate(SqlExpr::column("c"), &filter(FilterOp::In, json!("US")), None).is_err());
        assert!(filter_predicate(SqlExpr::column("c"), &filter(FilterOp::In, json!([])), None).is_err());
        assert!(filter_predicate(SqlExpr::column("c"), &filter(FilterOp::Gt, json!([1])), None).is_err());
        assert!(filter_predicate(SqlExpr::column("c"), &filter(FilterOp::Like, json!(3)), None).is_err());
    }

    #[test]
    fn ilike_on_bigquery_lowers_both_sides() {
        let expr = filter_predicate(
            SqlExpr::column("campaign"),
            &filter(FilterOp::ILike, json!("%brand%")),
            None,
        )
        .unwrap();
        assert_eq!(render(&expr), "(LOWER(campaign) LIKE LOWER('%brand%'))");
    }
}
