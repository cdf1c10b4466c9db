//! Properties that hold for every compiled request.

mod common;

use chrono::NaiveDate;
use serde_json::json;
use sqlparser::dialect::{BigQueryDialect as BigQueryParser, DuckDbDialect as DuckDbParser};
use sqlparser::parser::Parser;

use common::{bigquery, duckdb, shop_registry};
use semaquery::request::{FilterOp, SortDirection};
use semaquery::QueryRequest;

fn requests() -> Vec<QueryRequest> {
    let jan = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mar = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
    vec![
        QueryRequest::new().metric("revenue").dimension("order_date"),
        QueryRequest::new()
            .metric("revenue")
            .metric("orders_count")
            .metric("avg_order_value")
            .dimension("order_date__month")
            .dimension("country")
            .filter("country", FilterOp::NotIn, json!(["XX"]))
            .having("revenue", FilterOp::Gte, json!(10.5))
            .date_range(jan, mar)
            .order_by("order_date__month", SortDirection::Asc)
            .limit(50),
        QueryRequest::new()
            .metric("ctr")
            .metric("cpc")
            .dimension("campaign_name")
            .dimension("age")
            .dimension("fb_date__week"),
        QueryRequest::new()
            .metric("mtd_amount")
            .metric("rolling_revenue")
            .metric("revenue")
            .dimension("order_date")
            .dimension("country")
            .having("mtd_amount", FilterOp::Gt, json!(0))
            .date_range(jan, mar),
        QueryRequest::new()
            .metric("revenue")
            .metric("ctr")
            .dimension("country")
            .dimension("campaign_name")
            .filter("order_date", FilterOp::Gte, json!("2024-01-01")),
        QueryRequest::new().dimension("country").dimension("event_date"),
        QueryRequest::new()
            .metric("ga4_sessions")
            .dimension("country")
            .filter("country", FilterOp::Like, json!("U%"))
            .filter("event_date__month", FilterOp::Eq, json!("2024-02-01"))
            .date_range(jan, mar),
    ]
}

#[test]
fn generated_sql_is_a_single_statement() {
    let registry = shop_registry();
    for request in requests() {
        let bq = bigquery().compile(&registry, &request).unwrap();
        let statements = Parser::parse_sql(&BigQueryParser {}, &bq.generated_sql)
            .unwrap_or_else(|e| panic!("{e}\n{}", bq.generated_sql));
        assert_eq!(statements.len(), 1, "{}", bq.generated_sql);

        let duck = duckdb().compile(&registry, &request).unwrap();
        let statements = Parser::parse_sql(&DuckDbParser {}, &duck.generated_sql)
            .unwrap_or_else(|e| panic!("{e}\n{}", duck.generated_sql));
        assert_eq!(statements.len(), 1, "{}", duck.generated_sql);
    }
}

#[test]
fn group_by_matches_compatible_dimensions_in_order() {
    let registry = shop_registry();
    for request in requests() {
        let parts = bigquery().compile(&registry, &request).unwrap();
        let compatible: Vec<&String> = request
            .dimensions
            .iter()
            .filter(|d| !parts.incompatible_dimensions.iter().any(|i| &i.name == *d))
            .collect();
        assert_eq!(parts.group_by_columns.len(), compatible.len());
        assert!(parts.group_by_columns.iter().eq(compatible.into_iter()));
    }
}

#[test]
fn requested_items_are_partitioned() {
    let registry = shop_registry();
    for request in requests() {
        let parts = bigquery().compile(&registry, &request).unwrap();
        assert_eq!(
            request.metrics.len(),
            parts.metrics_expression.len() + parts.incompatible_metrics.len()
        );
        assert_eq!(
            request.dimensions.len(),
            parts.group_by_columns.len() + parts.incompatible_dimensions.len()
        );
    }
}

#[test]
fn ratios_are_always_zero_guarded() {
    let registry = shop_registry();
    for request in requests() {
        let parts = bigquery().compile(&registry, &request).unwrap();
        if let Some(ctr) = parts.metric_expression("ctr") {
            assert!(ctr.contains("/ NULLIF("), "{ctr}");
        }
    }
}

#[test]
fn compilation_is_idempotent() {
    let registry = shop_registry();
    let compiler = bigquery();
    for request in requests() {
        let first = compiler.compile(&registry, &request).unwrap();
        let second = compiler.compile(&registry, &request).unwrap();
        assert_eq!(first.generated_sql, second.generated_sql);
        assert_eq!(first, second);
    }
}

#[test]
fn concurrent_compilation_matches_serial() {
    let registry = shop_registry();
    let compiler = bigquery();
    let expected: Vec<String> = requests()
        .iter()
        .map(|r| compiler.compile(&registry, r).unwrap().generated_sql)
        .collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    requests()
                        .iter()
                        .map(|r| compiler.compile(&registry, r).unwrap().generated_sql)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
