//! Dialect-specific rendering of compiled requests.

mod common;

use serde_json::json;

use common::{bigquery, duckdb, shop_registry};
use semaquery::request::FilterOp;
use semaquery::sql_ast::{SelectItem, SelectQuery, SqlExpr, SqlRenderer, TableRef};
use semaquery::{DialectKind, QueryRequest};

#[test]
fn duckdb_truncates_through_timestamps() {
    let registry = shop_registry();
    let request = QueryRequest::new()
        .metric("ctr")
        .dimension("fb_date__month")
        .filter("campaign_name", FilterOp::ILike, json!("%brand%"));

    let parts = duckdb().compile(&registry, &request).unwrap();

    assert!(parts
        .mega_table_with_statement
        .contains("date_trunc('month', CAST(date_start AS TIMESTAMP)) AS fb_date__month"));
    assert_eq!(
        parts.metric_expression("ctr"),
        Some("(SUM(clicks) / nullif(SUM(impressions), 0))")
    );
    assert_eq!(
        parts.where_clause.as_deref(),
        Some("(campaign_name ILIKE '%brand%')")
    );
    assert_eq!(parts.time_increment.as_deref(), Some("monthly"));
}

#[test]
fn bigquery_lowers_ilike_and_escapes_strings() {
    let registry = shop_registry();
    let request = QueryRequest::new()
        .metric("revenue")
        .dimension("country")
        .filter("country", FilterOp::ILike, json!("o'hare%"));

    let parts = bigquery().compile(&registry, &request).unwrap();
    assert_eq!(
        parts.where_clause.as_deref(),
        Some(r"(LOWER(country) LIKE LOWER('o\'hare%'))")
    );
}

#[test]
fn reserved_aliases_are_quoted() {
    let query = SelectQuery {
        select: vec![SelectItem::aliased(SqlExpr::column("order"), "group")],
        from: TableRef::physical("shop.orders"),
        ..Default::default()
    };
    let bq = DialectKind::Bigquery.build();
    let duck = DialectKind::Duckdb.build();
    assert_eq!(
        SqlRenderer::new(bq.as_ref()).render_select(&query),
        "SELECT `order` AS `group` FROM shop.orders"
    );
    assert_eq!(
        SqlRenderer::new(duck.as_ref()).render_select(&query),
        "SELECT \"order\" AS \"group\" FROM shop.orders"
    );
}

#[test]
fn artifact_serializes_for_transport() {
    let registry = shop_registry();
    let parts = bigquery()
        .compile(&registry, &QueryRequest::new().metric("revenue").metric("ctr"))
        .unwrap();
    let value = serde_json::to_value(&parts).unwrap();
    assert_eq!(value["metrics"], json!(["revenue", "ctr"]));
    assert_eq!(value["incompatible_metrics"][0]["name"], "ctr");
    assert_eq!(
        value["incompatible_metrics"][0]["reason"]["kind"],
        "source_mismatch"
    );
    assert!(value["final_summary_answer"].is_null());
}
