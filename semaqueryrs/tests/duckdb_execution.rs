//! Runs generated DuckDB SQL against a synthetic table and checks the numbers.

mod common;

use chrono::NaiveDate;

use common::{duckdb, local_registry};
use semaquery::request::SortDirection;
use semaquery::QueryRequest;

fn bootstrap() -> anyhow::Result<duckdb::Connection> {
    let conn = duckdb::Connection::open_in_memory()?;
    conn.execute_batch(
        "
        CREATE TABLE orders (
            order_date DATE,
            region VARCHAR,
            amount DOUBLE
        );
        INSERT INTO orders VALUES
            ('2024-01-30', 'north', 10.0),
            ('2024-01-31', 'north', 15.0),
            ('2024-01-31', 'south', 5.0),
            ('2024-02-01', 'north', 5.0),
            ('2024-02-02', 'south', 7.0),
            ('2024-03-01', 'north', 1.0),
            ('2024-03-02', 'north', 2.0);
        ",
    )?;
    Ok(conn)
}

fn metric_column(conn: &duckdb::Connection, sql: &str, index: usize) -> anyhow::Result<Vec<f64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, f64>(index))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[test]
fn grain_to_date_resets_each_month() -> anyhow::Result<()> {
    let conn = bootstrap()?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("mtd_amount")
        .dimension("order_date")
        .order_by("order_date", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    let values = metric_column(&conn, &parts.generated_sql, 1)?;

    assert_eq!(values, vec![10.0, 30.0, 5.0, 12.0, 1.0, 3.0]);
    Ok(())
}

#[test]
fn grain_to_date_partitions_by_other_dimensions() -> anyhow::Result<()> {
    let conn = bootstrap()?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("mtd_amount")
        .dimension("order_date")
        .dimension("region")
        .filter("region", semaquery::request::FilterOp::Eq, serde_json::json!("north"))
        .order_by("order_date", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    let values = metric_column(&conn, &parts.generated_sql, 2)?;

    assert_eq!(values, vec![10.0, 25.0, 5.0, 1.0, 3.0]);
    Ok(())
}

#[test]
fn rolling_window_sees_rows_before_the_range() -> anyhow::Result<()> {
    let conn = bootstrap()?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("rolling_amount")
        .dimension("order_date")
        .date_range(
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        )
        .order_by("order_date", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    assert!(parts.qualify_clause.is_some());
    let values = metric_column(&conn, &parts.generated_sql, 1)?;

    // 2024-01-31 includes 2024-01-30; 2024-02-01 includes 2024-01-31.
    assert_eq!(values, vec![30.0, 25.0]);
    Ok(())
}

#[test]
fn monthly_totals_with_date_range() -> anyhow::Result<()> {
    let conn = bootstrap()?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("total_amount")
        .dimension("order_date__month")
        .date_range(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
        )
        .order_by("order_date__month", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    let values = metric_column(&conn, &parts.generated_sql, 1)?;

    // Month-truncated bounds keep all of January and February.
    assert_eq!(values, vec![30.0, 12.0]);
    Ok(())
}

#[test]
fn rolling_window_spans_calendar_days_across_gaps() -> anyhow::Result<()> {
    let conn = bootstrap()?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("rolling_amount")
        .dimension("order_date")
        .order_by("order_date", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    assert!(parts
        .metric_expression("rolling_amount")
        .is_some_and(|sql| sql.contains("RANGE BETWEEN 1 PRECEDING")));
    let values = metric_column(&conn, &parts.generated_sql, 1)?;

    // 2024-03-01 has no 2024-02-29 row, so it stands alone.
    assert_eq!(values, vec![10.0, 30.0, 25.0, 12.0, 1.0, 3.0]);
    Ok(())
}

#[test]
fn rolling_window_on_a_sparse_table() -> anyhow::Result<()> {
    let conn = duckdb::Connection::open_in_memory()?;
    conn.execute_batch(
        "
        CREATE TABLE orders (order_date DATE, region VARCHAR, amount DOUBLE);
        INSERT INTO orders VALUES ('2024-01-01', 'north', 100.0), ('2024-03-01', 'north', 1.0);
        ",
    )?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("rolling_amount")
        .dimension("order_date")
        .order_by("order_date", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    let values = metric_column(&conn, &parts.generated_sql, 1)?;

    assert_eq!(values, vec![100.0, 1.0]);
    Ok(())
}

#[test]
fn all_time_running_total() -> anyhow::Result<()> {
    let conn = bootstrap()?;
    let registry = local_registry();
    let request = QueryRequest::new()
        .metric("running_amount")
        .dimension("order_date")
        .order_by("order_date", SortDirection::Asc);

    let parts = duckdb().compile(&registry, &request)?;
    let values = metric_column(&conn, &parts.generated_sql, 1)?;

    // No reset at month boundaries.
    assert_eq!(values, vec![10.0, 30.0, 35.0, 42.0, 43.0, 45.0]);
    Ok(())
}
