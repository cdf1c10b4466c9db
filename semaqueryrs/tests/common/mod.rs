//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use semaquery::{DefinitionBatch, DefinitionRegistry, QueryCompiler};
use semaquery::{BigQueryDialect, CompilerConfig, DuckDbDialect};

pub const SHOP_DEFINITIONS: &str = r#"
data_sources:
  - name: orders
    system: SEMANTIC_LAYER
    table: shop.orders
    measures:
      revenue: { expr: "price * quantity", agg: SUM }
      order_count: { expr: "1", agg: COUNT }
      amount: { expr: amount, agg: SUM }
      max_price: { expr: price, agg: MAX }
  - name: ga4_events
    system: GA4
    table: analytics.events
    property_id: "123456"
    property_column: property_id
    measures:
      sessions: { expr: sessions, agg: SUM }
  - name: fb_insights
    system: FB_ADS
    table: ads.insights
    property_id: act_9
    property_column: account_id
    measures:
      clicks: { expr: clicks, agg: SUM }
      impressions: { expr: impressions, agg: SUM }
      spend: { expr: spend, agg: SUM }

dimensions:
  - name: order_date
    expr: order_date
    type: TIME
    type_params: { time_granularity: DAY, is_primary: true }
    data_source_names: [orders]
  - name: ship_date
    expr: shipped_at
    type: TIME
    type_params: { time_granularity: DAY }
    data_source_names: [orders]
  - name: created_date
    expr: created_at
    type: TIME
    type_params: { time_granularity: DAY }
    data_source_names: [orders]
  - name: country
    expr: country
    type: CATEGORICAL
    data_source_names: [orders, ga4_events]
  - name: event_date
    expr: event_date
    type: TIME
    type_params: { time_granularity: DAY, is_primary: true }
    data_source_names: [ga4_events]
  - name: fb_date
    expr: date_start
    type: TIME
    type_params: { time_granularity: DAY, is_primary: true }
    data_source_names: [fb_insights]
  - name: campaign_name
    expr: campaign_name
    type: FB_ADS_FIELD
    data_source_names: [fb_insights]
  - name: fb_ad_account
    expr: account_name
    type: FB_ADS_FIELD
    data_source_names: [fb_insights]
  - name: age
    expr: age
    type: FB_ADS_BREAKDOWN
    data_source_names: [fb_insights]

metrics:
  - id: m_revenue
    name: revenue
    type: MEASURE_PROXY
    measures: [revenue]
  - id: m_orders
    name: orders_count
    type: MEASURE_PROXY
    measures: [order_count]
  - id: m_top_price
    name: top_price
    type: MEASURE_PROXY
    measures: [max_price]
  - id: m_sessions
    name: ga4_sessions
    type: MEASURE_PROXY
    measures: [sessions]
  - id: m_ctr
    name: ctr
    type: RATIO
    numerator: clicks
    denominator: impressions
  - id: m_cpc
    name: cpc
    type: DERIVED
    expression: "spend / NULLIF(clicks, 0)"
    measures: [spend, clicks]
  - id: m_aov
    name: avg_order_value
    type: SQL_EXPRESSION
    expression: "revenue / NULLIF(order_count, 0)"
    measures: [revenue, order_count]
  - id: m_mtd
    name: mtd_amount
    type: CUMULATIVE
    measures: [amount]
    grain_to_date: MONTH
  - id: m_rolling
    name: rolling_revenue
    type: CUMULATIVE
    measures: [revenue]
    window: "7 days"
"#;

/// A single local table, for running generated SQL against DuckDB.
pub const LOCAL_DEFINITIONS: &str = r#"
data_sources:
  - name: orders
    system: SEMANTIC_LAYER
    table: orders
    measures:
      amount: { expr: amount, agg: SUM }
dimensions:
  - name: order_date
    expr: order_date
    type: TIME
    type_params: { time_granularity: DAY, is_primary: true }
    data_source_names: [orders]
  - name: region
    expr: region
    type: CATEGORICAL
    data_source_names: [orders]
metrics:
  - id: m_mtd
    name: mtd_amount
    type: CUMULATIVE
    measures: [amount]
    grain_to_date: MONTH
  - id: m_rolling
    name: rolling_amount
    type: CUMULATIVE
    measures: [amount]
    window: "2 days"
  - id: m_running
    name: running_amount
    type: CUMULATIVE
    measures: [amount]
  - id: m_total
    name: total_amount
    type: MEASURE_PROXY
    measures: [amount]
"#;

pub fn batch(yaml: &str) -> DefinitionBatch {
    serde_yaml::from_str(yaml).expect("fixture parses")
}

pub fn shop_registry() -> DefinitionRegistry {
    DefinitionRegistry::from_batch(batch(SHOP_DEFINITIONS)).expect("fixture validates")
}

pub fn local_registry() -> DefinitionRegistry {
    DefinitionRegistry::from_batch(batch(LOCAL_DEFINITIONS)).expect("fixture validates")
}

pub fn bigquery() -> QueryCompiler {
    QueryCompiler::with_dialect(CompilerConfig::default(), Box::new(BigQueryDialect))
}

pub fn duckdb() -> QueryCompiler {
    QueryCompiler::with_dialect(CompilerConfig::default(), Box::new(DuckDbDialect))
}
