//! The compiled query artifact handed back to callers.

use serde::Serialize;

use crate::definitions::TimeGranularity;
use crate::request::DateRange;

/// Everything produced for one request. Built once by the emitter and never
/// modified afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratedSqlQueryParts {
    /// `mega_table AS (... UNION ALL ...)`
    pub mega_table_with_statement: String,
    /// `mega_table_aggregated AS (SELECT ... FROM mega_table WHERE ... GROUP BY ...)`
    pub mega_table_aggregated_with_statement: String,
    pub generated_sql: String,
    /// The final SELECT without the WITH prefix.
    pub generated_sql_without_megatable_schema: String,
    pub where_clause: Option<String>,
    pub date_where_clause: Option<String>,
    pub group_by_columns: Vec<String>,
    pub having_clause: Option<String>,
    pub qualify_clause: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    /// Metric names exactly as requested.
    pub metrics: Vec<String>,
    pub metrics_expression: Vec<MetricExpression>,
    pub date_ranges: Vec<DateRange>,
    pub incompatible_metrics: Vec<IncompatibleItem>,
    pub incompatible_dimensions: Vec<IncompatibleItem>,
    pub sql_explanation: String,
    /// Filled in by a downstream summarizer, never by the compiler.
    pub final_summary_answer: Option<String>,
    pub level: Option<FbAdsLevel>,
    pub time_increment: Option<String>,
    pub fb_ads: Option<FbAdsParameters>,
}

impl GeneratedSqlQueryParts {
    pub fn metric_expression(&self, name: &str) -> Option<&str> {
        self.metrics_expression
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.sql.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricExpression {
    pub name: String,
    pub sql: String,
}

/// A requested metric or dimension left out of the query.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IncompatibleItem {
    pub name: String,
    pub reason: IncompatibilityReason,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncompatibilityReason {
    /// The item's sources do not overlap the sources already chosen.
    SourceMismatch {
        sources: Vec<String>,
        available: Vec<String>,
    },
    /// A measure the metric reads is not in any of the chosen sources.
    MissingMeasureSource { measure: String },
    /// Cumulative metric requested without the primary time dimension.
    NoTimeAxis,
    /// Window or reset grain does not fit the requested time grain.
    WindowGrainMismatch { axis: TimeGranularity },
}

impl IncompatibilityReason {
    pub fn is_source_related(&self) -> bool {
        matches!(
            self,
            IncompatibilityReason::SourceMismatch { .. }
                | IncompatibilityReason::MissingMeasureSource { .. }
        )
    }
}

impl std::fmt::Display for IncompatibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncompatibilityReason::SourceMismatch { sources, available } => write!(
                f,
                "available in [{}] but the query uses [{}]",
                sources.join(", "),
                available.join(", ")
            ),
            IncompatibilityReason::MissingMeasureSource { measure } => {
                write!(f, "measure {measure} is not in any queried source")
            }
            IncompatibilityReason::NoTimeAxis => {
                f.write_str("needs the primary time dimension in the request")
            }
            IncompatibilityReason::WindowGrainMismatch { axis } => {
                write!(f, "window does not line up with {axis} periods")
            }
        }
    }
}

/// Ads-insights reporting level.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FbAdsLevel {
    Account,
    Campaign,
    Adset,
    Ad,
}

impl FbAdsLevel {
    /// Level implied by one insights field name.
    pub fn of_field(field: &str) -> FbAdsLevel {
        if field.starts_with("ad_") {
            FbAdsLevel::Ad
        } else if field.starts_with("adset_") {
            FbAdsLevel::Adset
        } else if field.starts_with("campaign_") {
            FbAdsLevel::Campaign
        } else {
            FbAdsLevel::Account
        }
    }
}

/// `time_increment` parameter for an insights call at the given grain.
pub fn fb_time_increment(grain: Option<TimeGranularity>) -> &'static str {
    match grain {
        Some(TimeGranularity::Day) => "1",
        Some(TimeGranularity::Week) => "7",
        Some(TimeGranularity::Month) => "monthly",
        Some(TimeGranularity::Quarter) | Some(TimeGranularity::Year) | None => "all_days",
    }
}

/// Field lists for an ads-insights request, taken from the FB dimensions.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FbAdsParameters {
    pub fields: Vec<String>,
    pub breakdowns: Vec<String>,
    pub action_breakdowns: Vec<String>,
    pub summary_action_breakdowns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_field_prefix() {
        assert_eq!(FbAdsLevel::of_field("ad_name"), FbAdsLevel::Ad);
        assert_eq!(FbAdsLevel::of_field("adset_id"), FbAdsLevel::Adset);
        assert_eq!(FbAdsLevel::of_field("campaign_name"), FbAdsLevel::Campaign);
        assert_eq!(FbAdsLevel::of_field("account_currency"), FbAdsLevel::Account);
        assert!(FbAdsLevel::Ad > FbAdsLevel::Campaign);
    }

    #[test]
    fn time_increment_by_grain() {
        assert_eq!(fb_time_increment(Some(TimeGranularity::Day)), "1");
        assert_eq!(fb_time_increment(Some(TimeGranularity::Month)), "monthly");
        assert_eq!(fb_time_increment(None), "all_days");
    }

    #[test]
    fn reason_serializes_with_kind_tag() {
        let item = IncompatibleItem {
            name: "fb_ad_account".to_string(),
            reason: IncompatibilityReason::MissingMeasureSource {
                measure: "spend".to_string(),
            },
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["reason"]["kind"], "missing_measure_source");
    }
}
