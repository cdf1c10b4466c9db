//! Definition model: data sources, measures, dimensions and metrics.
//!
//! Loaders hand us flat records (`DimensionRecord`, `MetricRecord`) that mirror
//! the external schema. Converting them into `Dimension` / `Metric` moves every
//! type-dependent field into a tagged payload, so a TIME dimension always has
//! its granularity and a cumulative metric can never carry both a window and a
//! grain-to-date reset.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SemaqueryError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeGranularity {
    #[serde(alias = "day")]
    Day,
    #[serde(alias = "week")]
    Week,
    #[serde(alias = "month")]
    Month,
    #[serde(alias = "quarter")]
    Quarter,
    #[serde(alias = "year")]
    Year,
}

impl TimeGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGranularity::Day => "DAY",
            TimeGranularity::Week => "WEEK",
            TimeGranularity::Month => "MONTH",
            TimeGranularity::Quarter => "QUARTER",
            TimeGranularity::Year => "YEAR",
        }
    }

    /// Parse a grain name, accepting any case and a trailing plural `s`.
    pub fn parse(input: &str) -> Option<Self> {
        let lowered = input.trim().to_ascii_lowercase();
        let singular = lowered.strip_suffix('s').unwrap_or(&lowered);
        match singular {
            "day" => Some(TimeGranularity::Day),
            "week" => Some(TimeGranularity::Week),
            "month" => Some(TimeGranularity::Month),
            "quarter" => Some(TimeGranularity::Quarter),
            "year" => Some(TimeGranularity::Year),
            _ => None,
        }
    }

    /// True when `self` cuts time into smaller buckets than `other`.
    pub fn is_finer_than(&self, other: TimeGranularity) -> bool {
        *self < other
    }

    /// Number of `axis` periods that make up exactly one `self` period.
    ///
    /// Returns `None` when `self` is finer than `axis` or the two do not nest
    /// evenly (a month is not a whole number of weeks).
    pub fn periods_of(&self, axis: TimeGranularity) -> Option<u32> {
        use TimeGranularity::*;
        match (self, axis) {
            (a, b) if *a == b => Some(1),
            (Week, Day) => Some(7),
            (Quarter, Month) => Some(3),
            (Year, Month) => Some(12),
            (Year, Quarter) => Some(4),
            _ => None,
        }
    }

    /// Distance between two consecutive truncated periods, measured in the
    /// unit of `Function::PeriodOrdinal`: days up to WEEK, months above.
    pub fn ordinal_step(&self) -> u32 {
        match self {
            TimeGranularity::Day | TimeGranularity::Month => 1,
            TimeGranularity::Week => 7,
            TimeGranularity::Quarter => 3,
            TimeGranularity::Year => 12,
        }
    }

    /// True when the ordinal counts days rather than months.
    pub fn has_day_ordinal(&self) -> bool {
        matches!(self, TimeGranularity::Day | TimeGranularity::Week)
    }
}

impl std::fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregation {
    #[serde(alias = "sum")]
    Sum,
    #[serde(alias = "count")]
    Count,
    #[serde(alias = "count_distinct")]
    CountDistinct,
    #[serde(alias = "min")]
    Min,
    #[serde(alias = "max")]
    Max,
    #[serde(alias = "average", alias = "AVG", alias = "avg")]
    Average,
    #[serde(alias = "median")]
    Median,
    #[serde(alias = "sum_boolean")]
    SumBoolean,
}

impl Aggregation {
    /// Function that re-aggregates an already aggregated column.
    ///
    /// The aggregated mega table has exactly the output grain, so every group
    /// re-aggregates a single row. Additive aggregations sum their partials;
    /// the rest keep their single value.
    pub fn rollup(&self) -> Aggregation {
        match self {
            Aggregation::Sum
            | Aggregation::Count
            | Aggregation::CountDistinct
            | Aggregation::SumBoolean => Aggregation::Sum,
            Aggregation::Min => Aggregation::Min,
            Aggregation::Max | Aggregation::Average | Aggregation::Median => Aggregation::Max,
        }
    }

    /// Whether partial results can be accumulated across time periods.
    pub fn accumulates(&self) -> bool {
        matches!(
            self,
            Aggregation::Sum
                | Aggregation::Count
                | Aggregation::SumBoolean
                | Aggregation::Min
                | Aggregation::Max
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    #[serde(alias = "string")]
    String,
    #[serde(alias = "integer", alias = "INT64")]
    Integer,
    #[serde(alias = "float", alias = "FLOAT64")]
    Float,
    #[serde(alias = "numeric")]
    Numeric,
    #[serde(alias = "boolean", alias = "BOOL")]
    Boolean,
    #[serde(alias = "date")]
    Date,
    #[serde(alias = "datetime")]
    Datetime,
    #[serde(alias = "timestamp")]
    Timestamp,
}

// ============================================================================
// Data sources and measures
// ============================================================================

/// Backing system of a data source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSystem {
    SemanticLayer,
    Ga4,
    FbAds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Measure {
    /// SQL expression over the source table's columns.
    pub expr: String,
    pub agg: Aggregation,
    #[serde(default)]
    pub description: Option<String>,
}

/// A backing table plus the property/account it is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSource {
    pub name: String,
    pub system: SourceSystem,
    pub table: String,
    #[serde(default)]
    pub property_id: Option<String>,
    /// Column holding the property/account id in `table`.
    #[serde(default)]
    pub property_column: Option<String>,
    #[serde(default)]
    pub measures: BTreeMap<String, Measure>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DataSource {
    pub fn has_measures(&self) -> bool {
        !self.measures.is_empty()
    }

    /// Property scoping predicate parts, when both halves are configured.
    pub fn property_scope(&self) -> Option<(&str, &str)> {
        match (&self.property_column, &self.property_id) {
            (Some(column), Some(id)) => Some((column.as_str(), id.as_str())),
            _ => None,
        }
    }
}

// ============================================================================
// Dimensions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParams {
    pub time_granularity: TimeGranularity,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    Categorical,
    Time(TimeParams),
    FbAdsField,
    FbAdsBreakdown,
    FbAdsActionBreakdown,
    FbAdsSummaryActionBreakdown,
}

#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub expr: String,
    pub kind: DimensionKind,
    pub value_type: Option<ValueType>,
    /// Advisory sample of frequent values; never used for validation.
    pub top_n_values: Vec<Value>,
    pub data_source_names: BTreeSet<String>,
}

impl Dimension {
    pub fn time_params(&self) -> Option<&TimeParams> {
        match &self.kind {
            DimensionKind::Time(params) => Some(params),
            _ => None,
        }
    }

    pub fn is_time(&self) -> bool {
        self.time_params().is_some()
    }

    pub fn is_primary_time(&self) -> bool {
        self.time_params().is_some_and(|p| p.is_primary)
    }

    pub fn available_in(&self, source: &str) -> bool {
        self.data_source_names.contains(source)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionType {
    Categorical,
    Time,
    FbAdsField,
    FbAdsBreakdown,
    FbAdsActionBreakdown,
    FbAdsSummaryActionBreakdown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeParamsRecord {
    #[serde(default)]
    pub time_granularity: Option<TimeGranularity>,
    #[serde(default)]
    pub is_primary: bool,
}

/// Flat dimension record as produced by the definition loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub expr: String,
    #[serde(rename = "type")]
    pub dimension_type: DimensionType,
    #[serde(default)]
    pub type_params: Option<TypeParamsRecord>,
    #[serde(default)]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub top_n_values: Vec<Value>,
    #[serde(default)]
    pub data_source_names: Vec<String>,
}

impl TryFrom<DimensionRecord> for Dimension {
    type Error = SemaqueryError;

    fn try_from(record: DimensionRecord) -> Result<Self> {
        let name = record.name;
        if name.trim().is_empty() {
            return Err(SemaqueryError::invalid_definition(
                "<unnamed dimension>",
                "dimension name must not be empty",
            ));
        }
        if record.expr.trim().is_empty() {
            return Err(SemaqueryError::invalid_definition(
                &name,
                "dimension expr must not be empty",
            ));
        }
        if record.data_source_names.is_empty() {
            return Err(SemaqueryError::invalid_definition(
                &name,
                "dimension must list at least one data source",
            ));
        }

        let kind = match (record.dimension_type, record.type_params) {
            (DimensionType::Time, Some(params)) => {
                let time_granularity = params.time_granularity.ok_or_else(|| {
                    SemaqueryError::invalid_definition(
                        &name,
                        "TIME dimension requires type_params.time_granularity",
                    )
                })?;
                DimensionKind::Time(TimeParams {
                    time_granularity,
                    is_primary: params.is_primary,
                })
            }
            (DimensionType::Time, None) => {
                return Err(SemaqueryError::invalid_definition(
                    &name,
                    "TIME dimension requires type_params",
                ))
            }
            (other, Some(_)) => {
                return Err(SemaqueryError::invalid_definition(
                    &name,
                    format!("type_params are only valid on TIME dimensions, not {other:?}"),
                ))
            }
            (DimensionType::Categorical, None) => DimensionKind::Categorical,
            (DimensionType::FbAdsField, None) => DimensionKind::FbAdsField,
            (DimensionType::FbAdsBreakdown, None) => DimensionKind::FbAdsBreakdown,
            (DimensionType::FbAdsActionBreakdown, None) => DimensionKind::FbAdsActionBreakdown,
            (DimensionType::FbAdsSummaryActionBreakdown, None) => {
                DimensionKind::FbAdsSummaryActionBreakdown
            }
        };

        Ok(Dimension {
            name,
            description: record.description,
            display_name: record.display_name,
            expr: record.expr,
            kind,
            value_type: record.value_type,
            top_n_values: record.top_n_values,
            data_source_names: record.data_source_names.into_iter().collect(),
        })
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Rolling accumulation window, e.g. `7 days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeWindow {
    pub count: u32,
    pub granularity: TimeGranularity,
}

impl CumulativeWindow {
    /// Parse `"<count> <grain>"`, e.g. `7 days` or `1 MONTH`.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input.split_whitespace();
        let count: u32 = parts.next()?.parse().ok()?;
        let granularity = TimeGranularity::parse(parts.next()?)?;
        if parts.next().is_some() || count == 0 {
            return None;
        }
        Some(CumulativeWindow { count, granularity })
    }

    /// Window length in periods of `axis`, when it is a whole number.
    pub fn periods_on(&self, axis: TimeGranularity) -> Option<u32> {
        if let Some(per) = self.granularity.periods_of(axis) {
            return self.count.checked_mul(per);
        }
        let per = axis.periods_of(self.granularity)?;
        (self.count % per == 0).then(|| self.count / per)
    }
}

/// How a cumulative metric frames its accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CumulativePolicy {
    /// No window and no grain-to-date: accumulate over all history.
    AllTime,
    Window(CumulativeWindow),
    /// Reset at every boundary of the given calendar grain.
    GrainToDate(TimeGranularity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricKind {
    MeasureProxy {
        measure: String,
    },
    Ratio {
        numerator: String,
        denominator: String,
    },
    Cumulative {
        measure: String,
        policy: CumulativePolicy,
    },
    Derived {
        expression: String,
        measures: Vec<String>,
    },
    SqlExpression {
        expression: String,
        measures: Vec<String>,
    },
}

impl MetricKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricKind::MeasureProxy { .. } => "MEASURE_PROXY",
            MetricKind::Ratio { .. } => "RATIO",
            MetricKind::Cumulative { .. } => "CUMULATIVE",
            MetricKind::Derived { .. } => "DERIVED",
            MetricKind::SqlExpression { .. } => "SQL_EXPRESSION",
        }
    }

    /// Every measure the metric reads, in declaration order.
    pub fn measure_names(&self) -> Vec<&str> {
        match self {
            MetricKind::MeasureProxy { measure } | MetricKind::Cumulative { measure, .. } => {
                vec![measure.as_str()]
            }
            MetricKind::Ratio {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
            MetricKind::Derived { measures, .. } | MetricKind::SqlExpression { measures, .. } => {
                measures.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            MetricKind::Derived { expression, .. } | MetricKind::SqlExpression { expression, .. } => {
                Some(expression.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTable {
    pub view_id_of_table: Option<String>,
    pub table_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Metric {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub kind: MetricKind,
    pub table: Option<MetricTable>,
    pub value_type: Option<ValueType>,
    pub is_numeric: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    MeasureProxy,
    Cumulative,
    Ratio,
    Derived,
    SqlExpression,
}

fn default_true() -> bool {
    true
}

/// Flat metric record as produced by the definition loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub numerator: Option<String>,
    #[serde(default)]
    pub denominator: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub grain_to_date: Option<TimeGranularity>,
    #[serde(default)]
    pub view_id_of_table: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub value_type: Option<ValueType>,
    #[serde(default = "default_true")]
    pub is_numeric: bool,
}

impl TryFrom<MetricRecord> for Metric {
    type Error = SemaqueryError;

    fn try_from(record: MetricRecord) -> Result<Self> {
        let name = record.name.clone();
        let invalid = |message: &str| SemaqueryError::invalid_definition(&name, message);

        if record.name.trim().is_empty() || record.id.trim().is_empty() {
            return Err(invalid("metric id and name must not be empty"));
        }

        let has_ratio_fields = record.numerator.is_some() || record.denominator.is_some();
        let has_cumulative_fields = record.window.is_some() || record.grain_to_date.is_some();
        if has_ratio_fields && record.metric_type != MetricType::Ratio {
            return Err(invalid("numerator/denominator are only valid on RATIO metrics"));
        }
        if has_cumulative_fields && record.metric_type != MetricType::Cumulative {
            return Err(invalid(
                "window/grain_to_date are only valid on CUMULATIVE metrics",
            ));
        }

        let expression = record
            .expression
            .as_ref()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let kind = match record.metric_type {
            MetricType::MeasureProxy => {
                let [measure] = <[String; 1]>::try_from(record.measures.clone())
                    .map_err(|_| invalid("MEASURE_PROXY metrics reference exactly one measure"))?;
                if expression.is_some() {
                    tracing::warn!(metric = %name, "ignoring expression on MEASURE_PROXY metric");
                }
                MetricKind::MeasureProxy { measure }
            }
            MetricType::Ratio => {
                let (numerator, denominator) = match (&record.numerator, &record.denominator) {
                    (Some(n), Some(d)) => (n.clone(), d.clone()),
                    _ => return Err(invalid("RATIO metrics require numerator and denominator")),
                };
                if numerator == denominator {
                    return Err(invalid("ratio numerator and denominator must differ"));
                }
                if record
                    .measures
                    .iter()
                    .any(|m| *m != numerator && *m != denominator)
                {
                    return Err(invalid(
                        "RATIO measures may only list the numerator and denominator",
                    ));
                }
                if expression.is_some() {
                    tracing::warn!(metric = %name, "ignoring expression on RATIO metric");
                }
                MetricKind::Ratio {
                    numerator,
                    denominator,
                }
            }
            MetricType::Cumulative => {
                let [measure] = <[String; 1]>::try_from(record.measures.clone())
                    .map_err(|_| invalid("CUMULATIVE metrics reference exactly one measure"))?;
                let policy = match (&record.window, record.grain_to_date) {
                    (Some(_), Some(_)) => {
                        return Err(invalid("window and grain_to_date are mutually exclusive"))
                    }
                    (Some(window), None) => CumulativeWindow::parse(window)
                        .map(CumulativePolicy::Window)
                        .ok_or_else(|| {
                            SemaqueryError::invalid_definition(
                                &name,
                                format!("cannot parse window '{window}', expected e.g. '7 days'"),
                            )
                        })?,
                    (None, Some(grain)) => CumulativePolicy::GrainToDate(grain),
                    (None, None) => CumulativePolicy::AllTime,
                };
                if expression.is_some() {
                    tracing::warn!(metric = %name, "ignoring expression on CUMULATIVE metric");
                }
                MetricKind::Cumulative { measure, policy }
            }
            MetricType::Derived | MetricType::SqlExpression => {
                let expression = expression.ok_or_else(|| {
                    invalid("DERIVED and SQL_EXPRESSION metrics require an expression")
                })?;
                if record.measures.is_empty() {
                    return Err(invalid("expression metrics must list the measures they use"));
                }
                let measures = record.measures.clone();
                if record.metric_type == MetricType::Derived {
                    MetricKind::Derived {
                        expression,
                        measures,
                    }
                } else {
                    MetricKind::SqlExpression {
                        expression,
                        measures,
                    }
                }
            }
        };

        let table = match (record.view_id_of_table, record.table_name) {
            (None, None) => None,
            (view_id_of_table, table_name) => Some(MetricTable {
                view_id_of_table,
                table_name,
            }),
        };

        Ok(Metric {
            id: record.id,
            name: record.name,
            description: record.description,
            display_name: record.display_name,
            kind,
            table,
            value_type: record.value_type,
            is_numeric: record.is_numeric,
        })
    }
}

// ============================================================================
// Load batches
// ============================================================================

/// One batch of definitions from the loading collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionBatch {
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub dimensions: Vec<DimensionRecord>,
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
}

impl DefinitionBatch {
    pub fn merge(&mut self, other: DefinitionBatch) {
        self.data_sources.extend(other.data_sources);
        self.dimensions.extend(other.dimensions);
        self.metrics.extend(other.metrics);
    }
}
