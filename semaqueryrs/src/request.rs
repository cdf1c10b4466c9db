use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::definitions::TimeGranularity;
use crate::error::{Result, SemaqueryError};

/// A compile request from the transport layer.
///
/// Metric entries match a metric name or id. Dimension entries may carry a
/// granularity suffix (`order_date__month`) to roll a TIME dimension up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Row-level predicates on dimensions.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Post-aggregation predicates on metric aliases.
    #[serde(default)]
    pub having: Vec<Filter>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default, alias = "order")]
    pub order_by: Vec<OrderItem>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric(mut self, name: impl Into<String>) -> Self {
        self.metrics.push(name.into());
        self
    }

    pub fn dimension(mut self, name: impl Into<String>) -> Self {
        self.dimensions.push(name.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: serde_json::Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn having(mut self, field: impl Into<String>, op: FilterOp, value: serde_json::Value) -> Self {
        self.having.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange {
            start,
            end,
            granularity: None,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderItem {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Shape checks that need no registry.
    pub fn check_shape(&self, max_items: usize) -> Result<()> {
        if self.metrics.is_empty() && self.dimensions.is_empty() {
            return Err(SemaqueryError::InvalidRequest(
                "request must name at least one metric or dimension".to_string(),
            ));
        }
        let total = self.metrics.len() + self.dimensions.len();
        if max_items > 0 && total > max_items {
            return Err(SemaqueryError::InvalidRequest(format!(
                "request names {total} items, more than the configured maximum of {max_items}"
            )));
        }
        let mut seen = HashSet::new();
        for item in self.metrics.iter().chain(self.dimensions.iter()) {
            if !seen.insert(item.as_str()) {
                return Err(SemaqueryError::InvalidRequest(format!(
                    "'{item}' is requested more than once"
                )));
            }
        }
        if let Some(range) = &self.date_range {
            if range.start > range.end {
                return Err(SemaqueryError::InvalidRequest(format!(
                    "date range start {} is after end {}",
                    range.start, range.end
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "ilike")]
    ILike,
}

/// Inclusive date range. `granularity` sets the comparison grain when the
/// primary time dimension is not itself requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub granularity: Option<TimeGranularity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OrderItem {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}
