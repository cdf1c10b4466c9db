//! Request resolution: name lookup, data-source compatibility, time axis.

use std::collections::{BTreeSet, HashSet};

use crate::artifact::{IncompatibilityReason, IncompatibleItem};
use crate::definitions::{CumulativePolicy, DataSource, Dimension, Metric, MetricKind, TimeGranularity};
use crate::error::{DefinitionKind, Result, SemaqueryError};
use crate::registry::DefinitionRegistry;
use crate::request::{DateRange, Filter, QueryRequest};

/// Separates a dimension name from a requested granularity: `order_date__month`.
pub const GRAIN_SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
pub struct ResolvedMetric<'r> {
    pub requested: String,
    pub metric: &'r Metric,
    pub sources: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedDimension<'r> {
    /// Output column name: the dimension as requested, suffix included.
    pub alias: String,
    pub dimension: &'r Dimension,
    /// Truncation grain; set for TIME dimensions only.
    pub grain: Option<TimeGranularity>,
}

impl ResolvedDimension<'_> {
    /// Same underlying column at the same truncation.
    pub fn same_column(&self, other: &ResolvedDimension<'_>) -> bool {
        self.dimension.name == other.dimension.name && self.grain == other.grain
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedFilter<'r> {
    pub filter: Filter,
    pub target: ResolvedDimension<'r>,
}

/// Column the date range is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateColumn {
    /// A requested dimension (index into `ResolvedRequest::dimensions`).
    Axis(usize),
    /// Each branch's own primary time dimension, selected as a hidden column.
    Hidden { grain: TimeGranularity },
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedDateRange {
    pub range: DateRange,
    pub column: DateColumn,
}

#[derive(Debug, Clone)]
pub struct ResolvedRequest<'r> {
    pub requested_metrics: Vec<String>,
    pub requested_dimensions: Vec<String>,
    /// Compatible metrics, request order.
    pub metrics: Vec<ResolvedMetric<'r>>,
    /// Compatible dimensions, request order.
    pub dimensions: Vec<ResolvedDimension<'r>>,
    pub filters: Vec<ResolvedFilter<'r>>,
    pub incompatible_metrics: Vec<IncompatibleItem>,
    pub incompatible_dimensions: Vec<IncompatibleItem>,
    /// Mega-table branches, sorted by name.
    pub sources: Vec<&'r DataSource>,
    /// Index of the primary time dimension among `dimensions`.
    pub time_axis: Option<usize>,
    pub date_range: Option<ResolvedDateRange>,
}

impl<'r> ResolvedRequest<'r> {
    pub fn axis(&self) -> Option<&ResolvedDimension<'r>> {
        self.time_axis.and_then(|i| self.dimensions.get(i))
    }
}

pub fn resolve<'r>(registry: &'r DefinitionRegistry, request: &QueryRequest) -> Result<ResolvedRequest<'r>> {
    // Unknown names fail before any compatibility work.
    let mut metrics = Vec::with_capacity(request.metrics.len());
    let mut metric_names = HashSet::new();
    for requested in &request.metrics {
        let metric = registry.metric(requested)?;
        if !metric_names.insert(metric.name.as_str()) {
            return Err(SemaqueryError::InvalidRequest(format!(
                "metric {} is requested more than once",
                metric.name
            )));
        }
        metrics.push(ResolvedMetric {
            requested: requested.clone(),
            metric,
            sources: metric_sources(registry, metric)?,
        });
    }
    let dimensions = request
        .dimensions
        .iter()
        .map(|name| lookup_dimension(registry, name))
        .collect::<Result<Vec<_>>>()?;
    let filters = request
        .filters
        .iter()
        .map(|filter| {
            if registry.dimension(&filter.field).is_err() && registry.metric(&filter.field).is_ok() {
                return Err(SemaqueryError::InvalidFilterTarget {
                    target: filter.field.clone(),
                });
            }
            Ok(ResolvedFilter {
                filter: filter.clone(),
                target: lookup_dimension(registry, &filter.field)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // Running intersection, metrics first.
    let mut common: Option<BTreeSet<String>> = None;
    let mut compatible_metrics = Vec::new();
    let mut incompatible_metrics = Vec::new();
    for metric in metrics {
        match narrow(&mut common, &metric.sources) {
            Ok(()) => compatible_metrics.push(metric),
            Err(reason) => incompatible_metrics.push(IncompatibleItem {
                name: metric.requested,
                reason,
            }),
        }
    }
    let mut compatible_dimensions = Vec::new();
    let mut incompatible_dimensions = Vec::new();
    for dim in dimensions {
        match narrow(&mut common, &dim.dimension.data_source_names) {
            Ok(()) => compatible_dimensions.push(dim),
            Err(reason) => incompatible_dimensions.push(IncompatibleItem {
                name: dim.alias,
                reason,
            }),
        }
    }
    let common = common.unwrap_or_default();

    // Narrowing by later items can strand a metric's measures.
    let mut metrics = Vec::with_capacity(compatible_metrics.len());
    for metric in compatible_metrics {
        match missing_measure(registry, metric.metric, &common)? {
            Some(measure) => incompatible_metrics.push(IncompatibleItem {
                name: metric.requested,
                reason: IncompatibilityReason::MissingMeasureSource { measure },
            }),
            None => metrics.push(metric),
        }
    }
    let dimensions = compatible_dimensions;

    let time_axis = primary_time_axis(&dimensions)?;
    let axis_grain = time_axis.and_then(|i| dimensions[i].grain);

    let mut compiled_metrics = Vec::with_capacity(metrics.len());
    for metric in metrics {
        match cumulative_fit(metric.metric, axis_grain) {
            Some(reason) => incompatible_metrics.push(IncompatibleItem {
                name: metric.requested,
                reason,
            }),
            None => compiled_metrics.push(metric),
        }
    }
    let metrics = compiled_metrics;

    let all_requested = || {
        request
            .metrics
            .iter()
            .chain(request.dimensions.iter())
            .cloned()
            .collect::<Vec<_>>()
    };
    let lost_to_sources =
        |compatible: usize, incompatible: &[IncompatibleItem]| {
            compatible == 0 && incompatible.iter().any(|i| i.reason.is_source_related())
        };
    if lost_to_sources(metrics.len(), &incompatible_metrics)
        || lost_to_sources(dimensions.len(), &incompatible_dimensions)
    {
        return Err(SemaqueryError::NoCommonDataSource {
            items: all_requested(),
        });
    }
    if metrics.is_empty() && dimensions.is_empty() {
        return Err(SemaqueryError::InvalidRequest(
            "no requested metric or dimension can be compiled".to_string(),
        ));
    }

    for filter in &filters {
        if filter.target.dimension.data_source_names.is_disjoint(&common) {
            return Err(SemaqueryError::NoCommonDataSource {
                items: vec![filter.filter.field.clone()],
            });
        }
    }

    let date_range = request.date_range.map(|range| {
        let column = match time_axis {
            Some(index) => DateColumn::Axis(index),
            None => DateColumn::Hidden {
                grain: range
                    .granularity
                    .or_else(|| dimensions.iter().filter_map(|d| d.grain).min())
                    .unwrap_or(TimeGranularity::Day),
            },
        };
        ResolvedDateRange { range, column }
    });

    let sources = common
        .iter()
        .map(|name| registry.data_source(name))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        metrics = metrics.len(),
        dimensions = dimensions.len(),
        incompatible_metrics = incompatible_metrics.len(),
        incompatible_dimensions = incompatible_dimensions.len(),
        sources = ?common,
        "request resolved"
    );

    Ok(ResolvedRequest {
        requested_metrics: request.metrics.clone(),
        requested_dimensions: request.dimensions.clone(),
        metrics,
        dimensions,
        filters,
        incompatible_metrics,
        incompatible_dimensions,
        sources,
        time_axis,
        date_range,
    })
}

/// Look a dimension up, accepting a `__<grain>` suffix on TIME dimensions.
pub fn lookup_dimension<'r>(registry: &'r DefinitionRegistry, requested: &str) -> Result<ResolvedDimension<'r>> {
    if let Ok(dimension) = registry.dimension(requested) {
        return Ok(ResolvedDimension {
            alias: requested.to_string(),
            dimension,
            grain: dimension.time_params().map(|p| p.time_granularity),
        });
    }
    let not_found = || SemaqueryError::not_found(DefinitionKind::Dimension, requested);
    let (base, suffix) = requested.rsplit_once(GRAIN_SEPARATOR).ok_or_else(not_found)?;
    let (Ok(dimension), Some(grain)) = (registry.dimension(base), TimeGranularity::parse(suffix)) else {
        return Err(not_found());
    };
    let params = dimension.time_params().ok_or_else(|| {
        SemaqueryError::InvalidRequest(format!(
            "{requested}: granularity suffix on non-TIME dimension {base}"
        ))
    })?;
    if grain.is_finer_than(params.time_granularity) {
        return Err(SemaqueryError::InvalidRequest(format!(
            "{requested}: {base} is only available at {} or coarser",
            params.time_granularity
        )));
    }
    Ok(ResolvedDimension {
        alias: requested.to_string(),
        dimension,
        grain: Some(grain),
    })
}

/// Sources able to serve a metric.
pub fn metric_sources(registry: &DefinitionRegistry, metric: &Metric) -> Result<BTreeSet<String>> {
    match &metric.kind {
        MetricKind::MeasureProxy { measure } | MetricKind::Cumulative { measure, .. } => {
            Ok(registry.measure(measure)?.sources.clone())
        }
        MetricKind::Ratio {
            numerator,
            denominator,
        } => {
            let num = &registry.measure(numerator)?.sources;
            let den = &registry.measure(denominator)?.sources;
            Ok(num.intersection(den).cloned().collect())
        }
        MetricKind::Derived { measures, .. } | MetricKind::SqlExpression { measures, .. } => {
            let mut union = BTreeSet::new();
            for measure in measures {
                union.extend(registry.measure(measure)?.sources.iter().cloned());
            }
            Ok(union)
        }
    }
}

fn narrow(
    common: &mut Option<BTreeSet<String>>,
    sources: &BTreeSet<String>,
) -> std::result::Result<(), IncompatibilityReason> {
    match common {
        None => {
            *common = Some(sources.clone());
            Ok(())
        }
        Some(current) => {
            let shared: BTreeSet<String> = current.intersection(sources).cloned().collect();
            if shared.is_empty() {
                return Err(IncompatibilityReason::SourceMismatch {
                    sources: sources.iter().cloned().collect(),
                    available: current.iter().cloned().collect(),
                });
            }
            *current = shared;
            Ok(())
        }
    }
}

fn missing_measure(
    registry: &DefinitionRegistry,
    metric: &Metric,
    common: &BTreeSet<String>,
) -> Result<Option<String>> {
    for measure in metric.kind.measure_names() {
        if registry.measure(measure)?.sources.is_disjoint(common) {
            return Ok(Some(measure.to_string()));
        }
    }
    Ok(None)
}

/// Pick the time axis. Several TIME dimensions need exactly one primary
/// among them; requesting that primary at several grains picks the finest.
fn primary_time_axis(dimensions: &[ResolvedDimension<'_>]) -> Result<Option<usize>> {
    let time_dims: Vec<usize> = dimensions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.dimension.is_time())
        .map(|(i, _)| i)
        .collect();

    match time_dims.as_slice() {
        [] => Ok(None),
        [only] => Ok(dimensions[*only].dimension.is_primary_time().then_some(*only)),
        many => {
            let primaries: Vec<usize> = many
                .iter()
                .copied()
                .filter(|&i| dimensions[i].dimension.is_primary_time())
                .collect();
            let distinct: BTreeSet<&str> = primaries
                .iter()
                .map(|&i| dimensions[i].dimension.name.as_str())
                .collect();
            if distinct.len() != 1 {
                let candidates = if primaries.is_empty() { many } else { &primaries[..] };
                return Err(SemaqueryError::AmbiguousPrimaryTime {
                    candidates: candidates
                        .iter()
                        .map(|&i| dimensions[i].alias.clone())
                        .collect(),
                });
            }
            Ok(primaries.into_iter().min_by_key(|&i| dimensions[i].grain))
        }
    }
}

/// Reason a cumulative metric cannot be framed on the time axis.
fn cumulative_fit(metric: &Metric, axis: Option<TimeGranularity>) -> Option<IncompatibilityReason> {
    let MetricKind::Cumulative { policy, .. } = &metric.kind else {
        return None;
    };
    let Some(axis) = axis else {
        return Some(IncompatibilityReason::NoTimeAxis);
    };
    let fits = match policy {
        CumulativePolicy::AllTime => true,
        CumulativePolicy::Window(window) => window.periods_on(axis).is_some(),
        CumulativePolicy::GrainToDate(reset) => !reset.is_finer_than(axis),
    };
    (!fits).then_some(IncompatibilityReason::WindowGrainMismatch { axis })
}
