use std::collections::{HashMap, HashSet};

use crate::definitions::MetricKind;
use crate::error::{Result, SemaqueryError};
use crate::expr_parser::tokenize;
use crate::registry::DefinitionRegistry;

/// Load-time invariant checks over a freshly built registry.
///
/// Every failure names the offending definition; a single failure rejects the
/// whole batch.
pub struct Validator<'a> {
    registry: &'a DefinitionRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a DefinitionRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_dimensions()?;
        self.validate_primary_time()?;
        self.validate_metrics()?;
        Ok(())
    }

    fn validate_dimensions(&self) -> Result<()> {
        for dim in self.registry.dimensions() {
            for source in &dim.data_source_names {
                self.check(
                    self.registry.data_source(source).is_ok(),
                    &dim.name,
                    format!("references unknown data source {source}"),
                )?;
            }
            self.check(
                self.registry.metric(&dim.name).is_err(),
                &dim.name,
                "dimension and metric share a name",
            )?;
        }
        Ok(())
    }

    fn validate_primary_time(&self) -> Result<()> {
        for source in self.registry.data_sources().filter(|s| s.has_measures()) {
            let primaries: Vec<&str> = self
                .registry
                .dimensions()
                .filter(|d| d.is_primary_time() && d.available_in(&source.name))
                .map(|d| d.name.as_str())
                .collect();
            self.check(
                primaries.len() == 1,
                &source.name,
                format!(
                    "data source with measures needs exactly one primary TIME dimension, found [{}]",
                    primaries.join(", ")
                ),
            )?;
        }
        Ok(())
    }

    fn validate_metrics(&self) -> Result<()> {
        let mut proxy_targets: HashMap<&str, &str> = HashMap::new();
        let mut expressions: HashMap<String, &str> = HashMap::new();

        for metric in self.registry.metrics() {
            for measure in metric.kind.measure_names() {
                if self.registry.measure(measure).is_err() {
                    let message = if self.registry.metric(measure).is_ok() {
                        format!("references metric {measure}; metrics are built from measures only")
                    } else {
                        format!("references unknown measure {measure}")
                    };
                    return Err(SemaqueryError::invalid_definition(&metric.name, message));
                }
            }

            match &metric.kind {
                MetricKind::MeasureProxy { measure } => {
                    if let Some(other) = proxy_targets.insert(measure.as_str(), &metric.name) {
                        return Err(SemaqueryError::invalid_definition(
                            &metric.name,
                            format!("measure {measure} is already proxied by metric {other}"),
                        ));
                    }
                }
                MetricKind::Ratio {
                    numerator,
                    denominator,
                } => {
                    let shared = self.shared_sources(numerator, denominator)?;
                    self.check(
                        !shared.is_empty(),
                        &metric.name,
                        format!("numerator {numerator} and denominator {denominator} share no data source"),
                    )?;
                }
                MetricKind::Cumulative { measure, .. } => {
                    let info = self.registry.measure(measure)?;
                    self.check(
                        info.agg.accumulates(),
                        &metric.name,
                        format!(
                            "cumulative metric over {:?} measure {measure} cannot be accumulated",
                            info.agg
                        ),
                    )?;
                }
                MetricKind::Derived { .. } | MetricKind::SqlExpression { .. } => {}
            }

            if let Some(expression) = metric.kind.expression() {
                if let Err(message) = tokenize(expression) {
                    return Err(SemaqueryError::invalid_definition(&metric.name, message));
                }
                let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
                if let Some(other) = expressions.insert(normalized, &metric.name) {
                    return Err(SemaqueryError::invalid_definition(
                        &metric.name,
                        format!("expression duplicates metric {other}"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn shared_sources(&self, left: &str, right: &str) -> Result<HashSet<String>> {
        let left = &self.registry.measure(left)?.sources;
        let right = &self.registry.measure(right)?.sources;
        Ok(left.intersection(right).cloned().collect())
    }

    fn check(&self, condition: bool, name: &str, message: impl Into<String>) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(SemaqueryError::invalid_definition(name, message))
        }
    }
}
