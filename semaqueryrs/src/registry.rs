use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use glob::glob;

use crate::definitions::{
    Aggregation, DataSource, DefinitionBatch, Dimension, Measure, Metric,
};
use crate::error::{DefinitionKind, Result, SemaqueryError};
use crate::validation::Validator;

/// Cross-source view of one measure name.
#[derive(Debug, Clone)]
pub struct MeasureInfo {
    pub name: String,
    pub agg: Aggregation,
    pub sources: BTreeSet<String>,
}

/// Validated, immutable set of definitions.
///
/// Built wholesale from a [`DefinitionBatch`]; never mutated afterwards.
/// Use [`RegistryHandle`] to swap in a new registry while compiles are running.
#[derive(Debug, Default, Clone)]
pub struct DefinitionRegistry {
    data_sources: BTreeMap<String, DataSource>,
    dimensions: BTreeMap<String, Dimension>,
    metrics: BTreeMap<String, Metric>,
    metric_ids: BTreeMap<String, String>,
    measures: BTreeMap<String, MeasureInfo>,
}

impl DefinitionRegistry {
    pub fn from_batch(batch: DefinitionBatch) -> Result<Self> {
        let mut registry = DefinitionRegistry::default();

        for source in batch.data_sources {
            if registry.data_sources.contains_key(&source.name) {
                return Err(SemaqueryError::invalid_definition(
                    &source.name,
                    "duplicate data source name",
                ));
            }
            for (measure_name, measure) in &source.measures {
                registry.index_measure(&source.name, measure_name, measure)?;
            }
            registry.data_sources.insert(source.name.clone(), source);
        }

        for record in batch.dimensions {
            let dimension = Dimension::try_from(record)?;
            if registry.dimensions.contains_key(&dimension.name) {
                return Err(SemaqueryError::invalid_definition(
                    &dimension.name,
                    "duplicate dimension name",
                ));
            }
            registry.dimensions.insert(dimension.name.clone(), dimension);
        }

        for record in batch.metrics {
            let metric = Metric::try_from(record)?;
            if registry.metrics.contains_key(&metric.name) {
                return Err(SemaqueryError::invalid_definition(
                    &metric.name,
                    "duplicate metric name",
                ));
            }
            if registry.metric_ids.contains_key(&metric.id) {
                return Err(SemaqueryError::invalid_definition(
                    &metric.name,
                    format!("duplicate metric id {}", metric.id),
                ));
            }
            registry
                .metric_ids
                .insert(metric.id.clone(), metric.name.clone());
            registry.metrics.insert(metric.name.clone(), metric);
        }

        Validator::new(&registry).validate()?;
        tracing::debug!(
            data_sources = registry.data_sources.len(),
            dimensions = registry.dimensions.len(),
            metrics = registry.metrics.len(),
            "definition registry built"
        );
        Ok(registry)
    }

    /// Load every `*.yml` / `*.yaml` batch fragment under `dir`, merged in file name order.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(SemaqueryError::Config(format!(
                "definitions directory not found: {}",
                dir.display()
            )));
        }
        let mut files = Vec::new();
        for pattern in ["*.yml", "*.yaml"] {
            let pattern = format!("{}/{pattern}", dir.display());
            files.extend(
                glob(&pattern)
                    .map_err(|e| SemaqueryError::Other(e.into()))?
                    .flatten(),
            );
        }
        files.sort();

        let mut batch = DefinitionBatch::default();
        for path in &files {
            let contents = fs::read_to_string(path)?;
            let fragment: DefinitionBatch = serde_yaml::from_str(&contents)?;
            tracing::debug!(path = %path.display(), "loaded definition fragment");
            batch.merge(fragment);
        }
        Self::from_batch(batch)
    }

    fn index_measure(&mut self, source: &str, name: &str, measure: &Measure) -> Result<()> {
        let info = self
            .measures
            .entry(name.to_string())
            .or_insert_with(|| MeasureInfo {
                name: name.to_string(),
                agg: measure.agg,
                sources: BTreeSet::new(),
            });
        if info.agg != measure.agg {
            return Err(SemaqueryError::invalid_definition(
                name,
                format!(
                    "measure aggregates as {:?} in {source} but {:?} elsewhere",
                    measure.agg, info.agg
                ),
            ));
        }
        info.sources.insert(source.to_string());
        Ok(())
    }

    pub fn data_source(&self, name: &str) -> Result<&DataSource> {
        self.data_sources
            .get(name)
            .ok_or_else(|| SemaqueryError::not_found(DefinitionKind::DataSource, name))
    }

    pub fn dimension(&self, name: &str) -> Result<&Dimension> {
        self.dimensions
            .get(name)
            .ok_or_else(|| SemaqueryError::not_found(DefinitionKind::Dimension, name))
    }

    /// Look a metric up by name, then by id.
    pub fn metric(&self, name_or_id: &str) -> Result<&Metric> {
        self.metrics
            .get(name_or_id)
            .or_else(|| {
                self.metric_ids
                    .get(name_or_id)
                    .and_then(|name| self.metrics.get(name))
            })
            .ok_or_else(|| SemaqueryError::not_found(DefinitionKind::Metric, name_or_id))
    }

    pub fn measure(&self, name: &str) -> Result<&MeasureInfo> {
        self.measures
            .get(name)
            .ok_or_else(|| SemaqueryError::not_found(DefinitionKind::Measure, name))
    }

    /// The measure as declared by one particular source.
    pub fn measure_in(&self, source: &str, name: &str) -> Option<&Measure> {
        self.data_sources
            .get(source)
            .and_then(|s| s.measures.get(name))
    }

    pub fn primary_time_dimension(&self, source: &str) -> Option<&Dimension> {
        self.dimensions
            .values()
            .find(|d| d.is_primary_time() && d.available_in(source))
    }

    pub fn data_sources(&self) -> impl Iterator<Item = &DataSource> {
        self.data_sources.values()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }
}

/// Shared, swappable registry reference.
///
/// Readers take a snapshot (`Arc` clone) and keep it for the whole compile;
/// a reload builds and validates the replacement before publishing it.
#[derive(Debug, Default)]
pub struct RegistryHandle {
    current: RwLock<Arc<DefinitionRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: DefinitionRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<DefinitionRegistry> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the registry with one built from `batch`.
    /// On error the previous snapshot stays in effect.
    pub fn reload(&self, batch: DefinitionBatch) -> Result<Arc<DefinitionRegistry>> {
        let next = DefinitionRegistry::from_batch(batch).map_err(|err| {
            tracing::warn!(error = %err, "registry reload rejected; keeping previous definitions");
            err
        })?;
        Ok(self.publish(next))
    }

    pub fn reload_from_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Arc<DefinitionRegistry>> {
        let next = DefinitionRegistry::load_from_dir(dir).map_err(|err| {
            tracing::warn!(error = %err, "registry reload rejected; keeping previous definitions");
            err
        })?;
        Ok(self.publish(next))
    }

    fn publish(&self, registry: DefinitionRegistry) -> Arc<DefinitionRegistry> {
        let next = Arc::new(registry);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = next.clone();
        tracing::info!(
            metrics = next.metrics.len(),
            dimensions = next.dimensions.len(),
            "definition registry reloaded"
        );
        next
    }
}
