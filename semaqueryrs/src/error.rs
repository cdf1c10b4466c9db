use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemaqueryError>;

/// Which kind of definition a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Metric,
    Dimension,
    Measure,
    DataSource,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DefinitionKind::Metric => "metric",
            DefinitionKind::Dimension => "dimension",
            DefinitionKind::Measure => "measure",
            DefinitionKind::DataSource => "data source",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum SemaqueryError {
    #[error("{kind} not found: {name}")]
    DefinitionNotFound { kind: DefinitionKind, name: String },
    #[error("invalid definition {name}: {message}")]
    DefinitionValidation { name: String, message: String },
    #[error("no common data source for {}", items.join(", "))]
    NoCommonDataSource { items: Vec<String> },
    #[error("ambiguous primary time dimension among [{}]", candidates.join(", "))]
    AmbiguousPrimaryTime { candidates: Vec<String> },
    #[error("metric {metric} references unknown measure {token}")]
    UnresolvedMeasureReference { metric: String, token: String },
    #[error("order by target {target} is not a selected column")]
    InvalidOrderByTarget { target: String },
    #[error("having target {target} is not a compiled metric")]
    InvalidFilterTarget { target: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request cancelled before {stage}")]
    Cancelled { stage: &'static str },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SemaqueryError {
    pub(crate) fn not_found(kind: DefinitionKind, name: impl Into<String>) -> Self {
        SemaqueryError::DefinitionNotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn invalid_definition(name: impl Into<String>, message: impl Into<String>) -> Self {
        SemaqueryError::DefinitionValidation {
            name: name.into(),
            message: message.into(),
        }
    }
}
