//! Error types for the report pipeline

/// Errors that abort a pipeline run.
///
/// Per-row problems (unparsable dates, missing cells, rows without a pivot
/// category) never surface here; they are recovered by excluding the row and
/// counted in [`crate::diagnostics::RunDiagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Source name has no registered schema
    UnknownSource(String),
    /// Input is structurally incompatible with its schema
    SchemaMismatch { source: String, detail: String },
    /// A stage referenced a column the table does not have
    ColumnNotFound(String),
    /// A column holds a different value type than the operation requires
    ColumnTypeMismatch {
        column: String,
        expected: String,
        found: String,
    },
    /// An operation would produce two columns with the same name
    DuplicateColumn(String),
    /// Window start is after window end, or a bound failed to parse
    InvalidDateRange(String),
    /// Unsupported date pattern
    InvalidDateFormat(String),
    /// Pivot spread column has more distinct values than allowed
    PivotCardinality {
        column: String,
        limit: usize,
        found: usize,
    },
    /// Report plan is malformed (unknown stage, wrong input count, cycle)
    Plan(String),
    /// Invalid configuration value
    Config(String),
    /// File I/O error
    Io(String),
    /// CSV reading or writing error
    Csv(String),
    /// JSON (de)serialization error
    Json(String),
    /// Report writer failure
    Sink(String),
    /// Remote fetch failure
    Fetch(String),
    /// Failure inside a named plan stage
    Stage {
        stage: String,
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Wraps this error with the name of the stage that raised it.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, unwrapping stage context.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::UnknownSource(name) => write!(f, "Unknown source: {}", name),
            PipelineError::SchemaMismatch { source, detail } => {
                write!(f, "Schema mismatch for '{}': {}", source, detail)
            }
            PipelineError::ColumnNotFound(column) => write!(f, "Column not found: {}", column),
            PipelineError::ColumnTypeMismatch {
                column,
                expected,
                found,
            } => write!(
                f,
                "Column '{}' has type {}, expected {}",
                column, found, expected
            ),
            PipelineError::DuplicateColumn(column) => write!(f, "Duplicate column: {}", column),
            PipelineError::InvalidDateRange(msg) => write!(f, "Invalid date range: {}", msg),
            PipelineError::InvalidDateFormat(msg) => write!(f, "Invalid date format: {}", msg),
            PipelineError::PivotCardinality {
                column,
                limit,
                found,
            } => write!(
                f,
                "Pivot column '{}' has {} distinct values (limit {})",
                column, found, limit
            ),
            PipelineError::Plan(msg) => write!(f, "Invalid report plan: {}", msg),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
            PipelineError::Csv(msg) => write!(f, "CSV error: {}", msg),
            PipelineError::Json(msg) => write!(f, "JSON error: {}", msg),
            PipelineError::Sink(msg) => write!(f, "Sink error: {}", msg),
            PipelineError::Fetch(msg) => write!(f, "Fetch error: {}", msg),
            PipelineError::Stage { stage, source } => {
                write!(f, "Stage '{}' failed: {}", stage, source)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

// Conversions from other error types

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Sink(format!("SQL error: {}", err))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Fetch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
