use thiserror::Error;

/// Convenience result type for stage, wire and ingestion operations.
pub type CellResult<T> = Result<T, CellError>;

/// Severity classification used when reporting failures to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the pipeline aborts).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Error type returned by every stage, the wire codec, and ingestion.
///
/// A single enum is shared across the crate. Any `Err` aborts the whole pipeline: there is no
/// partial-success mode.
#[derive(Debug, Error)]
pub enum CellError {
    /// Underlying I/O error (e.g. file not found, broken pipe).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV tokenizer or reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON configuration error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern for input discovery.
    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A column named by the caller is not present in the schema.
    #[error("column '{name}' not found in schema")]
    MissingColumn { name: String },

    /// Two schemas that must agree do not (concatenation), or a schema arrives out of order.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Stage parameters are malformed (empty band list, duplicate gate, degenerate polygon, ...).
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The binary stream is truncated or corrupt.
    #[error("wire format error: {message}")]
    Wire { message: String },

    /// A record carries more feature values than its schema declares.
    #[error("record has {values} feature values but schema declares {columns} feature columns")]
    ShapeMismatch { values: usize, columns: usize },

    /// An ingestion line has fewer than the minimum number of fields.
    #[error("line {line}: expected at least 3 fields (id, x, y), found {fields}")]
    LineTooShort { line: usize, fields: usize },

    /// A declared ingestion column position lies beyond the line's field count.
    #[error("line {line}: {column} index {index} is out of range for {fields} fields")]
    IndexOutOfBounds {
        line: usize,
        column: &'static str,
        index: usize,
        fields: usize,
    },

    /// Shifting a group identifier during concatenation overflowed 32 bits.
    #[error("group id {group} cannot be shifted by offset {offset} without overflowing")]
    IdentityOverflow { group: u32, offset: u32 },
}

impl CellError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn wire(message: impl Into<String>) -> Self {
        Self::Wire {
            message: message.into(),
        }
    }

    /// Classify this error for observer callbacks.
    pub fn severity(&self) -> Severity {
        match self {
            CellError::Io(_) => Severity::Critical,
            CellError::Csv(err) => match err.kind() {
                csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            _ => Severity::Error,
        }
    }
}
