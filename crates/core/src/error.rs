//! Error types for ancil

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::invariant::InvariantReport;

/// Main error type for ancil operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Region mismatch: expected {expected}, got {actual}")]
    RegionMismatch { expected: String, actual: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Unknown method, variable, horizon, resolution or region name.
    /// Raised while the run is being assembled, before any computation.
    #[error("Configuration error: `{key}` = {value:?} ({reason})")]
    Configuration {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(InvariantReport),

    #[error("Deadline of {limit:?} exceeded by {operation} -> {output}")]
    Timeout {
        operation: String,
        output: String,
        limit: Duration,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error naming the offending key.
    pub fn config(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the failed operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Engine(e) => e.kind.is_retryable(),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// Classification of a failed raster-engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The expression or rule could not be parsed
    Syntax,
    /// A referenced raster does not exist in the catalog
    MissingReference,
    /// Inputs are not on compatible grids
    RegionMismatch,
    /// External I/O failed; the same call may succeed later
    Transient,
}

impl EngineErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, EngineErrorKind::Transient)
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineErrorKind::Syntax => "syntax",
            EngineErrorKind::MissingReference => "missing reference",
            EngineErrorKind::RegionMismatch => "region mismatch",
            EngineErrorKind::Transient => "transient",
        };
        f.write_str(s)
    }
}

/// A single failed raster-engine call, with enough context to locate it.
#[derive(Error, Debug, Clone)]
#[error(
    "{operation} failed ({kind}): {message} [expression: {expression}; inputs: {}; output: {output}]",
    .inputs.join(", ")
)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub operation: String,
    pub expression: String,
    pub inputs: Vec<String>,
    pub output: String,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: String::new(),
            expression: String::new(),
            inputs: Vec::new(),
            output: String::new(),
            message: message.into(),
        }
    }

    pub fn missing(name: &str) -> Self {
        Self::new(
            EngineErrorKind::MissingReference,
            format!("raster `{}` not found in catalog", name),
        )
    }

    /// Fill in call context that was not known where the error was raised.
    pub fn in_call(
        mut self,
        operation: &str,
        expression: &str,
        inputs: &[String],
        output: &str,
    ) -> Self {
        if self.operation.is_empty() {
            self.operation = operation.to_string();
        }
        if self.expression.is_empty() {
            self.expression = expression.to_string();
        }
        if self.inputs.is_empty() {
            self.inputs = inputs.to_vec();
        }
        if self.output.is_empty() {
            self.output = output.to_string();
        }
        self
    }
}

/// Result type alias for ancil operations
pub type Result<T> = std::result::Result<T, Error>;
