use thiserror::Error;

/// Per-line parse failures. These are always recovered by the mapper: the
/// line is logged and skipped, the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("wrong number of columns: expected {expected}, found {found}")]
    WrongColumnCount { expected: usize, found: usize },
    #[error("malformed numeric value for {field}: {value:?}")]
    MalformedNumeric { field: &'static str, value: String },
    #[error("schema needs at least {needed} fields, line has {found}")]
    SchemaMismatch { needed: usize, found: usize },
}

/// Invalid job configuration. Fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown {kind} {value:?} (expected one of: {expected})")]
    UnknownVariant { kind: &'static str, value: String, expected: &'static str },
    #[error("invalid threshold {0:?}: must be a non-negative integer")]
    InvalidThreshold(String),
}
