use thiserror::Error;

/// Canonical trajlake error taxonomy used across crates.
///
/// Classification guidance:
/// - [`TrajError::NotFound`]: lookup of an unregistered catalog name
/// - [`TrajError::Validation`]: operator output-contract violations caught before use
/// - [`TrajError::Execution`]: runtime transform, decode/encode, or data-shape failures
/// - [`TrajError::InvalidConfig`]: catalog/config/path contract violations
/// - [`TrajError::Unsupported`]: valid request for intentionally unimplemented behavior
/// - [`TrajError::Io`]: raw filesystem IO failures from std APIs
#[derive(Debug, Error)]
pub enum TrajError {
    /// Unknown table or named resource.
    ///
    /// The message always enumerates the registered names so the failure is
    /// actionable without inspecting catalog internals.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operator output-contract violations.
    ///
    /// Examples:
    /// - named outputs whose key set differs from the declared output names
    /// - a single-table output from an operator declaring multiple outputs
    /// - a reserved column name colliding with operator data
    #[error("validation error: {0}")]
    Validation(String),

    /// Runtime execution failures after validation succeeded.
    ///
    /// Examples:
    /// - arrow kernel or type-downcast failures
    /// - parquet decode/encode failures
    /// - embedded SQL engine errors
    #[error("execution error: {0}")]
    Execution(String),

    /// Invalid or inconsistent configuration/catalog state.
    ///
    /// Examples:
    /// - malformed date filter values
    /// - a null value in a requested partition column
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Valid request for a feature/shape not implemented in the current version.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard trajlake result alias.
pub type Result<T> = std::result::Result<T, TrajError>;
