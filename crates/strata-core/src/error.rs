//! Error types for strata operations.
//!
//! This module provides the error hierarchy used across the engine, with
//! structured error codes and suggestions for resolution.

use thiserror::Error;

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

/// Main error type for all strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    /// Malformed input (draft, query, vote, verification).
    ///
    /// Surfaced synchronously to the caller and never retried.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        code: ErrorCode,
        field: Option<String>,
    },

    /// Item, pattern or prediction not found.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        id: Option<String>,
    },

    /// Optimistic-concurrency loss on a persisted item.
    #[error("Concurrent update conflict on '{id}': expected version {expected_version}, found {actual_version:?}")]
    ConcurrentUpdateConflict {
        id: String,
        expected_version: u64,
        actual_version: Option<u64>,
    },

    /// Conflict retries exhausted.
    #[error("Persistence contention on '{id}' after {attempts} attempts")]
    PersistenceContention { id: String, attempts: usize },

    /// A bounded buffer could not make room for an item.
    #[error("Capacity exceeded in {buffer} buffer (capacity {capacity})")]
    CapacityExceeded { buffer: String, capacity: usize },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValOutOfRange,

    // Lookup (NF_xxx)
    ItemNotFound,
    PatternNotFound,
    PredictionNotFound,

    // Concurrency (CAS_xxx)
    CasConflict,
    CasContention,

    // Buffers (BUF_xxx)
    BufCapacity,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Configuration
    Configuration,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValOutOfRange => "VAL_003",
            ErrorCode::ItemNotFound => "NF_001",
            ErrorCode::PatternNotFound => "NF_002",
            ErrorCode::PredictionNotFound => "NF_003",
            ErrorCode::CasConflict => "CAS_001",
            ErrorCode::CasContention => "CAS_002",
            ErrorCode::BufCapacity => "BUF_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::Configuration => "CFG_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl StrataError {
    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            field: None,
        }
    }

    /// Create an invalid-input error naming the offending field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            code: ErrorCode::ValOutOfRange,
            field: Some(field.into()),
        }
    }

    /// Create a missing-field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::InvalidInput {
            message: format!("'{}' is required", field),
            code: ErrorCode::ValMissingField,
            field: Some(field),
        }
    }

    /// Create an item not found error.
    pub fn item_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::NotFound {
            message: format!("Memory item '{}' not found", id),
            code: ErrorCode::ItemNotFound,
            id: Some(id),
        }
    }

    /// Create a pattern not found error.
    pub fn pattern_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::NotFound {
            message: format!("Pattern '{}' not found", id),
            code: ErrorCode::PatternNotFound,
            id: Some(id),
        }
    }

    /// Create a prediction not found error.
    pub fn prediction_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::NotFound {
            message: format!("Prediction '{}' not found", id),
            code: ErrorCode::PredictionNotFound,
            id: Some(id),
        }
    }

    /// Create a compare-and-set conflict.
    pub fn conflict(id: impl Into<String>, expected_version: u64, actual_version: Option<u64>) -> Self {
        Self::ConcurrentUpdateConflict {
            id: id.into(),
            expected_version,
            actual_version,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Whether the operation that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentUpdateConflict { .. })
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::ConcurrentUpdateConflict { .. } => ErrorCode::CasConflict,
            Self::PersistenceContention { .. } => ErrorCode::CasContention,
            Self::CapacityExceeded { .. } => ErrorCode::BufCapacity,
            Self::Configuration(_) => ErrorCode::Configuration,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidInput { .. } => Some("Please check the request fields and value ranges"),
            Self::NotFound { .. } => Some("Please check the id and ensure it has not been purged"),
            Self::PersistenceContention { .. } => Some("The item is under heavy concurrent update; retry later"),
            Self::Configuration(_) => Some("Please check the engine configuration file and STRATA_* variables"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StrataError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}
