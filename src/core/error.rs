//! Typed error handling for the engine
//!
//! Every failure is classified so callers can react to the category rather
//! than to a message string.
//!
//! # Error Categories
//!
//! - [`SchemaError`]: the directive model and a request disagree (unknown
//!   type or field, malformed directive). Indicates an upstream validation
//!   gap and is reported as an internal error.
//! - [`InputError`]: malformed documents, filters, order tokens or write
//!   payloads. Always raised before any statement reaches the database.
//! - [`EngineError::OptimisticLock`]: an update or delete matched no row with
//!   the expected version. Retriable by the caller.
//! - [`StorageError`]: the backend failed (syntax, constraint, connection).
//! - [`ConfigError`]: configuration could not be loaded.
//!
//! # Example
//!
//! ```rust,ignore
//! match engine.run_mutation(&ctx).await {
//!     Err(EngineError::OptimisticLock { type_name, id }) => {
//!         // reload the row and retry with its current version
//!     }
//!     Err(e) => eprintln!("{} ({})", e, e.error_code()),
//!     Ok(data) => println!("{}", data),
//! }
//! ```

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

/// The main error type of the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Directive model / caller contract violation
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Malformed request input
    #[error(transparent)]
    Input(#[from] InputError),

    /// An update or delete affected no row with the expected version
    #[error("optimistic locking failed for {type_name} '{id}'")]
    OptimisticLock { type_name: String, id: Uuid },

    /// Storage backend errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal engine errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Get the error code reported in the `extensions.code` of a response error
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Schema(_) => "INTERNAL_SCHEMA_ERROR",
            EngineError::Input(e) => e.error_code(),
            EngineError::OptimisticLock { .. } => "OPTIMISTIC_LOCK_FAILED",
            EngineError::Storage(e) => e.error_code(),
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the operation unchanged after reloading state
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::OptimisticLock { .. })
    }

    /// Convert to a response error without a path
    pub fn to_response_error(&self) -> ResponseError {
        ResponseError {
            message: self.to_string(),
            path: None,
            extensions: self.extensions(),
        }
    }

    /// Convert to a response error attached to a root field
    pub fn to_response_error_at(&self, path: impl Into<String>) -> ResponseError {
        ResponseError {
            path: Some(vec![path.into()]),
            ..self.to_response_error()
        }
    }

    fn extensions(&self) -> Value {
        match self {
            EngineError::OptimisticLock { type_name, id } => json!({
                "code": self.error_code(),
                "type": type_name,
                "id": id.to_string(),
            }),
            _ => json!({ "code": self.error_code() }),
        }
    }
}

/// A single entry of the `errors` list of a response
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseError {
    /// Human-readable error message
    pub message: String,
    /// Response path of the root field that failed, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    /// Machine readable details, always carrying `code`
    pub extensions: Value,
}

impl ResponseError {
    /// The `extensions.code` value
    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(Value::as_str)
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors raised when a request or a schema definition contradicts the directive model
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unknown entity type: {type_name}")]
    UnknownType { type_name: String },

    #[error("Unknown field '{field}' on type {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("Unknown root field: {field}")]
    UnknownRootField { field: String },

    #[error("Entity type {type_name} must declare exactly one 'id' field")]
    MissingIdField { type_name: String },

    #[error("Invalid directive on {type_name}.{field}: {message}")]
    InvalidDirective {
        type_name: String,
        field: String,
        message: String,
    },

    #[error("Entity type {type_name} has no '{field}' field required for {operation}")]
    MissingManagedField {
        type_name: String,
        field: String,
        operation: String,
    },
}

// =============================================================================
// Input Errors
// =============================================================================

/// Errors caused by malformed request input
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to parse document: {message}")]
    Parse { message: String },

    #[error("No operation found in document")]
    MissingOperation,

    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("Document contains several operations; an operation name is required")]
    AmbiguousOperation,

    #[error("{kind} operations are not supported")]
    UnsupportedOperation { kind: String },

    #[error("Unknown fragment: {name}")]
    UnknownFragment { name: String },

    #[error("Missing value for variable ${name}")]
    MissingVariable { name: String },

    #[error("Missing required argument '{argument}' on field '{field}'")]
    MissingArgument { field: String, argument: String },

    #[error("Malformed filter: {message}")]
    MalformedFilter { message: String },

    #[error("Unknown filter operator: {operator}")]
    UnknownOperator { operator: String },

    #[error("Malformed order token: {token}")]
    MalformedOrder { token: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing field '{field}' in {type_name} payload")]
    MissingField { type_name: String, field: String },

    #[error("Unknown mutation: {name}")]
    UnknownMutation { name: String },

    #[error("Reference cycle between newly created rows: {type_name} '{id}'")]
    ReferenceCycle { type_name: String, id: Uuid },
}

impl InputError {
    pub fn error_code(&self) -> &'static str {
        match self {
            InputError::Parse { .. } => "GRAPHQL_PARSE_FAILED",
            InputError::ReferenceCycle { .. } => "REFERENCE_CYCLE",
            _ => "BAD_USER_INPUT",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to connect to {backend}: {message}")]
    Connection { backend: String, message: String },

    #[error("{backend} query error: {message}")]
    Query { backend: String, message: String },

    #[error("Data integrity error: {message}")]
    Integrity { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },
}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::Connection { .. } => "STORAGE_UNAVAILABLE",
            StorageError::Integrity { .. } => "STORAGE_INTEGRITY_ERROR",
            StorageError::Query { .. } | StorageError::Transaction { .. } => "STORAGE_ERROR",
        }
    }
}

#[cfg(any(feature = "postgres", feature = "mysql"))]
impl StorageError {
    /// Classify a sqlx error for the given backend
    pub fn from_sqlx(backend: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => StorageError::Integrity {
                    message: db_err.message().to_string(),
                },
                _ => StorageError::Query {
                    backend: backend.to_string(),
                    message: db_err.message().to_string(),
                },
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Connection {
                backend: backend.to_string(),
                message: err.to_string(),
            },
            other => StorageError::Query {
                backend: backend.to_string(),
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config{}: {message}", file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    Parse {
        file: Option<String>,
        message: String,
    },

    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Backend '{backend}' is not compiled in; enable the '{backend}' feature")]
    BackendDisabled { backend: String },
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            file: None,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io {
            message: err.to_string(),
        }
    }
}

impl From<graphql_parser::query::ParseError> for InputError {
    fn from(err: graphql_parser::query::ParseError) -> Self {
        InputError::Parse {
            message: err.to_string(),
        }
    }
}

impl From<graphql_parser::query::ParseError> for EngineError {
    fn from(err: graphql_parser::query::ParseError) -> Self {
        EngineError::Input(err.into())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("JSON error: {}", err))
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimistic_lock_is_distinct_and_retriable() {
        let err = EngineError::OptimisticLock {
            type_name: "User".to_string(),
            id: Uuid::nil(),
        };
        assert_eq!(err.error_code(), "OPTIMISTIC_LOCK_FAILED");
        assert!(err.is_retriable());
        assert!(err.to_string().contains("optimistic locking failed"));

        let storage: EngineError = StorageError::Query {
            backend: "PostgreSQL".to_string(),
            message: "syntax error".to_string(),
        }
        .into();
        assert_eq!(storage.error_code(), "STORAGE_ERROR");
        assert!(!storage.is_retriable());
    }

    #[test]
    fn test_schema_error_is_internal() {
        let err: EngineError = SchemaError::UnknownField {
            type_name: "User".to_string(),
            field: "nickname".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "INTERNAL_SCHEMA_ERROR");
        assert!(err.to_string().contains("nickname"));
    }

    #[test]
    fn test_input_error_codes() {
        assert_eq!(
            InputError::MalformedOrder {
                token: "name_UP".to_string()
            }
            .error_code(),
            "BAD_USER_INPUT"
        );
        assert_eq!(
            InputError::Parse {
                message: "unexpected".to_string()
            }
            .error_code(),
            "GRAPHQL_PARSE_FAILED"
        );
    }

    #[test]
    fn test_response_error_carries_code_and_path() {
        let err = EngineError::OptimisticLock {
            type_name: "User".to_string(),
            id: Uuid::nil(),
        };
        let response = err.to_response_error_at("update");
        assert_eq!(response.code(), Some("OPTIMISTIC_LOCK_FAILED"));
        assert_eq!(response.path, Some(vec!["update".to_string()]));
        assert_eq!(response.extensions["type"], json!("User"));

        let serialized = serde_json::to_value(err.to_response_error()).unwrap();
        assert!(serialized.get("path").is_none());
    }

    #[test]
    fn test_config_parse_error_mentions_file() {
        let err = ConfigError::Parse {
            file: Some("engine.yaml".to_string()),
            message: "bad indent".to_string(),
        };
        assert!(err.to_string().contains("engine.yaml"));

        let err = ConfigError::Parse {
            file: None,
            message: "bad indent".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to parse config: bad indent");
    }
}
