//! Error taxonomy for the memory engine.
//!
//! Every fallible path in the engine returns [`Error`]. The variants map to
//! caller-facing failure classes: bad input, missing rows, budget refusals,
//! unreachable dependencies, and provider misbehavior. Classification
//! helpers ([`Error::is_transient`], [`Error::is_retryable`]) drive the
//! retry policy in storage backends and request handlers.

use uuid::Uuid;

/// Result type alias for memory-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the agentic memory engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied invalid input; names the offending field.
    #[error("validation failed on `{field}`: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Human-readable description of the violation
        message: String,
    },

    /// Missing or invalid credentials, or a cross-tenant access attempt.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Entity does not exist or is not owned by the caller's tenant.
    ///
    /// Never distinguishes "not yours" from "does not exist".
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent modification conflict (e.g. racing delete).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Tenant is over its daily or monthly spend limit.
    #[error("budget exceeded: {usage_usd:.6} USD used of {limit_usd:.6} USD limit ({window})")]
    BudgetExceeded {
        /// Current usage in the applicable window
        usage_usd: f64,
        /// The limit that was hit
        limit_usd: f64,
        /// Which window was exhausted ("daily" or "monthly")
        window: String,
    },

    /// Storage backend failure, classified at the repository layer.
    #[error("storage error: {message}")]
    Storage {
        /// Backend-reported failure description
        message: String,
        /// Whether a retry with backoff may succeed
        transient: bool,
    },

    /// An external dependency (vector index, provider) is unreachable or
    /// timed out. Always considered transient.
    #[error("dependency unavailable: {dependency}: {message}")]
    DependencyUnavailable {
        /// Name of the unreachable dependency
        dependency: String,
        /// Failure description
        message: String,
    },

    /// LLM returned output that does not conform to the requested schema.
    #[error("provider output invalid: {0}")]
    ProviderOutputInvalid(String),

    /// A deadline elapsed before the operation completed.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Serialization failure on a domain payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Uncaught programming error; always logged with full context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Construct a validation error naming the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Construct a not-found error for a memory ID.
    #[must_use]
    pub fn memory_not_found(id: Uuid) -> Self {
        Error::NotFound(format!("memory {id}"))
    }

    /// Construct a transient storage error.
    pub fn storage_transient(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            transient: true,
        }
    }

    /// Construct a fatal storage error.
    pub fn storage_fatal(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            transient: false,
        }
    }

    /// Construct a dependency-unavailable error.
    pub fn unavailable(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DependencyUnavailable {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Check whether this failure is transient (a retry with backoff may
    /// succeed).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage { transient, .. } => *transient,
            Error::DependencyUnavailable { .. } | Error::Timeout(_) => true,
            _ => false,
        }
    }

    /// Check whether the engine may auto-retry this operation.
    ///
    /// Only transient failures of idempotent reads are retried; the caller
    /// is responsible for knowing whether the failed operation was a read.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    /// Translate a repository-layer error into its service-layer class.
    ///
    /// Transient storage failures become [`Error::DependencyUnavailable`];
    /// fatal ones become [`Error::Internal`]. All other variants pass
    /// through unchanged.
    #[must_use]
    pub fn into_service_error(self, dependency: &str) -> Self {
        match self {
            Error::Storage {
                message,
                transient: true,
            } => Error::unavailable(dependency, message),
            Error::Storage {
                message,
                transient: false,
            } => Error::Internal(message),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::storage_transient("connection reset").is_transient());
        assert!(!Error::storage_fatal("corrupt row").is_transient());
        assert!(Error::unavailable("vector-index", "timeout").is_transient());
        assert!(Error::Timeout("llm call".to_string()).is_transient());
        assert!(!Error::validation("importance", "out of range").is_transient());
        assert!(
            !Error::BudgetExceeded {
                usage_usd: 1.0,
                limit_usd: 0.5,
                window: "daily".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_service_translation() {
        let err = Error::storage_transient("locked").into_service_error("relational-store");
        assert!(matches!(err, Error::DependencyUnavailable { .. }));

        let err = Error::storage_fatal("schema drift").into_service_error("relational-store");
        assert!(matches!(err, Error::Internal(_)));

        let err = Error::memory_not_found(Uuid::new_v4()).into_service_error("relational-store");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_validation_names_field() {
        let err = Error::validation("layer", "unknown layer `wishful`");
        let msg = err.to_string();
        assert!(msg.contains("layer"));
        assert!(msg.contains("wishful"));
    }

    #[test]
    fn test_not_found_is_opaque() {
        let id = Uuid::new_v4();
        let msg = Error::memory_not_found(id).to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(!msg.contains("tenant"));
    }
}
