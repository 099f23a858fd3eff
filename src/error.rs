//! Error types for the reconciliation engine.
//!
//! This module provides the error hierarchy for every phase: configuration
//! loading, state persistence and migration, the PingOne HTTP client,
//! planning, and the resource lifecycle.
//!
//! A missing remote resource is deliberately absent from this hierarchy.
//! Reads and updates report it through dedicated outcome variants so it can
//! never be propagated as a failure by accident.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::diag::Diagnostics;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State persistence and migration errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// PingOne API errors.
    #[error("PingOne API error: {0}")]
    Api(#[from] ApiError),

    /// Planning and validation errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Lifecycle errors.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error kinds surfaced to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The supplied tree does not match the schema.
    TypeMismatch,
    /// A validator emitted an error.
    ValidationFailure,
    /// A post-plan or post-apply invariant was violated.
    PlanInconsistency,
    /// Concurrent modification or uniqueness violation.
    Conflict,
    /// Permanent client-side rejection.
    InvalidRequest,
    /// Server-side failure after retries.
    Upstream,
    /// Network failure after retries.
    Transport,
    /// Credentials could not be refreshed.
    AuthExpired,
    /// External cancellation.
    Cancelled,
    /// Wall-clock timeout.
    Timeout,
    /// Anything else (configuration, state files, internal).
    Other,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A required key is missing or empty.
    #[error("Missing required configuration key '{key}' in profile '{profile}': {message}")]
    MissingKey {
        /// Profile being loaded.
        profile: String,
        /// Full dotted key path.
        key: String,
        /// Human-readable explanation.
        message: String,
    },

    /// A key holds a value outside its allowed set.
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Full dotted key path.
        key: String,
        /// Human-readable explanation.
        message: String,
    },

    /// The requested profile does not exist.
    #[error("Profile '{profile}' not found in config file")]
    ProfileNotFound {
        /// Profile name.
        profile: String,
    },

    /// Unsupported authentication grant.
    #[error("Unsupported authentication type '{grant_type}' for profile '{profile}'")]
    UnsupportedGrantType {
        /// Grant type found in the file.
        grant_type: String,
        /// Profile name.
        profile: String,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// No upgrader is registered for a version step.
    #[error("No state upgrader for {resource_type} from schema version {from} to {to}")]
    MissingUpgrader {
        /// Resource type being migrated.
        resource_type: String,
        /// Source version of the missing step.
        from: u64,
        /// Target version of the missing step.
        to: u64,
    },

    /// State was written by a newer schema than this build knows.
    #[error("State for {resource_type} has schema version {found}, newer than supported version {current}")]
    FutureVersion {
        /// Resource type being loaded.
        resource_type: String,
        /// Version found in state.
        found: u64,
        /// Current schema version.
        current: u64,
    },

    /// An upgrader rejected the prior value.
    #[error("Failed to upgrade {resource_type} state from version {from}: {message}")]
    UpgradeFailed {
        /// Resource type being migrated.
        resource_type: String,
        /// Version the failing step started from.
        from: u64,
        /// Description of the failure.
        message: String,
    },
}

/// Classified PingOne API errors.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Concurrent modification or uniqueness violation (409 / 422).
    #[error("Conflict calling {operation} ({status}): {message}")]
    Conflict {
        /// Operation name.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Remote message.
        message: String,
        /// Formatted PingOne error details, empty when the body had none.
        detail: String,
    },

    /// Permanent client-side error (other 4xx).
    #[error("Invalid request calling {operation} ({status}): {message}")]
    InvalidRequest {
        /// Operation name.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Remote message.
        message: String,
        /// Formatted PingOne error details, empty when the body had none.
        detail: String,
    },

    /// Permission or region / environment scope error (401 / 403).
    #[error("Permission or scope error calling {operation} ({status}): {message}")]
    PermissionOrScope {
        /// Operation name.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Remote message.
        message: String,
        /// Formatted PingOne error details, empty when the body had none.
        detail: String,
    },

    /// Server-side failure after retries were exhausted.
    #[error("Upstream error calling {operation} ({status}) after {attempts} attempts: {message}")]
    Upstream {
        /// Operation name.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Attempts made.
        attempts: u32,
        /// Remote message.
        message: String,
        /// Formatted PingOne error details, empty when the body had none.
        detail: String,
    },

    /// Network failure after retries were exhausted.
    #[error("Transport error calling {operation} after {attempts} attempts: {message}")]
    Transport {
        /// Operation name.
        operation: String,
        /// Attempts made.
        attempts: u32,
        /// Description of the network error.
        message: String,
    },

    /// Credentials could not be refreshed.
    #[error("Authentication expired: {message}")]
    AuthExpired {
        /// Description of the refresh failure.
        message: String,
    },

    /// Token request was rejected.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Description of the failure.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response calling {operation}: {message}")]
    InvalidResponse {
        /// Operation name.
        operation: String,
        /// Description of the decode failure.
        message: String,
    },
}

/// Planning and validation errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The supplied tree does not match the schema.
    #[error("Type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Attribute path.
        path: String,
        /// Expected kind.
        expected: String,
        /// Found kind.
        found: String,
    },

    /// A path is not valid for the schema.
    #[error("Path not found in schema: {path}")]
    PathNotFound {
        /// Offending path or expression.
        path: String,
    },

    /// One or more validators emitted errors.
    #[error("Validation failed with {count} error(s)")]
    ValidationFailure {
        /// Number of errors.
        count: usize,
        /// The collected diagnostics.
        diagnostics: Diagnostics,
    },

    /// A post-plan or post-apply invariant was violated.
    #[error("Inconsistent result at '{path}': {message}")]
    PlanInconsistency {
        /// Attribute path.
        path: String,
        /// Description of the violation.
        message: String,
    },

    /// A schema failed internal validation at registration.
    #[error("Invalid schema for {resource_type}: {message}")]
    InvalidSchema {
        /// Resource type.
        resource_type: String,
        /// Description of the problem.
        message: String,
    },

    /// No resource type with this name is registered.
    #[error("Unknown resource type: {resource_type}")]
    UnknownResourceType {
        /// Requested type name.
        resource_type: String,
    },

    /// A `$ref` in a configuration document cannot be resolved.
    #[error("Unresolved reference '{reference}' in {address}: {message}")]
    UnresolvedReference {
        /// Instance holding the reference.
        address: String,
        /// The reference text.
        reference: String,
        /// Why it cannot be resolved.
        message: String,
    },
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation was cancelled.
    #[error("{operation} of {address} was cancelled")]
    Cancelled {
        /// Operation name.
        operation: String,
        /// Instance address.
        address: String,
    },

    /// The operation exceeded its wall-clock budget.
    #[error("{operation} of {address} timed out after {timeout:?}")]
    Timeout {
        /// Operation name.
        operation: String,
        /// Instance address.
        address: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The import identifier does not match the declared format.
    #[error("Invalid import ID specified (\"{id}\").  The ID should be in the format \"{format}\" and must match regex: {regex}")]
    InvalidImportId {
        /// Supplied identifier.
        id: String,
        /// Expected format, e.g. `environment_id/population_id`.
        format: String,
        /// Full anchored regex.
        regex: String,
    },

    /// The resource disappeared immediately after being written.
    #[error("{resource_type} {id} was not found immediately after {operation}")]
    Vanished {
        /// Resource type.
        resource_type: String,
        /// Resource identifier.
        id: String,
        /// Operation that preceded the read.
        operation: String,
    },

    /// The handler cannot act because a required value is missing.
    #[error("{resource_type}: {message}")]
    MissingValue {
        /// Resource type.
        resource_type: String,
        /// Description of the missing value.
        message: String,
    },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Maps this error onto the orchestrator-facing error kinds.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(api) => api.kind(),
            Self::Plan(PlanError::TypeMismatch { .. }) => ErrorKind::TypeMismatch,
            Self::Plan(PlanError::ValidationFailure { .. }) => ErrorKind::ValidationFailure,
            Self::Plan(PlanError::PlanInconsistency { .. }) => ErrorKind::PlanInconsistency,
            Self::Lifecycle(LifecycleError::Cancelled { .. }) => ErrorKind::Cancelled,
            Self::Lifecycle(LifecycleError::Timeout { .. }) => ErrorKind::Timeout,
            Self::Lifecycle(LifecycleError::InvalidImportId { .. }) => ErrorKind::InvalidRequest,
            _ => ErrorKind::Other,
        }
    }

    /// Returns true if this error is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Api(api) if api.is_retryable())
    }
}

impl ApiError {
    /// Maps the API error onto an [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidRequest { .. } | Self::PermissionOrScope { .. } => ErrorKind::InvalidRequest,
            Self::Upstream { .. } | Self::InvalidResponse { .. } => ErrorKind::Upstream,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::AuthExpired { .. } | Self::Authentication { .. } => ErrorKind::AuthExpired,
        }
    }

    /// Returns true for the transient classes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Transport { .. })
    }

    /// Returns the HTTP status behind the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Conflict { status, .. }
            | Self::InvalidRequest { status, .. }
            | Self::PermissionOrScope { status, .. }
            | Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the formatted PingOne error details, if any.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Conflict { detail, .. }
            | Self::InvalidRequest { detail, .. }
            | Self::PermissionOrScope { detail, .. }
            | Self::Upstream { detail, .. } => detail,
            _ => "",
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(operation: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

impl ConfigError {
    /// Creates a missing-key error.
    #[must_use]
    pub fn missing(profile: &str, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingKey {
            profile: profile.to_string(),
            key: key.into(),
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl PlanError {
    /// Creates an inconsistency error.
    #[must_use]
    pub fn inconsistent(path: impl ToString, message: impl Into<String>) -> Self {
        Self::PlanInconsistency {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ProviderError::from(ApiError::Conflict {
            operation: String::from("CreatePopulation"),
            status: 409,
            message: String::from("name taken"),
            detail: String::new(),
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());

        let err = ProviderError::from(ApiError::Transport {
            operation: String::from("ReadPopulation"),
            attempts: 5,
            message: String::from("connection reset"),
        });
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_retryable());

        let err = ProviderError::from(LifecycleError::Timeout {
            operation: String::from("create"),
            address: String::from("pingone_population.main"),
            timeout: Duration::from_secs(1800),
        });
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_import_id_message() {
        let err = LifecycleError::InvalidImportId {
            id: String::from("abc"),
            format: String::from("environment_id/population_id"),
            regex: String::from("^x$"),
        };
        assert!(err.to_string().starts_with("Invalid import ID specified (\"abc\")."));
    }
}
