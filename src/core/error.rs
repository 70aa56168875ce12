//! Typed error handling for the query engine
//!
//! Public async APIs return `anyhow::Result`, but every error raised by the
//! engine itself is an [`EngineError`] so callers can recover the category
//! with `downcast_ref`:
//!
//! ```rust,ignore
//! match service.get_rows(&query, &FetchOptions::default(), &ctx).await {
//!     Err(e) => match e.downcast_ref::<EngineError>() {
//!         Some(EngineError::Config(ConfigError::QueryNotFound { entity })) => { /* .. */ }
//!         _ => return Err(e),
//!     },
//!     Ok(rows) => { /* .. */ }
//! }
//! ```
//!
//! # Error Categories
//!
//! - [`ConfigError`]: schema or registry mistakes, meant to surface during development
//! - [`TransportError`]: backend failures, surfaced to the caller and never retried
//! - [`HookError`]: row hook failures, propagated through the same pipeline as results
//! - [`PipeError`]: in-memory filter/group/order failures

use std::fmt;
use thiserror::Error;

/// The main error type for the engine
#[derive(Debug)]
pub enum EngineError {
    /// Configuration errors (fatal)
    Config(ConfigError),

    /// Transport errors
    Transport(TransportError),

    /// Row hook errors
    Hook(HookError),

    /// Presentation pipe errors
    Pipe(PipeError),

    /// Internal engine errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "{}", e),
            EngineError::Transport(e) => write!(f, "{}", e),
            EngineError::Hook(e) => write!(f, "{}", e),
            EngineError::Pipe(e) => write!(f, "{}", e),
            EngineError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Config(e) => Some(e),
            EngineError::Transport(e) => Some(e),
            EngineError::Hook(e) => Some(e),
            EngineError::Pipe(e) => Some(e),
            EngineError::Internal(_) => None,
        }
    }
}

impl EngineError {
    /// Get a stable error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Config(e) => e.error_code(),
            EngineError::Transport(e) => e.error_code(),
            EngineError::Hook(e) => e.error_code(),
            EngineError::Pipe(e) => e.error_code(),
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Configuration errors are programming mistakes and are never recovered
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Config(_) | EngineError::Internal(_))
    }

    /// Find the engine error inside an `anyhow::Error`, if there is one
    pub fn find(err: &anyhow::Error) -> Option<&EngineError> {
        err.downcast_ref::<EngineError>()
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors caused by schemas, registrations or rows that do not fit them
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No query registered for entity '{entity}'")]
    QueryNotFound { entity: String },

    #[error(
        "Cannot propagate from '{parent}': child rows of '{child}' lack the foreign key column '{foreign_key}'"
    )]
    MissingForeignKey {
        parent: String,
        child: String,
        foreign_key: String,
    },

    #[error(
        "Cannot propagate to '{child}': embedded parent '{embedded}' lacks primary key '{primary_key}'"
    )]
    MissingEmbeddedKey {
        child: String,
        embedded: String,
        primary_key: String,
    },

    #[error("Row of '{entity}' has no primary key '{primary_key}'")]
    MissingPrimaryKey { entity: String, primary_key: String },

    #[error("Route parameter '{param}' not found in the hook context")]
    MissingRouteParam { param: String },

    #[error("Invalid fields declaration for entity '{entity}': {message}")]
    InvalidFields { entity: String, message: String },

    #[error("No 'pipe' fields declared for the backend filter of '{entity}'")]
    MissingFilterPipe { entity: String },

    #[error("Invalid schema '{entity}': {message}")]
    InvalidSchema { entity: String, message: String },
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::QueryNotFound { .. } => "QUERY_NOT_FOUND",
            ConfigError::MissingForeignKey { .. } => "MISSING_FOREIGN_KEY",
            ConfigError::MissingEmbeddedKey { .. } => "MISSING_EMBEDDED_KEY",
            ConfigError::MissingPrimaryKey { .. } => "MISSING_PRIMARY_KEY",
            ConfigError::MissingRouteParam { .. } => "MISSING_ROUTE_PARAM",
            ConfigError::InvalidFields { .. } => "INVALID_FIELDS",
            ConfigError::MissingFilterPipe { .. } => "MISSING_FILTER_PIPE",
            ConfigError::InvalidSchema { .. } => "INVALID_SCHEMA",
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors reported by a [`Transport`](crate::core::service::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{method} {url} failed: {message}")]
    Request {
        method: String,
        url: String,
        message: String,
    },

    #[error("{method} {url} returned status {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl TransportError {
    pub fn error_code(&self) -> &'static str {
        match self {
            TransportError::Request { .. } => "TRANSPORT_REQUEST_FAILED",
            TransportError::Status { .. } => "TRANSPORT_BAD_STATUS",
            TransportError::Decode { .. } => "TRANSPORT_DECODE_FAILED",
        }
    }
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        EngineError::Transport(err)
    }
}

// =============================================================================
// Hook Errors
// =============================================================================

/// Errors raised while resolving a row hook
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Row hook '{stage}' failed: {message}")]
    Failed { stage: String, message: String },

    #[error("Row hook '{stage}' returned an unexpected value, expected {expected}")]
    UnexpectedShape { stage: String, expected: String },
}

impl HookError {
    pub fn error_code(&self) -> &'static str {
        match self {
            HookError::Failed { .. } => "HOOK_FAILED",
            HookError::UnexpectedShape { .. } => "HOOK_UNEXPECTED_SHAPE",
        }
    }
}

impl From<HookError> for EngineError {
    fn from(err: HookError) -> Self {
        EngineError::Hook(err)
    }
}

// =============================================================================
// Pipe Errors
// =============================================================================

/// Errors raised by the in-memory filter, group and order engines
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("Property '{property}' not found in the filtered row")]
    MissingProperty { property: String },

    #[error("Invalid order specification: {message}")]
    InvalidOrder { message: String },
}

impl PipeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PipeError::MissingProperty { .. } => "PIPE_MISSING_PROPERTY",
            PipeError::InvalidOrder { .. } => "PIPE_INVALID_ORDER",
        }
    }
}

impl From<PipeError> for EngineError {
    fn from(err: PipeError) -> Self {
        EngineError::Pipe(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_names_entity() {
        let err = EngineError::from(ConfigError::QueryNotFound {
            entity: "tarifas".to_string(),
        });
        assert_eq!(err.to_string(), "No query registered for entity 'tarifas'");
        assert_eq!(err.error_code(), "QUERY_NOT_FOUND");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_transport_error_is_not_fatal() {
        let err = EngineError::from(TransportError::Status {
            method: "GET".to_string(),
            url: "users".to_string(),
            status: 500,
        });
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "GET users returned status 500");
    }

    #[test]
    fn test_find_through_anyhow() {
        let err: anyhow::Error = EngineError::from(PipeError::MissingProperty {
            property: "nombre".to_string(),
        })
        .into();
        let found = EngineError::find(&err).expect("engine error");
        assert_eq!(found.error_code(), "PIPE_MISSING_PROPERTY");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error as _;
        let err = EngineError::from(HookError::Failed {
            stage: "map".to_string(),
            message: "boom".to_string(),
        });
        assert!(err.source().is_some());
        assert!(EngineError::Internal("x".to_string()).source().is_none());
    }
}
