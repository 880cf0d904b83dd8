//! Error types for the busyness tracker.

use std::fmt;

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the busyness tracker.
///
/// Most of these never reach a caller of the read path. Lookup failures are
/// degraded per entity, unreadable snapshots are treated as absent, and only a
/// failure to persist the merged snapshot aborts a forced refresh.
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when encoding a snapshot for storage.
    SerializationError(String),

    /// Deserialization failed when decoding a stored snapshot or a provider
    /// response.
    ///
    /// **Recovery:** The snapshot is treated as absent and rewritten by the
    /// next forced refresh.
    DeserializationError(String),

    /// Validation failed for an input value (empty query, bad hour, ...).
    ValidationError(String),

    /// A working-hours interval string could not be parsed.
    ///
    /// Never surfaced by the schedule evaluator itself, which degrades to the
    /// default open window instead.
    ScheduleError(String),

    /// The lookup provider was unavailable for one entity.
    ///
    /// Common causes:
    /// - Network timeout or connection failure
    /// - Authentication failure (bad API key)
    /// - Malformed provider response
    ///
    /// **Recovery:** The entity falls back to its prior or default record.
    LookupError(String),

    /// The snapshot store could not be read or written.
    ///
    /// A failed write is the one fatal condition of a forced refresh, since
    /// the next cycle would otherwise repeat every lookup.
    StoreError(String),

    /// Configuration error while building the tracker.
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),

    /// A forced refresh is already running.
    ///
    /// Only returned by the non-blocking administrative trigger.
    RefreshInProgress,

    /// Feature not implemented or not enabled.
    ///
    /// Common causes:
    /// - Cargo feature not enabled (e.g., "redis" for RedisStore)
    NotImplemented(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::ScheduleError(msg) => write!(f, "Schedule error: {}", msg),
            Error::LookupError(msg) => write!(f, "Lookup error: {}", msg),
            Error::StoreError(msg) => write!(f, "Store error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::RefreshInProgress => write!(f, "Refresh already in progress"),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::StoreError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StoreError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::StoreError(format!("Redis error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::LookupError("timeout".to_string());
        assert_eq!(err.to_string(), "Lookup error: timeout");
        assert_eq!(
            Error::RefreshInProgress.to_string(),
            "Refresh already in progress"
        );
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_from_json_syntax() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::DeserializationError(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: Error = io.into();
        assert!(matches!(err, Error::StoreError(_)));
    }
}
