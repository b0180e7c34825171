//! Error types for featstore-store.

use std::path::PathBuf;
use std::time::Duration;

use featstore_types::{BigId, FeatureKey, GeometryError, ValidationError};

use crate::config::ConfigError;

/// Result type for featstore-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in featstore-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The feature object is malformed. Raised before any I/O.
    #[error("Invalid feature: {0}")]
    Validation(#[from] ValidationError),

    /// A version with the same unique identifier and valid start is already stored.
    #[error("Feature version already exists: {uid} starting at {valid_start}")]
    DuplicateVersion { uid: String, valid_start: String },

    /// The feature is already stored under another parent.
    #[error("Feature {0} is already associated to another parent")]
    ParentMismatch(String),

    /// The parent feature is not stored.
    #[error("Parent feature {0} does not exist")]
    UnknownParent(BigId),

    /// The identifier provider returned an id owned by another feature.
    #[error("Internal id {id} generated for {uid} is already in use")]
    IdCollision { id: u64, uid: String },

    /// A write path failed.
    #[error("Error while trying to {operation} feature {feature}: {source}")]
    Persistence {
        operation: &'static str,
        feature: String,
        #[source]
        source: Box<Error>,
    },

    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Removal of a key that is not stored.
    #[error("Feature not found: {0}")]
    FeatureNotFound(FeatureKey),

    /// The store holds no geometry to compute an extent from.
    #[error("Cannot compute features extent: no geometry in store")]
    NoExtent,

    /// A persisted valid-time range could not be parsed.
    #[error("Invalid valid-time range: {0}")]
    InvalidTimeRange(String),

    /// Geometry codec failure.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// A store variant cannot persist this kind of geometry.
    #[error("Unsupported system geometry: {0}")]
    UnsupportedGeometry(&'static str),

    /// No pooled connection became available in time.
    #[error("Timed out after {0:?} waiting for a database connection")]
    PoolTimeout(Duration),

    /// The store was closed.
    #[error("Feature store is closed")]
    StoreClosed,

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid store configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a failure with the operation and feature it happened on.
    pub(crate) fn persistence(
        operation: &'static str,
        feature: impl Into<String>,
        source: impl Into<Error>,
    ) -> Self {
        Error::Persistence {
            operation,
            feature: feature.into(),
            source: Box::new(source.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_message_names_feature() {
        let err = Error::persistence("update", "urn:x:1", Error::StoreClosed);
        assert_eq!(
            err.to_string(),
            "Error while trying to update feature urn:x:1: Feature store is closed"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
