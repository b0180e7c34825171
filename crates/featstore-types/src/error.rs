//! Error types for featstore-types.

use thiserror::Error;

/// Errors raised when a feature object is structurally invalid.
///
/// These are always detected before any I/O takes place.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The feature has no unique identifier.
    #[error("Missing feature unique identifier")]
    MissingUid,

    /// The unique identifier contains whitespace or control characters.
    #[error("Invalid feature unique identifier '{0}'")]
    InvalidUid(String),

    /// The feature has no name.
    #[error("Missing name for feature {0}")]
    MissingName(String),

    /// The valid time period ends before it begins.
    #[error("Invalid valid time for feature {0}: end is before begin")]
    InvalidValidTime(String),

    /// The feature geometry is malformed.
    #[error("Invalid geometry for feature {uid}: {source}")]
    InvalidGeometry {
        uid: String,
        #[source]
        source: GeometryError,
    },
}

/// Errors raised while encoding, decoding or checking geometries.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum GeometryError {
    /// The WKB buffer ended early.
    #[error("Truncated WKB: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Unknown byte order marker.
    #[error("Invalid WKB byte order marker {0}")]
    InvalidByteOrder(u8),

    /// Geometry type code not handled by this codec.
    #[error("Unsupported WKB geometry type {0}")]
    UnsupportedType(u32),

    /// Bytes left over after a complete geometry.
    #[error("{0} trailing bytes after WKB geometry")]
    TrailingBytes(usize),

    /// Not enough positions for the geometry kind.
    #[error("{kind} needs at least {min} positions, found {found}")]
    TooFewPositions {
        kind: &'static str,
        min: usize,
        found: usize,
    },

    /// A coordinate is NaN or infinite.
    #[error("Non-finite coordinate")]
    NonFiniteCoordinate,
}

/// Result type alias for validation checks.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
