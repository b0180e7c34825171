//! Domain types for the featstore temporal feature store.
//!
//! This crate holds the data model shared by the store and its front ends:
//! scoped ids, versioned keys, valid-time periods, 2D geometries and the
//! feature descriptions that get persisted.
//!
//! # Features
//!
//! - [`BigId`] and [`FeatureKey`] for addressing one version of one feature
//! - [`TimeExtent`] with open-ended valid-time periods
//! - [`Geometry`] with a little-endian WKB codec and [`Bbox`] extents
//! - [`Feature`], [`ProcedureDesc`] and [`SystemDesc`] value types
//! - [`check_feature_object`] to reject malformed features before any I/O
//!
//! # Example
//!
//! ```
//! use featstore_types::{Feature, Geometry, TimeExtent, check_feature_object};
//! use time::macros::datetime;
//!
//! let feature = Feature::new("urn:osh:foi:station1", "Station 1")
//!     .with_geometry(Geometry::Point([1.5, 43.2]))
//!     .with_valid_time(TimeExtent::beginning_at(datetime!(2024-03-01 0:00 UTC)));
//!
//! check_feature_object(&feature).unwrap();
//! ```

pub mod error;
pub mod feature;
pub mod geometry;
pub mod id;
pub mod key;
pub mod procedure;
pub mod temporal;

pub use error::{GeometryError, ValidationError, ValidationResult};
pub use feature::{Feature, StoredFeature, check_feature_object};
pub use geometry::{Bbox, Geometry, Position};
pub use id::BigId;
pub use key::FeatureKey;
pub use procedure::{Link, ProcedureDesc, ProcessType, SystemDesc};
pub use temporal::{
    FAR_FUTURE, MAX_INSTANT, MIN_INSTANT, TIMELESS, TimeExtent, format_instant, parse_instant,
    truncate_to_seconds,
};
