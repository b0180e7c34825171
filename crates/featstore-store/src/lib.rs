//! Temporally versioned feature storage.
//!
//! This crate stores features (identified things with an optional geometry
//! and validity period) in SQLite, keeping every version of every feature.
//!
//! # Features
//!
//! - One row per version, keyed by internal id and valid start time
//! - Entry cache in front of the database, invalidated on every write
//! - Optional batched ingestion, committed in one transaction
//! - Filtered, paged selection by id, uid, time, bounding box and keyword
//! - Variants for GeoJSON features, procedures and systems
//!
//! # Example
//!
//! ```no_run
//! use featstore_store::{FeatureFilter, GeoJsonFeatureStore, TemporalFilter};
//! use featstore_types::{BigId, Feature, Geometry};
//!
//! let store = GeoJsonFeatureStore::open_default()?;
//!
//! let gauge = Feature::new("urn:x:gauge:1", "River gauge")
//!     .with_geometry(Geometry::Point([2.35, 48.85]));
//! let key = store.add(BigId::NONE, gauge)?;
//!
//! let current = FeatureFilter::new()
//!     .valid_time(TemporalFilter::CurrentTime)
//!     .limit(10);
//! for entry in store.select_entries(current) {
//!     let (key, feature) = entry?;
//!     println!("{} {}", key, feature.name);
//! }
//! # let _ = key;
//! # Ok::<(), featstore_store::Error>(())
//! ```

mod batch;
mod cache;
mod config;
mod error;
mod filter;
mod id;
mod iter;
mod kinds;
mod pool;
mod query;
mod range;
mod schema;
mod store;

pub use batch::BatchState;
pub use cache::EntryCache;
pub use config::{
    BatchConfig, CacheConfig, ConfigError, DEFAULT_MAX_BATCH_SIZE, PoolConfig, StoreConfig,
    ValidationError as ConfigValidationError, default_config_path,
};
pub use error::{Error, Result};
pub use filter::{FeatureFilter, TemporalFilter, ValuePredicate};
pub use id::{IdProvider, IdProviderType, SequenceIdProvider, UidHashIdProvider};
pub use iter::EntryIter;
pub use kinds::{FeatureKind, GeoJsonFeatures, ProcedureDescriptions, SystemDescriptions};
pub use pool::{ConnectionPool, PooledConnection};
pub use query::{QueryBuilder, UPSERT_PARAMS};
pub use range::ValidRange;
pub use store::{FeatureStore, GeoJsonFeatureStore, ProcedureStore, SystemDescStore};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/featstore/features.db`
/// - macOS: `~/Library/Application Support/featstore/features.db`
/// - Windows: `C:\Users\<user>\AppData\Local\featstore\features.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("featstore")
        .join("features.db")
}
