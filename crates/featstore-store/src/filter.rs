//! Feature filters.
//!
//! [`FeatureFilter`] is a fluent builder describing which feature versions
//! to select. The store's query builder turns everything except the value
//! predicate into SQL; the predicate runs on deserialized values.
//!
//! # Example
//!
//! ```
//! use featstore_store::{FeatureFilter, TemporalFilter};
//! use featstore_types::{Bbox, Feature};
//!
//! let filter: FeatureFilter<Feature> = FeatureFilter::new()
//!     .uid("urn:osh:foi:*")
//!     .bbox(Bbox::new(0.0, 40.0, 5.0, 50.0))
//!     .valid_time(TemporalFilter::CurrentTime)
//!     .limit(100);
//! ```

use std::fmt;
use std::sync::Arc;

use featstore_types::{BigId, Bbox, TimeExtent};

/// Predicate applied to deserialized values.
pub type ValuePredicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Temporal condition on a version's valid-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalFilter {
    /// Versions whose validity overlaps the period.
    Intersects(TimeExtent),
    /// Versions valid during the whole period.
    Contains(TimeExtent),
    /// Versions whose validity is exactly the period.
    Equals(TimeExtent),
    /// Versions valid now.
    CurrentTime,
    /// Latest version of each feature.
    LatestVersion,
}

/// Selection criteria for feature versions.
///
/// All criteria are combined with AND; each list criterion matches any of
/// its values. An empty filter selects every stored version.
pub struct FeatureFilter<V> {
    /// Internal ids (numeric part).
    pub internal_ids: Vec<u64>,
    /// Parent ids (numeric part).
    pub parent_ids: Vec<u64>,
    /// Unique identifiers; a trailing `*` matches by prefix.
    pub uids: Vec<String>,
    /// Valid-time condition.
    pub valid_time: Option<TemporalFilter>,
    /// Spatial intersection with a box.
    pub bbox: Option<Bbox>,
    /// Case-insensitive substrings searched in uid, name and description.
    pub keywords: Vec<String>,
    /// Maximum number of entries delivered.
    pub limit: Option<usize>,
    /// Extra condition checked on each deserialized value.
    pub value_predicate: Option<ValuePredicate<V>>,
}

impl<V> FeatureFilter<V> {
    /// An empty filter.
    pub fn new() -> Self {
        Self {
            internal_ids: Vec::new(),
            parent_ids: Vec::new(),
            uids: Vec::new(),
            valid_time: None,
            bbox: None,
            keywords: Vec::new(),
            limit: None,
            value_predicate: None,
        }
    }

    pub fn internal_id(mut self, id: BigId) -> Self {
        self.internal_ids.push(id.id());
        self
    }

    pub fn internal_ids(mut self, ids: impl IntoIterator<Item = BigId>) -> Self {
        self.internal_ids.extend(ids.into_iter().map(|id| id.id()));
        self
    }

    /// Only children of `parent`. Use [`BigId::NONE`] for top-level features.
    pub fn parent(mut self, parent: BigId) -> Self {
        self.parent_ids.push(parent.id());
        self
    }

    /// Match a unique identifier, or a prefix when it ends with `*`.
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uids.push(uid.into());
        self
    }

    pub fn valid_time(mut self, temporal: TemporalFilter) -> Self {
        self.valid_time = Some(temporal);
        self
    }

    pub fn bbox(mut self, bbox: Bbox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keep only values for which `predicate` returns true.
    pub fn matching(mut self, predicate: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        self.value_predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `value` passes the value predicate.
    pub fn test_value(&self, value: &V) -> bool {
        self.value_predicate.as_ref().is_none_or(|p| p(value))
    }

    /// Whether every criterion can be evaluated in SQL.
    pub fn is_sql_only(&self) -> bool {
        self.value_predicate.is_none()
    }
}

impl<V> Default for FeatureFilter<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for FeatureFilter<V> {
    fn clone(&self) -> Self {
        Self {
            internal_ids: self.internal_ids.clone(),
            parent_ids: self.parent_ids.clone(),
            uids: self.uids.clone(),
            valid_time: self.valid_time,
            bbox: self.bbox,
            keywords: self.keywords.clone(),
            limit: self.limit,
            value_predicate: self.value_predicate.clone(),
        }
    }
}

impl<V> fmt::Debug for FeatureFilter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureFilter")
            .field("internal_ids", &self.internal_ids)
            .field("parent_ids", &self.parent_ids)
            .field("uids", &self.uids)
            .field("valid_time", &self.valid_time)
            .field("bbox", &self.bbox)
            .field("keywords", &self.keywords)
            .field("limit", &self.limit)
            .field("value_predicate", &self.value_predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featstore_types::{Feature, StoredFeature};

    #[test]
    fn test_builder() {
        let filter: FeatureFilter<Feature> = FeatureFilter::new()
            .internal_id(BigId::new(1, 4))
            .parent(BigId::NONE)
            .uid("urn:x:*")
            .keyword("river")
            .limit(3);
        assert_eq!(filter.internal_ids, [4]);
        assert_eq!(filter.parent_ids, [0]);
        assert_eq!(filter.uids, ["urn:x:*"]);
        assert_eq!(filter.keywords, ["river"]);
        assert_eq!(filter.limit, Some(3));
        assert!(filter.is_sql_only());
    }

    #[test]
    fn test_value_predicate() {
        let filter: FeatureFilter<Feature> =
            FeatureFilter::new().matching(|f: &Feature| f.name().starts_with("Station"));
        assert!(!filter.is_sql_only());
        assert!(filter.test_value(&Feature::new("urn:x:1", "Station 1")));
        assert!(!filter.test_value(&Feature::new("urn:x:2", "Buoy 2")));

        let cloned = filter.clone();
        assert!(cloned.test_value(&Feature::new("urn:x:1", "Station 1")));
        assert!(FeatureFilter::<Feature>::new().test_value(&Feature::new("urn:x:2", "Buoy")));
    }
}
