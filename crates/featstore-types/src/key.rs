//! Versioned feature keys.

use core::fmt;
use std::hash::{Hash, Hasher};

use time::OffsetDateTime;

use crate::id::BigId;
use crate::temporal::{MIN_INSTANT, TIMELESS, truncate_to_seconds};

/// Identifies exactly one version of one feature.
///
/// Equality and hashing only consider the internal id and the valid start
/// time; the parent id is companion data carried along with the key.
#[derive(Debug, Clone, Copy)]
pub struct FeatureKey {
    internal_id: BigId,
    valid_start_time: OffsetDateTime,
    parent_id: BigId,
}

impl FeatureKey {
    /// Create a key without parent.
    ///
    /// The start time is truncated to seconds. Starts at or before
    /// [`MIN_INSTANT`] become the [`TIMELESS`] sentinel.
    pub fn new(internal_id: BigId, valid_start_time: OffsetDateTime) -> Self {
        let valid_start_time = if valid_start_time <= MIN_INSTANT {
            TIMELESS
        } else {
            truncate_to_seconds(valid_start_time)
        };
        Self {
            internal_id,
            valid_start_time,
            parent_id: BigId::NONE,
        }
    }

    /// Key of a feature that has no temporal versioning.
    pub fn timeless(internal_id: BigId) -> Self {
        Self::new(internal_id, TIMELESS)
    }

    /// Attach a parent id.
    pub fn with_parent(mut self, parent_id: BigId) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn internal_id(&self) -> BigId {
        self.internal_id
    }

    pub fn valid_start_time(&self) -> OffsetDateTime {
        self.valid_start_time
    }

    /// Parent id, [`BigId::NONE`] when there is none.
    pub fn parent_id(&self) -> BigId {
        self.parent_id
    }

    /// Whether this key addresses the single always-valid version.
    pub fn is_timeless(&self) -> bool {
        self.valid_start_time == TIMELESS
    }
}

impl PartialEq for FeatureKey {
    fn eq(&self, other: &Self) -> bool {
        self.internal_id == other.internal_id && self.valid_start_time == other.valid_start_time
    }
}

impl Eq for FeatureKey {}

impl Hash for FeatureKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.internal_id.hash(state);
        self.valid_start_time.hash(state);
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_timeless() {
            write!(f, "FeatureKey(id={}, validStart=-infinity)", self.internal_id)
        } else {
            write!(
                f,
                "FeatureKey(id={}, validStart={})",
                self.internal_id,
                self.valid_start_time.unix_timestamp()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use time::macros::datetime;

    #[test]
    fn test_start_truncated_to_seconds() {
        let key = FeatureKey::new(BigId::new(1, 5), datetime!(2024-01-01 10:00:00.750 UTC));
        assert_eq!(key.valid_start_time(), datetime!(2024-01-01 10:00:00 UTC));
    }

    #[test]
    fn test_min_instant_collapses_to_timeless() {
        let key = FeatureKey::new(BigId::new(1, 5), MIN_INSTANT);
        assert!(key.is_timeless());
        assert_eq!(key, FeatureKey::timeless(BigId::new(1, 5)));
    }

    #[test]
    fn test_parent_excluded_from_equality() {
        let a = FeatureKey::timeless(BigId::new(1, 5));
        let b = a.with_parent(BigId::new(1, 99));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_eq!(b.parent_id(), BigId::new(1, 99));
    }

    #[test]
    fn test_versions_differ() {
        let id = BigId::new(1, 5);
        let v1 = FeatureKey::new(id, datetime!(2024-01-01 0:00 UTC));
        let v2 = FeatureKey::new(id, datetime!(2024-02-01 0:00 UTC));
        assert_ne!(v1, v2);
    }
}
