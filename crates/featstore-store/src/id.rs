//! Internal id assignment.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use featstore_types::StoredFeature;

/// Seed mixed into uid hashes so ids differ from a plain digest of the uid.
const UID_HASH_SEED: u32 = 212_158_449;

/// Number of significant bits in a hashed id.
const UID_HASH_BITS: u32 = 42;

/// Strategy used to assign internal ids to new features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdProviderType {
    /// Ids increase from the largest id already stored.
    #[default]
    Sequence,
    /// Ids derive from a hash of the unique identifier.
    UidHash,
}

/// Assigns an internal id to a feature being inserted.
///
/// Ids are never 0, which is reserved for "no id".
pub trait IdProvider<V>: Send + Sync {
    fn new_internal_id(&self, value: &V) -> u64;
}

/// Sequential ids.
#[derive(Debug)]
pub struct SequenceIdProvider {
    last: AtomicU64,
}

impl SequenceIdProvider {
    /// Start after `last_id`, usually the largest id already persisted.
    pub fn new(last_id: u64) -> Self {
        Self {
            last: AtomicU64::new(last_id),
        }
    }
}

impl<V> IdProvider<V> for SequenceIdProvider {
    fn new_internal_id(&self, _value: &V) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Stable ids derived from the feature's unique identifier.
///
/// The same uid always maps to the same id, across processes and databases.
#[derive(Debug, Default, Clone, Copy)]
pub struct UidHashIdProvider;

impl UidHashIdProvider {
    pub fn hash_uid(uid: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(UID_HASH_SEED.to_be_bytes());
        hasher.update(uid.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let id = u64::from_be_bytes(prefix) >> (64 - UID_HASH_BITS);
        id.max(1)
    }
}

impl<V: StoredFeature> IdProvider<V> for UidHashIdProvider {
    fn new_internal_id(&self, value: &V) -> u64 {
        Self::hash_uid(value.unique_identifier())
    }
}
