//! Scoped internal identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Internal identifier scoped to a database instance.
///
/// The scope distinguishes ids issued by different databases sharing one
/// runtime; the numeric part is what gets persisted in the `id` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BigId {
    scope: u32,
    id: u64,
}

impl BigId {
    /// Placeholder meaning "no id", e.g. a feature without parent.
    pub const NONE: BigId = BigId { scope: 0, id: 0 };

    /// Create an id in the given scope.
    pub const fn new(scope: u32, id: u64) -> Self {
        Self { scope, id }
    }

    /// The id scope.
    pub const fn scope(&self) -> u32 {
        self.scope
    }

    /// The numeric id within its scope.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether this is the [`BigId::NONE`] placeholder (numeric id 0).
    pub const fn is_none(&self) -> bool {
        self.id == 0
    }

    /// Numeric id as stored in a signed 64-bit SQL column.
    pub const fn as_i64(&self) -> i64 {
        self.id as i64
    }
}

impl fmt::Display for BigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.id)
    }
}
