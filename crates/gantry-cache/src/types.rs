//! Cache entry and operation outcome types.

use chrono::{DateTime, Utc};

/// A cached artifact set addressed by key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    /// Paths the payload was packed from.
    pub paths: Vec<String>,
    /// Opaque packed blob.
    pub payload: Vec<u8>,
    pub size_bytes: u64,
    pub checksum_sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a restore operation.
///
/// A miss is a normal outcome: `entry` is `None` and the caller carries
/// on without cached content.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub entry: Option<CacheEntry>,
    /// The key that matched; differs from the requested key on a
    /// partial (prefix) restore.
    pub matched_key: Option<String>,
    /// Exact hits make a subsequent save for the same key unnecessary.
    pub exact: bool,
}

impl RestoreOutcome {
    pub fn miss() -> Self {
        Self {
            entry: None,
            matched_key: None,
            exact: false,
        }
    }

    pub fn hit(entry: CacheEntry, exact: bool) -> Self {
        Self {
            matched_key: Some(entry.key.clone()),
            entry: Some(entry),
            exact,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.entry.is_some()
    }
}

/// Result of a save operation.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub key: String,
    /// `false` when the exact key already existed and the save was a
    /// no-op.
    pub stored: bool,
}
