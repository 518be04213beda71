//! Cache store trait and backends.
//!
//! The store is shared by every job instance of a run (and across
//! runs). Restores are safe to run concurrently; saves to the same key
//! are last-write-wins, and a save for an already-present exact key is
//! an explicit no-op so at most one write per key happens per run.

use crate::keys::matches_prefix;
use crate::types::{CacheEntry, RestoreOutcome, SaveOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::warn;

/// Key-addressed blob storage for build caches.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up `key`, falling back to the most recent entry whose key
    /// starts with `fallback_prefix` (a partial restore). A miss is a
    /// normal outcome, never an error the caller should fail a job on.
    async fn restore(&self, key: &str, fallback_prefix: &str) -> Result<RestoreOutcome>;

    /// Persist `payload` under `key`. No-op when the exact key already
    /// exists.
    async fn save(&self, key: &str, paths: &[String], payload: Vec<u8>) -> Result<SaveOutcome>;

    /// Check if an entry exists for the exact key.
    async fn exists(&self, key: &str) -> Result<bool>;
}

fn checksum(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// In-memory store backing tests and single-process engine wiring.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn restore(&self, key: &str, fallback_prefix: &str) -> Result<RestoreOutcome> {
        let entries = self.entries.read().await;

        if let Some(entry) = entries.get(key) {
            return Ok(RestoreOutcome::hit(entry.clone(), true));
        }

        let partial = entries
            .values()
            .filter(|e| matches_prefix(&e.key, fallback_prefix))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));

        Ok(match partial {
            Some(entry) => RestoreOutcome::hit(entry.clone(), false),
            None => RestoreOutcome::miss(),
        })
    }

    async fn save(&self, key: &str, paths: &[String], payload: Vec<u8>) -> Result<SaveOutcome> {
        let mut entries = self.entries.write().await;

        if entries.contains_key(key) {
            return Ok(SaveOutcome {
                key: key.to_string(),
                stored: false,
            });
        }

        let entry = CacheEntry {
            key: key.to_string(),
            paths: paths.to_vec(),
            size_bytes: payload.len() as u64,
            checksum_sha256: checksum(&payload),
            payload,
            created_at: Utc::now(),
        };
        entries.insert(key.to_string(), entry);

        Ok(SaveOutcome {
            key: key.to_string(),
            stored: true,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    paths: Vec<String>,
    size_bytes: u64,
    checksum_sha256: String,
    created_at: DateTime<Utc>,
}

/// Filesystem-backed store.
///
/// Each entry is a payload file plus a JSON metadata sidecar; an entry
/// is visible only once its sidecar exists. Both files are written to a
/// temporary name and renamed into place, so a save interrupted by
/// cancellation never surfaces as a valid entry.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn sanitize(key: &str) -> String {
        key.replace(['/', '\\', ':'], "_")
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.meta.json", Self::sanitize(key)))
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.payload", Self::sanitize(key)))
    }

    async fn read_entry(&self, meta_path: &PathBuf) -> Option<CacheEntry> {
        let raw = tokio::fs::read(meta_path).await.ok()?;
        let meta: EntryMeta = match serde_json::from_slice(&raw) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "unreadable cache metadata");
                return None;
            }
        };

        let payload = tokio::fs::read(self.payload_path(&meta.key)).await.ok()?;
        if checksum(&payload) != meta.checksum_sha256 {
            warn!(key = %meta.key, "cache payload checksum mismatch, treating as miss");
            return None;
        }

        Some(CacheEntry {
            key: meta.key,
            paths: meta.paths,
            size_bytes: meta.size_bytes,
            checksum_sha256: meta.checksum_sha256,
            payload,
            created_at: meta.created_at,
        })
    }

    async fn prefix_candidates(&self, prefix: &str) -> Result<Vec<PathBuf>> {
        let mut candidates = Vec::new();
        if !self.root.exists() {
            return Ok(candidates);
        }

        let sanitized_prefix = Self::sanitize(prefix);
        let mut read_dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::Cache(format!("failed to read cache dir: {}", e)))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::Cache(format!("failed to read cache dir entry: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&sanitized_prefix) && name.ends_with(".meta.json") {
                candidates.push(entry.path());
            }
        }

        Ok(candidates)
    }
}

#[async_trait]
impl CacheStore for FilesystemStore {
    async fn restore(&self, key: &str, fallback_prefix: &str) -> Result<RestoreOutcome> {
        if let Some(entry) = self.read_entry(&self.meta_path(key)).await {
            return Ok(RestoreOutcome::hit(entry, true));
        }

        let mut best: Option<CacheEntry> = None;
        for candidate in self.prefix_candidates(fallback_prefix).await? {
            if let Some(entry) = self.read_entry(&candidate).await {
                let newer = best
                    .as_ref()
                    .is_none_or(|b| entry.created_at > b.created_at);
                if newer {
                    best = Some(entry);
                }
            }
        }

        Ok(match best {
            Some(entry) => RestoreOutcome::hit(entry, false),
            None => RestoreOutcome::miss(),
        })
    }

    async fn save(&self, key: &str, paths: &[String], payload: Vec<u8>) -> Result<SaveOutcome> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Cache(format!("failed to create cache dir: {}", e)))?;

        let meta_path = self.meta_path(key);
        if tokio::fs::try_exists(&meta_path).await.unwrap_or(false) {
            return Ok(SaveOutcome {
                key: key.to_string(),
                stored: false,
            });
        }

        let meta = EntryMeta {
            key: key.to_string(),
            paths: paths.to_vec(),
            size_bytes: payload.len() as u64,
            checksum_sha256: checksum(&payload),
            created_at: Utc::now(),
        };

        // Payload first, sidecar last: the entry only becomes visible
        // once both renames have landed.
        let payload_path = self.payload_path(key);
        let payload_tmp = payload_path.with_extension("payload.partial");
        tokio::fs::write(&payload_tmp, &payload)
            .await
            .map_err(|e| Error::Cache(format!("failed to write payload: {}", e)))?;
        tokio::fs::rename(&payload_tmp, &payload_path)
            .await
            .map_err(|e| Error::Cache(format!("failed to place payload: {}", e)))?;

        let meta_tmp = meta_path.with_extension("json.partial");
        let raw = serde_json::to_vec_pretty(&meta)
            .map_err(|e| Error::Cache(format!("failed to encode metadata: {}", e)))?;
        tokio::fs::write(&meta_tmp, raw)
            .await
            .map_err(|e| Error::Cache(format!("failed to write metadata: {}", e)))?;
        tokio::fs::rename(&meta_tmp, &meta_path)
            .await
            .map_err(|e| Error::Cache(format!("failed to place metadata: {}", e)))?;

        Ok(SaveOutcome {
            key: key.to_string(),
            stored: true,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.meta_path(key))
            .await
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_exact_hit() {
        let store = MemoryStore::new();
        store
            .save("linux-cargo-aaaa", &["target".to_string()], b"blob".to_vec())
            .await
            .unwrap();

        let outcome = store
            .restore("linux-cargo-aaaa", "linux-cargo-")
            .await
            .unwrap();
        assert!(outcome.exact);
        assert_eq!(outcome.matched_key.as_deref(), Some("linux-cargo-aaaa"));
    }

    #[tokio::test]
    async fn test_memory_prefix_fallback() {
        let store = MemoryStore::new();
        store
            .save("linux-cargo-aaaa", &[], b"old".to_vec())
            .await
            .unwrap();

        let outcome = store
            .restore("linux-cargo-bbbb", "linux-cargo-")
            .await
            .unwrap();
        assert!(outcome.is_hit());
        assert!(!outcome.exact);
        assert_eq!(outcome.matched_key.as_deref(), Some("linux-cargo-aaaa"));
    }

    #[tokio::test]
    async fn test_memory_miss_is_not_an_error() {
        let store = MemoryStore::new();
        let outcome = store
            .restore("linux-cargo-aaaa", "linux-cargo-")
            .await
            .unwrap();
        assert!(!outcome.is_hit());
        assert!(outcome.matched_key.is_none());
    }

    #[tokio::test]
    async fn test_memory_save_is_idempotent() {
        let store = MemoryStore::new();
        let first = store
            .save("linux-cargo-aaaa", &[], b"first".to_vec())
            .await
            .unwrap();
        assert!(first.stored);

        let second = store
            .save("linux-cargo-aaaa", &[], b"second".to_vec())
            .await
            .unwrap();
        assert!(!second.stored);

        let outcome = store
            .restore("linux-cargo-aaaa", "linux-cargo-")
            .await
            .unwrap();
        assert_eq!(outcome.entry.unwrap().payload, b"first");
    }

    #[tokio::test]
    async fn test_memory_prefix_does_not_cross_purposes() {
        let store = MemoryStore::new();
        store
            .save("linux-npm-aaaa", &[], b"npm".to_vec())
            .await
            .unwrap();

        let outcome = store
            .restore("linux-cargo-bbbb", "linux-cargo-")
            .await
            .unwrap();
        assert!(!outcome.is_hit());
    }

    #[tokio::test]
    async fn test_filesystem_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        store
            .save("linux-cargo-aaaa", &["target".to_string()], b"blob".to_vec())
            .await
            .unwrap();
        assert!(store.exists("linux-cargo-aaaa").await.unwrap());

        let outcome = store
            .restore("linux-cargo-aaaa", "linux-cargo-")
            .await
            .unwrap();
        assert!(outcome.exact);
        let entry = outcome.entry.unwrap();
        assert_eq!(entry.payload, b"blob");
        assert_eq!(entry.paths, vec!["target".to_string()]);
    }

    #[tokio::test]
    async fn test_filesystem_prefix_fallback_and_noop_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        store.save("linux-cargo-aaaa", &[], b"v1".to_vec()).await.unwrap();
        let again = store.save("linux-cargo-aaaa", &[], b"v2".to_vec()).await.unwrap();
        assert!(!again.stored);

        let outcome = store
            .restore("linux-cargo-cccc", "linux-cargo-")
            .await
            .unwrap();
        assert!(outcome.is_hit());
        assert!(!outcome.exact);
        assert_eq!(outcome.entry.unwrap().payload, b"v1");
    }

    #[tokio::test]
    async fn test_filesystem_corrupt_payload_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf());

        store.save("linux-cargo-aaaa", &[], b"blob".to_vec()).await.unwrap();
        tokio::fs::write(dir.path().join("linux-cargo-aaaa.payload"), b"tampered")
            .await
            .unwrap();

        let outcome = store
            .restore("linux-cargo-aaaa", "linux-cargo-")
            .await
            .unwrap();
        assert!(!outcome.is_hit());
    }
}
