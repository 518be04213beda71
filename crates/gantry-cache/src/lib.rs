//! Build cache for Gantry: deterministic key derivation and a shared,
//! key-addressed blob store.

pub mod archive;
pub mod keys;
pub mod store;
pub mod types;

pub use keys::{derive_key, lockfile_digest, matches_prefix, restore_prefix};
pub use store::{CacheStore, FilesystemStore, MemoryStore};
pub use types::{CacheEntry, RestoreOutcome, SaveOutcome};
