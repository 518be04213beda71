//! Payload packing for cache entries.
//!
//! Payloads are plain tar streams; the store treats them as opaque
//! blobs. Packing and unpacking are best-effort: missing paths are
//! skipped, and callers degrade unpack errors to a cache miss.

use gantry_core::{Error, Result};
use std::path::Path;

/// Pack the given workspace-relative paths into a tar blob.
pub fn pack(base_dir: &Path, paths: &[String]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for path in paths {
        let abs = base_dir.join(path);
        if !abs.exists() {
            continue;
        }
        if abs.is_dir() {
            builder
                .append_dir_all(path, &abs)
                .map_err(|e| Error::Cache(format!("failed to pack {}: {}", path, e)))?;
        } else {
            builder
                .append_path_with_name(&abs, path)
                .map_err(|e| Error::Cache(format!("failed to pack {}: {}", path, e)))?;
        }
    }

    builder
        .into_inner()
        .map_err(|e| Error::Cache(format!("failed to finish archive: {}", e)))
}

/// Unpack a payload into the workspace.
pub fn unpack(payload: &[u8], base_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(payload);
    archive
        .unpack(base_dir)
        .map_err(|e| Error::Cache(format!("failed to unpack payload: {}", e)))
}
