//! Disk persistence for interface blobs and index shards.
//!
//! Artifacts are keyed by a content hash of their inputs and stored under a
//! versioned directory, split across this crate's two artifact kinds: a
//! package's interface blob ("astdata" in the layout below) and its
//! symbol-index shard. Directory layout:
//! `<cache-root>/.cache/astdata/<hash-of-package-path>/<hash-of-sources>`
//! `<cache-root>/.cache/index/<hash-of-package-path>/<hash-of-sources>`
//!
//! Keying on a hash of the package's own path (rather than its name)
//! tolerates packages being renamed/moved without colliding with an
//! unrelated package that happens to reuse the old name.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};
use crate::symbol::PackageShard;

pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content hash of a package's full set of source file contents, used
    /// as the second path component for both artifact kinds — a cache hit
    /// requires both the package's identity *and* its sources to match.
    pub fn sources_hash(sources: &[(PathBuf, String)]) -> String {
        let mut ordered = sources.to_vec();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        let mut hasher = Sha256::new();
        for (path, contents) in &ordered {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(contents.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    fn package_hash(pkg_dir: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(pkg_dir.to_string_lossy().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn astdata_path(&self, pkg_dir: &Path, sources_hash: &str) -> PathBuf {
        self.root.join(".cache").join("astdata").join(Self::package_hash(pkg_dir)).join(sources_hash)
    }

    fn index_path(&self, pkg_dir: &Path, sources_hash: &str) -> PathBuf {
        self.root.join(".cache").join("index").join(Self::package_hash(pkg_dir)).join(sources_hash)
    }

    pub fn load_interface_blob(&self, pkg_dir: &Path, sources_hash: &str) -> Option<Vec<u8>> {
        std::fs::read(self.astdata_path(pkg_dir, sources_hash)).ok()
    }

    pub fn store_interface_blob(&self, pkg_dir: &Path, sources_hash: &str, blob: &[u8]) -> Result<()> {
        let path = self.astdata_path(pkg_dir, sources_hash);
        write_atomic(&path, blob)
    }

    pub fn load_shard(&self, pkg_dir: &Path, sources_hash: &str) -> Option<PackageShard> {
        let path = self.index_path(pkg_dir, sources_hash);
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn store_shard(&self, pkg_dir: &Path, sources_hash: &str, shard: &PackageShard) -> Result<()> {
        let path = self.index_path(pkg_dir, sources_hash);
        let bytes = serde_json::to_vec(shard)?;
        write_atomic(&path, &bytes)
    }
}

/// Writes `bytes` to `path` via a tmp-file-then-rename so a reader never
/// observes a partially written artifact. The tmp name carries a random
/// suffix (rather than a fixed `.tmp`) so two threads racing to populate the
/// same cache entry — e.g. two packages recompiled concurrently both missing
/// the same upstream blob — write to distinct files instead of clobbering
/// each other's half-written tmp before the rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    let suffix: u64 = rand::Rng::gen(&mut rand::thread_rng());
    let tmp = path.with_extension(format!("tmp.{suffix:x}"));
    std::fs::write(&tmp, bytes).map_err(|e| CoreError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_interface_blob() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let pkg_dir = dir.path().join("pkg");
        let hash = DiskCache::sources_hash(&[(PathBuf::from("a.cj"), "fn a() {}".into())]);

        assert!(cache.load_interface_blob(&pkg_dir, &hash).is_none());
        cache.store_interface_blob(&pkg_dir, &hash, b"blob-bytes").unwrap();
        assert_eq!(cache.load_interface_blob(&pkg_dir, &hash).unwrap(), b"blob-bytes");
    }

    #[test]
    fn sources_hash_is_order_independent() {
        let a = [(PathBuf::from("a.cj"), "x".to_string()), (PathBuf::from("b.cj"), "y".to_string())];
        let b = [(PathBuf::from("b.cj"), "y".to_string()), (PathBuf::from("a.cj"), "x".to_string())];
        assert_eq!(DiskCache::sources_hash(&a), DiskCache::sources_hash(&b));
    }

    #[test]
    fn sources_hash_changes_with_contents() {
        let a = [(PathBuf::from("a.cj"), "x".to_string())];
        let b = [(PathBuf::from("a.cj"), "y".to_string())];
        assert_ne!(DiskCache::sources_hash(&a), DiskCache::sources_hash(&b));
    }

    #[test]
    fn round_trips_shard() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let pkg_dir = dir.path().join("pkg");
        let hash = "abc";
        let shard = PackageShard::default();
        cache.store_shard(&pkg_dir, hash, &shard).unwrap();
        let loaded = cache.load_shard(&pkg_dir, hash).unwrap();
        assert!(loaded.is_empty());
    }
}
