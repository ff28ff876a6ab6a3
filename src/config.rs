//! Engine- and cache-level configuration, resolved from manifest overrides,
//! environment variables, and OS defaults. Split into two small,
//! independently constructible config structs rather than one builder, since
//! the engine and the disk cache are independently testable units.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resolves a workspace's cache root.
///
/// Resolution order: manifest `cache_dir` override, then
/// `CANGJIE_HOME`'s cache subdirectory, then an OS-standard cache directory
/// via [`dirs::cache_dir`]. Falls back to `<workspace-root>/.cjls-cache` if
/// none of those are available (headless CI environments without `HOME`
/// set, for instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub root: PathBuf,
}

impl CacheConfig {
    pub fn resolve(workspace_root: &std::path::Path, manifest_override: Option<&str>) -> Self {
        if let Some(dir) = manifest_override {
            return Self { root: workspace_root.join(dir) };
        }
        if let Ok(home) = std::env::var("CANGJIE_HOME") {
            return Self { root: PathBuf::from(home).join("cache") };
        }
        if let Some(dir) = dirs::cache_dir() {
            return Self { root: dir.join("cjls") };
        }
        Self { root: workspace_root.join(".cjls-cache") }
    }
}

/// Tunables for [`crate::engine::WorkspaceEngine`], independent of any one
/// workspace's manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Overrides the Task Pool's worker count; `None` uses
    /// [`crate::task_pool::default_worker_count`].
    pub worker_count_override: Option<usize>,
    /// Restricted-IDE mode: disables cross-package find-references
    /// freshness promotion and caps LRU capacity lower, trading
    /// completeness for a smaller working set on constrained editors.
    pub restricted_ide_mode: bool,
    /// Overrides the LRU's capacity; `None` uses a small fixed default (spec
    /// §4.9: "order of 10 packages"), independent of workspace size.
    pub lru_capacity_override: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { worker_count_override: None, restricted_ide_mode: false, lru_capacity_override: None }
    }
}

impl EngineConfig {
    pub fn worker_count(&self) -> usize {
        self.worker_count_override.unwrap_or_else(crate::task_pool::default_worker_count)
    }

    pub fn lru_capacity(&self, _package_count: usize) -> usize {
        if let Some(cap) = self.lru_capacity_override {
            return cap.max(1);
        }
        if self.restricted_ide_mode {
            8
        } else {
            16
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_override_wins() {
        let cfg = CacheConfig::resolve(std::path::Path::new("/ws"), Some("custom-cache"));
        assert_eq!(cfg.root, PathBuf::from("/ws/custom-cache"));
    }

    #[test]
    fn restricted_ide_mode_caps_lru() {
        let cfg = EngineConfig { restricted_ide_mode: true, ..Default::default() };
        assert_eq!(cfg.lru_capacity(1000), 8);
    }

    #[test]
    fn lru_capacity_default_is_a_small_constant_independent_of_package_count() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.lru_capacity(10), 16);
        assert_eq!(cfg.lru_capacity(1000), 16);
    }

    #[test]
    fn lru_capacity_override_wins_over_both_defaults() {
        let cfg = EngineConfig { lru_capacity_override: Some(3), ..Default::default() };
        assert_eq!(cfg.lru_capacity(1000), 3);
    }
}
