//! The interface cache.
//!
//! Holds, per package, the serialized public-interface blob ("cjo") plus a
//! freshness state. Readers take a cloned snapshot under a shared lock;
//! writers transition state under an exclusive lock.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Freshness of a package's interface blob.
///
/// Total order `Fresh < WeakStale < Stale`. Transitions may only move up
/// (toward `Stale`) except for the explicit reset to `Fresh` performed by a
/// successful recompile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FreshnessStatus {
    Fresh,
    WeakStale,
    Stale,
}

pub type Blob = Vec<u8>;

#[derive(Debug, Clone)]
struct CjoData {
    data: Option<Blob>,
    status: FreshnessStatus,
}

/// Per-package slot holding a serialized interface blob and its freshness.
#[derive(Default)]
pub struct InterfaceCache {
    map: RwLock<HashMap<String, CjoData>>,
}

impl InterfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a fresh blob for `pkg`, unconditionally setting its status to
    /// [`FreshnessStatus::Fresh`]. This is the only way a package's status
    /// ever moves back down the lattice.
    #[tracing::instrument(level = "trace", skip(self, blob))]
    pub fn set_fresh(&self, pkg: &str, blob: Blob) {
        let mut map = self.map.write().expect("interface cache poisoned");
        map.insert(pkg.to_string(), CjoData { data: Some(blob), status: FreshnessStatus::Fresh });
    }

    /// Marks `pkg` as stale without changing its stored blob (used before a
    /// compile to signal "about to become fresh or get discarded").
    pub fn mark_stale(&self, pkg: &str) {
        let mut map = self.map.write().expect("interface cache poisoned");
        let entry = map.entry(pkg.to_string()).or_insert(CjoData { data: None, status: FreshnessStatus::Stale });
        entry.status = FreshnessStatus::Stale;
    }

    /// Returns a cloned copy of `pkg`'s blob, if any.
    pub fn get(&self, pkg: &str) -> Option<Blob> {
        let map = self.map.read().expect("interface cache poisoned");
        map.get(pkg).and_then(|d| d.data.clone())
    }

    pub fn status(&self, pkg: &str) -> Option<FreshnessStatus> {
        let map = self.map.read().expect("interface cache poisoned");
        map.get(pkg).map(|d| d.status)
    }

    /// Moves each named package's status up the lattice toward
    /// `new_status`. Never regresses a package already at a status >=
    /// `new_status`; packages with no existing entry are inserted with an
    /// empty blob at `new_status`.
    #[tracing::instrument(level = "trace", skip(self, packages))]
    pub fn update_status(&self, packages: &HashSet<String>, new_status: FreshnessStatus) {
        let mut map = self.map.write().expect("interface cache poisoned");
        for pkg in packages {
            let entry = map
                .entry(pkg.clone())
                .or_insert(CjoData { data: None, status: FreshnessStatus::Stale });
            if new_status > entry.status {
                entry.status = new_status;
            }
        }
    }

    /// Returns the subset of `packages` currently `Stale`.
    pub fn check_stale(&self, packages: &HashSet<String>) -> HashSet<String> {
        let map = self.map.read().expect("interface cache poisoned");
        packages
            .iter()
            .filter(|p| matches!(map.get(*p).map(|d| d.status), Some(FreshnessStatus::Stale)))
            .cloned()
            .collect()
    }

    /// Returns the subset of `packages` that are not `Fresh` (covers both
    /// `WeakStale` and `Stale`, used by find-references' freshness fence).
    pub fn check_not_fresh(&self, packages: &HashSet<String>) -> HashSet<String> {
        let map = self.map.read().expect("interface cache poisoned");
        packages
            .iter()
            .filter(|p| !matches!(map.get(*p).map(|d| d.status), Some(FreshnessStatus::Fresh)))
            .cloned()
            .collect()
    }

    pub fn remove(&self, pkg: &str) {
        let mut map = self.map.write().expect("interface cache poisoned");
        map.remove(pkg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn monotonicity_without_successful_compile() {
        let cache = InterfaceCache::new();
        cache.set_fresh("m.util", vec![1, 2, 3]);
        assert_eq!(cache.status("m.util"), Some(FreshnessStatus::Fresh));

        cache.update_status(&set(&["m.util"]), FreshnessStatus::WeakStale);
        assert_eq!(cache.status("m.util"), Some(FreshnessStatus::WeakStale));

        // moving "up" to Stale while already WeakStale should take effect...
        cache.update_status(&set(&["m.util"]), FreshnessStatus::Stale);
        assert_eq!(cache.status("m.util"), Some(FreshnessStatus::Stale));

        // ...but a redundant WeakStale bump must not move it back down.
        cache.update_status(&set(&["m.util"]), FreshnessStatus::WeakStale);
        assert_eq!(cache.status("m.util"), Some(FreshnessStatus::Stale));
    }

    #[test]
    fn successful_compile_resets_to_fresh() {
        let cache = InterfaceCache::new();
        cache.update_status(&set(&["m.util"]), FreshnessStatus::Stale);
        assert_eq!(cache.status("m.util"), Some(FreshnessStatus::Stale));

        cache.set_fresh("m.util", vec![9]);
        assert_eq!(cache.status("m.util"), Some(FreshnessStatus::Fresh));
    }

    #[test]
    fn check_stale_only_reports_stale() {
        let cache = InterfaceCache::new();
        cache.set_fresh("a", vec![]);
        cache.update_status(&set(&["b"]), FreshnessStatus::WeakStale);
        cache.update_status(&set(&["c"]), FreshnessStatus::Stale);

        let stale = cache.check_stale(&set(&["a", "b", "c"]));
        assert_eq!(stale, set(&["c"]));

        let not_fresh = cache.check_not_fresh(&set(&["a", "b", "c"]));
        assert_eq!(not_fresh, set(&["b", "c"]));
    }
}
