//! Crate-wide error type.
//!
//! Every fallible core API returns [`Result`]. Capability queries are
//! expected to catch these at their own boundary and degrade to a `null`
//! response rather than letting an error escape to the transport loop (see
//! `engine::WorkspaceEngine` query methods).

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workspace manifest: {0}")]
    Manifest(String),

    #[error("failed to (de)serialize cached artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("dependency cycle detected among packages: {0:?}")]
    Cycle(Vec<Vec<String>>),

    #[error("backend compilation failed: {0}")]
    BackendCompile(String),

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("an internal lock was poisoned by a panicking thread")]
    PoisonedLock,
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Runs a capability query behind [`std::panic::catch_unwind`], turning an
/// unexpected panic inside a pluggable [`crate::backend::CompileBackend`]
/// into a logged `None` instead of letting it unwind into the transport
/// loop. The closure only ever touches `Mutex`/`RwLock`-guarded state (both
/// unconditionally `RefUnwindSafe`) and shared trait-object references, so
/// asserting unwind safety here does not paper over any real invariant.
pub(crate) fn catch_query<T>(f: impl FnOnce() -> T) -> Option<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!("query panicked; returning no result instead of propagating");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_query_converts_panic_to_none() {
        let result = catch_query(|| -> i32 { panic!("boom") });
        assert_eq!(result, None);
    }

    #[test]
    fn catch_query_passes_through_normal_result() {
        let result = catch_query(|| 42);
        assert_eq!(result, Some(42));
    }
}

/// Helper for converting a `PoisonError` from any of the core's `Mutex`/`RwLock`
/// guards into a [`CoreError`]. The lock is expected to never actually be
/// poisoned in normal operation — the pools here never panic while holding a
/// guard — so this is purely a defensive conversion at the API boundary.
pub(crate) trait LockResultExt<T> {
    fn lock_ok(self) -> Result<T>;
}

impl<T> LockResultExt<T> for std::result::Result<T, std::sync::PoisonError<T>> {
    fn lock_ok(self) -> Result<T> {
        self.map_err(|_| CoreError::PoisonedLock)
    }
}
