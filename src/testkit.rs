//! Disposable on-disk workspace fixtures for tests, mirroring the
//! teacher's own `project_util::TempProject` pattern: build a throwaway
//! module directory with a manifest and a handful of source files, then
//! hand it to [`crate::engine::WorkspaceEngine::open`].

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Installs a `tracing` subscriber for the current test process, honoring
/// `RUST_LOG`. Safe to call from every test; only the first call wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

/// A scratch workspace directory that is removed when dropped.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Creates an empty scratch workspace with no manifest.
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("failed to create scratch workspace") }
    }

    /// Writes a single-module manifest naming `module_name`, with sources
    /// rooted at `<workspace>/src`.
    pub fn with_manifest(module_name: &str) -> Self {
        let ws = Self::new();
        ws.write_file("cjpm.toml", &format!("moduleName = \"{module_name}\"\n"));
        ws
    }

    /// Writes `contents` to `relative_path`, creating parent directories as
    /// needed, and returns the file's absolute path.
    pub fn write_file(&self, relative_path: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture directory");
        }
        std::fs::write(&path, contents).expect("failed to write fixture file");
        path
    }

    /// Convenience for a source file under the default module's `src`
    /// directory.
    pub fn write_src(&self, relative_path: &str, contents: &str) -> PathBuf {
        self.write_file(&format!("src/{relative_path}"), contents)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_manifest_and_source_tree() {
        let ws = TestWorkspace::with_manifest("m");
        let file = ws.write_src("main.cj", "public class Foo {\n}\n");
        assert!(file.exists());
        assert!(ws.root().join("cjpm.toml").exists());
    }
}
