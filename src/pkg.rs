//! Per-package runtime state: the [`PkgInfo`] record the engine keeps one of
//! per package directory, its source buffers, and its diagnostic sinks.
//!
//! Grounded in the original `PkgInfo`/`CompilerInvocation` pairing
//! (`examples/original_source/cangjie-language-server/src/languageserver/
//! CompilerCangjieProject.h`): a package's identity (paths, owning module),
//! its open-editor buffer overlay, and the two diagnostic sinks spec §4.10
//! describes (`diag` for the last full compile, `diag_trash` for scratch
//! diagnostics produced by completion/cursor-only reparses that must never
//! reach the client).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::diagnostic::Diagnostic;
use crate::error::{CoreError, LockResultExt, Result};

/// One package's mutable runtime state. Cheap to construct; the heavy
/// compiler artifacts live in the LRU, not here — `PkgInfo` survives
/// eviction (spec Property P9).
pub struct PkgInfo {
    /// Canonical absolute directory this package's sources live under.
    pub dir: PathBuf,
    /// Full dotted package name (e.g. `a.b.c`).
    pub full_name: String,
    /// Name of the module this package belongs to.
    pub owning_module: String,
    /// True for a module's root package (the one whose directory matches
    /// the module's declared `src_path`).
    pub is_source_root: bool,

    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Open-editor overlay: file path -> buffer contents, taking precedence
    /// over on-disk contents for any file present here.
    buffers: HashMap<PathBuf, String>,
    /// Diagnostics from the package's last full compile.
    diag: Vec<Diagnostic>,
    /// Scratch diagnostics from cursor-only/completion reparses — spec
    /// §4.10 requires these never leak into `diag`.
    diag_trash: Vec<Diagnostic>,
    needs_recompile: bool,
}

impl PkgInfo {
    pub fn new(dir: PathBuf, full_name: String, owning_module: String, is_source_root: bool) -> Self {
        Self { dir, full_name, owning_module, is_source_root, state: Mutex::new(State::default()) }
    }

    pub fn set_buffer(&self, path: impl Into<PathBuf>, contents: String) -> Result<()> {
        let mut state = self.state.lock().lock_ok()?;
        state.buffers.insert(path.into(), contents);
        state.needs_recompile = true;
        Ok(())
    }

    pub fn clear_buffer(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().lock_ok()?;
        state.buffers.remove(path);
        state.needs_recompile = true;
        Ok(())
    }

    /// Returns the buffer contents for `path` if the editor has it open,
    /// otherwise reads the file from disk.
    pub fn contents(&self, path: &Path) -> Result<String> {
        let state = self.state.lock().lock_ok()?;
        if let Some(buf) = state.buffers.get(path) {
            return Ok(buf.clone());
        }
        drop(state);
        std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))
    }

    pub fn set_diagnostics(&self, diags: Vec<Diagnostic>) -> Result<()> {
        let mut state = self.state.lock().lock_ok()?;
        state.diag = diags;
        Ok(())
    }

    pub fn diagnostics(&self) -> Result<Vec<Diagnostic>> {
        Ok(self.state.lock().lock_ok()?.diag.clone())
    }

    pub fn set_trash_diagnostics(&self, diags: Vec<Diagnostic>) -> Result<()> {
        let mut state = self.state.lock().lock_ok()?;
        state.diag_trash = diags;
        Ok(())
    }

    pub fn mark_needs_recompile(&self) -> Result<()> {
        self.state.lock().lock_ok()?.needs_recompile = true;
        Ok(())
    }

    pub fn clear_needs_recompile(&self) -> Result<()> {
        self.state.lock().lock_ok()?.needs_recompile = false;
        Ok(())
    }

    pub fn needs_recompile(&self) -> Result<bool> {
        Ok(self.state.lock().lock_ok()?.needs_recompile)
    }

    /// Every file currently open in an editor overlay for this package.
    pub fn open_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.state.lock().lock_ok()?.buffers.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_overlay_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.cj");
        std::fs::write(&file, "on disk").unwrap();

        let pkg = PkgInfo::new(dir.path().to_path_buf(), "m".into(), "m".into(), true);
        assert_eq!(pkg.contents(&file).unwrap(), "on disk");

        pkg.set_buffer(file.clone(), "in editor".into()).unwrap();
        assert_eq!(pkg.contents(&file).unwrap(), "in editor");
        assert!(pkg.needs_recompile().unwrap());
    }

    #[test]
    fn trash_diagnostics_do_not_touch_main_sink() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = PkgInfo::new(dir.path().to_path_buf(), "m".into(), "m".into(), true);
        pkg.set_diagnostics(vec![]).unwrap();
        pkg.set_trash_diagnostics(vec![Diagnostic::error("scratch".into(), Default::default())]).unwrap();
        assert!(pkg.diagnostics().unwrap().is_empty());
    }
}
