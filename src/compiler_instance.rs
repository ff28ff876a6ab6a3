//! Package Compiler: drives one package through the two-pass compile spec
//! §4.5 describes, on top of the [`CompileBackend`] seam.
//!
//! Grounded in the original `LSPCompilerInstance`
//! (`examples/original_source/cangjie-language-server/src/languageserver/
//! CompilerCangjieProject.h`): `preCompileProcess` parses a package against
//! only its own forward declarations (no upstream knowledge yet);
//! `compileAfterParse` brings in upstream interface blobs from the
//! Interface Cache, re-resolves every reference against the combined name
//! table, and decides whether the package's own serialized interface
//! changed.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{instrument, warn};

use crate::ast::ParsedFile;
use crate::backend::{CompileBackend, InterfaceBlob, NameTable};
use crate::diagnostic::Diagnostic;
use crate::graph::DependencyGraph;
use crate::iface_cache::InterfaceCache;
use crate::pkg::PkgInfo;
use crate::symbol::{Modifier, Position};

pub struct CompileOutcome {
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// One package's live compiler state: its sources, its own forward-declared
/// names, and the most recently parsed file forest.
pub struct CompilerInstance {
    pub package: String,
    sources: Vec<(PathBuf, String)>,
    own_names: NameTable,
    pub files: Vec<ParsedFile>,
    pub imports: Vec<String>,
}

impl CompilerInstance {
    /// First pass: reads every source file (buffer, falling back to disk),
    /// collects this package's own declared names, and parses against that
    /// local-only table — upstream identifiers are left unresolved until
    /// [`Self::compile_after_parse`] runs.
    #[instrument(level = "debug", skip(backend, pkg, source_files))]
    pub fn pre_compile_process(
        backend: &dyn CompileBackend,
        pkg: &PkgInfo,
        package: &str,
        source_files: &[PathBuf],
    ) -> crate::error::Result<Self> {
        let mut sources = Vec::with_capacity(source_files.len());
        for path in source_files {
            let contents = pkg.contents(path)?;
            sources.push((path.clone(), contents));
        }

        let mut own_names = NameTable::default();
        for (path, contents) in &sources {
            for decl in backend.declared_names(path, contents, package) {
                if decl.name.is_empty() {
                    continue;
                }
                own_names.export_id_by_name.insert(decl.name.clone(), decl.export_id.clone());
                own_names.modifier_by_export_id.insert(decl.export_id.clone(), decl.modifier);
            }
        }

        // Each file's full parse is independent of its siblings (upstream
        // names are already resolved into `own_names`), so this fans out
        // across the rayon pool instead of parsing one file at a time.
        let files: Vec<ParsedFile> =
            sources.par_iter().map(|(path, contents)| backend.parse(path, contents, package, &own_names)).collect();
        let mut imports: Vec<String> = files.iter().flat_map(|f| f.imports.iter().cloned()).collect();
        imports.sort();
        imports.dedup();

        Ok(Self { package: package.to_string(), sources, own_names, files, imports })
    }

    /// Second pass: merges in every upstream package's exported interface
    /// (from `iface_cache`, falling back to an empty table with a `warn!`
    /// when no blob is cached yet — a real backend would fall back to a
    /// full source compile of the upstream package here, but that path is
    /// this crate's seam, not its concern, see DESIGN.md), re-parses with
    /// the combined table, and serializes a fresh interface blob.
    #[instrument(level = "debug", skip(self, backend, iface_cache, graph))]
    pub fn compile_after_parse(
        &mut self,
        backend: &dyn CompileBackend,
        iface_cache: &InterfaceCache,
        graph: &DependencyGraph,
    ) -> CompileOutcome {
        let upstream = graph.dependencies(&self.package);
        let mut combined = self.own_names.clone();
        for pkg in &upstream {
            match iface_cache.get(pkg).and_then(|bytes| InterfaceBlob::decode(&bytes)) {
                Some(blob) => combined.merge(&blob.to_name_table()),
                None => warn!(package = %self.package, upstream = %pkg, "no cached interface for upstream package, treating as empty"),
            }
        }

        self.files =
            self.sources.par_iter().map(|(path, contents)| backend.parse(path, contents, &self.package, &combined)).collect();

        let new_blob = backend.serialize_interface(&self.files);
        let new_bytes = new_blob.encode();
        let previous = iface_cache.get(&self.package);
        let changed = previous.as_deref() != Some(new_bytes.as_slice());

        iface_cache.set_fresh(&self.package, new_bytes);

        CompileOutcome { changed, diagnostics: Vec::new() }
    }

    /// Completion variant: reparses only the file containing
    /// `cursor`, optionally with a synthetic identifier spliced in, and
    /// routes any diagnostics to the package's trash sink rather than
    /// `diag`.
    #[instrument(level = "trace", skip(self, backend, pkg))]
    pub fn compile_pass_for_complete(
        &self,
        backend: &dyn CompileBackend,
        pkg: &PkgInfo,
        cursor_file: &PathBuf,
        cursor: Position,
        synthetic_identifier: Option<&str>,
    ) -> Option<crate::backend::CursorParse> {
        let contents = self.sources.iter().find(|(p, _)| p == cursor_file).map(|(_, c)| c.clone())?;
        let result = backend.parse_with_cursor(cursor_file, &contents, &self.package, &self.own_names, cursor, synthetic_identifier);
        // The mock backend never produces diagnostics of its own; a real
        // backend's diagnostics from this reparse belong here.
        let _ = pkg.set_trash_diagnostics(Vec::new());
        Some(result)
    }

    pub fn sources(&self) -> &[(PathBuf, String)] {
        &self.sources
    }

    pub fn own_modifier(&self, export_id: &str) -> Modifier {
        self.own_names.modifier_by_export_id.get(export_id).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn pkg_with_file(dir: &std::path::Path, name: &str, contents: &str) -> (PkgInfo, PathBuf) {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        (PkgInfo::new(dir.to_path_buf(), "m".into(), "m".into(), true), path)
    }

    #[test]
    fn compile_after_parse_resolves_upstream_reference() {
        let dir = tempfile::tempdir().unwrap();
        let (util_pkg, util_file) = pkg_with_file(dir.path(), "util.cj", "public class Base {\n}\n");
        let (main_pkg, main_file) = pkg_with_file(dir.path(), "main.cj", "public class Derived <: Base {\n}\n");

        let backend = MockBackend;
        let graph = DependencyGraph::new();
        let iface_cache = InterfaceCache::new();

        let mut util_instance =
            CompilerInstance::pre_compile_process(&backend, &util_pkg, "m.util", &[util_file]).unwrap();
        util_instance.compile_after_parse(&backend, &iface_cache, &graph);

        let mut main_instance =
            CompilerInstance::pre_compile_process(&backend, &main_pkg, "m.main", &[main_file]).unwrap();
        graph.update_dependencies("m.main", ["m.util".to_string()].into_iter().collect());
        main_instance.compile_after_parse(&backend, &iface_cache, &graph);

        let derived = main_instance.files[0].declarations.iter().find(|d| d.name == "Derived").unwrap();
        assert!(derived.references.iter().any(|r| r.target_export_id == "m.util.Base"));
    }

    #[test]
    fn unchanged_sources_report_no_change_on_second_compile() {
        let dir = tempfile::tempdir().unwrap();
        let (pkg, file) = pkg_with_file(dir.path(), "a.cj", "public class Foo {\n}\n");
        let backend = MockBackend;
        let graph = DependencyGraph::new();
        let iface_cache = InterfaceCache::new();

        let mut instance = CompilerInstance::pre_compile_process(&backend, &pkg, "m", &[file]).unwrap();
        let first = instance.compile_after_parse(&backend, &iface_cache, &graph);
        assert!(first.changed);

        let second = instance.compile_after_parse(&backend, &iface_cache, &graph);
        assert!(!second.changed);
    }
}
