//! The Workspace Engine (`CompilerCangjieProject` in the original): the
//! orchestrator owning every other component and driving workspace open,
//! incremental edits, recompilation, and capability queries.
//!
//! Grounded in the original `CompilerCangjieProject`
//! (`examples/original_source/cangjie-language-server/src/languageserver/
//! CompilerCangjieProject.h/.cpp`), translated from its single God-object
//! with member mutexes into a struct of already-thread-safe components
//! (`DependencyGraph`, `InterfaceCache`, `TaskPool`, ...), each `Arc`-shared
//! so Task Pool closures can hold their own handle rather than borrowing
//! `self` — the idiomatic substitute for the original's raw `this` capture,
//! since `TaskPool::submit` closures must outlive any one call into the
//! engine.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, warn};

use crate::backend::{CompileBackend, CursorParse};
use crate::collector::Collector;
use crate::compiler_instance::CompilerInstance;
use crate::config::{CacheConfig, EngineConfig};
use crate::diagnostic::Diagnostic;
use crate::disk_cache::DiskCache;
use crate::error::{catch_query, CoreError, LockResultExt, Result};
use crate::graph::DependencyGraph;
use crate::iface_cache::{FreshnessStatus, InterfaceCache};
use crate::lru::LruCache;
use crate::manifest::{self, ModuleInfo};
use crate::pkg::PkgInfo;
use crate::symbol::index::SymbolIndex;
use crate::symbol::mem::MemIndex;
use crate::symbol::{Location, Position};
use crate::task_pool::{TaskId, TaskPool};

struct PackageEntry {
    info: Arc<PkgInfo>,
    module: Option<String>,
}

#[derive(Default)]
struct Bookkeeping {
    packages: HashMap<String, PackageEntry>,
    /// Package directory -> full name, the map capability queries resolve
    /// an edited file's owning package through.
    dir_to_package: HashMap<PathBuf, String>,
    instances: LruCache<String, CompilerInstance>,
    modules: Vec<ModuleInfo>,
}

/// Owns every compilation/indexing component for one open workspace.
pub struct WorkspaceEngine {
    root: PathBuf,
    backend: Arc<dyn CompileBackend>,
    config: EngineConfig,
    cache: Arc<DiskCache>,
    graph: Arc<DependencyGraph>,
    iface_cache: Arc<InterfaceCache>,
    index: Arc<MemIndex>,
    pool: TaskPool,
    state: Mutex<Bookkeeping>,
}

fn task_id_for(package: &str) -> TaskId {
    crate::symbol::symbol_id(package)
}

impl WorkspaceEngine {
    /// Opens a workspace rooted at `root`, running the full compilation flow
    /// before returning: every module's packages are discovered, parsed,
    /// and compiled, with disk-cache hits restoring a package's interface
    /// blob and index shard without a recompile.
    #[instrument(level = "info", skip(backend), fields(root = %root.display()))]
    pub fn open(root: &Path, backend: Box<dyn CompileBackend>, config: EngineConfig) -> Result<Self> {
        let cache_cfg = CacheConfig::resolve(root, None);
        let engine = Self {
            root: root.to_path_buf(),
            backend: Arc::from(backend),
            pool: TaskPool::new(config.worker_count()),
            config,
            cache: Arc::new(DiskCache::new(cache_cfg.root)),
            graph: Arc::new(DependencyGraph::new()),
            iface_cache: Arc::new(InterfaceCache::new()),
            index: Arc::new(MemIndex::new()),
            state: Mutex::new(Bookkeeping::default()),
        };
        engine.full_compile()?;
        Ok(engine)
    }

    fn full_compile(&self) -> Result<()> {
        let modules = discover_modules(&self.root)?;
        let mut all_packages: Vec<(String, Arc<PkgInfo>, Option<String>)> = Vec::new();

        for module in &modules {
            for (full_name, dir, files) in enumerate_module_packages(module)? {
                let is_source_root = Path::new(&module.src_path) == dir;
                let info = Arc::new(PkgInfo::new(dir.clone(), full_name.clone(), module.module_name.clone(), is_source_root));
                load_buffers(&info, &files)?;
                all_packages.push((full_name, info, Some(module.module_name.clone())));
            }
        }

        for (dir, files) in enumerate_loose_packages(&self.root, &modules)? {
            let full_name = dir.to_string_lossy().replace(['/', '\\'], ".");
            let info = Arc::new(PkgInfo::new(dir.clone(), full_name.clone(), "default".into(), true));
            load_buffers(&info, &files)?;
            all_packages.push((full_name, info, None));
        }

        {
            let mut state = self.state.lock().lock_ok()?;
            state.modules = modules;
            for (full_name, info, module) in &all_packages {
                state.dir_to_package.insert(info.dir.clone(), full_name.clone());
                state.packages.insert(full_name.clone(), PackageEntry { info: Arc::clone(info), module: module.clone() });
            }
        }

        // Step 4: pre-compile every package (own-names-only parse), record
        // its discovered imports as graph edges, mark it STALE.
        let mut pre_compiled: HashMap<String, CompilerInstance> = HashMap::new();
        for (full_name, info, _) in &all_packages {
            let files: Vec<PathBuf> = info.open_files()?;
            let instance = CompilerInstance::pre_compile_process(self.backend.as_ref(), info, full_name, &files)?;
            self.graph.update_dependencies(full_name, instance.imports.iter().cloned().collect());
            self.iface_cache.mark_stale(full_name);
            pre_compiled.insert(full_name.clone(), instance);
        }

        let all_names: HashSet<String> = all_packages.iter().map(|(n, _, _)| n.clone()).collect();
        if let Err(CoreError::Cycle(cycles)) = self.graph.check_no_cycles_in(&all_names) {
            warn!(?cycles, "dependency cycles detected during workspace open");
        }

        // Step 5: disk-cache cold start.
        for (full_name, info, module) in &all_packages {
            let sources = pre_compiled.get(full_name).map(|i| i.sources().to_vec()).unwrap_or_default();
            let hash = DiskCache::sources_hash(&sources);
            if let (Some(blob), Some(shard)) =
                (self.cache.load_interface_blob(&info.dir, &hash), self.cache.load_shard(&info.dir, &hash))
            {
                self.iface_cache.set_fresh(full_name, blob);
                let owning_module = module.clone().unwrap_or_else(|| "default".to_string());
                self.index.insert_shard(full_name, &owning_module, shard);
            }
        }

        // Steps 6-7: submit one task per package in topological order,
        // predecessors = every transitive upstream package. A FRESH
        // (disk-cache-hit) package early-exits without recompiling. Each
        // task that actually compiles sends its instance back over
        // `instance_tx` rather than capturing `self.state` (not `Arc`-shared
        // across worker threads), so the LRU is populated once all tasks
        // have joined, exactly as spec §4.6.1 step 6 requires.
        let (instance_tx, instance_rx) = mpsc::channel::<(String, CompilerInstance)>();
        let order = self.graph.partial_topological_sort(&all_names, true).unwrap_or_else(|| all_names.iter().cloned().collect());
        for full_name in &order {
            let Some((_, info, module)) = all_packages.iter().find(|(n, _, _)| n == full_name) else { continue };
            let predecessors: HashSet<TaskId> = self.graph.all_dependencies(full_name).iter().map(|p| task_id_for(p)).collect();

            if self.iface_cache.status(full_name) == Some(FreshnessStatus::Fresh) {
                self.pool.submit(task_id_for(full_name), predecessors, || {});
                continue;
            }

            let Some(mut instance) = pre_compiled.remove(full_name) else { continue };
            let backend = Arc::clone(&self.backend);
            let graph = Arc::clone(&self.graph);
            let iface_cache = Arc::clone(&self.iface_cache);
            let index = Arc::clone(&self.index);
            let cache = Arc::clone(&self.cache);
            let restricted_ide_mode = self.config.restricted_ide_mode;
            let pkg_name = full_name.clone();
            let owning_module = module.clone().unwrap_or_else(|| "default".to_string());
            let info = Arc::clone(info);
            let instance_tx = instance_tx.clone();

            self.pool.submit(task_id_for(full_name), predecessors, move || {
                let outcome = instance.compile_after_parse(backend.as_ref(), &iface_cache, &graph);
                let shard = Collector::new().collect(&pkg_name, &instance.files);
                index.insert_shard(&pkg_name, &owning_module, shard.clone());
                if outcome.changed {
                    propagate_staleness(&graph, &iface_cache, &pkg_name);
                }

                let no_errors = !outcome.diagnostics.iter().any(|d| d.severity == crate::diagnostic::Severity::Error);
                if no_errors || restricted_ide_mode {
                    let hash = DiskCache::sources_hash(instance.sources());
                    if let Some(blob) = iface_cache.get(&pkg_name) {
                        let _ = cache.store_interface_blob(&info.dir, &hash, &blob);
                    }
                    let _ = cache.store_shard(&info.dir, &hash, &shard);
                }

                let _ = info.set_diagnostics(outcome.diagnostics);
                let _ = instance_tx.send((pkg_name, instance));
            });
        }
        drop(instance_tx);
        self.pool.wait_until_all_tasks_complete();

        // Every task that compiled (as opposed to early-exiting on a FRESH
        // disk-cache hit) has already sent its instance by the time the
        // barrier above returns; drain them into the LRU, sized exactly the
        // way `recompile_package` sizes it on its own first insert.
        {
            let mut state = self.state.lock().lock_ok()?;
            let capacity = self.config.lru_capacity(all_names.len());
            if state.instances.len() == 0 && capacity != 0 {
                state.instances = LruCache::new(capacity);
            }
            for (full_name, instance) in instance_rx.try_iter() {
                if let Some(evicted) = state.instances.set(full_name, instance) {
                    debug!(evicted = %evicted, "evicted compiler instance from LRU");
                }
            }
        }

        Ok(())
    }

    /// Handles an editor buffer change: updates the buffer and recompiles
    /// the owning package.
    #[instrument(level = "debug", skip(self, contents))]
    pub fn on_file_changed(&self, path: &Path, contents: String) -> Result<Vec<Diagnostic>> {
        let package = self.package_for_path(path)?;
        package.info.set_buffer(path.to_path_buf(), contents)?;
        self.recompile_package(&package.full_name)
    }

    /// Handles file deletion: drops the buffer, recompiles, and purges the
    /// package entirely if it has no files left.
    #[instrument(level = "debug", skip(self))]
    pub fn on_file_deleted(&self, path: &Path) -> Result<()> {
        let package = self.package_for_path(path)?;
        package.info.clear_buffer(path)?;
        if package.info.open_files()?.is_empty() {
            self.purge_package(&package.full_name)?;
            return Ok(());
        }
        self.recompile_package(&package.full_name)?;
        Ok(())
    }

    /// Registers a brand-new source directory discovered outside any
    /// currently-known package: a fresh `PkgInfo` is created and the new
    /// file's contents loaded before the first recompile.
    #[instrument(level = "debug", skip(self, contents))]
    pub fn on_new_package_file(&self, path: &Path, contents: String, owning_module: Option<&str>) -> Result<Vec<Diagnostic>> {
        let dir = path.parent().unwrap_or(path).to_path_buf();
        let full_name = owning_module
            .map(|m| manifest::full_package_name(m, &dir, path))
            .unwrap_or_else(|| dir.to_string_lossy().replace(['/', '\\'], "."));

        {
            let mut state = self.state.lock().lock_ok()?;
            if !state.packages.contains_key(&full_name) {
                let info = Arc::new(PkgInfo::new(dir.clone(), full_name.clone(), owning_module.unwrap_or("default").to_string(), false));
                state.dir_to_package.insert(dir, full_name.clone());
                state.packages.insert(full_name.clone(), PackageEntry { info, module: owning_module.map(|s| s.to_string()) });
            }
        }

        let package = self.package_for_path(path)?;
        package.info.set_buffer(path.to_path_buf(), contents)?;
        self.recompile_package(&full_name)
    }

    fn purge_package(&self, full_name: &str) -> Result<()> {
        let mut state = self.state.lock().lock_ok()?;
        if let Some(entry) = state.packages.remove(full_name) {
            state.dir_to_package.remove(&entry.info.dir);
        }
        state.instances.erase(&full_name.to_string());
        drop(state);
        self.graph.remove_package(full_name);
        self.iface_cache.remove(full_name);
        self.index.remove_package(full_name);
        Ok(())
    }

    fn package_for_path(&self, path: &Path) -> Result<FoundPackage> {
        let state = self.state.lock().lock_ok()?;
        let mut best: Option<(&PathBuf, &str)> = None;
        for (full_name, entry) in &state.packages {
            if path.starts_with(&entry.info.dir) {
                let is_better = best.map(|(dir, _)| entry.info.dir.components().count() > dir.components().count()).unwrap_or(true);
                if is_better {
                    best = Some((&entry.info.dir, full_name.as_str()));
                }
            }
        }
        let (_, full_name) = best.ok_or_else(|| CoreError::UnknownPackage(path.display().to_string()))?;
        let full_name = full_name.to_string();
        let info = Arc::clone(&state.packages[&full_name].info);
        Ok(FoundPackage { full_name, info })
    }

    /// Spec §4.6.3's nine-step recompile.
    #[instrument(level = "debug", skip(self))]
    fn recompile_package(&self, full_name: &str) -> Result<Vec<Diagnostic>> {
        let info = {
            let state = self.state.lock().lock_ok()?;
            Arc::clone(&state.packages.get(full_name).ok_or_else(|| CoreError::UnknownPackage(full_name.to_string()))?.info)
        };
        info.set_diagnostics(Vec::new())?;

        let files = info.open_files()?;
        let mut instance = CompilerInstance::pre_compile_process(self.backend.as_ref(), &info, full_name, &files)?;
        self.graph.update_dependencies(full_name, instance.imports.iter().cloned().collect());

        let all_names: HashSet<String> = {
            let state = self.state.lock().lock_ok()?;
            state.packages.keys().cloned().collect()
        };
        if let Err(CoreError::Cycle(cycles)) = self.graph.check_no_cycles_in(&all_names) {
            let mut diags = Vec::new();
            for cycle in &cycles {
                if cycle.iter().any(|p| p == full_name) {
                    diags.push(Diagnostic::error(format!("import cycle detected: {}", cycle.join(" -> ")), Location::default()));
                }
            }
            info.set_diagnostics(diags.clone())?;
            return Ok(diags);
        }

        let upstream = self.graph.all_dependencies(full_name);
        let stale_upstream = self.iface_cache.check_stale(&upstream);
        self.recompile_many(&stale_upstream)?;

        let outcome = instance.compile_after_parse(self.backend.as_ref(), &self.iface_cache, &self.graph);
        if outcome.changed {
            propagate_staleness(&self.graph, &self.iface_cache, full_name);
        }

        let owning_module = {
            let state = self.state.lock().lock_ok()?;
            state.packages.get(full_name).and_then(|e| e.module.clone()).unwrap_or_else(|| "default".to_string())
        };
        let shard = Collector::new().collect(full_name, &instance.files);
        self.index.insert_shard(full_name, &owning_module, shard.clone());

        {
            let mut state = self.state.lock().lock_ok()?;
            let capacity = self.config.lru_capacity(state.packages.len());
            if state.instances.len() == 0 && capacity != 0 {
                state.instances = LruCache::new(capacity);
            }
            if let Some(evicted) = state.instances.set(full_name.to_string(), instance) {
                debug!(evicted = %evicted, "evicted compiler instance from LRU");
            }
        }

        info.set_diagnostics(outcome.diagnostics.clone())?;
        info.clear_needs_recompile()?;

        if self.should_persist(&outcome.diagnostics) {
            let sources: Vec<(PathBuf, String)> =
                info.open_files()?.into_iter().map(|p| info.contents(&p).map(|c| (p, c))).collect::<Result<Vec<_>>>()?;
            let hash = DiskCache::sources_hash(&sources);
            if let Some(blob) = self.iface_cache.get(full_name) {
                self.cache.store_interface_blob(&info.dir, &hash, &blob)?;
            }
            self.cache.store_shard(&info.dir, &hash, &shard)?;
        }

        Ok(outcome.diagnostics)
    }

    fn should_persist(&self, diagnostics: &[Diagnostic]) -> bool {
        let no_errors = !diagnostics.iter().any(|d| d.severity == crate::diagnostic::Severity::Error);
        no_errors || self.config.restricted_ide_mode
    }

    fn recompile_many(&self, packages: &HashSet<String>) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let order = self.graph.partial_topological_sort(packages, true).unwrap_or_else(|| packages.iter().cloned().collect());
        for pkg in order {
            self.recompile_package(&pkg)?;
        }
        Ok(())
    }

    /// Spec §4.6.4: owning-package lookup plus an LRU-miss recompile.
    pub fn ensure_compiled(&self, path: &Path) -> Result<String> {
        let package = self.package_for_path(path)?;
        let in_lru = {
            let mut state = self.state.lock().lock_ok()?;
            state.instances.contains(&package.full_name)
        };
        if !in_lru {
            self.recompile_package(&package.full_name)?;
        }
        Ok(package.full_name)
    }

    /// Completion variant of a capability query: ensures the owning package
    /// is compiled, then reparses only the
    /// cursor's file with an optional synthetic identifier spliced in.
    /// Returns `Ok(None)` both when the package has no file at `path` and
    /// when the backend panics mid-reparse — a completion request is
    /// best-effort and must never crash the caller over a single bad parse.
    #[instrument(level = "trace", skip(self))]
    pub fn complete_at(
        &self,
        path: &Path,
        cursor: Position,
        synthetic_identifier: Option<&str>,
    ) -> Result<Option<CursorParse>> {
        let full_name = self.ensure_compiled(path)?;
        let info = {
            let state = self.state.lock().lock_ok()?;
            Arc::clone(&state.packages.get(&full_name).ok_or_else(|| CoreError::UnknownPackage(full_name.clone()))?.info)
        };
        let backend = Arc::clone(&self.backend);
        let path_buf = path.to_path_buf();

        let mut state = self.state.lock().lock_ok()?;
        let Some(instance) = state.instances.get(&full_name) else {
            return Ok(None);
        };
        let result = catch_query(|| instance.compile_pass_for_complete(backend.as_ref(), &info, &path_buf, cursor, synthetic_identifier));
        Ok(result.flatten())
    }

    /// Find-references' freshness fence: every downstream
    /// package of `full_name` must be interface-`FRESH` before references
    /// are trusted; this is the only query path that recompiles unedited
    /// packages. Skipped entirely in restricted-IDE mode.
    #[instrument(level = "debug", skip(self))]
    pub fn ensure_downstream_fresh(&self, full_name: &str) -> Result<()> {
        if self.config.restricted_ide_mode {
            return Ok(());
        }
        let downstream = self.graph.all_dependents(full_name);
        let not_fresh = self.iface_cache.check_not_fresh(&downstream);
        self.recompile_many(&not_fresh)
    }

    pub fn diagnostics(&self, full_name: &str) -> Result<Vec<Diagnostic>> {
        let state = self.state.lock().lock_ok()?;
        let entry = state.packages.get(full_name).ok_or_else(|| CoreError::UnknownPackage(full_name.to_string()))?;
        entry.info.diagnostics()
    }

    /// Workspace symbol / completion-imports queries: read the index
    /// directly, never triggering compilation.
    pub fn index(&self) -> &dyn SymbolIndex {
        self.index.as_ref()
    }

    pub fn package_count(&self) -> Result<usize> {
        Ok(self.state.lock().lock_ok()?.packages.len())
    }

    pub fn package_names(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().lock_ok()?.packages.keys().cloned().collect())
    }
}

struct FoundPackage {
    full_name: String,
    info: Arc<PkgInfo>,
}

fn load_buffers(info: &PkgInfo, files: &[PathBuf]) -> Result<()> {
    for file in files {
        let contents = std::fs::read_to_string(file).map_err(|e| CoreError::io(file, e))?;
        info.set_buffer(file.clone(), contents)?;
    }
    info.clear_needs_recompile()?;
    Ok(())
}

/// Direct downstream -> `STALE`, transitive downstream -> `WEAKSTALE`.
fn propagate_staleness(graph: &DependencyGraph, iface_cache: &InterfaceCache, full_name: &str) {
    let direct = graph.dependents(full_name);
    let transitive = graph.all_dependents(full_name);
    let only_transitive: HashSet<String> = transitive.difference(&direct).cloned().collect();
    iface_cache.update_status(&direct, FreshnessStatus::Stale);
    iface_cache.update_status(&only_transitive, FreshnessStatus::WeakStale);
}

fn discover_modules(root: &Path) -> Result<Vec<ModuleInfo>> {
    let manifest_path = root.join("cjpm.toml");
    if !manifest_path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&manifest_path).map_err(|e| CoreError::io(&manifest_path, e))?;
    Ok(vec![manifest::parse_manifest(root, &text)?])
}

/// Recursively enumerates a module's packages: each directory under
/// `src_path` containing at least one `.cj` file becomes one package, named
/// by its dotted path relative to `src_path`.
fn enumerate_module_packages(module: &ModuleInfo) -> Result<Vec<(String, PathBuf, Vec<PathBuf>)>> {
    let src_path = PathBuf::from(&module.src_path);
    if !src_path.exists() {
        return Ok(Vec::new());
    }

    let mut by_dir: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    for entry in walkdir::WalkDir::new(&src_path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "cj") {
            let dir = entry.path().parent().unwrap_or(&src_path).to_path_buf();
            by_dir.entry(dir).or_default().push(entry.path().to_path_buf());
        }
    }

    let mut packages = Vec::with_capacity(by_dir.len());
    for (dir, files) in by_dir {
        let full_name = manifest::full_package_name(&module.module_name, &src_path, &files[0]);
        packages.push((full_name, dir, files));
    }
    Ok(packages)
}

/// Spec §4.6.1 step 3: the workspace root itself (if it has `.cj` files not
/// claimed by any module), none of which participate in module-scoped
/// dependency resolution.
fn enumerate_loose_packages(root: &Path, modules: &[ModuleInfo]) -> Result<Vec<(PathBuf, Vec<PathBuf>)>> {
    let claimed: HashSet<PathBuf> = modules.iter().map(|m| PathBuf::from(&m.src_path)).collect();
    let mut result = Vec::new();

    let mut root_files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.path().extension().is_some_and(|e| e == "cj") {
                root_files.push(entry.path());
            }
        }
    }
    if !root_files.is_empty() && !claimed.contains(root) {
        result.push((root.to_path_buf(), root_files));
    }
    Ok(result)
}
