//! Module Manager: parses workspace manifests and resolves module layout.
//!
//! The manifest format is a small key/value/table dialect, not full TOML:
//! parsing is tolerant and forward-compatible, logging and ignoring
//! unrecognized keys rather than rejecting them. A tiny hand-written parser
//! keeps the dependency surface minimal instead of pulling in a full `toml`
//! crate, while still only ever producing `serde`-friendly struct output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cfg_if::cfg_if;
use path_slash::PathExt as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};

/// A resolved module: its own identity, source root, and dependency
/// metadata, with every path normalized to a canonical slash-separated form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub module_name: String,
    pub module_root_path: String,
    pub src_path: String,
    /// Package name -> on-disk path to its serialized interface blob, for
    /// every package this module directly or transitively requires.
    pub cjo_requires_map: HashMap<String, String>,
    pub all_direct_dependencies: Vec<String>,
    pub all_transitive_dependencies: Vec<String>,
    pub target: Option<String>,
    pub cache_dir: Option<String>,
    pub macro_lib_paths: Vec<String>,
    pub cfg: HashMap<String, String>,
}

/// Raw parsed manifest contents before path resolution.
#[derive(Debug, Clone, Default)]
struct RawManifest {
    module_name: Option<String>,
    package_requires: HashMap<String, String>,
    requires: HashMap<String, Vec<String>>,
    src_path: Option<String>,
    target: Option<String>,
    cache_dir: Option<String>,
    macro_lib_paths: Vec<String>,
    cfg: HashMap<String, String>,
}

/// Parses one manifest's text into a [`ModuleInfo`], anchored at
/// `module_root`. Unknown top-level keys are logged at `warn!` and skipped.
pub fn parse_manifest(module_root: &Path, text: &str) -> Result<ModuleInfo> {
    let raw = parse_raw(text)?;
    let module_name = raw.module_name.clone().ok_or_else(|| CoreError::Manifest("missing moduleName".into()))?;

    let src_path = raw
        .src_path
        .clone()
        .map(|p| module_root.join(p))
        .unwrap_or_else(|| module_root.join("src"));

    let mut all_direct: Vec<String> = raw.package_requires.keys().cloned().collect();
    for (_module, pkgs) in &raw.requires {
        for p in pkgs {
            if !all_direct.contains(p) {
                all_direct.push(p.clone());
            }
        }
    }
    all_direct.sort();

    // Without a real dependency resolver, transitive == direct at manifest
    // parse time; the Dependency Graph fills in the true transitive closure
    // once packages are actually parsed and their imports discovered.
    let all_transitive = all_direct.clone();

    Ok(ModuleInfo {
        module_name,
        module_root_path: normalize_path(module_root),
        src_path: normalize_path(&src_path),
        cjo_requires_map: raw.package_requires,
        all_direct_dependencies: all_direct,
        all_transitive_dependencies: all_transitive,
        target: raw.target,
        cache_dir: raw.cache_dir,
        macro_lib_paths: expand_macro_lib_paths(module_root, &raw.macro_lib_paths),
        cfg: raw.cfg,
    })
}

/// Expands each configured `macro_lib_paths` entry as a glob pattern rooted
/// at the module, so a manifest can name a whole directory of macro
/// libraries (`"macros/*.so"`) instead of listing every file. Entries with
/// no glob metacharacter, or that match nothing on disk, pass through
/// unchanged so a path to a library that simply hasn't been built yet is
/// still recorded.
fn expand_macro_lib_paths(module_root: &Path, patterns: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            expanded.push(pattern.clone());
            continue;
        }
        let full_pattern = module_root.join(pattern);
        let matches: Vec<String> = glob::glob(&full_pattern.to_string_lossy())
            .ok()
            .map(|paths| paths.filter_map(|p| p.ok()).map(|p| normalize_path(&p)).collect())
            .unwrap_or_default();
        if matches.is_empty() {
            expanded.push(pattern.clone());
        } else {
            expanded.extend(matches);
        }
    }
    expanded
}

fn parse_raw(text: &str) -> Result<RawManifest> {
    let mut raw = RawManifest::default();
    let mut section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with('[') {
            let name = trimmed.trim_start_matches('[').trim_end_matches(']').trim().to_string();
            section = Some(name);
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            warn!(line = lineno, "manifest line is not a key = value pair, ignoring");
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');

        match section.as_deref() {
            None => match key {
                "moduleName" => raw.module_name = Some(value.to_string()),
                "src_path" => raw.src_path = Some(value.to_string()),
                "target" => raw.target = Some(value.to_string()),
                "cache_dir" => raw.cache_dir = Some(value.to_string()),
                "macro_lib_paths" => raw.macro_lib_paths = split_list(value),
                other => warn!(key = other, "unknown top-level manifest key, ignoring"),
            },
            Some("package_requires") => {
                raw.package_requires.insert(key.to_string(), value.to_string());
            }
            Some("requires") => {
                raw.requires.insert(key.to_string(), split_list(value));
            }
            Some("cfg") => {
                raw.cfg.insert(key.to_string(), value.to_string());
            }
            Some(other) => {
                warn!(section = other, key, "unknown manifest section, ignoring key");
            }
        }
    }

    Ok(raw)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalizes a path to forward-slash separators, case-folded only where the
/// underlying filesystem is case-insensitive (`dunce` gives us the canonical
/// form on Windows without the `\\?\` prefix; elsewhere this is a no-op
/// beyond separator fix-up).
///
/// A path that does not exist yet (e.g. a manifest-declared `cache_dir` that
/// has not been created) cannot be canonicalized, so the fallback below
/// fixes up separators by hand; which fix-up applies is a real platform
/// split, not just a style choice, so it is spelled with `cfg_if!`.
pub fn normalize_path(path: &Path) -> String {
    match dunce::canonicalize(path) {
        Ok(canonical) => canonical.to_slash_lossy().into_owned(),
        Err(_) => fallback_normalize(path),
    }
}

fn fallback_normalize(path: &Path) -> String {
    cfg_if! {
        if #[cfg(windows)] {
            path.to_slash_lossy().into_owned()
        } else {
            path.to_string_lossy().into_owned()
        }
    }
}

/// Computes the expected full package name for `file`, relative to
/// `module_name`/`src_path`. Returns `"default"` if `file` is not under
/// `src_path`.
pub fn full_package_name(module_name: &str, src_path: &Path, file: &Path) -> String {
    let Ok(relative) = file.strip_prefix(src_path) else {
        return "default".to_string();
    };
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    if parent.as_os_str().is_empty() {
        return module_name.to_string();
    }
    let dotted = parent.to_slash_lossy().replace('/', ".");
    format!("{module_name}.{dotted}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_module_name_and_requires() {
        let text = r#"
            moduleName = "m"
            [package_requires]
            other = "../other"
            [cfg]
            debug = "true"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let info = parse_manifest(dir.path(), text).unwrap();
        assert_eq!(info.module_name, "m");
        assert_eq!(info.cjo_requires_map.get("other"), Some(&"../other".to_string()));
        assert_eq!(info.cfg.get("debug"), Some(&"true".to_string()));
    }

    #[test]
    fn missing_module_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_manifest(dir.path(), "src_path = \"src\"").is_err());
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let info = parse_manifest(dir.path(), "moduleName = \"m\"\nfutureFeature = \"x\"").unwrap();
        assert_eq!(info.module_name, "m");
    }

    #[test]
    fn macro_lib_paths_glob_pattern_expands_to_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("macros")).unwrap();
        std::fs::write(dir.path().join("macros/a.so"), b"").unwrap();
        std::fs::write(dir.path().join("macros/b.so"), b"").unwrap();

        let text = "moduleName = \"m\"\nmacro_lib_paths = [\"macros/*.so\"]\n";
        let info = parse_manifest(dir.path(), text).unwrap();
        assert_eq!(info.macro_lib_paths.len(), 2);
    }

    #[test]
    fn macro_lib_paths_without_wildcard_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let text = "moduleName = \"m\"\nmacro_lib_paths = [\"macros/explicit.so\"]\n";
        let info = parse_manifest(dir.path(), text).unwrap();
        assert_eq!(info.macro_lib_paths, vec!["macros/explicit.so".to_string()]);
    }

    #[test]
    fn full_package_name_for_root_and_nested() {
        let src = PathBuf::from("/ws/src");
        assert_eq!(full_package_name("m", &src, &src.join("a.cj")), "m");
        assert_eq!(full_package_name("m", &src, &src.join("util/a.cj")), "m.util");
        assert_eq!(full_package_name("m", &src, Path::new("/elsewhere/a.cj")), "default");
    }
}
