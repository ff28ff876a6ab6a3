//! Core index types: symbols, references, relations, extensions, and the
//! per-package shard that bundles them.

pub mod index;
pub mod mem;
#[cfg(feature = "persistent-index")]
pub mod db;

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Stable 64-bit identifier for a declaration, derived from its export
/// identifier (see [`symbol_id`]).
pub type SymbolId = u64;

/// Sentinel for declarations that cannot be indexed (empty export
/// identifier — a purely local, non-lambda binding).
pub const INVALID_SYMBOL_ID: SymbolId = 0;

/// Hashes an export identifier into a [`SymbolId`].
///
/// Two recompilations of an unchanged source file must produce identical
/// ids for the same declaration (spec Property P6); this holds as long as
/// the export identifier string itself is stable, which is the backend's
/// responsibility. Local lambdas and parameters are expected to already be
/// encoded by the caller as `<outer-export-id>$<identifier>`.
pub fn symbol_id(export_identifier: &str) -> SymbolId {
    if export_identifier.is_empty() {
        return INVALID_SYMBOL_ID;
    }
    // FNV-1a: fast, deterministic across processes and platforms, and
    // dependency-free — unlike `DefaultHasher` its output is not
    // randomized per-process, which matters here since ids are persisted
    // to disk and compared across compiler runs.
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in export_identifier.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    if hash == INVALID_SYMBOL_ID {
        // Vanishingly unlikely, but INVALID_SYMBOL_ID is reserved.
        hash = 1;
    }
    hash
}

/// Builds the compound export identifier used for a local lambda or a
/// member parameter nested inside `outer`.
pub fn nested_export_identifier(outer_export_id: &str, local_identifier: &str) -> String {
    format!("{outer_export_id}${local_identifier}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub file: String,
    pub range: Location,
}

impl SymbolLocation {
    pub fn is_zero(&self) -> bool {
        let z = Position { line: 0, column: 0 };
        self.range.start == z && self.range.end == z
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AstKind {
    Class,
    Interface,
    Struct,
    Enum,
    #[default]
    Function,
    Variable,
    Property,
    Parameter,
    TypeAlias,
    Macro,
    Package,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Modifier {
    #[default]
    Undefined,
    Private,
    Internal,
    Protected,
    Public,
}

/// A single declaration in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Dotted path within the owning package, e.g. `Outer.inner`.
    pub scope: String,
    pub definition: SymbolLocation,
    pub declaration: SymbolLocation,
    pub kind: AstKind,
    pub signature: String,
    pub return_type: String,
    pub modifier: Modifier,
    pub is_member_param: bool,
    pub is_from_interface_blob: bool,
    pub is_deprecated: bool,
    pub insert_text: String,
    pub owning_module: String,
    pub enclosing_macro_call: Option<SymbolLocation>,
}

impl Symbol {
    pub fn is_invalid(&self) -> bool {
        self.id == INVALID_SYMBOL_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Definition,
    Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ref {
    pub location: SymbolLocation,
    pub kind: RefKind,
    pub container: SymbolId,
    pub is_from_interface_blob: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    BaseOf,
    RiddenBy,
    Extend,
    CalledBy,
    ContainedBy,
    Overrides,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Relation {
    pub subject: SymbolId,
    pub predicate: RelationKind,
    pub object: SymbolId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendItem {
    pub id: SymbolId,
    pub modifier: Modifier,
    pub interface_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossType {
    ExportedToC,
    ImportedFromC,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossSymbol {
    pub id: SymbolId,
    pub name: String,
    pub definition: SymbolLocation,
    pub declaration: SymbolLocation,
    pub cross_type: CrossType,
}

pub type SymbolSlab = Vec<Symbol>;
pub type RefSlab = std::collections::BTreeMap<SymbolId, Vec<Ref>>;
pub type RelationSlab = Vec<Relation>;
pub type ExtendSlab = std::collections::BTreeMap<SymbolId, Vec<ExtendItem>>;
pub type CrossSymbolSlab = Vec<CrossSymbol>;

/// Everything the Symbol Collector produces for one compiled package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageShard {
    pub symbols: SymbolSlab,
    pub refs: RefSlab,
    pub relations: RelationSlab,
    pub extends: ExtendSlab,
    pub cross_symbols: CrossSymbolSlab,
}

impl PackageShard {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
            && self.refs.is_empty()
            && self.relations.is_empty()
            && self.extends.is_empty()
            && self.cross_symbols.is_empty()
    }
}

/// Content hash of a shard, used only to detect no-op rewrites in tests;
/// not part of the on-disk format.
pub fn shard_fingerprint(shard: &PackageShard) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    shard.symbols.len().hash(&mut hasher);
    shard.refs.len().hash(&mut hasher);
    shard.relations.len().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_is_deterministic() {
        assert_eq!(symbol_id("pkg.Foo.bar"), symbol_id("pkg.Foo.bar"));
        assert_ne!(symbol_id("pkg.Foo.bar"), symbol_id("pkg.Foo.baz"));
    }

    #[test]
    fn empty_export_id_is_invalid() {
        assert_eq!(symbol_id(""), INVALID_SYMBOL_ID);
    }

    #[test]
    fn nested_ids_are_namespaced_by_outer() {
        let outer_a = nested_export_identifier("pkg.f", "x");
        let outer_b = nested_export_identifier("pkg.g", "x");
        assert_ne!(symbol_id(&outer_a), symbol_id(&outer_b));
    }
}
