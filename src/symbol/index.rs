//! The [`SymbolIndex`] trait: the query surface shared by the in-memory
//! implementation ([`super::mem::MemIndex`]) and, behind the
//! `persistent-index` feature, the sled-backed implementation
//! ([`super::db::IndexDatabase`]).
//!
//! Modeled on the original `SymbolIndex`/`MemIndex` split, translated from
//! its callback-based C++ API to plain return values, which is the more
//! idiomatic shape for a Rust trait object boundary.

use std::collections::HashSet;

use auto_impl::auto_impl;

use super::{CrossSymbol, ExtendItem, Modifier, Ref, RefKind, Relation, RelationKind, Symbol, SymbolId};

pub struct FuzzyFindRequest {
    pub query: String,
    pub limit: Option<usize>,
}

pub struct LookupRequest {
    pub ids: Vec<SymbolId>,
}

pub struct RefsRequest {
    pub ids: Vec<SymbolId>,
    pub filter: Option<RefKind>,
}

pub struct RelationsRequest {
    pub id: SymbolId,
    pub predicate: RelationKind,
}

/// Result of [`SymbolIndex::refs_find_reference`]: the unique definition
/// plus the list of use-site references, kept apart because find-references
/// callers usually want to highlight the definition differently.
#[derive(Default)]
pub struct RefsFindReferenceResult {
    pub definition: Option<Ref>,
    pub references: Vec<Ref>,
}

/// An import-visible symbol paired with the package it was found in —
/// `findImportSymsOn*` in the original always needs both.
pub struct ImportCandidate {
    pub package: String,
    pub symbol: Symbol,
}

/// Same as [`ImportCandidate`] but additionally scoped to an extended type
/// and the interface (if any) that contributed the member.
pub struct ExtendCandidate {
    pub package: String,
    pub extended_interface: Option<String>,
    pub symbol: Symbol,
}

/// Query surface implemented by every symbol-index backend.
///
/// `#[auto_impl(Box, Arc)]` lets callers hold a `Box<dyn SymbolIndex>` or
/// `Arc<dyn SymbolIndex>` and still call these methods directly, matching
/// the blanket-impl convention the pack's `Compiler`/`CompilerInput` traits
/// use via the same crate.
#[auto_impl(Box, Arc)]
pub trait SymbolIndex: Send + Sync {
    fn fuzzy_find(&self, req: &FuzzyFindRequest) -> Vec<Symbol>;

    fn lookup(&self, req: &LookupRequest) -> Vec<Symbol>;

    fn refs(&self, req: &RefsRequest) -> Vec<Ref>;

    /// Like [`Self::refs`] but splits out the unique `Definition` ref from
    /// the `Reference` list.
    fn refs_find_reference(&self, req: &RefsRequest) -> RefsFindReferenceResult;

    fn callees(&self, pkg: &str, decl_id: SymbolId) -> Vec<(SymbolId, Ref)>;

    fn relations(&self, req: &RelationsRequest) -> Vec<Relation>;

    /// The reverse of [`Self::relations`]: every relation whose *object* is
    /// `id` rather than its subject. Type-hierarchy "subtypes" needs this
    /// direction (walking from a base type to every type that names it in
    /// a `<:` clause), which `relations` alone cannot answer.
    fn relations_into(&self, id: SymbolId, predicate: RelationKind) -> Vec<Relation>;

    /// Walks `RiddenBy` edges upward (from an overriding/implementing
    /// declaration toward the declaration(s) it overrides), returning every
    /// ancestor id reached and the id closest to the top of the chain.
    fn find_ridden_up(&self, id: SymbolId) -> (Vec<SymbolId>, Option<SymbolId>);

    /// Walks `RiddenBy` edges downward (from a base declaration toward every
    /// declaration that overrides/implements it, transitively).
    fn find_ridden_down(&self, id: SymbolId) -> Vec<SymbolId>;

    fn get_extends(&self, type_id: SymbolId) -> Vec<ExtendItem>;

    /// Import-aware completion candidates visible from `current_package`
    /// (in `current_module`) that are not already present among
    /// `already_present`, applying the visibility rule from spec §4.8.
    ///
    /// `allowed_packages` is the current module's direct-dependency package
    /// set (supplied by the caller, which owns the Module Manager and
    /// Dependency Graph); any candidate outside it is filtered out entirely.
    #[allow(clippy::too_many_arguments)]
    fn find_import_syms_on_completion(
        &self,
        already_present: &[SymbolId],
        import_decl_syms: &[SymbolId],
        current_package: &str,
        current_module: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ImportCandidate>;

    #[allow(clippy::too_many_arguments)]
    fn find_extend_syms_on_completion(
        &self,
        dot_complete_sym: SymbolId,
        visible_members: &[SymbolId],
        current_package: &str,
        current_module: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ExtendCandidate>;

    #[allow(clippy::too_many_arguments)]
    fn find_import_syms_on_quick_fix(
        &self,
        current_package: &str,
        current_module: &str,
        import_decl_syms: &[SymbolId],
        identifier: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ImportCandidate>;

    fn find_cross_symbol_by_name(&self, name: &str) -> Vec<CrossSymbol>;

    fn find_comment(&self, id: SymbolId) -> Option<String>;
}

/// Shared visibility predicate used by every `find_import_syms_on_*`
/// implementation (spec §4.8's "Completion-import visibility rule").
pub(crate) fn is_import_visible(
    modifier: Modifier,
    owner_package: &str,
    owner_module_root: &str,
    current_package: &str,
    current_module_root: &str,
) -> bool {
    match modifier {
        Modifier::Public => true,
        Modifier::Internal => is_package_prefix(owner_package, current_package),
        Modifier::Protected => {
            is_package_prefix(owner_package, current_package)
                || is_package_prefix(current_package, owner_package)
                || owner_module_root == current_module_root
        }
        Modifier::Private | Modifier::Undefined => false,
    }
}

/// True if `ancestor` is `descendant` itself or a dotted prefix of it, e.g.
/// `m` is an ancestor of `m.util` and of `m` itself.
fn is_package_prefix(ancestor: &str, descendant: &str) -> bool {
    if ancestor == descendant {
        return true;
    }
    descendant.strip_prefix(ancestor).map(|rest| rest.starts_with('.')).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_is_always_visible() {
        assert!(is_import_visible(Modifier::Public, "m.a", "m", "m.b", "m"));
        assert!(is_import_visible(Modifier::Public, "m.a", "m", "other", "other"));
    }

    #[test]
    fn internal_requires_ancestor_package() {
        assert!(is_import_visible(Modifier::Internal, "m", "m", "m.util", "m"));
        assert!(!is_import_visible(Modifier::Internal, "m.util", "m", "m", "m"));
        assert!(!is_import_visible(Modifier::Internal, "m.a", "m", "m.b", "m"));
    }

    #[test]
    fn protected_allows_same_module_root() {
        assert!(is_import_visible(Modifier::Protected, "m.a", "m", "m.b", "m"));
        assert!(!is_import_visible(Modifier::Protected, "m.a", "m", "other.b", "other"));
    }

    #[test]
    fn private_is_never_visible() {
        assert!(!is_import_visible(Modifier::Private, "m", "m", "m", "m"));
    }
}
