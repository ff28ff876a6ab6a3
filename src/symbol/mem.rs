//! In-memory [`SymbolIndex`] implementation (`MemIndex`).
//!
//! Four maps keyed by package full name, exactly as spec §4.8 describes,
//! plus a couple of derived lookup tables (symbol-by-id, symbol's owning
//! package) rebuilt whenever a shard is replaced so that id-based lookups
//! stay O(1) instead of scanning every package.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use super::index::{
    is_import_visible, ExtendCandidate, FuzzyFindRequest, ImportCandidate, LookupRequest,
    RefsFindReferenceResult, RefsRequest, RelationsRequest, SymbolIndex,
};
use super::{
    CrossSymbol, ExtendItem, PackageShard, Ref, RefKind, Relation, RelationKind, Symbol, SymbolId,
};

#[derive(Default)]
struct Tables {
    shards: BTreeMap<String, PackageShard>,
    symbols_by_id: HashMap<SymbolId, Symbol>,
    owner_package: HashMap<SymbolId, String>,
    owner_module: HashMap<String, String>,
}

/// Fully in-memory, process-lifetime symbol index.
#[derive(Default)]
pub struct MemIndex {
    tables: RwLock<Tables>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the shard for `pkg` atomically, re-deriving the id-based
    /// lookup tables. `owning_module` is recorded so visibility checks
    /// against `allowed_packages`/module-root comparisons work without a
    /// second round-trip to the Module Manager.
    pub fn insert_shard(&self, pkg: &str, owning_module: &str, shard: PackageShard) {
        let mut tables = self.tables.write().expect("index poisoned");

        if let Some(old) = tables.shards.get(pkg) {
            let stale_ids: Vec<SymbolId> = old.symbols.iter().map(|s| s.id).collect();
            for id in stale_ids {
                tables.symbols_by_id.remove(&id);
                tables.owner_package.remove(&id);
            }
        }

        for sym in &shard.symbols {
            tables.symbols_by_id.insert(sym.id, sym.clone());
            tables.owner_package.insert(sym.id, pkg.to_string());
        }
        tables.owner_module.insert(pkg.to_string(), owning_module.to_string());
        tables.shards.insert(pkg.to_string(), shard);
    }

    pub fn remove_package(&self, pkg: &str) {
        let mut tables = self.tables.write().expect("index poisoned");
        if let Some(old) = tables.shards.remove(pkg) {
            for sym in &old.symbols {
                tables.symbols_by_id.remove(&sym.id);
                tables.owner_package.remove(&sym.id);
            }
        }
        tables.owner_module.remove(pkg);
    }

    pub fn package_count(&self) -> usize {
        self.tables.read().expect("index poisoned").shards.len()
    }
}

fn fuzzy_score(query: &str, candidate: &str) -> Option<i32> {
    if query.is_empty() {
        return Some(0);
    }
    let query = query.to_ascii_lowercase();
    let candidate_lower = candidate.to_ascii_lowercase();
    let mut qi = query.chars().peekable();
    let mut score = 0i32;
    let mut last_match: Option<usize> = None;
    for (i, c) in candidate_lower.chars().enumerate() {
        if let Some(&q) = qi.peek() {
            if q == c {
                qi.next();
                score += if candidate_lower.starts_with(&query) { 10 } else { 1 };
                if let Some(last) = last_match {
                    if i == last + 1 {
                        score += 2; // reward contiguous runs
                    }
                }
                last_match = Some(i);
            }
        }
    }
    if qi.peek().is_none() {
        Some(score)
    } else {
        None
    }
}

impl SymbolIndex for MemIndex {
    fn fuzzy_find(&self, req: &FuzzyFindRequest) -> Vec<Symbol> {
        let tables = self.tables.read().expect("index poisoned");
        let mut scored: Vec<(i32, &Symbol)> = tables
            .shards
            .values()
            .flat_map(|shard| shard.symbols.iter())
            .filter_map(|sym| fuzzy_score(&req.query, &sym.name).map(|score| (score, sym)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        let limit = req.limit.unwrap_or(usize::MAX);
        scored.into_iter().take(limit).map(|(_, sym)| sym.clone()).collect()
    }

    fn lookup(&self, req: &LookupRequest) -> Vec<Symbol> {
        let tables = self.tables.read().expect("index poisoned");
        req.ids.iter().filter_map(|id| tables.symbols_by_id.get(id).cloned()).collect()
    }

    fn refs(&self, req: &RefsRequest) -> Vec<Ref> {
        let tables = self.tables.read().expect("index poisoned");
        let ids: HashSet<SymbolId> = req.ids.iter().copied().collect();
        let mut out = Vec::new();
        for shard in tables.shards.values() {
            for id in &ids {
                if let Some(refs) = shard.refs.get(id) {
                    out.extend(refs.iter().filter(|r| matches_filter(r.kind, req.filter)).cloned());
                }
            }
        }
        out
    }

    fn refs_find_reference(&self, req: &RefsRequest) -> RefsFindReferenceResult {
        let tables = self.tables.read().expect("index poisoned");
        let ids: HashSet<SymbolId> = req.ids.iter().copied().collect();
        let mut result = RefsFindReferenceResult::default();
        for shard in tables.shards.values() {
            for id in &ids {
                if let Some(refs) = shard.refs.get(id) {
                    for r in refs {
                        match r.kind {
                            RefKind::Definition => result.definition = Some(r.clone()),
                            RefKind::Reference => result.references.push(r.clone()),
                        }
                    }
                }
            }
        }
        result
    }

    fn callees(&self, pkg: &str, decl_id: SymbolId) -> Vec<(SymbolId, Ref)> {
        let tables = self.tables.read().expect("index poisoned");
        let Some(shard) = tables.shards.get(pkg) else { return Vec::new() };
        let mut out = Vec::new();
        for (&referent, refs) in &shard.refs {
            if referent == decl_id {
                continue;
            }
            for r in refs {
                if r.kind == RefKind::Reference && r.container == decl_id {
                    out.push((referent, r.clone()));
                }
            }
        }
        out
    }

    fn relations(&self, req: &RelationsRequest) -> Vec<Relation> {
        let tables = self.tables.read().expect("index poisoned");
        tables
            .shards
            .values()
            .flat_map(|shard| shard.relations.iter())
            .filter(|rel| rel.subject == req.id && rel.predicate == req.predicate)
            .copied()
            .collect()
    }

    fn relations_into(&self, id: SymbolId, predicate: RelationKind) -> Vec<Relation> {
        let tables = self.tables.read().expect("index poisoned");
        tables
            .shards
            .values()
            .flat_map(|shard| shard.relations.iter())
            .filter(|rel| rel.object == id && rel.predicate == predicate)
            .copied()
            .collect()
    }

    fn find_ridden_up(&self, id: SymbolId) -> (Vec<SymbolId>, Option<SymbolId>) {
        let tables = self.tables.read().expect("index poisoned");
        let mut ids = Vec::new();
        let mut top = None;
        let mut visited = HashSet::new();
        walk_ridden_up(&tables, id, &mut ids, &mut top, &mut visited);
        (ids, top)
    }

    fn find_ridden_down(&self, id: SymbolId) -> Vec<SymbolId> {
        let tables = self.tables.read().expect("index poisoned");
        let mut ids = Vec::new();
        let mut visited = HashSet::new();
        walk_ridden_down(&tables, id, &mut ids, &mut visited);
        ids
    }

    fn get_extends(&self, type_id: SymbolId) -> Vec<ExtendItem> {
        let tables = self.tables.read().expect("index poisoned");
        tables
            .shards
            .values()
            .filter_map(|shard| shard.extends.get(&type_id))
            .flat_map(|items| items.iter().cloned())
            .collect()
    }

    fn find_import_syms_on_completion(
        &self,
        already_present: &[SymbolId],
        import_decl_syms: &[SymbolId],
        current_package: &str,
        current_module: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ImportCandidate> {
        let tables = self.tables.read().expect("index poisoned");
        let present: HashSet<SymbolId> = already_present.iter().copied().collect();
        let imported: HashSet<SymbolId> = import_decl_syms.iter().copied().collect();

        let mut out = Vec::new();
        for (pkg, shard) in &tables.shards {
            if pkg == current_package || !allowed_packages.contains(pkg) {
                continue;
            }
            let owner_module = tables.owner_module.get(pkg).map(String::as_str).unwrap_or("");
            for sym in &shard.symbols {
                if present.contains(&sym.id) || imported.contains(&sym.id) {
                    continue;
                }
                if is_import_visible(sym.modifier, pkg, owner_module, current_package, current_module) {
                    out.push(ImportCandidate { package: pkg.clone(), symbol: sym.clone() });
                }
            }
        }
        out
    }

    fn find_extend_syms_on_completion(
        &self,
        dot_complete_sym: SymbolId,
        visible_members: &[SymbolId],
        current_package: &str,
        current_module: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ExtendCandidate> {
        let tables = self.tables.read().expect("index poisoned");
        let visible: HashSet<SymbolId> = visible_members.iter().copied().collect();
        let items = self.get_extends(dot_complete_sym);

        let mut out = Vec::new();
        for item in items {
            if visible.contains(&item.id) {
                continue;
            }
            let Some(pkg) = tables.owner_package.get(&item.id) else { continue };
            if pkg == current_package || !allowed_packages.contains(pkg) {
                continue;
            }
            let owner_module = tables.owner_module.get(pkg).map(String::as_str).unwrap_or("");
            if !is_import_visible(item.modifier, pkg, owner_module, current_package, current_module) {
                continue;
            }
            if let Some(sym) = tables.symbols_by_id.get(&item.id) {
                out.push(ExtendCandidate {
                    package: pkg.clone(),
                    extended_interface: item.interface_name.clone(),
                    symbol: sym.clone(),
                });
            }
        }
        out
    }

    fn find_import_syms_on_quick_fix(
        &self,
        current_package: &str,
        current_module: &str,
        import_decl_syms: &[SymbolId],
        identifier: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ImportCandidate> {
        let tables = self.tables.read().expect("index poisoned");
        let imported: HashSet<SymbolId> = import_decl_syms.iter().copied().collect();

        let mut out = Vec::new();
        for (pkg, shard) in &tables.shards {
            if pkg == current_package || !allowed_packages.contains(pkg) {
                continue;
            }
            let owner_module = tables.owner_module.get(pkg).map(String::as_str).unwrap_or("");
            for sym in &shard.symbols {
                if sym.name != identifier || imported.contains(&sym.id) {
                    continue;
                }
                if is_import_visible(sym.modifier, pkg, owner_module, current_package, current_module) {
                    out.push(ImportCandidate { package: pkg.clone(), symbol: sym.clone() });
                }
            }
        }
        out
    }

    fn find_cross_symbol_by_name(&self, name: &str) -> Vec<CrossSymbol> {
        let tables = self.tables.read().expect("index poisoned");
        tables
            .shards
            .values()
            .flat_map(|shard| shard.cross_symbols.iter())
            .filter(|cs| cs.name == name)
            .cloned()
            .collect()
    }

    fn find_comment(&self, _id: SymbolId) -> Option<String> {
        // Doc comments are attached by the backend's AST, not by the
        // Symbol Collector; this core has no comment storage of its own and
        // always reports "none", leaving doc lookups to the backend trait.
        None
    }
}

fn matches_filter(kind: RefKind, filter: Option<RefKind>) -> bool {
    match filter {
        None => true,
        Some(f) => f == kind,
    }
}

fn walk_ridden_up(
    tables: &Tables,
    id: SymbolId,
    ids: &mut Vec<SymbolId>,
    top: &mut Option<SymbolId>,
    visited: &mut HashSet<SymbolId>,
) {
    for shard in tables.shards.values() {
        for rel in &shard.relations {
            if rel.predicate == RelationKind::RiddenBy && rel.object == id && visited.insert(rel.subject) {
                ids.push(rel.subject);
                *top = Some(rel.subject);
                walk_ridden_up(tables, rel.subject, ids, top, visited);
            }
        }
    }
}

fn walk_ridden_down(tables: &Tables, id: SymbolId, ids: &mut Vec<SymbolId>, visited: &mut HashSet<SymbolId>) {
    for shard in tables.shards.values() {
        for rel in &shard.relations {
            if rel.predicate == RelationKind::RiddenBy && rel.subject == id && visited.insert(rel.object) {
                ids.push(rel.object);
                walk_ridden_down(tables, rel.object, ids, visited);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{AstKind, Location, Modifier, Position, SymbolLocation};

    fn loc(line: u32) -> SymbolLocation {
        SymbolLocation {
            file: "f.cj".into(),
            range: Location { start: Position { line, column: 0 }, end: Position { line, column: 1 } },
        }
    }

    fn sym(id: SymbolId, name: &str, modifier: Modifier) -> Symbol {
        Symbol {
            id,
            name: name.to_string(),
            scope: String::new(),
            definition: loc(0),
            declaration: loc(0),
            kind: AstKind::Function,
            signature: String::new(),
            return_type: String::new(),
            modifier,
            is_member_param: false,
            is_from_interface_blob: false,
            is_deprecated: false,
            insert_text: name.to_string(),
            owning_module: "m".to_string(),
            enclosing_macro_call: None,
        }
    }

    #[test]
    fn lookup_after_insert() {
        let idx = MemIndex::new();
        let mut shard = PackageShard::default();
        shard.symbols.push(sym(1, "foo", Modifier::Public));
        idx.insert_shard("m.util", "m", shard);

        let found = idx.lookup(&LookupRequest { ids: vec![1] });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "foo");
    }

    #[test]
    fn fuzzy_find_matches_subsequence() {
        let idx = MemIndex::new();
        let mut shard = PackageShard::default();
        shard.symbols.push(sym(1, "foo", Modifier::Public));
        shard.symbols.push(sym(2, "bar", Modifier::Public));
        idx.insert_shard("m", "m", shard);

        let found = idx.fuzzy_find(&FuzzyFindRequest { query: "fo".into(), limit: None });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "foo");
    }

    #[test]
    fn refs_scan_across_packages() {
        let idx = MemIndex::new();
        let mut shard_a = PackageShard::default();
        shard_a.refs.insert(1, vec![Ref { location: loc(0), kind: RefKind::Definition, container: 1, is_from_interface_blob: false }]);
        idx.insert_shard("m", "m", shard_a);

        let mut shard_b = PackageShard::default();
        shard_b.refs.insert(1, vec![Ref { location: loc(5), kind: RefKind::Reference, container: 2, is_from_interface_blob: false }]);
        idx.insert_shard("m.util", "m", shard_b);

        let refs = idx.refs(&RefsRequest { ids: vec![1], filter: None });
        assert_eq!(refs.len(), 2);

        let result = idx.refs_find_reference(&RefsRequest { ids: vec![1], filter: None });
        assert!(result.definition.is_some());
        assert_eq!(result.references.len(), 1);
    }

    #[test]
    fn ridden_chain_traversal() {
        let idx = MemIndex::new();
        let mut shard = PackageShard::default();
        // B overrides A: RiddenBy(subject=A, object=B) per spec wording
        // "parent declaration -> child overriding declaration".
        shard.relations.push(Relation { subject: 10, predicate: RelationKind::RiddenBy, object: 20 });
        shard.relations.push(Relation { subject: 20, predicate: RelationKind::RiddenBy, object: 30 });
        idx.insert_shard("m", "m", shard);

        let (up_ids, top) = idx.find_ridden_up(30);
        assert_eq!(up_ids, vec![20, 10]);
        assert_eq!(top, Some(10));

        let down_ids = idx.find_ridden_down(10);
        assert_eq!(down_ids, vec![20, 30]);
    }

    #[test]
    fn import_visibility_filters_by_allowed_packages() {
        let idx = MemIndex::new();
        let mut shard = PackageShard::default();
        shard.symbols.push(sym(1, "helper", Modifier::Public));
        idx.insert_shard("m.util", "m", shard);

        let none: HashSet<String> = HashSet::new();
        let found = idx.find_import_syms_on_completion(&[], &[], "m.main", "m", &none);
        assert!(found.is_empty(), "package not in allowed set must be filtered out");

        let mut allowed = HashSet::new();
        allowed.insert("m.util".to_string());
        let found = idx.find_import_syms_on_completion(&[], &[], "m.main", "m", &allowed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbol.name, "helper");
    }
}
