//! Sled-backed [`SymbolIndex`] implementation, persisting shards across
//! sessions the way the in-memory-only [`super::mem::MemIndex`] cannot.
//!
//! This stands in for the relational `IndexDatabase` described in spec §3/
//! §6 (`files`, `symbols`, `refs`, `relations`, `extends`, `crossSymbols`,
//! `comments`, `config` "tables"). The teacher's own dependency stack has no
//! embedded-SQL crate; `sled` is the nearest real crate the broader example
//! pack reaches for to back a per-workspace persisted index (see
//! `examples/other_examples/a7fd15d5_probelabs-probe__lsp-daemon-…`'s
//! sled-per-workspace cache), so each spec "table" becomes a sled tree
//! keyed by package full name and holding a JSON-serialized shard/column.
//! Query serving still goes through an in-memory mirror — sled gives
//! durability, not query performance.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::symbol::index::{
    ExtendCandidate, FuzzyFindRequest, ImportCandidate, LookupRequest, RefsFindReferenceResult,
    RefsRequest, RelationsRequest, SymbolIndex,
};
use crate::symbol::mem::MemIndex;
use crate::symbol::{CrossSymbol, ExtendItem, PackageShard, Ref, Relation, Symbol, SymbolId};

const SHARDS_TREE: &str = "shards";
const MODULES_TREE: &str = "owning_modules";

/// Persisted symbol index. Every mutation is written through to `sled`
/// before the in-memory mirror is updated, so a crash leaves the on-disk
/// store no further ahead of what queries have observed.
pub struct IndexDatabase {
    db: sled::Db,
    mem: MemIndex,
}

impl IndexDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| CoreError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let mem = MemIndex::new();

        let shards = db.open_tree(SHARDS_TREE).map_err(sled_err(path))?;
        let modules = db.open_tree(MODULES_TREE).map_err(sled_err(path))?;
        for entry in shards.iter() {
            let (key, value) = entry.map_err(sled_err(path))?;
            let pkg = String::from_utf8_lossy(&key).into_owned();
            let shard: PackageShard = serde_json::from_slice(&value)?;
            let owning_module = modules
                .get(&key)
                .ok()
                .flatten()
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_default();
            mem.insert_shard(&pkg, &owning_module, shard);
        }

        Ok(Self { db, mem })
    }

    pub fn insert_shard(&self, pkg: &str, owning_module: &str, shard: PackageShard) -> Result<()> {
        let shards = self.db.open_tree(SHARDS_TREE).map_err(sled_err(""))?;
        let modules = self.db.open_tree(MODULES_TREE).map_err(sled_err(""))?;
        let bytes = serde_json::to_vec(&shard)?;
        shards.insert(pkg.as_bytes(), bytes).map_err(sled_err(""))?;
        modules.insert(pkg.as_bytes(), owning_module.as_bytes()).map_err(sled_err(""))?;
        self.db.flush().map_err(sled_err(""))?;
        self.mem.insert_shard(pkg, owning_module, shard);
        Ok(())
    }

    pub fn remove_package(&self, pkg: &str) -> Result<()> {
        let shards = self.db.open_tree(SHARDS_TREE).map_err(sled_err(""))?;
        let modules = self.db.open_tree(MODULES_TREE).map_err(sled_err(""))?;
        shards.remove(pkg.as_bytes()).map_err(sled_err(""))?;
        modules.remove(pkg.as_bytes()).map_err(sled_err(""))?;
        self.mem.remove_package(pkg);
        Ok(())
    }
}

fn sled_err(path: impl AsRef<Path>) -> impl Fn(sled::Error) -> CoreError {
    let path = path.as_ref().to_path_buf();
    move |e| CoreError::io(path.clone(), std::io::Error::new(std::io::ErrorKind::Other, e))
}

impl SymbolIndex for IndexDatabase {
    fn fuzzy_find(&self, req: &FuzzyFindRequest) -> Vec<Symbol> {
        self.mem.fuzzy_find(req)
    }

    fn lookup(&self, req: &LookupRequest) -> Vec<Symbol> {
        self.mem.lookup(req)
    }

    fn refs(&self, req: &RefsRequest) -> Vec<Ref> {
        self.mem.refs(req)
    }

    fn refs_find_reference(&self, req: &RefsRequest) -> RefsFindReferenceResult {
        self.mem.refs_find_reference(req)
    }

    fn callees(&self, pkg: &str, decl_id: SymbolId) -> Vec<(SymbolId, Ref)> {
        self.mem.callees(pkg, decl_id)
    }

    fn relations(&self, req: &RelationsRequest) -> Vec<Relation> {
        self.mem.relations(req)
    }

    fn relations_into(&self, id: SymbolId, predicate: crate::symbol::RelationKind) -> Vec<Relation> {
        self.mem.relations_into(id, predicate)
    }

    fn find_ridden_up(&self, id: SymbolId) -> (Vec<SymbolId>, Option<SymbolId>) {
        self.mem.find_ridden_up(id)
    }

    fn find_ridden_down(&self, id: SymbolId) -> Vec<SymbolId> {
        self.mem.find_ridden_down(id)
    }

    fn get_extends(&self, type_id: SymbolId) -> Vec<ExtendItem> {
        self.mem.get_extends(type_id)
    }

    fn find_import_syms_on_completion(
        &self,
        already_present: &[SymbolId],
        import_decl_syms: &[SymbolId],
        current_package: &str,
        current_module: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ImportCandidate> {
        self.mem.find_import_syms_on_completion(
            already_present,
            import_decl_syms,
            current_package,
            current_module,
            allowed_packages,
        )
    }

    fn find_extend_syms_on_completion(
        &self,
        dot_complete_sym: SymbolId,
        visible_members: &[SymbolId],
        current_package: &str,
        current_module: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ExtendCandidate> {
        self.mem.find_extend_syms_on_completion(
            dot_complete_sym,
            visible_members,
            current_package,
            current_module,
            allowed_packages,
        )
    }

    fn find_import_syms_on_quick_fix(
        &self,
        current_package: &str,
        current_module: &str,
        import_decl_syms: &[SymbolId],
        identifier: &str,
        allowed_packages: &HashSet<String>,
    ) -> Vec<ImportCandidate> {
        self.mem.find_import_syms_on_quick_fix(
            current_package,
            current_module,
            import_decl_syms,
            identifier,
            allowed_packages,
        )
    }

    fn find_cross_symbol_by_name(&self, name: &str) -> Vec<CrossSymbol> {
        self.mem.find_cross_symbol_by_name(name)
    }

    fn find_comment(&self, id: SymbolId) -> Option<String> {
        self.mem.find_comment(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::index::LookupRequest;
    use crate::symbol::{AstKind, Location, Modifier, Position, SymbolLocation};

    fn sym(id: SymbolId) -> Symbol {
        Symbol {
            id,
            name: "foo".into(),
            scope: String::new(),
            definition: SymbolLocation {
                file: "f.cj".into(),
                range: Location { start: Position { line: 0, column: 0 }, end: Position { line: 0, column: 1 } },
            },
            declaration: SymbolLocation {
                file: "f.cj".into(),
                range: Location { start: Position { line: 0, column: 0 }, end: Position { line: 0, column: 1 } },
            },
            kind: AstKind::Function,
            signature: String::new(),
            return_type: String::new(),
            modifier: Modifier::Public,
            is_member_param: false,
            is_from_interface_blob: false,
            is_deprecated: false,
            insert_text: "foo".into(),
            owning_module: "m".into(),
            enclosing_macro_call: None,
        }
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = IndexDatabase::open(dir.path()).unwrap();
            let mut shard = PackageShard::default();
            shard.symbols.push(sym(1));
            db.insert_shard("m.util", "m", shard).unwrap();
        }
        let db = IndexDatabase::open(dir.path()).unwrap();
        let found = db.lookup(&LookupRequest { ids: vec![1] });
        assert_eq!(found.len(), 1);
    }
}
