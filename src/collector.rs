//! Symbol Collector: walks a compiled package's [`ParsedFile`] forest and
//! produces the [`PackageShard`] the Symbol Index stores.
//!
//! Grounded in the original `CompilerCangjieProject`'s index-building pass
//! (`examples/original_source/cangjie-language-server/src/languageserver/
//! index/`): one `Symbol` per indexable declaration, a `Definition` ref for
//! its own name plus a `Reference` ref for every resolved use, `BaseOf`/
//! `Extend` relations from inheritance clauses, and `RiddenBy` edges wired up
//! after every declaration in the package has been visited once (override
//! matching needs the whole package's symbol table, not just one file's).

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::ast::{DeclNode, ParsedFile};
use crate::symbol::{
    nested_export_identifier, symbol_id, AstKind, ExtendItem, PackageShard, Ref, RefKind,
    Relation, RelationKind, Symbol, SymbolId, SymbolLocation,
};

/// Intermediate record kept per override-capable declaration while walking a
/// package, so the ridden-by pass can run once the whole tree is known.
struct OverrideCandidate {
    id: SymbolId,
    name: String,
    kind: AstKind,
    is_static: bool,
    is_generic: bool,
    param_types: Vec<String>,
    /// Export ids of types this declaration's *container* inherits from —
    /// an override only matches a member on one of these.
    container_inherits: Vec<SymbolId>,
}

#[derive(Default)]
pub struct Collector {
    shard: PackageShard,
    /// All override-capable declarations seen, keyed by their own id, used
    /// to resolve `RiddenBy` after the walk.
    candidates: Vec<OverrideCandidate>,
    /// Declared ids grouped by (container id) for sibling override lookup.
    members_by_container: HashMap<SymbolId, Vec<usize>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the full collection pass over every file of one package and
    /// returns the resulting shard. `package` is the full dotted package
    /// name; it prefixes every `SymbolID` computation performed elsewhere,
    /// but export ids are assumed to already be fully qualified by the
    /// backend.
    pub fn collect(mut self, package: &str, files: &[ParsedFile]) -> PackageShard {
        for file in files {
            self.visit_decls(package, file.path.to_string_lossy().as_ref(), &file.declarations, None, &[]);
        }
        self.wire_ridden_by();
        self.shard
    }

    fn visit_decls(
        &mut self,
        package: &str,
        file: &str,
        decls: &[DeclNode],
        container: Option<SymbolId>,
        container_inherits: &[SymbolId],
    ) {
        for decl in decls {
            self.visit_decl(package, file, decl, container, container_inherits);
        }
    }

    fn visit_decl(
        &mut self,
        package: &str,
        file: &str,
        decl: &DeclNode,
        container: Option<SymbolId>,
        container_inherits: &[SymbolId],
    ) {
        if decl.is_macro_generated {
            trace!(export_id = %decl.export_id, "skipping macro-generated declaration");
            return;
        }
        if !decl.is_indexable() {
            trace!(name = %decl.name, "skipping unindexable declaration (no export id)");
            return;
        }

        let id = symbol_id(&decl.export_id);
        let container_id = container.unwrap_or(id);

        let symbol = Symbol {
            id,
            name: decl.name.clone(),
            scope: scope_of(&decl.export_id, package),
            definition: SymbolLocation { file: file.to_string(), range: decl.definition_range },
            declaration: SymbolLocation { file: file.to_string(), range: decl.declaration_range },
            kind: decl.kind,
            signature: decl.signature.clone(),
            return_type: decl.return_type.clone(),
            modifier: decl.modifier,
            is_member_param: decl.is_member_param,
            is_from_interface_blob: false,
            is_deprecated: decl.is_deprecated,
            insert_text: decl.insert_text.clone(),
            owning_module: String::new(),
            enclosing_macro_call: decl.enclosing_macro_call.map(|range| SymbolLocation { file: file.to_string(), range }),
        };
        self.shard.symbols.push(symbol);

        self.shard.refs.entry(id).or_default().push(Ref {
            location: SymbolLocation { file: file.to_string(), range: decl.definition_range },
            kind: RefKind::Definition,
            container: container_id,
            is_from_interface_blob: false,
        });

        let mut inherited_ids = Vec::new();
        for base_export_id in &decl.inherits {
            let base_id = symbol_id(base_export_id);
            inherited_ids.push(base_id);
            let predicate = if decl.is_extend_block { RelationKind::Extend } else { RelationKind::BaseOf };
            self.shard.relations.push(Relation { subject: id, predicate, object: base_id });
        }

        if decl.is_extend_block {
            if let Some(extended) = &decl.extended_type_export_id {
                let extended_id = symbol_id(extended);
                let interface_name = decl.inherits.first().cloned();
                self.shard.extends.entry(extended_id).or_default().push(ExtendItem {
                    id,
                    modifier: decl.modifier,
                    interface_name,
                });
            }
        }

        for reference in &decl.references {
            if reference.target_export_id.is_empty() {
                continue;
            }
            let target_id = symbol_id(&reference.target_export_id);
            self.shard.refs.entry(target_id).or_default().push(Ref {
                location: SymbolLocation { file: file.to_string(), range: reference.range },
                kind: RefKind::Reference,
                container: container_id,
                is_from_interface_blob: false,
            });
        }

        if matches!(decl.kind, AstKind::Function | AstKind::Property) {
            let idx = self.candidates.len();
            self.candidates.push(OverrideCandidate {
                id,
                name: decl.name.clone(),
                kind: decl.kind,
                is_static: decl.is_static,
                is_generic: decl.is_generic,
                param_types: decl.param_types.clone(),
                container_inherits: container_inherits.to_vec(),
            });
            self.members_by_container.entry(container_id).or_default().push(idx);
        }

        for (i, child) in decl.children.iter().enumerate() {
            let mut child = child.clone();
            if let Some(iface) = decl.extend_interface_per_child.get(i).cloned().flatten() {
                // Record which interface this extend-block member satisfies
                // so the collector's caller (via get_extends) can surface it.
                if !child.inherits.contains(&iface) {
                    child.inherits.push(iface);
                }
            }
            self.visit_decl(package, file, &child, Some(id), &inherited_ids);
        }
    }

    /// Matches every override candidate against the members of its
    /// container's declared bases, transitively, and records a `RiddenBy`
    /// relation edge for each match (subject = base member, object =
    /// overriding member, matching the original's "ridden by" naming — the
    /// base declaration is "ridden by" the override).
    fn wire_ridden_by(&mut self) {
        let mut edges = Vec::new();
        for candidate in &self.candidates {
            if !candidate.is_static {
                for &base_container in &candidate.container_inherits {
                    if let Some(member_indices) = self.members_by_container.get(&base_container) {
                        for &mi in member_indices {
                            let base = &self.candidates[mi];
                            if matches(candidate, base) {
                                edges.push((base.id, candidate.id));
                            }
                        }
                    }
                }
            }
        }
        for (base, overrider) in edges {
            self.shard.relations.push(Relation { subject: base, predicate: RelationKind::RiddenBy, object: overrider });
        }
    }
}

fn matches(a: &OverrideCandidate, b: &OverrideCandidate) -> bool {
    a.name == b.name && a.kind == b.kind && a.is_static == b.is_static && a.is_generic == b.is_generic && a.param_types == b.param_types
}

/// Derives a dotted scope path from an export id by stripping the leading
/// package prefix, e.g. `m.util.Foo.bar` under package `m.util` -> `Foo.bar`.
fn scope_of(export_id: &str, package: &str) -> String {
    export_id
        .strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(export_id)
        .split('$')
        .next()
        .unwrap_or(export_id)
        .to_string()
}

/// Computes the export identifier for a local binding nested inside an
/// already-indexed declaration. Exposed for backends that don't flatten
/// nested names themselves.
pub fn nested_id_for(outer_export_id: &str, local_identifier: &str) -> String {
    nested_export_identifier(outer_export_id, local_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Location, Modifier, Position};
    use std::path::PathBuf;

    fn loc() -> Location {
        Location { start: Position { line: 0, column: 0 }, end: Position { line: 0, column: 1 } }
    }

    fn decl(export_id: &str, name: &str, kind: AstKind) -> DeclNode {
        DeclNode {
            export_id: export_id.into(),
            name: name.into(),
            kind,
            modifier: Modifier::Public,
            definition_range: loc(),
            declaration_range: loc(),
            ..Default::default()
        }
    }

    #[test]
    fn emits_symbol_and_definition_ref() {
        let file = ParsedFile {
            path: PathBuf::from("f.cj"),
            declarations: vec![decl("m.Foo", "Foo", AstKind::Class)],
            imports: vec![],
        };
        let shard = Collector::new().collect("m", &[file]);
        assert_eq!(shard.symbols.len(), 1);
        let id = symbol_id("m.Foo");
        assert_eq!(shard.refs[&id].len(), 1);
        assert_eq!(shard.refs[&id][0].kind, RefKind::Definition);
    }

    #[test]
    fn emits_reference_ref_for_resolved_use() {
        let mut user = decl("m.Bar", "Bar", AstKind::Function);
        user.references.push(crate::ast::RefNode {
            target_export_id: "m.Foo".into(),
            range: loc(),
            kind: crate::ast::RefNodeKind::TypeRef,
        });
        let file = ParsedFile {
            path: PathBuf::from("f.cj"),
            declarations: vec![decl("m.Foo", "Foo", AstKind::Class), user],
            imports: vec![],
        };
        let shard = Collector::new().collect("m", &[file]);
        let foo_id = symbol_id("m.Foo");
        assert_eq!(shard.refs[&foo_id].iter().filter(|r| r.kind == RefKind::Reference).count(), 1);
    }

    #[test]
    fn emits_base_of_relation() {
        let mut derived = decl("m.Derived", "Derived", AstKind::Class);
        derived.inherits.push("m.Base".into());
        let file = ParsedFile {
            path: PathBuf::from("f.cj"),
            declarations: vec![decl("m.Base", "Base", AstKind::Class), derived],
            imports: vec![],
        };
        let shard = Collector::new().collect("m", &[file]);
        let derived_id = symbol_id("m.Derived");
        let base_id = symbol_id("m.Base");
        assert!(shard
            .relations
            .iter()
            .any(|r| r.subject == derived_id && r.predicate == RelationKind::BaseOf && r.object == base_id));
    }

    #[test]
    fn wires_ridden_by_for_matching_override() {
        let mut base_class = decl("m.Base", "Base", AstKind::Class);
        let base_method = decl("m.Base.run", "run", AstKind::Function);
        base_class.children.push(base_method);

        let mut derived_class = decl("m.Derived", "Derived", AstKind::Class);
        derived_class.inherits.push("m.Base".into());
        let mut derived_method = decl("m.Derived.run", "run", AstKind::Function);
        derived_method.is_override = true;
        derived_class.children.push(derived_method);

        let file = ParsedFile {
            path: PathBuf::from("f.cj"),
            declarations: vec![base_class, derived_class],
            imports: vec![],
        };
        let shard = Collector::new().collect("m", &[file]);
        let base_run = symbol_id("m.Base.run");
        let derived_run = symbol_id("m.Derived.run");
        assert!(shard
            .relations
            .iter()
            .any(|r| r.subject == base_run && r.predicate == RelationKind::RiddenBy && r.object == derived_run));
    }

    #[test]
    fn skips_macro_generated_declarations() {
        let mut gen = decl("m.Gen", "Gen", AstKind::Function);
        gen.is_macro_generated = true;
        let file = ParsedFile { path: PathBuf::from("f.cj"), declarations: vec![gen], imports: vec![] };
        let shard = Collector::new().collect("m", &[file]);
        assert!(shard.symbols.is_empty());
    }
}
