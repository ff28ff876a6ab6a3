//! The pluggable seam standing in for the real parser/typechecker.
//!
//! [`CompileBackend`] is deliberately narrow: it only has to turn source
//! text into the [`crate::ast`] shape the Symbol Collector walks, and to
//! serialize/deserialize the "public interface" a downstream package
//! consumes instead of a full re-parse. A production deployment plugs in a
//! real compiler here; [`MockBackend`] is a small, dependency-free stand-in
//! used by this crate's own tests, keeping the actual frontend entirely
//! behind this trait rather than hard-coded into [`crate::engine::WorkspaceEngine`].

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ast::{DeclNode, ParsedFile, RefNode, RefNodeKind};
use crate::symbol::{AstKind, Location, Modifier, Position};

/// Flattened name -> export-id table, built from a package's own forward
/// declarations plus every upstream package's exported interface. Backends
/// use it to resolve a bare identifier use to the `SymbolID`-bearing export
/// identifier of its declaration.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    pub export_id_by_name: HashMap<String, String>,
    pub modifier_by_export_id: HashMap<String, Modifier>,
}

impl NameTable {
    pub fn merge(&mut self, other: &NameTable) {
        self.export_id_by_name.extend(other.export_id_by_name.clone());
        self.modifier_by_export_id.extend(other.modifier_by_export_id.clone());
    }
}

/// A package's serialized public interface: the subset of declared names
/// visible to downstream packages, plus a byte blob two compiles of
/// identical sources will serialize identically (used to detect "did this
/// package's public interface actually change").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceBlob {
    pub exported: Vec<(String, String, ModifierWire)>,
    pub raw: Vec<u8>,
}

/// `Modifier` isn't `Serialize` by way of the index module to keep that
/// module focused; the backend's own wire copy avoids coupling the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierWire {
    Undefined,
    Private,
    Internal,
    Protected,
    Public,
}

impl From<Modifier> for ModifierWire {
    fn from(m: Modifier) -> Self {
        match m {
            Modifier::Undefined => Self::Undefined,
            Modifier::Private => Self::Private,
            Modifier::Internal => Self::Internal,
            Modifier::Protected => Self::Protected,
            Modifier::Public => Self::Public,
        }
    }
}

impl From<ModifierWire> for Modifier {
    fn from(m: ModifierWire) -> Self {
        match m {
            ModifierWire::Undefined => Self::Undefined,
            ModifierWire::Private => Self::Private,
            ModifierWire::Internal => Self::Internal,
            ModifierWire::Protected => Self::Protected,
            ModifierWire::Public => Self::Public,
        }
    }
}

impl InterfaceBlob {
    pub fn to_name_table(&self) -> NameTable {
        let mut table = NameTable::default();
        for (name, export_id, modifier) in &self.exported {
            table.export_id_by_name.insert(name.clone(), export_id.clone());
            table.modifier_by_export_id.insert(export_id.clone(), (*modifier).into());
        }
        table
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("interface blob is always serializable")
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Outcome of compiling one file with a synthetic cursor token inserted,
/// for completion.
pub struct CursorParse {
    pub file: ParsedFile,
    /// Export id the cursor landed inside, if any (used by dot-completion).
    pub enclosing_decl_export_id: Option<String>,
}

pub trait CompileBackend: Send + Sync {
    /// Cheap first pass: just the names this file declares, so a package's
    /// own forward references can resolve before the full parse.
    fn declared_names(&self, path: &Path, contents: &str, package: &str) -> Vec<DeclNode>;

    /// Full parse + reference resolution against the combined name table
    /// (own package forward decls + upstream exports).
    fn parse(&self, path: &Path, contents: &str, package: &str, names: &NameTable) -> ParsedFile;

    /// Parses the single file containing the cursor, optionally with a
    /// synthetic identifier token spliced in at `cursor`.
    fn parse_with_cursor(
        &self,
        path: &Path,
        contents: &str,
        package: &str,
        names: &NameTable,
        cursor: Position,
        synthetic_identifier: Option<&str>,
    ) -> CursorParse;

    fn serialize_interface(&self, files: &[ParsedFile]) -> InterfaceBlob;
}

/// Regex-based stand-in backend. Recognizes a small, deliberately
/// restricted surface (`package`, `import`, `class`/`interface`/`struct`/
/// `enum`/`func`/`let`/`var`, `extend ... <: ...`, `<:` inheritance lists,
/// `open`/`override`, and `public|private|internal|protected` modifiers) —
/// enough to exercise every code path in [`crate::collector`] without
/// pulling in a real grammar.
#[derive(Default, Clone, Copy)]
pub struct MockBackend;

static DECL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?P<modifier>public|private|internal|protected)?\s*
        (?P<open>open\s+)?
        (?P<override>override\s+)?
        (?P<static_>static\s+)?
        (?P<kind>class|interface|struct|enum|func|let|var|type)
        \s+
        (?P<name>[A-Za-z_][A-Za-z0-9_]*)
        (?:\s*<(?P<generic>[^>]*)>)?
        (?:\s*\((?P<params>[^)]*)\))?
        (?:\s*:\s*(?P<ret>[A-Za-z_][A-Za-z0-9_\[\]<>,\s]*))?
        (?:\s*<:\s*(?P<inherits>[A-Za-z_][A-Za-z0-9_,\s.]*))?
        ",
    )
    .unwrap()
});

static EXTEND_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*extend\s+(?P<ty>[A-Za-z_][A-Za-z0-9_]*)\s*<:\s*(?P<iface>[A-Za-z_][A-Za-z0-9_]*)").unwrap());

static IMPORT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*import\s+(?P<pkg>[A-Za-z_][A-Za-z0-9_.]*)").unwrap());

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

fn modifier_of(m: Option<&str>) -> Modifier {
    match m {
        Some("public") => Modifier::Public,
        Some("private") => Modifier::Private,
        Some("internal") => Modifier::Internal,
        Some("protected") => Modifier::Protected,
        _ => Modifier::Undefined,
    }
}

fn kind_of(k: &str) -> AstKind {
    match k {
        "class" => AstKind::Class,
        "interface" => AstKind::Interface,
        "struct" => AstKind::Struct,
        "enum" => AstKind::Enum,
        "func" => AstKind::Function,
        "type" => AstKind::TypeAlias,
        _ => AstKind::Variable,
    }
}

impl MockBackend {
    fn scan_declarations(&self, package: &str, contents: &str) -> Vec<DeclNode> {
        // Containers (class/interface/struct/enum) nest their members as
        // `DeclNode::children` rather than flat siblings, so the Collector's
        // `container_inherits` threading (needed to wire `RiddenBy`) sees the
        // same shape a real parser's AST would produce.
        struct OpenContainer {
            node: DeclNode,
            depth_at_open: usize,
        }

        let mut out = Vec::new();
        let mut stack: Vec<OpenContainer> = Vec::new();
        let mut extend_stack: Option<(String, Option<String>)> = None;
        let mut depth_at_extend_open = 0usize;
        let mut depth = 0usize;

        for (lineno, line) in contents.lines().enumerate() {
            let open_braces = line.matches('{').count();
            let close_braces = line.matches('}').count();
            let depth_before_line = depth;

            if let Some(caps) = EXTEND_LINE.captures(line) {
                let ty = caps.name("ty").unwrap().as_str().to_string();
                let iface = caps.name("iface").map(|m| m.as_str().to_string());
                extend_stack = Some((ty, iface));
                depth_at_extend_open = depth;
            } else if let Some(caps) = DECL_LINE.captures(line) {
                let name = caps.name("name").unwrap().as_str().to_string();
                let kind_str = caps.name("kind").unwrap().as_str();
                let kind = kind_of(kind_str);
                let modifier = modifier_of(caps.name("modifier").map(|m| m.as_str()));
                let is_override = caps.name("override").is_some();
                let is_static = caps.name("static_").is_some();
                let is_generic = caps.name("generic").is_some();
                // Bare names here; `parse` resolves them to full export ids
                // once a `NameTable` is available.
                let inherits: Vec<String> = caps
                    .name("inherits")
                    .map(|m| m.as_str().split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default();
                let param_types: Vec<String> = caps
                    .name("params")
                    .map(|m| {
                        m.as_str()
                            .split(',')
                            .filter(|s| !s.trim().is_empty())
                            .map(|s| s.trim().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                let return_type = caps.name("ret").map(|m| m.as_str().trim().to_string()).unwrap_or_default();

                let export_id = match stack.last() {
                    Some(parent) => format!("{}.{name}", parent.node.export_id),
                    None => format!("{package}.{name}"),
                };
                let range = Location {
                    start: Position { line: lineno as u32, column: 0 },
                    end: Position { line: lineno as u32, column: line.len() as u32 },
                };

                let decl = DeclNode {
                    export_id,
                    name,
                    kind,
                    modifier,
                    signature: line.trim().to_string(),
                    return_type,
                    definition_range: range,
                    declaration_range: range,
                    is_deprecated: line.contains("@Deprecated"),
                    insert_text: kind_str.to_string(),
                    is_member_param: false,
                    inherits,
                    is_extend_block: false,
                    extended_type_export_id: extend_stack.as_ref().map(|(ty, _)| format!("{package}.{ty}")),
                    extend_interface_per_child: Vec::new(),
                    is_override,
                    is_static,
                    is_generic,
                    param_types,
                    references: Vec::new(),
                    children: Vec::new(),
                    is_macro_generated: false,
                    enclosing_macro_call: None,
                };

                if matches!(kind, AstKind::Class | AstKind::Interface | AstKind::Struct | AstKind::Enum) && open_braces > 0 {
                    stack.push(OpenContainer { node: decl, depth_at_open: depth_before_line });
                } else if let Some(parent) = stack.last_mut() {
                    parent.node.children.push(decl);
                } else {
                    out.push(decl);
                }
            }

            depth += open_braces;
            depth = depth.saturating_sub(close_braces);
            if extend_stack.is_some() && depth <= depth_at_extend_open && (open_braces > 0 || close_braces > 0) && close_braces > open_braces {
                extend_stack = None;
            }

            while let Some(top) = stack.last() {
                if depth <= top.depth_at_open && close_braces > open_braces {
                    let finished = stack.pop().expect("stack.last() just confirmed Some");
                    match stack.last_mut() {
                        Some(parent) => parent.node.children.push(finished.node),
                        None => out.push(finished.node),
                    }
                } else {
                    break;
                }
            }
        }

        // Malformed/truncated input: flush any containers left open at EOF
        // rather than silently dropping their members.
        while let Some(finished) = stack.pop() {
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(finished.node),
                None => out.push(finished.node),
            }
        }

        out
    }
}

impl CompileBackend for MockBackend {
    fn declared_names(&self, _path: &Path, contents: &str, package: &str) -> Vec<DeclNode> {
        self.scan_declarations(package, contents)
    }

    fn parse(&self, path: &Path, contents: &str, package: &str, names: &NameTable) -> ParsedFile {
        let mut decls = self.scan_declarations(package, contents);
        let imports: Vec<String> = contents
            .lines()
            .filter_map(|l| IMPORT_LINE.captures(l))
            .map(|c| c.name("pkg").unwrap().as_str().to_string())
            .collect();

        for decl in &mut decls {
            resolve_decl(decl, package, names);
        }

        ParsedFile { path: path.to_path_buf(), declarations: decls, imports }
    }

    fn parse_with_cursor(
        &self,
        path: &Path,
        contents: &str,
        package: &str,
        names: &NameTable,
        cursor: Position,
        synthetic_identifier: Option<&str>,
    ) -> CursorParse {
        let mut patched = contents.to_string();
        if let Some(tok) = synthetic_identifier {
            if let Some(line) = patched.lines().nth(cursor.line as usize) {
                let mut new_line = line.to_string();
                let at = (cursor.column as usize).min(new_line.len());
                new_line.insert_str(at, tok);
                let lines: Vec<&str> = patched.lines().collect();
                let mut rebuilt = String::new();
                for (i, l) in lines.iter().enumerate() {
                    if i as u32 == cursor.line {
                        rebuilt.push_str(&new_line);
                    } else {
                        rebuilt.push_str(l);
                    }
                    rebuilt.push('\n');
                }
                patched = rebuilt;
            }
        }

        let file = self.parse(path, &patched, package, names);
        let enclosing = file
            .declarations
            .iter()
            .find(|d| d.declaration_range.start.line <= cursor.line && d.declaration_range.end.line >= cursor.line)
            .map(|d| d.export_id.clone());

        CursorParse { file, enclosing_decl_export_id: enclosing }
    }

    fn serialize_interface(&self, files: &[ParsedFile]) -> InterfaceBlob {
        let mut exported = Vec::new();
        for file in files {
            for decl in &file.declarations {
                if decl.modifier == Modifier::Private || decl.name.is_empty() {
                    continue;
                }
                exported.push((decl.name.clone(), decl.export_id.clone(), decl.modifier.into()));
            }
        }
        exported.sort();
        exported.dedup();
        let raw = serde_json::to_vec(&exported).expect("exported table always serializes");
        InterfaceBlob { exported, raw }
    }
}

/// Resolves the bare names a [`DeclNode`] only had the text for at scan
/// time (inheritance clauses, parameter types, the return type) against the
/// combined name table, recording each resolution as a [`RefNode`] the
/// collector turns into a `Reference` [`crate::symbol::Ref`] and, for
/// `inherits`, rewriting the entry itself to the resolved export id so the
/// collector's `base-of`/`ridden-by` wiring doesn't need its own lookup.
fn resolve_decl(decl: &mut DeclNode, package: &str, names: &NameTable) {
    let resolve_one = |name: &str| -> String {
        names.export_id_by_name.get(name).cloned().unwrap_or_else(|| format!("{package}.{name}"))
    };

    for inherited in &mut decl.inherits {
        let resolved = resolve_one(inherited);
        decl.references.push(RefNode {
            target_export_id: resolved.clone(),
            range: decl.declaration_range,
            kind: RefNodeKind::TypeRef,
        });
        *inherited = resolved;
    }

    let mut resolve_type_text = |text: &str, decl_references: &mut Vec<RefNode>, range: Location| {
        for m in IDENT.find_iter(text) {
            let word = m.as_str();
            if is_keyword(word) || !names.export_id_by_name.contains_key(word) {
                continue;
            }
            decl_references.push(RefNode {
                target_export_id: resolve_one(word),
                range,
                kind: RefNodeKind::TypeRef,
            });
        }
    };
    resolve_type_text(&decl.return_type.clone(), &mut decl.references, decl.definition_range);
    for param in decl.param_types.clone() {
        resolve_type_text(&param, &mut decl.references, decl.definition_range);
    }

    for child in &mut decl.children {
        resolve_decl(child, package, names);
    }
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "public"
            | "private"
            | "internal"
            | "protected"
            | "open"
            | "override"
            | "static"
            | "class"
            | "interface"
            | "struct"
            | "enum"
            | "func"
            | "let"
            | "var"
            | "type"
            | "extend"
            | "import"
            | "package"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_simple_class() {
        let backend = MockBackend;
        let src = "public class Foo {\n}\n";
        let decls = backend.scan_declarations("m", src);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "Foo");
        assert_eq!(decls[0].export_id, "m.Foo");
        assert_eq!(decls[0].modifier, Modifier::Public);
    }

    #[test]
    fn scans_inheritance_clause() {
        let backend = MockBackend;
        let src = "public class Derived <: Base {\n}\n";
        let decls = backend.scan_declarations("m", src);
        assert_eq!(decls[0].inherits, vec!["Base".to_string()]);
    }

    #[test]
    fn resolves_inheritance_reference() {
        let backend = MockBackend;
        let mut names = NameTable::default();
        names.export_id_by_name.insert("Base".into(), "m.Base".into());

        let file = backend.parse(Path::new("d.cj"), "public class Derived <: Base {\n}\n", "m", &names);
        let derived = file.declarations.iter().find(|d| d.name == "Derived").unwrap();
        assert!(derived.references.iter().any(|r| r.target_export_id == "m.Base"));
    }

    #[test]
    fn imports_are_collected() {
        let backend = MockBackend;
        let names = NameTable::default();
        let file = backend.parse(Path::new("d.cj"), "import m.util\npublic class Foo {\n}\n", "m", &names);
        assert_eq!(file.imports, vec!["m.util".to_string()]);
    }
}
