//! The minimal declaration/reference model the Symbol Collector walks.
//!
//! The real parser/typechecker is an external library the core drives; this
//! module is the seam — it is deliberately the *smallest* shape that lets
//! [`crate::collector`] implement its symbol/reference/relation walk
//! without inventing a full compiler front end. A real backend
//! implementation would translate its own AST into this shape; the
//! [`crate::backend::MockBackend`] shipped here does the same thing with a
//! few text heuristics, for tests.

use std::path::PathBuf;

use crate::symbol::{AstKind, Location, Modifier};

/// One parsed source file, already split into a flat forest of
/// declarations. Mirrors how a typechecked translation unit would be
/// handed to the Symbol Collector.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub declarations: Vec<DeclNode>,
    /// Full names of packages this file's `import` statements resolved to.
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefNodeKind {
    NameUse,
    TypeRef,
    NamedArgLabel,
    MacroTarget,
}

/// A use of some other declaration, found inside a decl's body/signature.
#[derive(Debug, Clone)]
pub struct RefNode {
    /// Export identifier of the *referent* — what SymbolID is computed
    /// from. Empty if the reference could not be resolved (dangling import,
    /// unresolved name); unresolved references are skipped by the collector.
    pub target_export_id: String,
    pub range: Location,
    pub kind: RefNodeKind,
}

/// One declaration: a class/interface/struct/enum/function/variable/
/// property/parameter/type-alias/macro, or a package-level `extend` block.
#[derive(Debug, Clone, Default)]
pub struct DeclNode {
    /// Empty for purely-local, non-lambda bindings — these are unindexable
    /// and the collector skips them.
    pub export_id: String,
    pub name: String,
    pub kind: AstKind,
    pub modifier: Modifier,
    pub signature: String,
    pub return_type: String,
    pub definition_range: Location,
    pub declaration_range: Location,
    pub is_deprecated: bool,
    pub insert_text: String,
    pub is_member_param: bool,

    /// Export ids of declarations this one inherits/implements (`A <: B,
    /// C`). Emits `base-of` relations, or `extend` if `is_extend_block`.
    pub inherits: Vec<String>,
    pub is_extend_block: bool,
    /// For an `extend` block: export id of the type being extended.
    pub extended_type_export_id: Option<String>,
    /// For an `extend` block: the interface (if any) each contributed
    /// member implements, indexed in parallel with `children`.
    pub extend_interface_per_child: Vec<Option<String>>,

    /// Explicit override marker — used by the ridden-by matcher as a strong
    /// signal alongside structural matching.
    pub is_override: bool,
    pub is_static: bool,
    pub is_generic: bool,
    /// Simplified parameter type strings, used for override matching.
    pub param_types: Vec<String>,

    pub references: Vec<RefNode>,
    pub children: Vec<DeclNode>,
    /// True for declarations introduced purely by macro expansion — the
    /// collector's cross-symbol path handles these separately and the
    /// ordinary symbol/ref/relation walk skips them.
    pub is_macro_generated: bool,
    pub enclosing_macro_call: Option<Location>,
}

impl DeclNode {
    pub fn is_indexable(&self) -> bool {
        !self.export_id.is_empty()
    }
}
