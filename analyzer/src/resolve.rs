// resolve.rs: Scope resolution for block-diagram programs
//
// Walks the parsed AST, binds every definition, formal parameter and `with`
// local in a scope arena, and resolves each identifier reference against the
// scope chain, the builtin table and the imported libraries.
//
// Preconditions: `program` is an AST from the parser (possibly containing
//                `Invalid` bodies). `dictionary` describes importable libraries.
// Postconditions: returns resolution tables plus all accumulated diagnostics.
// Failure modes: unknown names, unknown imports and duplicate definitions
//                produce `Diagnostic` entries. Resolution continues past errors.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};

use crate::ast::*;
use crate::diag::{DiagKind, Diagnostic};
use crate::dimension::Dimension;
use crate::id::{DefId, IdAllocator, ScopeId, SymbolId};
use crate::registry::{
    self, Builtin, BuiltinClass, ImportDictionary, STANDARD_LIBRARY, BUILTINS,
};
use crate::suggest;

// ── Public types ────────────────────────────────────────────────────────────

/// Result of scope resolution.
#[derive(Debug)]
pub struct ResolveResult {
    pub resolved: ResolvedProgram,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolution tables produced by scope resolution.
/// Downstream stages use these alongside the original AST.
#[derive(Debug)]
pub struct ResolvedProgram {
    /// Scope arena; `ScopeId(0)` is the global scope.
    pub scopes: Vec<Scope>,
    /// Symbol arena.
    pub symbols: Vec<Symbol>,
    /// Identifier node span (or call callee span) → bound symbol.
    pub references: HashMap<Span, SymbolId>,
    /// Definition name span → definition.
    pub definitions: HashMap<Span, DefId>,
    /// Indexed by `DefId`.
    pub defs: Vec<DefEntry>,
    /// Libraries successfully imported, in import order.
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Formal parameters of a definition.
    Params(DefId),
    /// Locals of one `with` block.
    With,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub bindings: HashMap<String, SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Primitive(&'static Builtin),
    UserDefined {
        def: DefId,
        name: String,
        params: usize,
        site: Span,
    },
    Imported {
        name: String,
        library: String,
        arity: Dimension,
        stateful: bool,
    },
    Parameter {
        owner: DefId,
        index: usize,
        name: String,
        site: Span,
    },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Primitive(builtin) => builtin.name,
            Symbol::UserDefined { name, .. }
            | Symbol::Imported { name, .. }
            | Symbol::Parameter { name, .. } => name,
        }
    }

    /// Arity known without analysis; `None` for user definitions,
    /// parameters and UI groups (computed by the dimension analyzer).
    pub fn arity(&self) -> Option<Dimension> {
        match self {
            Symbol::Primitive(b) if b.class == BuiltinClass::UiGroup => None,
            Symbol::Primitive(b) => Some(Dimension::new(b.inputs, b.outputs)),
            Symbol::Imported { arity, .. } => Some(*arity),
            Symbol::UserDefined { .. } | Symbol::Parameter { .. } => None,
        }
    }

    /// Definition site in the analyzed source, if any.
    pub fn site(&self) -> Option<Span> {
        match self {
            Symbol::UserDefined { site, .. } | Symbol::Parameter { site, .. } => Some(*site),
            Symbol::Primitive(_) | Symbol::Imported { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DefEntry {
    pub name: String,
    /// Span of the defining name.
    pub site: Span,
    /// Span of the whole definition.
    pub span: Span,
    pub param_count: usize,
    /// Scope the name is bound in.
    pub scope: ScopeId,
    /// Scope holding the formal parameters, if the definition has any.
    pub params_scope: Option<ScopeId>,
    /// Parameterized definitions lexically enclosing this one, outermost
    /// first. Their parameters are visible in this body.
    pub enclosing_params: Vec<DefId>,
    pub symbol: SymbolId,
    /// False when the body failed to parse.
    pub valid: bool,
}

impl ResolvedProgram {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn def(&self, id: DefId) -> &DefEntry {
        &self.defs[id.index()]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Symbol bound at an identifier or callee span.
    pub fn reference(&self, span: Span) -> Option<&Symbol> {
        self.references.get(&span).map(|id| self.symbol(*id))
    }

    /// Definition whose name sits at `name_span`.
    pub fn def_at(&self, name_span: Span) -> Option<DefId> {
        self.definitions.get(&name_span).copied()
    }

    /// Global definition by name.
    pub fn global(&self, name: &str) -> Option<DefId> {
        let id = self.scopes.first()?.bindings.get(name)?;
        match self.symbol(*id) {
            Symbol::UserDefined { def, .. } => Some(*def),
            _ => None,
        }
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve all names in a parsed program.
pub fn resolve(program: &Program, dictionary: &ImportDictionary) -> ResolveResult {
    let mut ctx = ResolveCtx::new();

    // Pass 1: collect global definitions (forward references are allowed)
    ctx.collect_globals(program);

    // Pass 2: bring imported libraries into the import table
    ctx.process_imports(program, dictionary);

    // Pass 3: resolve references in every valid body
    ctx.resolve_bodies(program);

    ResolveResult {
        resolved: ctx.resolved,
        diagnostics: ctx.diagnostics,
    }
}

// ── Internal context ────────────────────────────────────────────────────────

struct ResolveCtx {
    resolved: ResolvedProgram,
    diagnostics: Vec<Diagnostic>,
    ids: IdAllocator,
    builtins: HashMap<&'static str, SymbolId>,
    /// Visible name (qualified for included libraries) → imported symbol.
    import_table: HashMap<String, SymbolId>,
    /// Namespace prefixes (`os`, `fi`, ...) provided by successful imports.
    provided_prefixes: BTreeSet<String>,
    /// Definitions from pass 1, in program order.
    global_defs: Vec<DefId>,
}

impl ResolveCtx {
    fn new() -> Self {
        let mut ctx = ResolveCtx {
            resolved: ResolvedProgram {
                scopes: Vec::new(),
                symbols: Vec::new(),
                references: HashMap::new(),
                definitions: HashMap::new(),
                defs: Vec::new(),
                imports: Vec::new(),
            },
            diagnostics: Vec::new(),
            ids: IdAllocator::new(),
            builtins: HashMap::new(),
            import_table: HashMap::new(),
            provided_prefixes: BTreeSet::new(),
            global_defs: Vec::new(),
        };
        ctx.push_scope(None, ScopeKind::Global);
        for builtin in BUILTINS {
            let id = ctx.push_symbol(Symbol::Primitive(builtin));
            ctx.builtins.insert(builtin.name, id);
        }
        ctx
    }

    fn error(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    fn push_scope(&mut self, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = self.ids.alloc_scope();
        self.resolved.scopes.push(Scope {
            parent,
            kind,
            bindings: HashMap::new(),
        });
        id
    }

    fn push_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = self.ids.alloc_symbol();
        self.resolved.symbols.push(symbol);
        id
    }

    /// Bind `name` in `scope`. The first binding wins; a second one in the
    /// same scope is reported at `site`.
    fn bind(&mut self, scope: ScopeId, name: &str, site: Span, symbol: SymbolId) {
        let existing = self.resolved.scopes[scope.index()]
            .bindings
            .get(name)
            .copied();
        match existing {
            Some(first) => {
                let mut diag = Diagnostic::new(
                    DiagKind::DuplicateDefinitionError,
                    site,
                    format!("`{name}` is already defined in this scope"),
                )
                .with_suggestion(format!("rename or remove one of the `{name}` definitions"));
                if let Some(first_site) = self.resolved.symbol(first).site() {
                    diag = diag.with_related(first_site, "first defined here");
                }
                self.error(diag);
            }
            None => {
                self.resolved.scopes[scope.index()]
                    .bindings
                    .insert(name.to_string(), symbol);
            }
        }
    }

    fn declare_def(&mut self, def: &Definition, scope: ScopeId, enclosing: &[DefId]) -> DefId {
        let id = self.ids.alloc_def();
        let symbol = self.push_symbol(Symbol::UserDefined {
            def: id,
            name: def.name.name.clone(),
            params: def.params.len(),
            site: def.name.span,
        });
        self.resolved.defs.push(DefEntry {
            name: def.name.name.clone(),
            site: def.name.span,
            span: def.span,
            param_count: def.params.len(),
            scope,
            params_scope: None,
            enclosing_params: enclosing.to_vec(),
            symbol,
            valid: !def.is_invalid(),
        });
        self.resolved.definitions.insert(def.name.span, id);
        self.bind(scope, &def.name.name, def.name.span, symbol);
        id
    }

    // ── Pass 1: globals ─────────────────────────────────────────────────

    fn collect_globals(&mut self, program: &Program) {
        for def in &program.definitions {
            let id = self.declare_def(def, ScopeId(0), &[]);
            self.global_defs.push(id);
        }
    }

    // ── Pass 2: imports ─────────────────────────────────────────────────

    fn process_imports(&mut self, program: &Program, dictionary: &ImportDictionary) {
        for import in &program.imports {
            if self.resolved.imports.contains(&import.path) {
                continue;
            }
            let Some(exports) = dictionary.exports(&import.path) else {
                let mut diag = Diagnostic::new(
                    DiagKind::ImportNotFoundError,
                    import.span,
                    format!("library `{}` not found", import.path),
                );
                if let Some(close) = suggest::closest(&import.path, dictionary.library_names()) {
                    diag = diag.with_suggestion(format!("did you mean `{close}`?"));
                }
                self.error(diag);
                continue;
            };

            for export in exports {
                if self.import_table.contains_key(&export.name) {
                    continue;
                }
                if let Some((prefix, _)) = export.name.split_once('.') {
                    self.provided_prefixes.insert(prefix.to_string());
                }
                let id = self.push_symbol(Symbol::Imported {
                    name: export.name.clone(),
                    library: export.library.to_string(),
                    arity: Dimension::new(export.symbol.inputs, export.symbol.outputs),
                    stateful: export.symbol.stateful,
                });
                self.import_table.insert(export.name, id);
            }
            self.resolved.imports.push(import.path.clone());
        }
    }

    // ── Pass 3: bodies ──────────────────────────────────────────────────

    fn resolve_bodies(&mut self, program: &Program) {
        let globals = std::mem::take(&mut self.global_defs);
        for (def, id) in program.definitions.iter().zip(globals) {
            self.resolve_definition(def, id, &[]);
        }
    }

    fn resolve_definition(&mut self, def: &Definition, id: DefId, enclosing: &[DefId]) {
        if def.is_invalid() {
            return;
        }
        let mut scope = self.resolved.def(id).scope;
        let mut inner: Vec<DefId> = enclosing.to_vec();

        if !def.params.is_empty() {
            let params_scope = self.push_scope(Some(scope), ScopeKind::Params(id));
            for (index, param) in def.params.iter().enumerate() {
                let symbol = self.push_symbol(Symbol::Parameter {
                    owner: id,
                    index,
                    name: param.name.clone(),
                    site: param.span,
                });
                self.bind(params_scope, &param.name, param.span, symbol);
            }
            self.resolved.defs[id.index()].params_scope = Some(params_scope);
            scope = params_scope;
            inner.push(id);
        }

        self.resolve_expr(&def.body, scope, &inner);
    }

    fn resolve_expr(&mut self, expr: &Expr, scope: ScopeId, enclosing: &[DefId]) {
        match &expr.kind {
            ExprKind::Ident(name) => self.resolve_name(name, expr.span, scope),
            ExprKind::Call { callee, args } => {
                self.resolve_name(&callee.name, callee.span, scope);
                for arg in args {
                    self.resolve_expr(arg, scope, enclosing);
                }
            }
            ExprKind::Compose { .. } | ExprKind::Infix { .. } => {
                let (spine, leftmost) = expr.left_spine();
                self.resolve_expr(leftmost, scope, enclosing);
                for (_, right) in spine.iter().rev().filter_map(|node| node.operands()) {
                    self.resolve_expr(right, scope, enclosing);
                }
            }
            ExprKind::Prime(inner) => self.resolve_expr(inner, scope, enclosing),
            ExprKind::With { body, defs } => {
                let with_scope = self.push_scope(Some(scope), ScopeKind::With);
                let ids: Vec<DefId> = defs
                    .iter()
                    .map(|def| self.declare_def(def, with_scope, enclosing))
                    .collect();
                for (def, id) in defs.iter().zip(ids) {
                    self.resolve_definition(def, id, enclosing);
                }
                self.resolve_expr(body, with_scope, enclosing);
            }
            ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Prim(_) | ExprKind::Invalid => {}
        }
    }

    fn resolve_name(&mut self, name: &str, span: Span, scope: ScopeId) {
        match self.lookup(name, scope) {
            Some(symbol) => {
                self.resolved.references.insert(span, symbol);
            }
            None => self.undefined(name, span, scope),
        }
    }

    /// Scope chain (innermost first), then builtins, then imports.
    fn lookup(&self, name: &str, scope: ScopeId) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.resolved.scope(id);
            if let Some(symbol) = scope.bindings.get(name) {
                return Some(*symbol);
            }
            current = scope.parent;
        }
        self.builtins
            .get(name)
            .or_else(|| self.import_table.get(name))
            .copied()
    }

    fn undefined(&mut self, name: &str, span: Span, scope: ScopeId) {
        let mut diag = Diagnostic::new(
            DiagKind::UndefinedSymbolError,
            span,
            format!("undefined symbol `{name}`"),
        );
        if let Some(suggestion) = self.suggest_for(name, scope) {
            diag = diag.with_suggestion(suggestion);
        }
        self.error(diag);
    }

    fn suggest_for(&self, name: &str, scope: ScopeId) -> Option<String> {
        if let Some((prefix, _)) = name.split_once('.') {
            if self.provided_prefixes.contains(prefix) {
                let members = self
                    .import_table
                    .keys()
                    .filter(|k| k.starts_with(prefix) && k[prefix.len()..].starts_with('.'));
                let mut members: Vec<&str> = members.map(String::as_str).collect();
                members.sort_unstable();
                return suggest::closest(name, members)
                    .map(|close| format!("did you mean `{close}`?"));
            }
            if registry::is_standard_prefix(prefix) {
                return Some(format!("add `import(\"{STANDARD_LIBRARY}\");`"));
            }
        }

        let mut visible: Vec<&str> = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.resolved.scope(id);
            visible.extend(scope.bindings.keys().map(String::as_str));
            current = scope.parent;
        }
        visible.extend(
            self.builtins
                .keys()
                .copied()
                .filter(|n| n.chars().all(|c| c.is_alphanumeric() || c == '_')),
        );
        visible.extend(self.import_table.keys().map(String::as_str));
        visible.sort_unstable();
        visible.dedup();
        suggest::closest(name, visible).map(|close| format!("did you mean `{close}`?"))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolve_source(source: &str) -> ResolveResult {
        let parsed = parse(source);
        assert!(
            parsed.errors.is_empty(),
            "parse errors: {:#?}",
            parsed.errors
        );
        resolve(&parsed.program.unwrap(), &ImportDictionary::standard())
    }

    fn resolve_ok(source: &str) -> ResolvedProgram {
        let result = resolve_source(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:#?}",
            result.diagnostics
        );
        result.resolved
    }

    fn errors_of(result: &ResolveResult, kind: DiagKind) -> Vec<&Diagnostic> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.kind == kind)
            .collect()
    }

    /// Symbol bound at the first occurrence of `needle` after byte `from`.
    fn symbol_at<'a>(resolved: &'a ResolvedProgram, source: &str, needle: &str, from: usize) -> &'a Symbol {
        let start = from + source[from..].find(needle).expect("needle present");
        let span: Span = (start..start + needle.len()).into();
        resolved
            .reference(span)
            .unwrap_or_else(|| panic!("no reference at {span:?}"))
    }

    // ── Globals ──

    #[test]
    fn forward_reference_resolves() {
        let src = "process = a; a = _;";
        let resolved = resolve_ok(src);
        assert!(matches!(
            symbol_at(&resolved, src, "a", 9),
            Symbol::UserDefined { name, .. } if name == "a"
        ));
        assert_eq!(resolved.defs.len(), 2);
        assert!(resolved.global("process").is_some());
    }

    #[test]
    fn builtins_resolve() {
        let src = "process = mem : sin;";
        let resolved = resolve_ok(src);
        assert!(matches!(symbol_at(&resolved, src, "mem", 0), Symbol::Primitive(b) if b.name == "mem"));
        assert_eq!(
            symbol_at(&resolved, src, "sin", 0).arity(),
            Some(Dimension::new(1, 1))
        );
    }

    #[test]
    fn user_definition_shadows_builtin() {
        let src = "sin = _; process = sin;";
        let resolved = resolve_ok(src);
        assert!(matches!(symbol_at(&resolved, src, "sin", 9), Symbol::UserDefined { .. }));
    }

    #[test]
    fn duplicate_definition() {
        let result = resolve_source("a = _;\na = !;");
        let dups = errors_of(&result, DiagKind::DuplicateDefinitionError);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].span, Span::from(7..8));
        assert_eq!(dups[0].related[0].span, Span::from(0..1));
    }

    // ── Imports ──

    #[test]
    fn imported_symbol_resolves() {
        let src = "import(\"stdfaust.lib\");\nprocess = os.osc(440);";
        let resolved = resolve_ok(src);
        let sym = symbol_at(&resolved, src, "os.osc", 0);
        assert!(matches!(sym, Symbol::Imported { stateful: true, .. }));
        assert_eq!(sym.arity(), Some(Dimension::new(1, 1)));
        assert_eq!(resolved.imports, vec!["stdfaust.lib"]);
    }

    #[test]
    fn missing_standard_import_is_suggested() {
        let result = resolve_source("process = os.osc(440);");
        assert_eq!(result.diagnostics.len(), 1);
        let d = &result.diagnostics[0];
        assert_eq!(d.kind, DiagKind::UndefinedSymbolError);
        assert!(d.suggestion.as_deref().unwrap().contains("import(\"stdfaust.lib\")"));
    }

    #[test]
    fn misspelled_member_of_imported_namespace() {
        let result = resolve_source("import(\"stdfaust.lib\");\nprocess = os.oscc(440);");
        let d = &errors_of(&result, DiagKind::UndefinedSymbolError)[0];
        assert_eq!(d.suggestion.as_deref(), Some("did you mean `os.osc`?"));
    }

    #[test]
    fn unknown_import_with_suggestion() {
        let result = resolve_source("import(\"stdfaust.lb\");");
        let d = &errors_of(&result, DiagKind::ImportNotFoundError)[0];
        assert_eq!(d.suggestion.as_deref(), Some("did you mean `stdfaust.lib`?"));
    }

    #[test]
    fn direct_library_import_is_unqualified() {
        let src = "import(\"filters.lib\");\nprocess = dcblocker;";
        let resolved = resolve_ok(src);
        assert!(matches!(symbol_at(&resolved, src, "dcblocker", 0), Symbol::Imported { .. }));
    }

    // ── Undefined symbols ──

    #[test]
    fn undefined_with_close_name() {
        let result = resolve_source("gain = _;\nprocess = gian;");
        let d = &errors_of(&result, DiagKind::UndefinedSymbolError)[0];
        assert_eq!(d.message, "undefined symbol `gian`");
        assert_eq!(d.suggestion.as_deref(), Some("did you mean `gain`?"));
    }

    #[test]
    fn undefined_without_candidates() {
        let result = resolve_source("process = zzzzzzzz;");
        let d = &errors_of(&result, DiagKind::UndefinedSymbolError)[0];
        assert!(d.suggestion.is_none());
    }

    // ── Parameters and with blocks ──

    #[test]
    fn parameters_resolve_and_shadow() {
        let src = "f(mem) = mem;";
        let resolved = resolve_ok(src);
        assert!(matches!(
            symbol_at(&resolved, src, "mem", 7),
            Symbol::Parameter { index: 0, .. }
        ));
    }

    #[test]
    fn duplicate_parameters() {
        let result = resolve_source("f(x, x) = x;");
        assert_eq!(errors_of(&result, DiagKind::DuplicateDefinitionError).len(), 1);
    }

    #[test]
    fn with_locals_are_mutually_visible_but_not_outside() {
        let result = resolve_source("p = a with { a = b; b = _; };\nq = a;");
        let undefined = errors_of(&result, DiagKind::UndefinedSymbolError);
        assert_eq!(undefined.len(), 1);
        assert_eq!(undefined[0].span, Span::from(34..35));
    }

    #[test]
    fn with_block_creates_one_scope() {
        let resolved = resolve_ok("f(x) = g with { g = x; };");
        // global, f's parameters, the with block
        assert_eq!(resolved.scopes.len(), 3);
        assert_eq!(resolved.scopes[2].kind, ScopeKind::With);
        assert_eq!(resolved.scopes[2].parent, Some(ScopeId(1)));
    }

    #[test]
    fn enclosing_parameter_owners_recorded() {
        let resolved = resolve_ok("f(x) = g with { g = x; };");
        let f = resolved.global("f").unwrap();
        let g = &resolved.defs[1];
        assert_eq!(g.name, "g");
        assert_eq!(g.enclosing_params, vec![f]);
        assert_eq!(resolved.def(f).param_count, 1);
    }

    #[test]
    fn invalid_definition_name_stays_bound() {
        let parsed = parse("a = _ : ;\nb = a;");
        assert_eq!(parsed.errors.len(), 1);
        let result = resolve(&parsed.program.unwrap(), &ImportDictionary::standard());
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
        let a = result.resolved.global("a").unwrap();
        assert!(!result.resolved.def(a).valid);
    }
}
