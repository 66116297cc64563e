// structure.rs: Structural summary: definitions, UI parameters, imports
//
// Preconditions: `program`, `resolved` and `dims` come from the earlier
//                passes on the same source.
// Postconditions: every valid top-level definition is listed in source
//                 order; every UI control whose callee resolves to the
//                 builtin is listed once per distinct group path it is
//                 instantiated under, following definition references
//                 and call arguments from the unreferenced definitions.
//                 Controls never reached that way are listed with their
//                 lexical group path.
// Failure modes: inconsistent slider ranges produce ParameterRangeError;
//                paths shared by several controls produce DuplicatePathError.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::ast::*;
use crate::diag::{DiagKind, Diagnostic, LineIndex};
use crate::dimension::{collect_local_bodies, Dimension, DimensionResult};
use crate::id::DefId;
use crate::registry::BuiltinClass;
use crate::resolve::{ResolvedProgram, Symbol};

/// How much the report includes. Validation is the same for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    #[default]
    Basic,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureReport {
    pub detail: DetailLevel,
    pub imports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<Metadata>,
    pub definitions: Vec<DefinitionInfo>,
    pub parameters: Vec<UiParameter>,
    /// Dimension of `process`, when defined and known.
    pub process: Option<Dimension>,
    /// Structure-stage diagnostics, filled in by the pipeline.
    pub diagnostics: Vec<Diagnostic>,
}

/// One `declare` statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    pub inputs: Option<usize>,
    pub outputs: Option<usize>,
    pub line: usize,
    pub column: usize,
    /// `with` locals; only with `DetailLevel::Full`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<DefinitionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiParameter {
    /// Constructor name: `hslider`, `button`, `hbargraph`, ...
    pub kind: &'static str,
    pub label: String,
    /// Group labels and the control label joined with `/`.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    pub line: usize,
    pub column: usize,
    /// Top-level definition containing the control.
    pub definition: String,
}

#[derive(Debug)]
pub struct StructureResult {
    pub report: StructureReport,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn analyze_structure(
    program: &Program,
    resolved: &ResolvedProgram,
    dims: &DimensionResult,
    lines: &LineIndex<'_>,
    detail: DetailLevel,
) -> StructureResult {
    let mut walker = ControlWalker::new(program, resolved, lines, detail);

    let mut definitions = Vec::new();
    let mut tops = Vec::new();
    for def in &program.definitions {
        if def.is_invalid() {
            continue;
        }
        definitions.push(definition_info(def, resolved, dims, lines, detail));
        if let Some(id) = resolved.def_at(def.name.span) {
            tops.push((id, def));
        }
    }

    // Instantiate from the definitions nothing else refers to, then pick up
    // the controls no instantiation reached.
    let referenced = referenced_from_outside(resolved);
    for (id, _) in &tops {
        if !referenced.contains(id) {
            walker.instantiate(*id, &[], None);
        }
    }
    walker.follow = false;
    for (_, def) in &tops {
        walker.walk(&def.body);
    }

    let process = resolved
        .global("process")
        .and_then(|id| dims.definitions.get(&id).copied());

    let report = StructureReport {
        detail,
        imports: program.imports.iter().map(|i| i.path.clone()).collect(),
        metadata: program
            .declarations
            .iter()
            .map(|d| Metadata {
                target: d.target.as_ref().map(|t| t.name.clone()),
                key: d.key.name.clone(),
                value: d.value.clone(),
            })
            .collect(),
        definitions,
        parameters: walker.parameters,
        process,
        diagnostics: Vec::new(),
    };

    StructureResult {
        report,
        diagnostics: walker.diagnostics,
    }
}

fn definition_info(
    def: &Definition,
    resolved: &ResolvedProgram,
    dims: &DimensionResult,
    lines: &LineIndex<'_>,
    detail: DetailLevel,
) -> DefinitionInfo {
    let dim = resolved
        .def_at(def.name.span)
        .and_then(|id| dims.definitions.get(&id).copied());
    let pos = lines.position(def.name.span.start);

    let mut locals = Vec::new();
    if detail == DetailLevel::Full {
        collect_locals(&def.body, &mut |local| {
            if !local.is_invalid() {
                locals.push(definition_info(local, resolved, dims, lines, detail));
            }
        });
    }

    DefinitionInfo {
        name: def.name.name.clone(),
        params: def.params.iter().map(|p| p.name.clone()).collect(),
        inputs: dim.map(|d| d.inputs),
        outputs: dim.map(|d| d.outputs),
        line: pos.line,
        column: pos.column,
        locals,
    }
}

/// Definitions referenced from outside their own body.
fn referenced_from_outside(resolved: &ResolvedProgram) -> HashSet<DefId> {
    let mut referenced = HashSet::new();
    for (span, symbol) in &resolved.references {
        if let Symbol::UserDefined { def, .. } = resolved.symbol(*symbol) {
            let body = resolved.def(*def).span;
            if !(body.start <= span.start && span.start < body.end) {
                referenced.insert(*def);
            }
        }
    }
    referenced
}

/// Visit the `with` locals directly owned by `expr` (not their own locals).
fn collect_locals<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Definition)) {
    match &expr.kind {
        ExprKind::With { body, defs } => {
            for def in defs {
                visit(def);
            }
            collect_locals(body, visit);
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                collect_locals(arg, visit);
            }
        }
        ExprKind::Compose { .. } | ExprKind::Infix { .. } => {
            let (spine, leftmost) = expr.left_spine();
            collect_locals(leftmost, visit);
            for (_, right) in spine.into_iter().rev().filter_map(Expr::operands) {
                collect_locals(right, visit);
            }
        }
        ExprKind::Prime(inner) => collect_locals(inner, visit),
        _ => {}
    }
}

/// Strip `[key:value]` metadata from a UI label and trim the rest.
pub fn strip_label_metadata(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut depth = 0usize;
    for c in label.chars() {
        match c {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn literal_number(expr: &Expr) -> Option<f64> {
    match expr.kind {
        ExprKind::Number(n) => Some(n),
        _ => None,
    }
}

fn literal_label(expr: Option<&Expr>) -> Option<String> {
    match &expr?.kind {
        ExprKind::Str(s) => Some(strip_label_metadata(s)),
        _ => None,
    }
}

// ── Control walk ────────────────────────────────────────────────────────────

/// Arguments bound to one instantiated definition's parameters.
struct CallFrame<'a> {
    def: DefId,
    args: &'a [Expr],
    /// Call expression, `None` for a bare reference.
    site: Option<Span>,
    /// Frames visible to the arguments.
    caller_depth: usize,
}

/// Definition, call site, group path and visible call sites of one
/// instantiation.
type InstanceKey = (DefId, Option<Span>, Vec<String>, Vec<Option<Span>>);

struct ControlWalker<'a> {
    resolved: &'a ResolvedProgram,
    lines: &'a LineIndex<'a>,
    detail: DetailLevel,
    /// Every definition body by id, locals included.
    bodies: HashMap<DefId, &'a Definition>,
    /// Whole-definition span and name of each top-level definition.
    tops: Vec<(Span, String)>,
    /// Follow references into definition bodies; off for the lexical pass.
    follow: bool,
    /// Definitions being instantiated, innermost last.
    frames: Vec<CallFrame<'a>>,
    instances: HashSet<InstanceKey>,
    /// Labels of the enclosing UI groups.
    groups: Vec<String>,
    parameters: Vec<UiParameter>,
    /// Path → span of the first control using it.
    paths: HashMap<String, Span>,
    /// Control span and path of every listed parameter.
    recorded: HashSet<(Span, String)>,
    /// Controls listed at least once.
    reached: HashSet<Span>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ControlWalker<'a> {
    fn new(
        program: &'a Program,
        resolved: &'a ResolvedProgram,
        lines: &'a LineIndex<'a>,
        detail: DetailLevel,
    ) -> Self {
        let mut bodies = HashMap::new();
        let mut tops = Vec::new();
        for def in &program.definitions {
            tops.push((def.span, def.name.name.clone()));
            if let Some(id) = resolved.def_at(def.name.span) {
                bodies.insert(id, def);
            }
            collect_local_bodies(&def.body, &mut |local| {
                if let Some(id) = resolved.def_at(local.name.span) {
                    bodies.insert(id, local);
                }
            });
        }
        ControlWalker {
            resolved,
            lines,
            detail,
            bodies,
            tops,
            follow: true,
            frames: Vec::new(),
            instances: HashSet::new(),
            groups: Vec::new(),
            parameters: Vec::new(),
            paths: HashMap::new(),
            recorded: HashSet::new(),
            reached: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    fn walk(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Call { callee, args } => self.walk_call(expr, callee, args),
            ExprKind::Compose { .. } | ExprKind::Infix { .. } => {
                let (spine, leftmost) = expr.left_spine();
                self.walk(leftmost);
                for (_, right) in spine.into_iter().rev().filter_map(Expr::operands) {
                    self.walk(right);
                }
            }
            ExprKind::Prime(inner) => self.walk(inner),
            ExprKind::With { body, defs } => {
                // Locals are reached through references when following.
                if !self.follow {
                    for def in defs {
                        self.walk(&def.body);
                    }
                }
                self.walk(body);
            }
            ExprKind::Ident(_) if self.follow => self.follow_reference(expr.span),
            ExprKind::Ident(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Prim(_)
            | ExprKind::Invalid => {}
        }
    }

    fn follow_reference(&mut self, span: Span) {
        let resolved = self.resolved;
        match resolved.reference(span) {
            Some(Symbol::UserDefined { def, .. }) => self.instantiate(*def, &[], None),
            Some(Symbol::Parameter { owner, index, .. }) => self.substitute(*owner, *index),
            _ => {}
        }
    }

    /// Walk the body of `def` under the current groups with `args` bound
    /// to its first parameters.
    fn instantiate(&mut self, def: DefId, args: &'a [Expr], site: Option<Span>) {
        // Recursion stops at the first repeated definition.
        let recursive = self.frames.iter().any(|f| f.def == def);
        if recursive || !self.resolved.def(def).valid {
            return;
        }
        let Some(body) = self.bodies.get(&def).copied() else {
            return;
        };
        let key = (
            def,
            site,
            self.groups.clone(),
            self.frames.iter().map(|f| f.site).collect(),
        );
        if !self.instances.insert(key) {
            return;
        }

        let caller_depth = self.frames.len();
        self.frames.push(CallFrame {
            def,
            args,
            site,
            caller_depth,
        });
        self.walk(&body.body);
        self.frames.pop();
    }

    /// Walk the argument bound to parameter `index` of `owner` in the
    /// frames of its caller.
    fn substitute(&mut self, owner: DefId, index: usize) {
        let Some(frame) = self.frames.iter().rev().find(|f| f.def == owner) else {
            return;
        };
        let (args, depth) = (frame.args, frame.caller_depth);
        let Some(arg) = args.get(index) else {
            return;
        };
        let inner = self.frames.split_off(depth);
        self.walk(arg);
        self.frames.extend(inner);
    }

    fn walk_call(&mut self, expr: &'a Expr, callee: &Ident, args: &'a [Expr]) {
        let resolved = self.resolved;
        let symbol = resolved.reference(callee.span);
        let builtin = match symbol {
            Some(Symbol::Primitive(b)) => Some(*b),
            _ => None,
        };

        match builtin.map(|b| (b.name, b.class)) {
            Some((_, BuiltinClass::UiGroup)) => match literal_label(args.first()) {
                Some(label) => {
                    self.groups.push(label);
                    for arg in &args[1..] {
                        self.walk(arg);
                    }
                    self.groups.pop();
                }
                None => {
                    for arg in args {
                        self.walk(arg);
                    }
                }
            },
            Some((kind, class @ (BuiltinClass::UiControl | BuiltinClass::UiDisplay))) => {
                if let Some(label) = literal_label(args.first()) {
                    self.record_control(kind, class, label, expr.span, args);
                }
            }
            _ => match symbol {
                Some(Symbol::UserDefined { def, params, .. }) if self.follow => {
                    // Extra arguments are box-applied at the call site.
                    let (bound, extra) = args.split_at((*params).min(args.len()));
                    self.instantiate(*def, bound, Some(expr.span));
                    for arg in extra {
                        self.walk(arg);
                    }
                }
                _ => {
                    if self.follow {
                        self.follow_reference(callee.span);
                    }
                    for arg in args {
                        self.walk(arg);
                    }
                }
            },
        }
    }

    /// Top-level definition lexically containing `span`.
    fn definition_at(&self, span: Span) -> String {
        self.tops
            .iter()
            .find(|(def, _)| def.start <= span.start && span.start < def.end)
            .map(|(_, name)| name.clone())
            .unwrap_or_default()
    }

    fn record_control(
        &mut self,
        kind: &'static str,
        class: BuiltinClass,
        label: String,
        span: Span,
        args: &[Expr],
    ) {
        // The lexical pass only lists controls no instantiation reached.
        if !self.follow && self.reached.contains(&span) {
            return;
        }
        let path = self
            .groups
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(label.as_str()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if !self.recorded.insert((span, path.clone())) {
            return;
        }

        let number = |i: usize| args.get(i).and_then(literal_number);
        let (default, min, max, step) = match (class, kind) {
            (BuiltinClass::UiDisplay, _) => (None, number(1), number(2), None),
            (_, "button" | "checkbox") => (None, None, None, None),
            _ => (number(1), number(2), number(3), number(4)),
        };

        if self.reached.insert(span) {
            self.check_range(&label, span, default, min, max);
        }

        if let Some(first) = self.paths.get(&path) {
            self.diagnostics.push(
                Diagnostic::new(
                    DiagKind::DuplicatePathError,
                    span,
                    format!("UI path `{path}` is used by more than one control"),
                )
                .with_related(*first, "first used here"),
            );
        } else {
            self.paths.insert(path.clone(), span);
        }

        let definition = self.definition_at(span);
        let full = self.detail == DetailLevel::Full;
        let keep = |v: Option<f64>| if full { v } else { None };
        let pos = self.lines.position(span.start);
        self.parameters.push(UiParameter {
            kind,
            label,
            path,
            default: keep(default),
            min: keep(min),
            max: keep(max),
            step: keep(step),
            line: pos.line,
            column: pos.column,
            definition,
        });
    }

    fn check_range(
        &mut self,
        label: &str,
        span: Span,
        default: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    ) {
        let (Some(min), Some(max)) = (min, max) else {
            return;
        };
        if min > max {
            self.diagnostics.push(Diagnostic::new(
                DiagKind::ParameterRangeError,
                span,
                format!("`{label}`: min {min} is greater than max {max}"),
            ));
            return;
        }
        if let Some(default) = default {
            if default < min || default > max {
                self.diagnostics.push(Diagnostic::new(
                    DiagKind::ParameterRangeError,
                    span,
                    format!("`{label}`: default {default} is outside the range [{min}, {max}]"),
                ));
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::analyze_dimensions;
    use crate::parser::parse;
    use crate::registry::ImportDictionary;
    use crate::resolve::resolve;

    fn structure(source: &str, detail: DetailLevel) -> StructureResult {
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:#?}", parsed.errors);
        let program = parsed.program.unwrap();
        let resolved = resolve(&program, &ImportDictionary::standard()).resolved;
        let dims = analyze_dimensions(&program, &resolved);
        let lines = LineIndex::new(source);
        analyze_structure(&program, &resolved, &dims, &lines, detail)
    }

    fn kinds(result: &StructureResult) -> Vec<DiagKind> {
        result.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn definitions_with_arity_and_position() {
        let r = structure("gain = *(0.5);\n\nprocess = gain, _;", DetailLevel::Basic);
        let defs = &r.report.definitions;
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "gain");
        assert_eq!((defs[0].inputs, defs[0].outputs), (Some(1), Some(1)));
        assert_eq!((defs[1].line, defs[1].column), (3, 1));
        assert_eq!(r.report.process, Some(Dimension::new(2, 2)));
    }

    #[test]
    fn parameterized_definition_has_unknown_arity() {
        let r = structure("f(x) = x : _;", DetailLevel::Basic);
        let f = &r.report.definitions[0];
        assert_eq!(f.params, vec!["x"]);
        assert_eq!(f.inputs, None);
    }

    #[test]
    fn slider_fields_in_full_mode() {
        let src = r#"process = hslider("gain", 0.5, 0, 1, 0.01);"#;
        let r = structure(src, DetailLevel::Full);
        let p = &r.report.parameters[0];
        assert_eq!(p.kind, "hslider");
        assert_eq!(p.path, "gain");
        assert_eq!(p.definition, "process");
        assert_eq!(
            (p.default, p.min, p.max, p.step),
            (Some(0.5), Some(0.0), Some(1.0), Some(0.01))
        );
        assert!(r.diagnostics.is_empty());
    }

    #[test]
    fn basic_mode_omits_numbers_but_still_validates() {
        let src = r#"process = hslider("F", 5, 10, 20, 1);"#;
        let basic = structure(src, DetailLevel::Basic);
        assert_eq!(basic.report.parameters[0].default, None);
        assert_eq!(kinds(&basic), vec![DiagKind::ParameterRangeError]);

        let full = structure(src, DetailLevel::Full);
        assert_eq!(kinds(&full), vec![DiagKind::ParameterRangeError]);
        assert!(full.diagnostics[0].message.contains("outside the range [10, 20]"));
    }

    #[test]
    fn inverted_range() {
        let r = structure(r#"process = vslider("v", 0, 1, -1, 0.1);"#, DetailLevel::Basic);
        assert_eq!(kinds(&r), vec![DiagKind::ParameterRangeError]);
        assert!(r.diagnostics[0].message.contains("min 1 is greater than max -1"));
    }

    #[test]
    fn negative_literals() {
        let r = structure(r#"process = hslider("db", -6, -60, 0, 0.1);"#, DetailLevel::Full);
        assert!(r.diagnostics.is_empty());
        assert_eq!(r.report.parameters[0].min, Some(-60.0));
    }

    #[test]
    fn group_paths_and_label_metadata() {
        let src = r#"
process = hgroup("Mixer [style:knob]", hslider("gain [unit:dB]", 0, -10, 10, 1)
        , vgroup("Aux", button("mute")));
"#;
        let r = structure(src, DetailLevel::Basic);
        let paths: Vec<&str> = r.report.parameters.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["Mixer/gain", "Mixer/Aux/mute"]);
        assert_eq!(r.report.parameters[0].label, "gain");
    }

    #[test]
    fn duplicate_paths() {
        let src = r#"process = button("go"), button("go");"#;
        let r = structure(src, DetailLevel::Basic);
        assert_eq!(kinds(&r), vec![DiagKind::DuplicatePathError]);
        let d = &r.diagnostics[0];
        assert_eq!(d.span.start, 24);
        assert_eq!(d.related[0].span.start, 10);
    }

    #[test]
    fn same_label_in_different_groups_is_fine() {
        let src = r#"process = hgroup("a", button("go")), hgroup("b", button("go"));"#;
        let r = structure(src, DetailLevel::Basic);
        assert!(r.diagnostics.is_empty());
    }

    #[test]
    fn controls_in_definitions_take_the_groups_of_their_use() {
        let src = r#"
left = hslider("gain", 0, 0, 1, 0.1);
right = hslider("gain", 0, 0, 1, 0.1);
process = hgroup("L", left), hgroup("R", right);
"#;
        let r = structure(src, DetailLevel::Basic);
        assert!(r.diagnostics.is_empty(), "{:#?}", r.diagnostics);
        let paths: Vec<(&str, &str)> = r
            .report
            .parameters
            .iter()
            .map(|p| (p.path.as_str(), p.definition.as_str()))
            .collect();
        assert_eq!(paths, vec![("L/gain", "left"), ("R/gain", "right")]);
    }

    #[test]
    fn arguments_take_the_groups_of_the_callee() {
        let src = r#"f(x) = hgroup("G", x); process = f(button("b"));"#;
        let r = structure(src, DetailLevel::Basic);
        let paths: Vec<&str> = r.report.parameters.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["G/b"]);
        assert_eq!(r.report.parameters[0].definition, "process");
    }

    #[test]
    fn nested_calls_of_the_same_definition() {
        let src = r#"f(x) = hgroup("G", x); process = f(f(button("b")));"#;
        let r = structure(src, DetailLevel::Basic);
        let paths: Vec<&str> = r.report.parameters.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["G/G/b"]);

        let r = structure(r#"f(x) = f(x) : button("r"); process = f(_);"#, DetailLevel::Basic);
        assert_eq!(r.report.parameters.len(), 1);
    }

    #[test]
    fn shared_definition_is_listed_per_path() {
        let src = r#"g = button("go"); process = hgroup("A", g), hgroup("B", g);"#;
        let r = structure(src, DetailLevel::Basic);
        assert!(r.diagnostics.is_empty(), "{:#?}", r.diagnostics);
        let paths: Vec<&str> = r.report.parameters.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["A/go", "B/go"]);

        let r = structure(r#"g = button("go"); process = g, g;"#, DetailLevel::Basic);
        assert!(r.diagnostics.is_empty(), "{:#?}", r.diagnostics);
        assert_eq!(r.report.parameters.len(), 1);
    }

    #[test]
    fn range_is_checked_once_per_control() {
        let src = r#"g = hslider("x", 5, 0, 1, 0.1); process = hgroup("A", g), hgroup("B", g);"#;
        let r = structure(src, DetailLevel::Basic);
        assert_eq!(kinds(&r), vec![DiagKind::ParameterRangeError]);
        assert_eq!(r.report.parameters.len(), 2);
    }

    #[test]
    fn unreached_controls_keep_their_lexical_path() {
        let src = r#"f(x) = _; process = f(vgroup("V", button("b")));"#;
        let r = structure(src, DetailLevel::Basic);
        let paths: Vec<&str> = r.report.parameters.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["V/b"]);
    }

    #[test]
    fn long_chains_are_walked() {
        let chain = vec!["_"; 5000].join(" : ");
        let src = format!("process = {chain} : *(button(\"b\"));");
        let r = structure(&src, DetailLevel::Full);
        assert_eq!(r.report.parameters.len(), 1);
        assert_eq!(r.report.process, Some(Dimension::new(1, 1)));
    }

    #[test]
    fn shadowed_control_is_not_counted() {
        let src = "hslider(x) = x; process = hslider(1);";
        let r = structure(src, DetailLevel::Basic);
        assert!(r.report.parameters.is_empty());
    }

    #[test]
    fn bargraph_range() {
        let r = structure(r#"process = hbargraph("lvl", 0, 1);"#, DetailLevel::Full);
        let p = &r.report.parameters[0];
        assert_eq!((p.min, p.max, p.default), (Some(0.0), Some(1.0), None));
    }

    #[test]
    fn controls_inside_with_locals_and_arguments() {
        let src = r#"
import("stdfaust.lib");
process = os.osc(freq) with { freq = nentry("freq", 440, 20, 2000, 1); };
"#;
        let r = structure(src, DetailLevel::Full);
        assert_eq!(r.report.parameters.len(), 1);
        assert_eq!(r.report.parameters[0].path, "freq");
        assert_eq!(r.report.definitions[0].locals[0].name, "freq");
        assert_eq!(r.report.imports, vec!["stdfaust.lib"]);
    }

    #[test]
    fn locals_only_in_full_mode() {
        let r = structure("process = g with { g = _; };", DetailLevel::Basic);
        assert!(r.report.definitions[0].locals.is_empty());
    }

    #[test]
    fn metadata_is_reported() {
        let r = structure(
            "declare name \"synth\";\ndeclare process author \"me\";\nprocess = _;",
            DetailLevel::Basic,
        );
        assert_eq!(r.report.metadata.len(), 2);
        assert_eq!(r.report.metadata[0].key, "name");
        assert_eq!(r.report.metadata[1].target.as_deref(), Some("process"));
    }

    #[test]
    fn strips_metadata() {
        assert_eq!(strip_label_metadata("gain [unit:dB]"), "gain");
        assert_eq!(strip_label_metadata("[1] freq"), "freq");
        assert_eq!(strip_label_metadata("plain"), "plain");
    }
}
