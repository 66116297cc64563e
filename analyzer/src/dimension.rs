// dimension.rs: Box-algebra dimension analysis
//
// Computes (inputs, outputs) for every expression node and checks the
// composition rules of the five operators. Definitions are evaluated on
// demand with their parameters bound to the argument dimensions, memoized
// per parameter frame, with an in-progress set for cycle detection.
//
// Preconditions: `program` is an AST from the parser; `resolved` comes from
//                `resolve::resolve` on the same AST.
// Postconditions: `dims` holds the first dimension computed for each node
//                 span; unknown dimensions are absent. Each (kind, span)
//                 diagnostic is reported at most once.
// Failure modes: composition mismatches, circular definitions and missing
//                feedback delays produce diagnostics. A passed deadline stops
//                evaluation and sets `timed_out`.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::ast::*;
use crate::diag::{BoxRule, DiagKind, Diagnostic};
use crate::id::DefId;
use crate::registry::{lookup_builtin, BuiltinClass};
use crate::resolve::{ResolvedProgram, Symbol};

// ── Public types ────────────────────────────────────────────────────────────

/// Number of input and output signals of a block diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimension {
    pub inputs: usize,
    pub outputs: usize,
}

impl Dimension {
    pub const fn new(inputs: usize, outputs: usize) -> Self {
        Dimension { inputs, outputs }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(inputs={}, outputs={})", self.inputs, self.outputs)
    }
}

const LITERAL: Dimension = Dimension::new(0, 1);
const MEM: Dimension = Dimension::new(1, 1);

/// Result of dimension analysis.
#[derive(Debug, Default)]
pub struct DimensionResult {
    /// Expression node span → dimension (first computed value).
    pub dims: HashMap<Span, Dimension>,
    /// Definition → dimension when evaluated on its own. Parameterized
    /// definitions are only present if their dimension does not depend on
    /// the arguments.
    pub definitions: HashMap<DefId, Dimension>,
    pub diagnostics: Vec<Diagnostic>,
    pub timed_out: bool,
}

// ── Public entry points ─────────────────────────────────────────────────────

/// Analyze dimensions of every valid definition.
pub fn analyze_dimensions(program: &Program, resolved: &ResolvedProgram) -> DimensionResult {
    analyze_dimensions_with_deadline(program, resolved, None)
}

/// As [`analyze_dimensions`], giving up once `deadline` has passed.
pub fn analyze_dimensions_with_deadline(
    program: &Program,
    resolved: &ResolvedProgram,
    deadline: Option<Instant>,
) -> DimensionResult {
    let mut ctx = DimCtx::new(resolved, deadline);
    for def in &program.definitions {
        ctx.collect_bodies(def);
    }

    for def in &program.definitions {
        if def.is_invalid() {
            continue;
        }
        let Some(id) = resolved.def_at(def.name.span) else {
            continue;
        };
        ctx.eval_standalone(id, def.name.span);
        if ctx.result.timed_out {
            break;
        }
    }

    ctx.result
}

// ── Internal context ────────────────────────────────────────────────────────

/// Argument dimensions bound to one parameterized definition's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Frame {
    def: DefId,
    args: Vec<Option<Dimension>>,
}

/// Definition plus the argument dimensions of every visible frame.
type MemoKey = (DefId, Vec<Vec<Option<Dimension>>>);

/// Outcome of the conservative delay scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Delay {
    Found,
    None,
    /// The scan reached something it cannot see into.
    Unknown,
}

impl Delay {
    fn or(self, other: Delay) -> Delay {
        match (self, other) {
            (Delay::Found, _) | (_, Delay::Found) => Delay::Found,
            (Delay::Unknown, _) | (_, Delay::Unknown) => Delay::Unknown,
            _ => Delay::None,
        }
    }
}

struct DimCtx<'a> {
    resolved: &'a ResolvedProgram,
    bodies: HashMap<DefId, &'a Definition>,
    /// Parameter frames visible to the expression being evaluated.
    frames: Vec<Frame>,
    memo: HashMap<MemoKey, Option<Dimension>>,
    in_progress: HashSet<DefId>,
    cycle_reported: HashSet<DefId>,
    /// Delay scan results per definition and argument delays.
    delay_memo: HashMap<(DefId, Vec<Delay>), Delay>,
    /// Argument delays of the calls the scan is currently inside.
    delay_frames: Vec<(DefId, Vec<Delay>)>,
    reported: HashSet<(DiagKind, Span)>,
    deadline: Option<Instant>,
    result: DimensionResult,
}

impl<'a> DimCtx<'a> {
    fn new(resolved: &'a ResolvedProgram, deadline: Option<Instant>) -> Self {
        DimCtx {
            resolved,
            bodies: HashMap::new(),
            frames: Vec::new(),
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            cycle_reported: HashSet::new(),
            delay_memo: HashMap::new(),
            delay_frames: Vec::new(),
            reported: HashSet::new(),
            deadline,
            result: DimensionResult::default(),
        }
    }

    fn collect_bodies(&mut self, def: &'a Definition) {
        if let Some(id) = self.resolved.def_at(def.name.span) {
            self.bodies.insert(id, def);
        }
        collect_local_bodies(&def.body, &mut |local| {
            if let Some(id) = self.resolved.def_at(local.name.span) {
                self.bodies.insert(id, local);
            }
        });
    }

    fn report(&mut self, diag: Diagnostic) {
        if self.reported.insert((diag.kind, diag.span)) {
            self.result.diagnostics.push(diag);
        }
    }

    fn expired(&mut self) -> bool {
        if self.result.timed_out {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.result.timed_out = true;
            }
        }
        self.result.timed_out
    }

    // ── Definitions ─────────────────────────────────────────────────────

    /// Evaluate a definition outside any call: parameters are unknown.
    fn eval_standalone(&mut self, id: DefId, at: Span) -> Option<Dimension> {
        let params = self.resolved.def(id).param_count;
        let dim = self.eval_def(id, vec![None; params], at);
        if let Some(dim) = dim {
            self.result.definitions.entry(id).or_insert(dim);
        }
        dim
    }

    /// Evaluate definition `id` with `args` bound to its parameters.
    /// `at` is the referencing span, used for cycle reports.
    fn eval_def(&mut self, id: DefId, args: Vec<Option<Dimension>>, at: Span) -> Option<Dimension> {
        if self.expired() {
            return None;
        }
        let resolved = self.resolved;
        let entry = resolved.def(id);
        if !entry.valid {
            return None;
        }
        let body = *self.bodies.get(&id)?;

        let mut frames: Vec<Frame> = entry
            .enclosing_params
            .iter()
            .map(|owner| self.visible_frame(*owner))
            .collect();
        if entry.param_count > 0 {
            frames.push(Frame { def: id, args });
        }

        let key: MemoKey = (id, frames.iter().map(|f| f.args.clone()).collect());
        if let Some(dim) = self.memo.get(&key) {
            return *dim;
        }

        if self.in_progress.contains(&id) {
            if self.cycle_reported.insert(id) {
                let name = entry.name.clone();
                let site = entry.site;
                self.report(
                    Diagnostic::new(
                        DiagKind::CircularDefinitionError,
                        at,
                        format!("`{name}` is defined in terms of itself"),
                    )
                    .with_related(site, format!("`{name}` defined here")),
                );
            }
            return None;
        }

        self.in_progress.insert(id);
        let saved = std::mem::replace(&mut self.frames, frames);
        let dim = self.eval(&body.body);
        self.frames = saved;
        self.in_progress.remove(&id);

        self.memo.insert(key, dim);
        dim
    }

    /// Innermost active frame for `owner`, or an all-unknown frame.
    fn visible_frame(&self, owner: DefId) -> Frame {
        self.frames
            .iter()
            .rev()
            .find(|f| f.def == owner)
            .cloned()
            .unwrap_or_else(|| Frame {
                def: owner,
                args: vec![None; self.resolved.def(owner).param_count],
            })
    }

    fn parameter(&self, owner: DefId, index: usize) -> Option<Dimension> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.def == owner)
            .and_then(|f| f.args.get(index).copied().flatten())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval(&mut self, expr: &'a Expr) -> Option<Dimension> {
        if self.result.timed_out {
            return None;
        }
        let dim = match &expr.kind {
            ExprKind::Number(_) | ExprKind::Str(_) => Some(LITERAL),
            ExprKind::Prim(op) => {
                lookup_builtin(op.symbol()).map(|b| Dimension::new(b.inputs, b.outputs))
            }
            ExprKind::Ident(_) => self.eval_reference(expr.span),
            ExprKind::Call { callee, args } => self.eval_call(expr, callee, args),
            ExprKind::Compose { .. } | ExprKind::Infix { .. } => self.eval_chain(expr),
            ExprKind::Prime(inner) => {
                let inner = self.eval(inner)?;
                if inner.outputs == MEM.inputs {
                    Some(Dimension::new(inner.inputs, MEM.outputs))
                } else {
                    self.report(Diagnostic::new(
                        DiagKind::BoxDimensionError(BoxRule::Sequential),
                        expr.span,
                        format!(
                            "one-sample delay needs outputs=1, but the delayed expression has outputs={}",
                            inner.outputs
                        ),
                    ));
                    None
                }
            }
            ExprKind::With { body, defs } => {
                for def in defs {
                    if def.is_invalid() {
                        continue;
                    }
                    if let Some(id) = self.resolved.def_at(def.name.span) {
                        self.eval_standalone(id, def.name.span);
                    }
                }
                self.eval(body)
            }
            ExprKind::Invalid => None,
        };
        if let Some(dim) = dim {
            self.result.dims.entry(expr.span).or_insert(dim);
        }
        dim
    }

    /// A binary node and the binary nodes down its left spine, innermost
    /// first.
    fn eval_chain(&mut self, expr: &'a Expr) -> Option<Dimension> {
        let (spine, leftmost) = expr.left_spine();
        let mut acc = self.eval(leftmost);
        for node in spine.into_iter().rev() {
            if self.result.timed_out {
                return None;
            }
            let dim = match &node.kind {
                ExprKind::Compose { op, right, .. } => {
                    let r = self.eval(right);
                    match (acc, r) {
                        (Some(l), Some(r)) => self.compose(*op, l, r, node, right),
                        _ => None,
                    }
                }
                ExprKind::Infix { op, right, .. } => {
                    let r = self.eval(right);
                    match (acc, r) {
                        (Some(l), Some(r)) => self.apply_infix(*op, l, r, node.span),
                        _ => None,
                    }
                }
                _ => None,
            };
            if let Some(dim) = dim {
                self.result.dims.entry(node.span).or_insert(dim);
            }
            acc = dim;
        }
        acc
    }

    /// A bare identifier.
    fn eval_reference(&mut self, span: Span) -> Option<Dimension> {
        let resolved = self.resolved;
        let symbol = resolved.reference(span)?;
        match symbol {
            Symbol::Primitive(b) => match b.class {
                BuiltinClass::UiGroup => None,
                _ => Some(Dimension::new(b.inputs, b.outputs)),
            },
            Symbol::Imported { arity, .. } => Some(*arity),
            Symbol::UserDefined { params, .. } if *params > 0 => None,
            Symbol::UserDefined { def, .. } => self.eval_def(*def, Vec::new(), span),
            Symbol::Parameter { owner, index, .. } => self.parameter(*owner, *index),
        }
    }

    fn eval_call(&mut self, expr: &'a Expr, callee: &Ident, args: &'a [Expr]) -> Option<Dimension> {
        let arg_dims: Vec<Option<Dimension>> = args.iter().map(|a| self.eval(a)).collect();
        let resolved = self.resolved;
        let symbol = resolved.reference(callee.span)?;

        match symbol {
            Symbol::Primitive(b) => match b.class {
                BuiltinClass::UiControl => Some(Dimension::new(b.inputs, b.outputs)),
                BuiltinClass::UiDisplay => Some(Dimension::new(b.inputs, b.outputs)),
                BuiltinClass::UiGroup => arg_dims.get(1).copied().flatten(),
                BuiltinClass::Box | BuiltinClass::Delay => {
                    let f = Dimension::new(b.inputs, b.outputs);
                    self.box_apply(&callee.name, f, &arg_dims, expr.span)
                }
            },
            Symbol::Imported { arity, .. } => {
                let f = *arity;
                self.box_apply(&callee.name, f, &arg_dims, expr.span)
            }
            Symbol::Parameter { owner, index, .. } => {
                let f = self.parameter(*owner, *index)?;
                self.box_apply(&callee.name, f, &arg_dims, expr.span)
            }
            Symbol::UserDefined { def, params: 0, .. } => {
                let f = self.eval_def(*def, Vec::new(), callee.span)?;
                self.box_apply(&callee.name, f, &arg_dims, expr.span)
            }
            Symbol::UserDefined { def, params, .. } => {
                let params = *params;
                if arg_dims.len() < params {
                    return None;
                }
                let f = self.eval_def(*def, arg_dims[..params].to_vec(), callee.span)?;
                if arg_dims.len() == params {
                    Some(f)
                } else {
                    self.box_apply(&callee.name, f, &arg_dims[params..], expr.span)
                }
            }
        }
    }

    /// `f(a1..an)` as `a1, .., an : f`, with missing leading inputs wired
    /// through.
    fn box_apply(
        &mut self,
        name: &str,
        f: Dimension,
        args: &[Option<Dimension>],
        span: Span,
    ) -> Option<Dimension> {
        let args: Vec<Dimension> = args.iter().copied().collect::<Option<_>>()?;
        let outputs: usize = args.iter().map(|a| a.outputs).sum();
        let inputs: usize = args.iter().map(|a| a.inputs).sum();
        if outputs > f.inputs {
            self.report(Diagnostic::new(
                DiagKind::BoxDimensionError(BoxRule::Sequential),
                span,
                format!(
                    "arguments of `{name}` provide outputs={outputs}, but `{name}` has inputs={}",
                    f.inputs
                ),
            ));
            return None;
        }
        Some(Dimension::new(f.inputs - outputs + inputs, f.outputs))
    }

    fn apply_infix(&mut self, op: PrimOp, l: Dimension, r: Dimension, span: Span) -> Option<Dimension> {
        let b = lookup_builtin(op.symbol())?;
        let outputs = l.outputs + r.outputs;
        if outputs != b.inputs {
            self.report(Diagnostic::new(
                DiagKind::BoxDimensionError(BoxRule::Sequential),
                span,
                format!(
                    "operands of `{}` provide outputs={outputs}, but `{}` has inputs={}",
                    op.symbol(),
                    op.symbol(),
                    b.inputs
                ),
            ));
            return None;
        }
        Some(Dimension::new(l.inputs + r.inputs, b.outputs))
    }

    fn compose(
        &mut self,
        op: CompOp,
        a: Dimension,
        b: Dimension,
        expr: &'a Expr,
        right: &'a Expr,
    ) -> Option<Dimension> {
        let span = expr.span;
        match op {
            CompOp::Seq => {
                if a.outputs == b.inputs {
                    return Some(Dimension::new(a.inputs, b.outputs));
                }
                self.report(Diagnostic::new(
                    DiagKind::BoxDimensionError(BoxRule::Sequential),
                    span,
                    format!(
                        "sequential composition `A : B` mismatch: A has outputs={}, B has inputs={}",
                        a.outputs, b.inputs
                    ),
                ));
                None
            }
            CompOp::Par => Some(Dimension::new(a.inputs + b.inputs, a.outputs + b.outputs)),
            CompOp::Split => {
                let ok = if a.outputs == 0 {
                    b.inputs == 0
                } else {
                    b.inputs % a.outputs == 0
                };
                if ok {
                    return Some(Dimension::new(a.inputs, b.outputs));
                }
                self.report(Diagnostic::new(
                    DiagKind::BoxDimensionError(BoxRule::Split),
                    span,
                    format!(
                        "split composition `A <: B` mismatch: B has inputs={}, which is not a multiple of A's outputs={}",
                        b.inputs, a.outputs
                    ),
                ));
                None
            }
            CompOp::Merge => {
                let ok = if b.inputs == 0 {
                    a.outputs == 0
                } else {
                    a.outputs % b.inputs == 0
                };
                if ok {
                    return Some(Dimension::new(a.inputs, b.outputs));
                }
                self.report(Diagnostic::new(
                    DiagKind::BoxDimensionError(BoxRule::Merge),
                    span,
                    format!(
                        "merge composition `A :> B` mismatch: A has outputs={}, which is not a multiple of B's inputs={}",
                        a.outputs, b.inputs
                    ),
                ));
                None
            }
            CompOp::Rec => {
                if a.outputs < b.inputs || a.inputs < b.outputs {
                    self.report(Diagnostic::new(
                        DiagKind::BoxDimensionError(BoxRule::Recursive),
                        span,
                        format!(
                            "recursive composition `A ~ B` mismatch: A has inputs={} and outputs={}, B has inputs={} and outputs={}",
                            a.inputs, a.outputs, b.inputs, b.outputs
                        ),
                    ));
                    return None;
                }
                if self.delay_in(right) == Delay::None {
                    self.report(Diagnostic::new(
                        DiagKind::CausalityWarning,
                        span,
                        "feedback path of `A ~ B` has no delay; B is computed from A's output in the same sample",
                    ));
                }
                Some(Dimension::new(a.inputs - b.outputs, a.outputs))
            }
        }
    }

    // ── Causality scan ──────────────────────────────────────────────────

    fn delay_in(&mut self, expr: &'a Expr) -> Delay {
        match &expr.kind {
            ExprKind::Number(_) | ExprKind::Str(_) => Delay::None,
            ExprKind::Prim(PrimOp::Delay) | ExprKind::Prime(_) => Delay::Found,
            ExprKind::Prim(_) => Delay::None,
            ExprKind::Ident(_) => self.delay_of_symbol(expr.span),
            ExprKind::Call { callee, args } => {
                let resolved = self.resolved;
                match resolved.reference(callee.span) {
                    // Arguments bound to parameters reach the body through
                    // the parameter frame; extra ones are box-applied.
                    Some(Symbol::UserDefined { def, params, .. })
                        if *params > 0 && args.len() >= *params =>
                    {
                        let (bound, extra) = args.split_at(*params);
                        let bound: Vec<Delay> = bound.iter().map(|a| self.delay_in(a)).collect();
                        let mut delay = self.delay_of_def(*def, bound);
                        for arg in extra {
                            delay = delay.or(self.delay_in(arg));
                        }
                        delay
                    }
                    _ => {
                        let mut delay = self.delay_of_symbol(callee.span);
                        for arg in args {
                            delay = delay.or(self.delay_in(arg));
                        }
                        delay
                    }
                }
            }
            ExprKind::Compose { .. } | ExprKind::Infix { .. } => {
                let (spine, leftmost) = expr.left_spine();
                let mut delay = self.delay_in(leftmost);
                for node in spine.into_iter().rev() {
                    if let ExprKind::Infix {
                        op: PrimOp::Delay, ..
                    } = node.kind
                    {
                        delay = Delay::Found;
                    }
                    if let Some((_, right)) = node.operands() {
                        delay = delay.or(self.delay_in(right));
                    }
                }
                delay
            }
            ExprKind::With { body, .. } => self.delay_in(body),
            ExprKind::Invalid => Delay::Unknown,
        }
    }

    fn delay_of_symbol(&mut self, span: Span) -> Delay {
        let resolved = self.resolved;
        let Some(symbol) = resolved.reference(span) else {
            return Delay::Unknown;
        };
        match symbol {
            Symbol::Primitive(b) if b.class == BuiltinClass::Delay => Delay::Found,
            Symbol::Primitive(_) => Delay::None,
            Symbol::Imported { stateful: true, .. } => Delay::Found,
            Symbol::Imported { .. } => Delay::None,
            // Without a known argument, assume it may delay.
            Symbol::Parameter { owner, index, .. } => self
                .delay_frames
                .iter()
                .rev()
                .find(|(def, _)| def == owner)
                .and_then(|(_, args)| args.get(*index).copied())
                .unwrap_or(Delay::Found),
            Symbol::UserDefined { def, .. } => self.delay_of_def(*def, Vec::new()),
        }
    }

    /// Scan the body of `id` with `args` as the delays of its first
    /// parameters.
    fn delay_of_def(&mut self, id: DefId, args: Vec<Delay>) -> Delay {
        let key = (id, args);
        if let Some(delay) = self.delay_memo.get(&key) {
            return *delay;
        }
        let resolved = self.resolved;
        let entry = resolved.def(id);
        if !entry.valid {
            return Delay::Unknown;
        }
        let Some(def) = self.bodies.get(&id).copied() else {
            return Delay::Unknown;
        };
        // Outer parameters make the result depend on the enclosing call.
        let memoize = entry.enclosing_params.is_empty();

        // Cycle guard: a definition being scanned contributes nothing more.
        self.delay_memo.insert(key.clone(), Delay::None);
        self.delay_frames.push(key.clone());
        let delay = self.delay_in(&def.body);
        self.delay_frames.pop();
        if memoize {
            self.delay_memo.insert(key, delay);
        } else {
            self.delay_memo.remove(&key);
        }
        delay
    }
}

pub(crate) fn collect_local_bodies<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Definition)) {
    match &expr.kind {
        ExprKind::With { body, defs } => {
            for def in defs {
                visit(def);
                collect_local_bodies(&def.body, visit);
            }
            collect_local_bodies(body, visit);
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                collect_local_bodies(arg, visit);
            }
        }
        ExprKind::Compose { .. } | ExprKind::Infix { .. } => {
            let (spine, leftmost) = expr.left_spine();
            collect_local_bodies(leftmost, visit);
            for (_, right) in spine.into_iter().rev().filter_map(Expr::operands) {
                collect_local_bodies(right, visit);
            }
        }
        ExprKind::Prime(inner) => collect_local_bodies(inner, visit),
        ExprKind::Ident(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::Prim(_)
        | ExprKind::Invalid => {}
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
