// AST node types for block-diagram source files.
//
// Mirrors the grammar accepted by the parser. Every node carries a `Span`
// (byte offsets) for error reporting; expression nodes are also identified by
// their span in the side tables built by later passes.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module plus pretty printer).
// Side effects: none.

use std::fmt;

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Span covering `first` through `last`.
pub fn join(first: Span, last: Span) -> Span {
    (first.start..last.end).into()
}

// ── Root ──

/// A complete program: imports, metadata declarations and definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
    pub definitions: Vec<Definition>,
    /// Statements dropped by error recovery that could not be kept as a
    /// (name-only) definition.
    pub skipped: Vec<Span>,
    pub span: Span,
}

// ── import_stmt: 'import' '(' STRING ')' ';' ──

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub path: String,
    pub span: Span,
}

// ── declare_stmt: 'declare' IDENT IDENT? STRING ';' ──

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// `declare foo author "x";` targets definition `foo`.
    pub target: Option<Ident>,
    pub key: Ident,
    pub value: String,
    pub span: Span,
}

// ── definition: IDENT ('(' params ')')? '=' expression ';' ──

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Expr,
    pub span: Span,
}

impl Definition {
    /// True when the body could not be parsed and was replaced by `Invalid`.
    pub fn is_invalid(&self) -> bool {
        matches!(self.body.kind, ExprKind::Invalid)
    }
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Plain or dotted identifier (`_`, `mem`, `gain`, `os.osc`).
    Ident(String),
    Number(f64),
    Str(String),
    /// Operator used as a box: `+`, `@`, `!`, ...
    Prim(PrimOp),
    /// `name(args)`; operator boxes applied to arguments use the operator
    /// symbol as callee name (`+(1)`).
    Call { callee: Ident, args: Vec<Expr> },
    Compose {
        op: CompOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Infix arithmetic `a + b`, i.e. `a, b : +`.
    Infix {
        op: PrimOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `e'`, i.e. `e : mem`.
    Prime(Box<Expr>),
    With { body: Box<Expr>, defs: Vec<Definition> },
    /// Subtree rooted at an unrecoverable syntax error.
    Invalid,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    /// Binding strength used by the printer; mirrors the parser tiers.
    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::With { .. } => 0,
            ExprKind::Compose { op, .. } => op.precedence(),
            ExprKind::Infix { op, .. } => op.infix_precedence().unwrap_or(ATOM_PRECEDENCE),
            ExprKind::Prime(_) => POSTFIX_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    /// Expressions that need parentheses when used as a call argument.
    fn is_compound(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Compose { .. } | ExprKind::With { .. }
        )
    }

    /// Left and right operands of a `Compose` or `Infix` node.
    pub fn operands(&self) -> Option<(&Expr, &Expr)> {
        match &self.kind {
            ExprKind::Compose { left, right, .. } | ExprKind::Infix { left, right, .. } => {
                Some((left, right))
            }
            _ => None,
        }
    }

    /// Binary nodes down the left spine, outermost first, and the operand
    /// the spine ends on. The parser folds chains to the left, so walking
    /// the spine in a loop keeps recursion depth independent of chain length.
    pub fn left_spine(&self) -> (Vec<&Expr>, &Expr) {
        let mut spine = Vec::new();
        let mut current = self;
        while let Some((left, _)) = current.operands() {
            spine.push(current);
            current = left;
        }
        (spine, current)
    }
}

// Dismantle subtrees with an explicit stack; the derived drop would recurse
// once per chain link.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_children(&mut self.kind, &mut pending);
        while let Some(mut child) = pending.pop() {
            take_children(&mut child.kind, &mut pending);
        }
    }
}

fn take_children(kind: &mut ExprKind, pending: &mut Vec<Expr>) {
    match kind {
        ExprKind::Ident(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::Prim(_)
        | ExprKind::Invalid => return,
        _ => {}
    }
    match std::mem::replace(kind, ExprKind::Invalid) {
        ExprKind::Compose { left, right, .. } | ExprKind::Infix { left, right, .. } => {
            pending.push(*left);
            pending.push(*right);
        }
        ExprKind::Prime(inner) => pending.push(*inner),
        ExprKind::Call { args, .. } => pending.extend(args),
        ExprKind::With { body, defs } => {
            pending.push(*body);
            pending.extend(defs.into_iter().map(|def| def.body));
        }
        _ => {}
    }
}

/// The five box-algebra composition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Seq,
    Par,
    Split,
    Merge,
    Rec,
}

impl CompOp {
    /// Precedence table, highest binds tightest. All tiers are left-associative;
    /// split and merge share a tier.
    pub const fn precedence(self) -> u8 {
        match self {
            CompOp::Rec => 4,
            CompOp::Par => 3,
            CompOp::Seq => 2,
            CompOp::Split | CompOp::Merge => 1,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            CompOp::Seq => ":",
            CompOp::Par => ",",
            CompOp::Split => "<:",
            CompOp::Merge => ":>",
            CompOp::Rec => "~",
        }
    }
}

/// Operator boxes that may appear as values, infix operators, or callees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Delay,
    Cut,
}

impl PrimOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            PrimOp::Add => "+",
            PrimOp::Sub => "-",
            PrimOp::Mul => "*",
            PrimOp::Div => "/",
            PrimOp::Mod => "%",
            PrimOp::Delay => "@",
            PrimOp::Cut => "!",
        }
    }

    /// Infix binding strength (above every composition tier). `!` has no
    /// infix form.
    pub const fn infix_precedence(self) -> Option<u8> {
        match self {
            PrimOp::Add | PrimOp::Sub => Some(5),
            PrimOp::Mul | PrimOp::Div | PrimOp::Mod => Some(6),
            PrimOp::Delay => Some(7),
            PrimOp::Cut => None,
        }
    }
}

const POSTFIX_PRECEDENCE: u8 = 8;
const ATOM_PRECEDENCE: u8 = 9;

// ── Identifier ──

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── Pretty printer ──
//
// Output re-parses to a structurally equal tree: parentheses are inserted
// only where the precedence table requires them, except around compound call
// arguments, which are always wrapped (arguments are parsed without the `,`
// tier).

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for import in &self.imports {
            write!(f, "import(")?;
            write_string(f, &import.path)?;
            writeln!(f, ");")?;
        }
        for decl in &self.declarations {
            write!(f, "declare ")?;
            if let Some(target) = &decl.target {
                write!(f, "{} ", target.name)?;
            }
            write!(f, "{} ", decl.key.name)?;
            write_string(f, &decl.value)?;
            writeln!(f, ";")?;
        }
        for def in &self.definitions {
            writeln!(f, "{def}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.name)?;
        if !self.params.is_empty() {
            let names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
            write!(f, "({})", names.join(", "))?;
        }
        write!(f, " = {};", self.body)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Ident(name) => write!(f, "{name}"),
            ExprKind::Number(n) => write!(f, "{n}"),
            ExprKind::Str(s) => write_string(f, s),
            ExprKind::Prim(op) => write!(f, "{}", op.symbol()),
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if arg.is_compound() {
                        write!(f, "({arg})")?;
                    } else {
                        write!(f, "{arg}")?;
                    }
                }
                write!(f, ")")
            }
            ExprKind::Compose { .. } | ExprKind::Infix { .. } => write_chain(f, self),
            ExprKind::Prime(inner) => {
                write_operand(f, inner, POSTFIX_PRECEDENCE, false)?;
                write!(f, "'")
            }
            ExprKind::With { body, defs } => {
                write_operand(f, body, 1, false)?;
                write!(f, " with {{")?;
                for def in defs {
                    write!(f, " {def}")?;
                }
                write!(f, " }}")
            }
            ExprKind::Invalid => write!(f, "<invalid>"),
        }
    }
}

/// Print a binary node and the left operands that need no parentheses as
/// one flat chain.
fn write_chain(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    let mut spine = Vec::new();
    let mut current = expr;
    let leftmost = loop {
        let Some((left, _)) = current.operands() else {
            break current;
        };
        spine.push(current);
        if left.operands().is_none() || left.precedence() < current.precedence() {
            break left;
        }
        current = left;
    };

    let innermost = spine.last().map_or(ATOM_PRECEDENCE, |node| node.precedence());
    write_operand(f, leftmost, innermost, false)?;
    for node in spine.iter().rev() {
        let Some((_, right)) = node.operands() else {
            continue;
        };
        match &node.kind {
            ExprKind::Compose { op: CompOp::Par, .. } => write!(f, ", ")?,
            ExprKind::Compose { op, .. } => write!(f, " {} ", op.symbol())?,
            ExprKind::Infix { op, .. } => write!(f, " {} ", op.symbol())?,
            _ => {}
        }
        write_operand(f, right, node.precedence(), true)?;
    }
    Ok(())
}

fn write_operand(f: &mut fmt::Formatter<'_>, child: &Expr, parent: u8, right: bool) -> fmt::Result {
    let prec = child.precedence();
    if prec < parent || (right && prec == parent) {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            _ => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        (0..0).into()
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), span())
    }

    fn compose(op: CompOp, left: Expr, right: Expr) -> Expr {
        Expr::new(
            ExprKind::Compose {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span(),
        )
    }

    #[test]
    fn precedence_table_order() {
        assert!(CompOp::Rec.precedence() > CompOp::Par.precedence());
        assert!(CompOp::Par.precedence() > CompOp::Seq.precedence());
        assert!(CompOp::Seq.precedence() > CompOp::Split.precedence());
        assert_eq!(CompOp::Split.precedence(), CompOp::Merge.precedence());
    }

    #[test]
    fn prints_without_redundant_parens() {
        // (a, b) : c needs no parentheses: `,` binds tighter than `:`.
        let e = compose(
            CompOp::Seq,
            compose(CompOp::Par, ident("a"), ident("b")),
            ident("c"),
        );
        assert_eq!(e.to_string(), "a, b : c");
    }

    #[test]
    fn prints_parens_for_looser_child() {
        let e = compose(
            CompOp::Par,
            compose(CompOp::Seq, ident("a"), ident("b")),
            ident("c"),
        );
        assert_eq!(e.to_string(), "(a : b), c");
    }

    #[test]
    fn right_nested_same_tier_is_parenthesized() {
        let e = compose(
            CompOp::Split,
            ident("a"),
            compose(CompOp::Merge, ident("b"), ident("c")),
        );
        assert_eq!(e.to_string(), "a <: (b :> c)");
    }

    #[test]
    fn call_arguments_are_wrapped_when_compound() {
        let call = Expr::new(
            ExprKind::Call {
                callee: Ident {
                    name: "f".into(),
                    span: span(),
                },
                args: vec![
                    compose(CompOp::Par, ident("a"), ident("b")),
                    Expr::new(ExprKind::Number(2.5), span()),
                ],
            },
            span(),
        );
        assert_eq!(call.to_string(), "f((a, b), 2.5)");
    }

    #[test]
    fn strings_are_escaped() {
        let e = Expr::new(ExprKind::Str("say \"hi\"\\".into()), span());
        assert_eq!(e.to_string(), r#""say \"hi\"\\""#);
    }

    #[test]
    fn definition_with_params() {
        let def = Definition {
            name: Ident {
                name: "gain".into(),
                span: span(),
            },
            params: vec![Ident {
                name: "g".into(),
                span: span(),
            }],
            body: Expr::new(
                ExprKind::Infix {
                    op: PrimOp::Mul,
                    left: Box::new(ident("_")),
                    right: Box::new(ident("g")),
                },
                span(),
            ),
            span: span(),
        };
        assert_eq!(def.to_string(), "gain(g) = _ * g;");
    }
}
