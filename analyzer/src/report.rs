// report.rs: Diagnostics engine: locate, suggest, order, select quick fixes
//
// Preconditions: diagnostics carry spans into the source `lines` indexes.
// Postconditions: every input diagnostic is present in the output, located,
//                 errors before warnings, then by (line, column).
// Failure modes: none.
// Side effects: none.

use serde::Serialize;

use crate::diag::{BoxRule, DiagKind, Diagnostic, LineIndex};

/// Number of quick fixes returned when the caller does not choose.
pub const DEFAULT_QUICK_FIX_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregated {
    pub diagnostics: Vec<Diagnostic>,
    /// Leading entries of `diagnostics`, the ones to fix first.
    pub quick_fixes: Vec<Diagnostic>,
}

// ── Suggestion table ───────────────────────────────────────────────────────

/// (kind, message substring, suggestion). The first matching row wins; an
/// empty substring matches any message of that kind.
const SUGGESTIONS: &[(DiagKind, &str, &str)] = &[
    (
        DiagKind::LexicalError,
        "unterminated block comment",
        "close the comment with `*/`",
    ),
    (
        DiagKind::LexicalError,
        "",
        "remove the character or move it into a string literal",
    ),
    (
        DiagKind::SyntaxError,
        "",
        "definitions have the form `name = expression;`",
    ),
    (
        DiagKind::UndefinedSymbolError,
        "",
        "define the symbol or import the library that provides it",
    ),
    (
        DiagKind::DuplicateDefinitionError,
        "",
        "rename or remove one of the definitions",
    ),
    (
        DiagKind::ImportNotFoundError,
        "",
        "check the library name; the standard environment is `stdfaust.lib`",
    ),
    (
        DiagKind::CircularDefinitionError,
        "",
        "express feedback with the recursive operator, e.g. `process = + ~ mem;`",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Sequential),
        "operands of",
        "use single-output operands, e.g. `_ * 0.5`",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Sequential),
        "arguments of",
        "pass fewer arguments, or arguments with fewer outputs",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Sequential),
        "one-sample delay",
        "apply `'` to a single-output expression",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Sequential),
        "",
        "make A's outputs equal B's inputs, or use `<:` / `:>` to split or merge signals",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Split),
        "",
        "B's inputs must be a multiple of A's outputs; use `:` for a one-to-one connection",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Merge),
        "",
        "A's outputs must be a multiple of B's inputs; use `:` for a one-to-one connection",
    ),
    (
        DiagKind::BoxDimensionError(BoxRule::Recursive),
        "",
        "in `A ~ B`, B may have at most A's outputs as inputs and at most A's inputs as outputs",
    ),
    (
        DiagKind::CausalityWarning,
        "",
        "insert a delay in the feedback path, e.g. `+ ~ (_ : mem)` or `+ ~ _'`",
    ),
    (
        DiagKind::ParameterRangeError,
        "default",
        "choose a default between min and max",
    ),
    (
        DiagKind::ParameterRangeError,
        "",
        "swap min and max",
    ),
    (
        DiagKind::DuplicatePathError,
        "",
        "give each control a distinct label, or place them in different groups",
    ),
    (
        DiagKind::AnalysisTimeoutError,
        "",
        "simplify the program or raise the analysis timeout",
    ),
];

/// Suggestion for a diagnostic from the static table.
pub fn suggestion_for(kind: DiagKind, message: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(k, pattern, _)| *k == kind && message.contains(pattern))
        .map(|(_, _, suggestion)| *suggestion)
}

// ── Aggregation ────────────────────────────────────────────────────────────

pub fn aggregate(
    mut diagnostics: Vec<Diagnostic>,
    lines: &LineIndex<'_>,
    quick_fix_limit: usize,
) -> Aggregated {
    for diag in &mut diagnostics {
        diag.locate(lines);
        if diag.suggestion.is_none() {
            diag.suggestion = suggestion_for(diag.kind, &diag.message).map(str::to_string);
        }
    }
    diagnostics.sort_by_key(|d| (d.severity, d.line, d.column));

    let quick_fixes = diagnostics.iter().take(quick_fix_limit).cloned().collect();
    Aggregated {
        diagnostics,
        quick_fixes,
    }
}

/// Render diagnostics as `path:line:column: severity[code]: message` blocks.
pub fn render_text(path: &str, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diag in diagnostics {
        out.push_str(&format!("{path}:{}:{}: {diag}\n", diag.line, diag.column));
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────
