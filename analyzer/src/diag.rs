// diag.rs: Unified diagnostics model
//
// Provides the shared diagnostic types used across all analysis stages, plus
// the byte-offset → line/column index used to locate them.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code is never reused for a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    pub const E0001: DiagCode = DiagCode("E0001"); // lexical error
    pub const E0100: DiagCode = DiagCode("E0100"); // syntax error
    pub const E0200: DiagCode = DiagCode("E0200"); // undefined symbol
    pub const E0201: DiagCode = DiagCode("E0201"); // duplicate definition
    pub const E0202: DiagCode = DiagCode("E0202"); // import not found
    pub const E0300: DiagCode = DiagCode("E0300"); // circular definition
    pub const E0301: DiagCode = DiagCode("E0301"); // sequential arity
    pub const E0302: DiagCode = DiagCode("E0302"); // split arity
    pub const E0303: DiagCode = DiagCode("E0303"); // merge arity
    pub const E0304: DiagCode = DiagCode("E0304"); // recursive arity
    pub const W0300: DiagCode = DiagCode("W0300"); // missing delay in feedback
    pub const E0400: DiagCode = DiagCode("E0400"); // parameter range
    pub const E0401: DiagCode = DiagCode("E0401"); // duplicate UI path
    pub const E0900: DiagCode = DiagCode("E0900"); // analysis timeout
}

// ── Kind & severity ──────────────────────────────────────────────────────

/// Which composition rule a box-dimension error violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxRule {
    Sequential,
    Split,
    Merge,
    Recursive,
}

impl fmt::Display for BoxRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoxRule::Sequential => "Sequential",
            BoxRule::Split => "Split",
            BoxRule::Merge => "Merge",
            BoxRule::Recursive => "Recursive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagKind {
    LexicalError,
    SyntaxError,
    UndefinedSymbolError,
    DuplicateDefinitionError,
    ImportNotFoundError,
    CircularDefinitionError,
    BoxDimensionError(BoxRule),
    CausalityWarning,
    ParameterRangeError,
    DuplicatePathError,
    AnalysisTimeoutError,
}

impl DiagKind {
    pub fn code(self) -> DiagCode {
        match self {
            DiagKind::LexicalError => codes::E0001,
            DiagKind::SyntaxError => codes::E0100,
            DiagKind::UndefinedSymbolError => codes::E0200,
            DiagKind::DuplicateDefinitionError => codes::E0201,
            DiagKind::ImportNotFoundError => codes::E0202,
            DiagKind::CircularDefinitionError => codes::E0300,
            DiagKind::BoxDimensionError(BoxRule::Sequential) => codes::E0301,
            DiagKind::BoxDimensionError(BoxRule::Split) => codes::E0302,
            DiagKind::BoxDimensionError(BoxRule::Merge) => codes::E0303,
            DiagKind::BoxDimensionError(BoxRule::Recursive) => codes::E0304,
            DiagKind::CausalityWarning => codes::W0300,
            DiagKind::ParameterRangeError => codes::E0400,
            DiagKind::DuplicatePathError => codes::E0401,
            DiagKind::AnalysisTimeoutError => codes::E0900,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagKind::CausalityWarning => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Short name without the box rule, e.g. `BoxDimensionError`.
    pub fn name(self) -> &'static str {
        match self {
            DiagKind::LexicalError => "LexicalError",
            DiagKind::SyntaxError => "SyntaxError",
            DiagKind::UndefinedSymbolError => "UndefinedSymbolError",
            DiagKind::DuplicateDefinitionError => "DuplicateDefinitionError",
            DiagKind::ImportNotFoundError => "ImportNotFoundError",
            DiagKind::CircularDefinitionError => "CircularDefinitionError",
            DiagKind::BoxDimensionError(_) => "BoxDimensionError",
            DiagKind::CausalityWarning => "CausalityWarning",
            DiagKind::ParameterRangeError => "ParameterRangeError",
            DiagKind::DuplicatePathError => "DuplicatePathError",
            DiagKind::AnalysisTimeoutError => "AnalysisTimeoutError",
        }
    }
}

impl fmt::Display for DiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagKind::BoxDimensionError(rule) => write!(f, "BoxDimensionError({rule})"),
            other => f.write_str(other.name()),
        }
    }
}

impl Serialize for DiagKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

// ── Related location ─────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedLocation {
    #[serde(skip)]
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any analysis stage.
///
/// `line`/`column` are 0 until [`Diagnostic::locate`] runs; the pipeline
/// locates every diagnostic before returning it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagKind,
    pub severity: Severity,
    pub code: DiagCode,
    #[serde(skip)]
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedLocation>,
}

impl Diagnostic {
    /// Create a diagnostic; severity and code follow from `kind`.
    pub fn new(kind: DiagKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            code: kind.code(),
            span,
            line: 0,
            column: 0,
            message: message.into(),
            suggestion: None,
            related: Vec::new(),
        }
    }

    /// Attach a suggested fix.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach a related location.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related.push(RelatedLocation {
            span,
            line: 0,
            column: 0,
            label: label.into(),
        });
        self
    }

    /// Fill in line/column for the primary and related spans.
    pub fn locate(&mut self, lines: &LineIndex<'_>) {
        let pos = lines.position(self.span.start);
        self.line = pos.line;
        self.column = pos.column;
        for related in &mut self.related {
            let pos = lines.position(related.span.start);
            related.line = pos.line;
            related.column = pos.column;
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        for related in &self.related {
            write!(
                f,
                "\n  note: {} ({}:{})",
                related.label, related.line, related.column
            )?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  hint: {}", suggestion)?;
        }
        Ok(())
    }
}

// ── Line index ───────────────────────────────────────────────────────────

/// 1-based line and column (columns count characters, not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Maps byte offsets in a source to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex {
            source,
            line_starts,
        }
    }

    /// Offsets past the end clamp to the end of the source.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line - 1];
        let column = self
            .source
            .get(start..offset)
            .map_or(offset - start, |text| text.chars().count());
        Position {
            line,
            column: column + 1,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        (start..end).into()
    }

    #[test]
    fn severity_follows_kind() {
        let d = Diagnostic::new(DiagKind::CausalityWarning, span(0, 1), "no delay");
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.code, codes::W0300);
        let d = Diagnostic::new(
            DiagKind::BoxDimensionError(BoxRule::Split),
            span(0, 1),
            "bad split",
        );
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code, codes::E0302);
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::new(DiagKind::UndefinedSymbolError, span(0, 3), "undefined symbol `foo`");
        assert_eq!(format!("{d}"), "error[E0200]: undefined symbol `foo`");
    }

    #[test]
    fn display_with_hint_and_note() {
        let mut d = Diagnostic::new(DiagKind::DuplicateDefinitionError, span(10, 11), "`a` is defined twice")
            .with_related(span(0, 1), "first defined here")
            .with_suggestion("rename one of the definitions");
        d.locate(&LineIndex::new("a = _;\n   a = _;"));
        assert_eq!(
            format!("{d}"),
            "error[E0201]: `a` is defined twice\n  note: first defined here (1:1)\n  hint: rename one of the definitions"
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(
            DiagKind::BoxDimensionError(BoxRule::Merge).to_string(),
            "BoxDimensionError(Merge)"
        );
        assert_eq!(DiagKind::SyntaxError.to_string(), "SyntaxError");
        assert_eq!(DiagKind::BoxDimensionError(BoxRule::Merge).name(), "BoxDimensionError");
    }

    #[test]
    fn serializes_without_span() {
        let mut d = Diagnostic::new(DiagKind::SyntaxError, span(4, 5), "unexpected `;`");
        d.locate(&LineIndex::new("abc\nd;"));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "SyntaxError");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["code"], "E0100");
        assert_eq!(json["line"], 2);
        assert_eq!(json["column"], 1);
        assert!(json.get("span").is_none());
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn line_index_positions() {
        let lines = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(lines.line_count(), 4);
        assert_eq!(lines.position(0), Position { line: 1, column: 1 });
        assert_eq!(lines.position(2), Position { line: 1, column: 3 });
        assert_eq!(lines.position(3), Position { line: 2, column: 1 });
        assert_eq!(lines.position(7), Position { line: 4, column: 1 });
        assert_eq!(lines.position(100), Position { line: 4, column: 3 });
    }

    #[test]
    fn columns_count_characters() {
        let lines = LineIndex::new("é = _;");
        // `=` sits at byte 3 but is the third character.
        assert_eq!(lines.position(3), Position { line: 1, column: 3 });
    }
}
