// explain.rs: Explain raw error messages
//
// Classifies a raw message (from a compiler or from this analyzer) against a
// static pattern table and produces a diagnosis with fixes and before/after
// examples. Counts written as `[n]` are quoted back in the diagnosis.
//
// Preconditions: none; any string is accepted.
// Postconditions: `category` is None only when no pattern matched.
// Failure modes: none.
// Side effects: none.

use serde::Serialize;

use crate::diag::{BoxRule, DiagKind, Diagnostic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixExample {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDiagnosis {
    pub category: Option<DiagKind>,
    pub diagnosis: String,
    pub root_cause: String,
    pub suggested_fixes: Vec<String>,
    pub examples: Vec<FixExample>,
    /// Diagnostics of the analyzed source that match the category.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Diagnostic>,
}

// ── Pattern table ──────────────────────────────────────────────────────────

struct Pattern {
    kind: DiagKind,
    /// Lowercase substrings; any one of them selects the row.
    needles: &'static [&'static str],
    diagnosis: &'static str,
    root_cause: &'static str,
    /// Names for the first two bracketed counts.
    counts: Option<(&'static str, &'static str)>,
    fixes: &'static [&'static str],
    examples: &'static [(&'static str, &'static str)],
}

// Rows are tried in order; specific composition names come before the
// generic wording they share.
const PATTERNS: &[Pattern] = &[
    Pattern {
        kind: DiagKind::BoxDimensionError(BoxRule::Split),
        needles: &["split composition", "boxdimensionerror(split)", "e0302", "must be a divisor"],
        diagnosis: "A split composition `A <: B` connects signals that do not fan out evenly.",
        root_cause: "The number of inputs of B must be a multiple of the number of outputs of A.",
        counts: Some(("outputs of A", "inputs of B")),
        fixes: &[
            "change B so its input count is a multiple of A's outputs",
            "use `:` when A's outputs and B's inputs should match one-to-one",
        ],
        examples: &[("process = _, _ <: _, _, _;", "process = _, _ <: _, _, _, _;")],
    },
    Pattern {
        kind: DiagKind::BoxDimensionError(BoxRule::Merge),
        needles: &["merge composition", "boxdimensionerror(merge)", "e0303", "must be a multiple"],
        diagnosis: "A merge composition `A :> B` mixes signals that do not fold evenly.",
        root_cause: "The number of outputs of A must be a multiple of the number of inputs of B.",
        counts: Some(("outputs of A", "inputs of B")),
        fixes: &[
            "change A so its output count is a multiple of B's inputs",
            "use `:` when A's outputs and B's inputs should match one-to-one",
        ],
        examples: &[("process = _, _, _ :> _, _;", "process = _, _, _, _ :> _, _;")],
    },
    Pattern {
        kind: DiagKind::BoxDimensionError(BoxRule::Recursive),
        needles: &["recursive composition", "boxdimensionerror(recursive)", "e0304"],
        diagnosis: "A recursive composition `A ~ B` has a feedback path that does not fit.",
        root_cause: "B may take at most as many inputs as A has outputs, and produce at most as many outputs as A has inputs.",
        counts: None,
        fixes: &["reduce B's inputs or outputs, or widen A"],
        examples: &[("process = _ ~ (_, _);", "process = + ~ _';")],
    },
    Pattern {
        kind: DiagKind::BoxDimensionError(BoxRule::Sequential),
        needles: &[
            "sequential composition",
            "boxdimensionerror(sequential)",
            "e0301",
            "number of outputs",
            "operands of",
            "arguments of",
        ],
        diagnosis: "A sequential composition `A : B` connects a different number of signals on each side.",
        root_cause: "The number of outputs of A must equal the number of inputs of B.",
        counts: Some(("outputs of A", "inputs of B")),
        fixes: &[
            "make A's outputs equal B's inputs",
            "use `:>` to mix several outputs down, or `<:` to duplicate a signal",
        ],
        examples: &[
            (
                "process = os.osc(440), os.osc(660) : mem;",
                "process = os.osc(440), os.osc(660) :> mem;",
            ),
            ("process = _, _ : _;", "process = _, _ : +;"),
        ],
    },
    Pattern {
        kind: DiagKind::UndefinedSymbolError,
        needles: &["undefined symbol", "undefinedsymbolerror", "e0200", "unbound identifier"],
        diagnosis: "A name is used that is not defined in any visible scope.",
        root_cause: "The symbol is misspelled, defined in a `with` block that is not visible here, or provided by a library that is not imported.",
        counts: None,
        fixes: &[
            "check the spelling of the name",
            "add `import(\"stdfaust.lib\");` for standard library symbols such as `os.osc`",
        ],
        examples: &[(
            "process = os.osc(440);",
            "import(\"stdfaust.lib\");\nprocess = os.osc(440);",
        )],
    },
    Pattern {
        kind: DiagKind::ImportNotFoundError,
        needles: &["importnotfounderror", "e0202", "unable to open", "library `"],
        diagnosis: "An imported library is not known.",
        root_cause: "The library name does not match any library in the import dictionary.",
        counts: None,
        fixes: &["check the library name", "import the standard environment `stdfaust.lib`"],
        examples: &[("import(\"stdfaust.lb\");", "import(\"stdfaust.lib\");")],
    },
    Pattern {
        kind: DiagKind::DuplicateDefinitionError,
        needles: &["already defined", "duplicatedefinitionerror", "e0201", "multiple definitions"],
        diagnosis: "The same name is defined twice in one scope.",
        root_cause: "Only the first definition is used; later ones are ignored.",
        counts: None,
        fixes: &["rename or remove one of the definitions"],
        examples: &[("gain = 0.5;\ngain = 0.8;", "gain = 0.5;\nboost = 0.8;")],
    },
    Pattern {
        kind: DiagKind::CircularDefinitionError,
        needles: &["circular", "defined in terms of itself", "e0300", "endless evaluation cycle"],
        diagnosis: "A definition refers back to itself.",
        root_cause: "Definitions are expanded like macros, so a self-reference never terminates.",
        counts: None,
        fixes: &["express feedback with the recursive operator `~`"],
        examples: &[("process = process : +(1);", "process = +(1) ~ _';")],
    },
    Pattern {
        kind: DiagKind::CausalityWarning,
        needles: &["causality", "no delay", "w0300"],
        diagnosis: "A feedback loop has no delay in its feedback path.",
        root_cause: "Without a delay, the feedback signal would depend on itself within the same sample.",
        counts: None,
        fixes: &["insert `mem`, `@(n)` or `'` in the feedback path"],
        examples: &[("process = + ~ _;", "process = + ~ _';")],
    },
    Pattern {
        kind: DiagKind::ParameterRangeError,
        needles: &["parameterrangeerror", "e0400", "outside the range", "greater than max"],
        diagnosis: "A UI control has inconsistent range values.",
        root_cause: "Controls require min <= default <= max.",
        counts: None,
        fixes: &["choose a default inside the range", "swap min and max if they are inverted"],
        examples: &[(
            "hslider(\"freq\", 5, 10, 20, 1)",
            "hslider(\"freq\", 15, 10, 20, 1)",
        )],
    },
    Pattern {
        kind: DiagKind::DuplicatePathError,
        needles: &["duplicatepatherror", "e0401", "more than one control"],
        diagnosis: "Two UI controls share the same path.",
        root_cause: "Controls are addressed by their group path and label, which must be unique.",
        counts: None,
        fixes: &["give each control a distinct label", "place the controls in different groups"],
        examples: &[(
            "button(\"go\"), button(\"go\")",
            "button(\"go 1\"), button(\"go 2\")",
        )],
    },
    Pattern {
        kind: DiagKind::LexicalError,
        needles: &["lexicalerror", "e0001", "unexpected character", "unterminated"],
        diagnosis: "The source contains characters that do not form a token.",
        root_cause: "A stray character or an unterminated comment was found.",
        counts: None,
        fixes: &["remove the stray character", "close block comments with `*/`"],
        examples: &[("process = _ $ _;", "process = _ , _;")],
    },
    Pattern {
        kind: DiagKind::SyntaxError,
        needles: &["syntax error", "syntaxerror", "e0100", "unexpected", "parse error"],
        diagnosis: "The statement does not follow the grammar.",
        root_cause: "A token appears where the parser expects something else, often a missing `;` or parenthesis.",
        counts: None,
        fixes: &["terminate every statement with `;`", "balance parentheses and braces"],
        examples: &[("process = _ : _", "process = _ : _;")],
    },
    Pattern {
        kind: DiagKind::AnalysisTimeoutError,
        needles: &["analysistimeouterror", "e0900", "timed out", "timeout"],
        diagnosis: "Analysis did not finish in time.",
        root_cause: "The program is too large or deeply nested for the configured timeout.",
        counts: None,
        fixes: &["raise the timeout", "split the program into smaller definitions"],
        examples: &[],
    },
];

/// Numbers written in square brackets, in order: "[2] ... [1]" → [2, 1].
pub fn bracketed_counts(message: &str) -> Vec<usize> {
    let mut counts = Vec::new();
    let mut rest = message;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        if let Some(close) = rest.find(']') {
            if let Ok(n) = rest[..close].trim().parse() {
                counts.push(n);
            }
        }
    }
    counts
}

/// Explain `raw`. `diagnostics` are the located diagnostics of the source
/// the message came from, when available.
pub fn diagnose_error(raw: &str, diagnostics: Option<&[Diagnostic]>) -> ErrorDiagnosis {
    let lower = raw.to_lowercase();
    let pattern = PATTERNS
        .iter()
        .find(|p| p.needles.iter().any(|needle| lower.contains(needle)));

    let mut result = match pattern {
        Some(p) => {
            let mut diagnosis = p.diagnosis.to_string();
            let counts = bracketed_counts(raw);
            if let (Some((first, second)), [a, b, ..]) = (p.counts, counts.as_slice()) {
                diagnosis.push_str(&format!(" Reported counts: {first} = {a}, {second} = {b}."));
            }
            ErrorDiagnosis {
                category: Some(p.kind),
                diagnosis,
                root_cause: p.root_cause.to_string(),
                suggested_fixes: p.fixes.iter().map(|f| f.to_string()).collect(),
                examples: p
                    .examples
                    .iter()
                    .map(|(before, after)| FixExample {
                        before: before.to_string(),
                        after: after.to_string(),
                    })
                    .collect(),
                related: Vec::new(),
            }
        }
        None => ErrorDiagnosis {
            category: None,
            diagnosis: "The message does not match a known error pattern.".to_string(),
            root_cause: "Unknown.".to_string(),
            suggested_fixes: vec![
                "analyze the source to obtain located diagnostics".to_string(),
            ],
            examples: Vec::new(),
            related: Vec::new(),
        },
    };

    if let Some(diagnostics) = diagnostics {
        result.related = diagnostics
            .iter()
            .filter(|d| match result.category {
                Some(kind) => d.kind == kind,
                None => d.is_error(),
            })
            .cloned()
            .collect();
        for diag in &result.related {
            if let Some(suggestion) = &diag.suggestion {
                if !result.suggested_fixes.contains(suggestion) {
                    result.suggested_fixes.push(suggestion.clone());
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    #[test]
    fn compiler_sequential_message() {
        let raw = "ERROR : sequential composition A:B\nThe number of outputs [2] of A must be equal to the number of inputs [1] of B";
        let d = diagnose_error(raw, None);
        assert_eq!(d.category, Some(DiagKind::BoxDimensionError(BoxRule::Sequential)));
        assert!(d.diagnosis.contains("outputs of A = 2, inputs of B = 1"), "{}", d.diagnosis);
        assert!(!d.examples.is_empty());
    }

    #[test]
    fn split_wins_over_generic_wording() {
        let raw = "split composition A<:B: the number of outputs [2] of A must be a divisor of the number of inputs [3] of B";
        let d = diagnose_error(raw, None);
        assert_eq!(d.category, Some(DiagKind::BoxDimensionError(BoxRule::Split)));
    }

    #[test]
    fn own_diagnostic_names_are_recognized() {
        let cases = [
            ("error[E0200]: undefined symbol `gian`", DiagKind::UndefinedSymbolError),
            ("CausalityWarning at 3:9", DiagKind::CausalityWarning),
            ("unexpected character: \"$\"", DiagKind::LexicalError),
            ("unexpected ';', expected expression", DiagKind::SyntaxError),
            ("library `foo.lib` not found", DiagKind::ImportNotFoundError),
            ("`a` is defined in terms of itself", DiagKind::CircularDefinitionError),
        ];
        for (raw, kind) in cases {
            assert_eq!(diagnose_error(raw, None).category, Some(kind), "{raw}");
        }
    }

    #[test]
    fn unknown_message() {
        let d = diagnose_error("something odd happened", None);
        assert_eq!(d.category, None);
        assert_eq!(d.suggested_fixes.len(), 1);
    }

    #[test]
    fn attaches_matching_diagnostics_and_their_suggestions() {
        let span: Span = (0..1).into();
        let diags = vec![
            Diagnostic::new(DiagKind::UndefinedSymbolError, span, "undefined symbol `gian`")
                .with_suggestion("did you mean `gain`?"),
            Diagnostic::new(DiagKind::CausalityWarning, span, "no delay"),
        ];
        let d = diagnose_error("undefined symbol", Some(&diags));
        assert_eq!(d.related.len(), 1);
        assert!(d.suggested_fixes.contains(&"did you mean `gain`?".to_string()));
    }

    #[test]
    fn counts_are_extracted_in_order() {
        assert_eq!(bracketed_counts("a [2] b [ 1 ] c [x]"), vec![2, 1]);
        assert!(bracketed_counts("no counts").is_empty());
    }
}
