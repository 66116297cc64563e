// End-to-end scenarios through the public API.
//
// Each test runs the full pipeline (`boxlint::analyze` or one of the narrower
// entry points) with the bundled standard dictionary and checks the exact set
// of diagnostic kinds, plus the key fields a fix suggestion relies on.

use std::path::{Path, PathBuf};

use boxlint::diag::BoxRule;
use boxlint::{analyze, analyze_structure, analyze_syntax, DetailLevel, DiagKind, Diagnostic};

fn fixture(name: &str) -> String {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}

fn kinds(diags: &[Diagnostic]) -> Vec<DiagKind> {
    diags.iter().map(|d| d.kind).collect()
}

// ── Reference scenarios ─────────────────────────────────────────────────────

#[test]
fn missing_standard_import() {
    let result = analyze(&fixture("missing_import.dsp"));
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::UndefinedSymbolError]);
    let d = &result.diagnostics[0];
    assert!(d
        .suggestion
        .as_deref()
        .is_some_and(|s| s.contains("import(\"stdfaust.lib\")")));
    assert_eq!((d.line, d.column), (1, 11));
}

#[test]
fn parallel_pair_into_one_input_box() {
    let src = "import(\"stdfaust.lib\");\nprocess = os.osc(440), os.osc(660) : mem;\n";
    let result = analyze(src);
    assert_eq!(
        kinds(&result.diagnostics),
        vec![DiagKind::BoxDimensionError(BoxRule::Sequential)]
    );
    let msg = &result.diagnostics[0].message;
    assert!(msg.contains("outputs=2"), "{msg}");
    assert!(msg.contains("inputs=1"), "{msg}");
}

#[test]
fn parallel_pair_into_adder_is_fine() {
    let src = "import(\"stdfaust.lib\");\nprocess = os.osc(440), os.osc(660) : +;\n";
    assert!(analyze(src).diagnostics.is_empty());
}

#[test]
fn missing_trailing_semicolon() {
    let src = "import(\"stdfaust.lib\");\nprocess = os.osc(440) : *(0.5)";
    let result = analyze(src);
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::SyntaxError]);
    let d = &result.diagnostics[0];
    assert_eq!((d.line, d.column), (2, 31));
    assert!(d.suggestion.as_deref().is_some_and(|s| s.contains(';')));
}

#[test]
fn missing_semicolon_mid_file() {
    let result = analyze("a = _\nb = _;\nprocess = a : b;\n");
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::SyntaxError]);
    assert_eq!(result.diagnostics[0].line, 2);
}

#[test]
fn slider_default_outside_range() {
    let result = analyze(r#"process = hslider("F", 5, 10, 20, 1);"#);
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::ParameterRangeError]);
}

#[test]
fn feedback_without_delay() {
    let result = analyze("a = +;\nb = _;\nprocess = a ~ b;\n");
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::CausalityWarning]);
    assert!(!result.has_errors());
    assert!(analyze_syntax("a = +;\nb = _;\nprocess = a ~ b;\n").valid);
}

// ── Fixtures ────────────────────────────────────────────────────────────────

#[test]
fn realistic_program_is_clean() {
    let result = analyze(&fixture("synth.dsp"));
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);

    let structure = result.structure.expect("structure report");
    assert_eq!(structure.imports, vec!["stdfaust.lib"]);
    let names: Vec<&str> = structure.definitions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["freq", "gain", "voice", "echo", "process"]);
    let paths: Vec<&str> = structure.parameters.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, vec!["Synth/freq", "Synth/gain"]);
    assert_eq!(
        structure.process.map(|d| (d.inputs, d.outputs)),
        Some((0, 2))
    );
}

#[test]
fn broken_program_reports_every_stage() {
    let result = analyze(&fixture("broken.dsp"));
    assert_eq!(
        kinds(&result.diagnostics),
        vec![
            DiagKind::ParameterRangeError,
            DiagKind::BoxDimensionError(BoxRule::Sequential),
            DiagKind::SyntaxError,
        ]
    );
    let lines: Vec<usize> = result.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![3, 4, 5]);
}

// ── Scoping ─────────────────────────────────────────────────────────────────

#[test]
fn nested_with_blocks() {
    let src = r#"
process = outer with {
    outer = inner : *(k) with { inner = _ <: _, _ :> _; };
    k = 0.5;
};
"#;
    let result = analyze(src);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
    let structure = analyze_structure(src, DetailLevel::Full);
    let locals: Vec<&str> = structure.definitions[0]
        .locals
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(locals, vec!["outer", "k"]);
}

#[test]
fn with_locals_do_not_leak() {
    let result = analyze("f = g with { g = _; };\nprocess = g;\n");
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::UndefinedSymbolError]);
    assert_eq!(result.diagnostics[0].line, 2);
}

#[test]
fn misspelled_library_member() {
    let result = analyze("import(\"stdfaust.lib\");\nprocess = os.oscc(440);\n");
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::UndefinedSymbolError]);
    assert_eq!(
        result.diagnostics[0].suggestion.as_deref(),
        Some("did you mean `os.osc`?")
    );
}

#[test]
fn circular_definitions() {
    let result = analyze("a = b : _;\nb = a : _;\nprocess = a;\n");
    assert_eq!(
        kinds(&result.diagnostics),
        vec![DiagKind::CircularDefinitionError]
    );
    assert_eq!(result.diagnostics[0].related.len(), 1);
}

#[test]
fn duplicate_ui_paths_in_groups() {
    let src = r#"process = vgroup("ch", hslider("level", 0, 0, 1, 0.1)), vgroup("ch", hslider("level", 0, 0, 1, 0.1));"#;
    let result = analyze(src);
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::DuplicatePathError]);
    assert_eq!(result.diagnostics[0].related[0].column, 24);
}

#[test]
fn same_control_definition_in_two_groups() {
    let src = r#"
left = hslider("gain", 0, 0, 1, 0.1);
right = hslider("gain", 0, 0, 1, 0.1);
process = hgroup("L", left), hgroup("R", right);
"#;
    let result = analyze(src);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
    let structure = result.structure.expect("structure report");
    let paths: Vec<&str> = structure.parameters.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, vec!["L/gain", "R/gain"]);
}

#[test]
fn parameter_bound_to_plain_wire_needs_a_delay() {
    let result = analyze("f(x) = x;\nprocess = + ~ f(_);\n");
    assert_eq!(kinds(&result.diagnostics), vec![DiagKind::CausalityWarning]);
}

#[test]
fn very_long_chains() {
    for n in [2000, 3000, 20_000] {
        let chain = vec!["_"; n].join(" : ");
        let src = format!("process = {chain};\n");
        let result = analyze(&src);
        assert!(result.diagnostics.is_empty(), "{n}: {:#?}", result.diagnostics);

        let program = boxlint::parser::parse(&src).program.expect("parses");
        assert_eq!(program.to_string(), src);
    }
}

#[test]
fn lexical_error_does_not_stop_analysis() {
    let result = analyze("process = _ $ _;\nbad = _, _ : mem;\n");
    let found = kinds(&result.diagnostics);
    assert!(found.contains(&DiagKind::LexicalError), "{found:?}");
    assert!(
        found.contains(&DiagKind::BoxDimensionError(BoxRule::Sequential)),
        "{found:?}"
    );
}
