// Property-based tests for analyzer invariants.
//
// Four categories:
// 1. Idempotence: analyzing the same text twice gives identical reports
// 2. Sequential law: k wires : k wires never reports a Sequential error
// 3. Split law: k wires <: m wires reports a Split error iff m % k != 0
// 4. Printer round-trip: print → re-parse gives the same tree and text
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use boxlint::ast::{Definition, Expr, ExprKind, Ident, Program, Span};
use boxlint::diag::BoxRule;
use boxlint::{analyze, analyze_syntax, DiagKind};
use proptest::prelude::*;

// ── Generators ──────────────────────────────────────────────────────────────

/// `k` parallel wires, parenthesized.
fn wires(k: usize) -> String {
    format!("({})", vec!["_"; k].join(", "))
}

/// Token soup: mostly valid fragments with the occasional stray character.
fn arb_source() -> impl Strategy<Value = String> {
    let fragment = prop_oneof![
        Just("process"),
        Just("f"),
        Just("g"),
        Just("="),
        Just(";"),
        Just("_"),
        Just("!"),
        Just("mem"),
        Just("+"),
        Just(":"),
        Just(","),
        Just("<:"),
        Just(":>"),
        Just("~"),
        Just("("),
        Just(")"),
        Just("with"),
        Just("{"),
        Just("}"),
        Just("0.5"),
        Just("\"s\""),
        Just("os.osc"),
        Just("import(\"stdfaust.lib\");"),
        Just("$"),
        Just("/*"),
        Just("\n"),
    ];
    prop::collection::vec(fragment, 0..40).prop_map(|parts| parts.join(" "))
}

/// Fully parenthesized expressions over a small set of leaves.
fn arb_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("_".to_string()),
        Just("!".to_string()),
        Just("mem".to_string()),
        Just("f".to_string()),
        Just("\"label\"".to_string()),
        (0u32..1000).prop_map(|n| n.to_string()),
        (0u32..100).prop_map(|n| format!("{}.25", n)),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop_oneof![Just(":"), Just(","), Just("<:"), Just(":>"), Just("~")],
                inner.clone()
            )
                .prop_map(|(a, op, b)| format!("({a} {op} {b})")),
            (
                inner.clone(),
                prop_oneof![Just("+"), Just("-"), Just("*"), Just("/"), Just("@")],
                inner.clone()
            )
                .prop_map(|(a, op, b)| format!("({a} {op} {b})")),
            inner.clone().prop_map(|a| format!("({a})'")),
            prop::collection::vec(inner.clone(), 1..3)
                .prop_map(|args| format!("max({})", args.join(", "))),
            (inner.clone(), inner)
                .prop_map(|(body, local)| format!("({body} with {{ h = {local}; }})")),
        ]
    })
}

// ── Span erasure ────────────────────────────────────────────────────────────

fn no_span() -> Span {
    Span::from(0..0)
}

fn erase_ident(ident: &mut Ident) {
    ident.span = no_span();
}

fn erase_expr(expr: &mut Expr) {
    expr.span = no_span();
    match &mut expr.kind {
        ExprKind::Call { callee, args } => {
            erase_ident(callee);
            args.iter_mut().for_each(erase_expr);
        }
        ExprKind::Compose { left, right, .. } | ExprKind::Infix { left, right, .. } => {
            erase_expr(left);
            erase_expr(right);
        }
        ExprKind::Prime(inner) => erase_expr(inner),
        ExprKind::With { body, defs } => {
            erase_expr(body);
            defs.iter_mut().for_each(erase_definition);
        }
        ExprKind::Ident(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::Prim(_)
        | ExprKind::Invalid => {}
    }
}

fn erase_definition(def: &mut Definition) {
    def.span = no_span();
    erase_ident(&mut def.name);
    def.params.iter_mut().for_each(erase_ident);
    erase_expr(&mut def.body);
}

/// The program with every span zeroed, so trees parsed from differently
/// laid out text compare equal.
fn without_spans(mut program: Program) -> Program {
    program.span = no_span();
    for import in &mut program.imports {
        import.span = no_span();
    }
    for decl in &mut program.declarations {
        decl.span = no_span();
        erase_ident(&mut decl.key);
        decl.target.iter_mut().for_each(erase_ident);
    }
    program.definitions.iter_mut().for_each(erase_definition);
    program
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn analysis_is_idempotent(source in arb_source()) {
        prop_assert_eq!(analyze_syntax(&source), analyze_syntax(&source));
        prop_assert_eq!(analyze(&source), analyze(&source));
    }

    #[test]
    fn full_analysis_keeps_syntax_diagnostics(source in arb_source()) {
        let syntax = analyze_syntax(&source);
        let full = analyze(&source);
        for d in &syntax.diagnostics {
            prop_assert!(full.diagnostics.contains(d), "dropped {:?}", d);
            prop_assert!(d.line >= 1 && d.column >= 1);
        }
    }

    #[test]
    fn matching_sequential_is_valid(k in 1usize..8) {
        let source = format!("process = {} : {};", wires(k), wires(k));
        let report = analyze_syntax(&source);
        prop_assert!(report.valid, "{:?}", report.diagnostics);
    }

    #[test]
    fn mismatched_sequential_is_reported(k in 1usize..8, m in 1usize..8) {
        prop_assume!(k != m);
        let source = format!("process = {} : {};", wires(k), wires(m));
        let report = analyze_syntax(&source);
        let seq = DiagKind::BoxDimensionError(BoxRule::Sequential);
        prop_assert!(report.diagnostics.iter().any(|d| d.kind == seq));
    }

    #[test]
    fn split_arity_law(k in 1usize..6, m in 1usize..13) {
        let source = format!("process = {} <: {};", wires(k), wires(m));
        let report = analyze_syntax(&source);
        let split = DiagKind::BoxDimensionError(BoxRule::Split);
        let reported = report.diagnostics.iter().any(|d| d.kind == split);
        prop_assert_eq!(reported, m % k != 0, "k={} m={}", k, m);
    }

    #[test]
    fn printed_ast_reparses(expr in arb_expr()) {
        let source = format!("f = _;\nprocess = {expr};\n");
        let first = boxlint::parser::parse(&source);
        prop_assert!(first.errors.is_empty(), "{:?}\n{}", first.errors, source);
        let first = first.program.unwrap();
        let printed = first.to_string();

        let second = boxlint::parser::parse(&printed);
        prop_assert!(second.errors.is_empty(), "{:?}\n{}", second.errors, printed);
        let second = second.program.unwrap();
        prop_assert_eq!(&printed, &second.to_string());
        prop_assert_eq!(without_spans(first), without_spans(second), "{}", printed);
    }
}
