// boxlint: static analyzer for block-diagram signal-processing programs
//
// Library root. The free functions below run the pipeline with the bundled
// standard dictionary; use `pipeline::Analyzer` for a custom dictionary or
// options.

pub mod ast;
pub mod diag;
pub mod dimension;
pub mod explain;
pub mod id;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod structure;
pub mod suggest;

pub use diag::{DiagKind, Diagnostic, Severity};
pub use explain::ErrorDiagnosis;
pub use pipeline::{AnalysisCache, AnalysisOptions, AnalysisResult, Analyzer, SyntaxReport};
pub use registry::ImportDictionary;
pub use structure::{DetailLevel, StructureReport};

/// Tokenize, parse, resolve and check dimensions of `source`.
pub fn analyze_syntax(source: &str) -> SyntaxReport {
    Analyzer::default().analyze_syntax(source)
}

/// Definitions, UI parameters and imports of `source`.
pub fn analyze_structure(source: &str, detail: DetailLevel) -> StructureReport {
    Analyzer::default()
        .with_options(AnalysisOptions::new().detail(detail))
        .analyze_structure(source)
}

/// Explain a raw error message, optionally against the source it came from.
pub fn diagnose_error(raw_message: &str, source: Option<&str>) -> ErrorDiagnosis {
    Analyzer::default().diagnose_error(raw_message, source)
}

/// Full analysis: diagnostics, quick fixes and the structure report.
pub fn analyze(source: &str) -> AnalysisResult {
    Analyzer::default().analyze(source)
}
