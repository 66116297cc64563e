// pipeline.rs: Analysis state, pass orchestration and caller-facing entry points
//
// Holds the artifacts of every pass in one state struct and runs the minimal
// set of passes for a given terminal PassId. `Analyzer` wraps the runner for
// the three operations (syntax check, structure, full analysis) plus error
// explanation; `AnalysisCache` memoizes full results by content hash.
//
// Preconditions: the dictionary passed to `Analyzer::new` is the one the
//                source's imports are resolved against.
// Postconditions: every operation returns located, ordered diagnostics; on
//                 timeout, exactly one AnalysisTimeoutError.
// Failure modes: only the timeout aborts a run; all other problems are
//                diagnostics.
// Side effects: emits `tracing` spans and debug events per pass.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info_span};

use crate::ast::Program;
use crate::diag::{DiagKind, Diagnostic, LineIndex};
use crate::dimension::DimensionResult;
use crate::explain::ErrorDiagnosis;
use crate::lexer::LexResult;
use crate::pass::{descriptor, required_passes, PassId};
use crate::registry::ImportDictionary;
use crate::report::{Aggregated, DEFAULT_QUICK_FIX_LIMIT};
use crate::resolve::ResolvedProgram;
use crate::structure::{DetailLevel, StructureReport};

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisOptions {
    pub detail: DetailLevel,
    /// Wall-clock bound for one run; `None` is unbounded.
    pub timeout: Option<Duration>,
    pub quick_fix_limit: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            detail: DetailLevel::Basic,
            timeout: None,
            quick_fix_limit: DEFAULT_QUICK_FIX_LIMIT,
        }
    }
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn quick_fix_limit(mut self, limit: usize) -> Self {
        self.quick_fix_limit = limit;
        self
    }
}

// ── Results ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxReport {
    /// No error-severity diagnostics.
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub diagnostics: Vec<Diagnostic>,
    pub quick_fixes: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureReport>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn timed_out(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagKind::AnalysisTimeoutError)
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Artifacts of the passes run so far for one source.
pub struct AnalysisState<'s> {
    pub source: &'s str,
    pub lines: LineIndex<'s>,
    pub tokens: Option<LexResult>,
    pub program: Option<Program>,
    pub resolved: Option<ResolvedProgram>,
    pub dimensions: Option<DimensionResult>,
    pub structure: Option<StructureReport>,
    pub report: Option<Aggregated>,
    /// Raw diagnostics of every pass in execution order.
    pub diagnostics: Vec<Diagnostic>,
    /// The structure pass's share of `diagnostics`.
    pub structure_diagnostics: Vec<Diagnostic>,
}

impl<'s> AnalysisState<'s> {
    pub fn new(source: &'s str) -> Self {
        AnalysisState {
            source,
            lines: LineIndex::new(source),
            tokens: None,
            program: None,
            resolved: None,
            dimensions: None,
            structure: None,
            report: None,
            diagnostics: Vec::new(),
            structure_diagnostics: Vec::new(),
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// The run exceeded its deadline before or during `pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeout {
    pub pass: PassId,
}

fn timeout_diagnostic(timeout: Option<Duration>, pass: PassId) -> Diagnostic {
    let limit = timeout.map_or(0, |t| t.as_millis());
    Diagnostic::new(
        DiagKind::AnalysisTimeoutError,
        (0..0).into(),
        format!(
            "analysis exceeded the timeout of {limit} ms during the {} pass",
            descriptor(pass).name
        ),
    )
}

// ── Pipeline runner ────────────────────────────────────────────────────────

fn finish_pass(state: &mut AnalysisState<'_>, pass_id: PassId, diags: Vec<Diagnostic>, started: Instant) {
    debug!(
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        diagnostics = diags.len(),
        "{} complete",
        descriptor(pass_id).name
    );
    state.diagnostics.extend(diags);
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Run the minimal set of passes to produce `terminal`.
///
/// Passes whose input artifact is missing (no program after a fatal parse)
/// are skipped; the report pass always runs when requested.
pub fn run_pipeline(
    state: &mut AnalysisState<'_>,
    terminal: PassId,
    dictionary: &ImportDictionary,
    options: &AnalysisOptions,
    deadline: Option<Instant>,
) -> Result<(), PipelineTimeout> {
    for pass_id in required_passes(terminal) {
        if expired(deadline) {
            return Err(PipelineTimeout { pass: pass_id });
        }
        let span = info_span!("pass", name = descriptor(pass_id).name);
        let _enter = span.enter();
        let started = Instant::now();

        match pass_id {
            PassId::Lex => {
                let tokens = crate::lexer::lex(state.source);
                debug!(tokens = tokens.tokens.len(), errors = tokens.errors.len(), "lexed");
                state.tokens = Some(tokens);
                // Lexical errors are reported through the parse result.
                finish_pass(state, pass_id, Vec::new(), started);
            }
            PassId::Parse => {
                let tokens = state.tokens.take().unwrap_or_else(|| crate::lexer::lex(state.source));
                let result = crate::parser::parse_tokens(state.source, tokens);
                state.program = result.program;
                finish_pass(state, pass_id, result.errors, started);
            }
            PassId::Resolve => {
                let Some(program) = state.program.as_ref() else {
                    continue;
                };
                let result = crate::resolve::resolve(program, dictionary);
                state.resolved = Some(result.resolved);
                finish_pass(state, pass_id, result.diagnostics, started);
            }
            PassId::Dimensions => {
                let (Some(program), Some(resolved)) = (state.program.as_ref(), state.resolved.as_ref())
                else {
                    continue;
                };
                let mut result =
                    crate::dimension::analyze_dimensions_with_deadline(program, resolved, deadline);
                if result.timed_out {
                    return Err(PipelineTimeout { pass: pass_id });
                }
                let diags = std::mem::take(&mut result.diagnostics);
                state.dimensions = Some(result);
                finish_pass(state, pass_id, diags, started);
            }
            PassId::Structure => {
                let (Some(program), Some(resolved), Some(dims)) = (
                    state.program.as_ref(),
                    state.resolved.as_ref(),
                    state.dimensions.as_ref(),
                ) else {
                    continue;
                };
                let result = crate::structure::analyze_structure(
                    program,
                    resolved,
                    dims,
                    &state.lines,
                    options.detail,
                );
                state.structure = Some(result.report);
                state.structure_diagnostics = result.diagnostics.clone();
                finish_pass(state, pass_id, result.diagnostics, started);
            }
            PassId::Report => {
                let aggregated = crate::report::aggregate(
                    state.diagnostics.clone(),
                    &state.lines,
                    options.quick_fix_limit,
                );
                debug!(
                    diagnostics = aggregated.diagnostics.len(),
                    quick_fixes = aggregated.quick_fixes.len(),
                    "report complete"
                );
                state.report = Some(aggregated);
            }
        }
    }
    Ok(())
}

// ── Analyzer ───────────────────────────────────────────────────────────────

/// Entry point for callers. Holds only immutable data, so one analyzer can
/// serve several threads.
#[derive(Debug, Clone)]
pub struct Analyzer {
    dictionary: ImportDictionary,
    options: AnalysisOptions,
    fingerprint: [u8; 32],
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(ImportDictionary::standard())
    }
}

impl Analyzer {
    pub fn new(dictionary: ImportDictionary) -> Self {
        let fingerprint = dictionary.fingerprint();
        Analyzer {
            dictionary,
            options: AnalysisOptions::default(),
            fingerprint,
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn dictionary(&self) -> &ImportDictionary {
        &self.dictionary
    }

    fn run(&self, state: &mut AnalysisState<'_>, terminal: PassId) -> Result<(), Diagnostic> {
        let deadline = self.options.timeout.map(|t| Instant::now() + t);
        run_pipeline(state, terminal, &self.dictionary, &self.options, deadline).map_err(|err| {
            debug!(pass = descriptor(err.pass).name, "analysis timed out");
            let mut diag = timeout_diagnostic(self.options.timeout, err.pass);
            diag.locate(&state.lines);
            diag
        })
    }

    /// Tokenize, parse, resolve and check dimensions.
    pub fn analyze_syntax(&self, source: &str) -> SyntaxReport {
        let mut state = AnalysisState::new(source);
        let diagnostics = match self.run(&mut state, PassId::Dimensions) {
            Ok(()) => {
                crate::report::aggregate(state.diagnostics, &state.lines, self.options.quick_fix_limit)
                    .diagnostics
            }
            Err(timeout) => vec![timeout],
        };
        SyntaxReport {
            valid: !diagnostics.iter().any(Diagnostic::is_error),
            diagnostics,
        }
    }

    /// Structural summary with the structure-stage diagnostics attached.
    pub fn analyze_structure(&self, source: &str) -> StructureReport {
        let mut state = AnalysisState::new(source);
        let outcome = self.run(&mut state, PassId::Structure);
        let mut report = state.structure.take().unwrap_or_else(|| self.empty_structure());
        report.diagnostics = match outcome {
            Ok(()) => {
                crate::report::aggregate(
                    state.structure_diagnostics,
                    &state.lines,
                    self.options.quick_fix_limit,
                )
                .diagnostics
            }
            Err(timeout) => vec![timeout],
        };
        report
    }

    /// Run every pass.
    pub fn analyze(&self, source: &str) -> AnalysisResult {
        let mut state = AnalysisState::new(source);
        match self.run(&mut state, PassId::Report) {
            Ok(()) => {
                let Aggregated {
                    diagnostics,
                    quick_fixes,
                } = state.report.take().unwrap_or_else(|| Aggregated {
                    diagnostics: Vec::new(),
                    quick_fixes: Vec::new(),
                });
                let structure = state.structure.take().map(|mut report| {
                    report.diagnostics = diagnostics
                        .iter()
                        .filter(|d| {
                            matches!(
                                d.kind,
                                DiagKind::ParameterRangeError | DiagKind::DuplicatePathError
                            )
                        })
                        .cloned()
                        .collect();
                    report
                });
                AnalysisResult {
                    diagnostics,
                    quick_fixes,
                    structure,
                }
            }
            Err(timeout) => AnalysisResult {
                diagnostics: vec![timeout.clone()],
                quick_fixes: vec![timeout],
                structure: None,
            },
        }
    }

    /// Explain a raw error message; with `source`, attach the matching
    /// diagnostics of its analysis.
    pub fn diagnose_error(&self, raw_message: &str, source: Option<&str>) -> ErrorDiagnosis {
        let analyzed = source.map(|s| self.analyze(s));
        crate::explain::diagnose_error(
            raw_message,
            analyzed.as_ref().map(|r| r.diagnostics.as_slice()),
        )
    }

    fn empty_structure(&self) -> StructureReport {
        StructureReport {
            detail: self.options.detail,
            imports: Vec::new(),
            metadata: Vec::new(),
            definitions: Vec::new(),
            parameters: Vec::new(),
            process: None,
            diagnostics: Vec::new(),
        }
    }

    /// Content key for `source` under this analyzer's dictionary and options.
    pub fn cache_key(&self, source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(self.fingerprint);
        hasher.update(format!("{:?}", self.options).as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        bytes_to_hex(&hash)
    }
}

pub(crate) fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ── Cache ──────────────────────────────────────────────────────────────────

/// Memoizes full analysis results by content hash. An edited source hashes
/// to a new key, so stale entries are never served.
#[derive(Debug)]
pub struct AnalysisCache {
    analyzer: Analyzer,
    entries: HashMap<String, AnalysisResult>,
}

impl AnalysisCache {
    pub fn new(analyzer: Analyzer) -> Self {
        AnalysisCache {
            analyzer,
            entries: HashMap::new(),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Cached result for `source`, analyzing on a miss. Timed-out results
    /// are returned but not stored.
    pub fn get_or_analyze(&mut self, source: &str) -> AnalysisResult {
        let key = self.analyzer.cache_key(source);
        if let Some(hit) = self.entries.get(&key) {
            debug!(key = %key, "analysis cache hit");
            return hit.clone();
        }
        let result = self.analyzer.analyze(source);
        if !result.timed_out() {
            self.entries.insert(key, result.clone());
        }
        result
    }

    /// Drop the entry for `source`. Returns whether one existed.
    pub fn invalidate(&mut self, source: &str) -> bool {
        let key = self.analyzer.cache_key(source);
        self.entries.remove(&key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
