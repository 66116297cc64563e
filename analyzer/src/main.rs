use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, Level};

use boxlint::report::render_text;
use boxlint::{AnalysisOptions, Analyzer, DetailLevel, ImportDictionary};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Detail {
    Basic,
    Full,
}

impl From<Detail> for DetailLevel {
    fn from(detail: Detail) -> Self {
        match detail {
            Detail::Basic => DetailLevel::Basic,
            Detail::Full => DetailLevel::Full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "boxlint",
    version,
    about = "Static analyzer for block-diagram signal-processing programs"
)]
struct Cli {
    /// Source file to analyze
    source: Option<PathBuf>,

    /// Import dictionary JSON file (repeatable)
    #[arg(short = 'L', long = "library")]
    library: Vec<PathBuf>,

    /// Do not load the bundled standard library dictionary
    #[arg(long)]
    no_std: bool,

    /// Structure report verbosity
    #[arg(long, value_enum, default_value_t = Detail::Basic)]
    detail: Detail,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Print the structure report instead of diagnostics
    #[arg(long)]
    structure: bool,

    /// Explain a raw error message (against SOURCE when given)
    #[arg(long, value_name = "MSG")]
    explain: Option<String>,

    /// Analysis timeout in milliseconds (0 disables it)
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Print passes and timing to stderr
    #[arg(long)]
    verbose: bool,
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("boxlint: error: {}", message);
    ExitCode::from(2)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // ── Load import dictionary ──
    let mut dictionary = if cli.no_std {
        ImportDictionary::new()
    } else {
        ImportDictionary::standard()
    };
    for path in &cli.library {
        match dictionary.load_json(path) {
            Ok(n) => debug!(path = %path.display(), libraries = n, "loaded dictionary"),
            Err(e) => return fail(e),
        }
    }
    debug!(libraries = dictionary.len(), "dictionary ready");

    let mut options = AnalysisOptions::new().detail(cli.detail.into());
    if cli.timeout_ms > 0 {
        options = options.timeout(Duration::from_millis(cli.timeout_ms));
    }
    let analyzer = Analyzer::new(dictionary).with_options(options);

    // ── Read source ──
    let source = match &cli.source {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => Some(s),
            Err(e) => return fail(format_args!("{}: {}", path.display(), e)),
        },
        None => None,
    };
    let display_path = cli
        .source
        .as_ref()
        .map_or_else(|| "<input>".to_string(), |p| p.display().to_string());

    // ── Explain mode ──
    if let Some(message) = &cli.explain {
        let diagnosis = analyzer.diagnose_error(message, source.as_deref());
        match cli.format {
            Format::Json => match to_json(&diagnosis) {
                Ok(json) => println!("{json}"),
                Err(e) => return fail(e),
            },
            Format::Text => {
                if let Some(kind) = diagnosis.category {
                    println!("category: {kind}");
                }
                println!("diagnosis: {}", diagnosis.diagnosis);
                println!("root cause: {}", diagnosis.root_cause);
                for fix in &diagnosis.suggested_fixes {
                    println!("fix: {fix}");
                }
                for example in &diagnosis.examples {
                    println!("before:\n  {}\nafter:\n  {}", example.before, example.after);
                }
                print!("{}", render_text(&display_path, &diagnosis.related));
            }
        }
        return ExitCode::SUCCESS;
    }

    let Some(source) = source else {
        return fail("no source file given (use --explain MSG to explain a message)");
    };

    // ── Structure mode ──
    if cli.structure {
        let report = analyzer.analyze_structure(&source);
        match cli.format {
            Format::Json => match to_json(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => return fail(e),
            },
            Format::Text => {
                for def in &report.definitions {
                    let arity = match (def.inputs, def.outputs) {
                        (Some(i), Some(o)) => format!("({i}, {o})"),
                        _ => "(?, ?)".to_string(),
                    };
                    println!("{}:{}: {} {}", def.line, def.column, def.name, arity);
                }
                for param in &report.parameters {
                    println!("{}:{}: {} {}", param.line, param.column, param.kind, param.path);
                }
                print!("{}", render_text(&display_path, &report.diagnostics));
            }
        }
        let failed = report.diagnostics.iter().any(|d| d.is_error());
        return if failed { ExitCode::from(1) } else { ExitCode::SUCCESS };
    }

    // ── Full analysis ──
    let result = analyzer.analyze(&source);
    match cli.format {
        Format::Json => match to_json(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => return fail(e),
        },
        Format::Text => print!("{}", render_text(&display_path, &result.diagnostics)),
    }
    if result.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
