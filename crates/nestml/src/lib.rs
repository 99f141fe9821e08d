//! NESTML compiler front-end.
//!
//! This is the high-level public API. [`compile`] performs the steps:
//!
//! 1. Discovers all `*.nestml` files under the input path (recursive),
//!    sorted for deterministic diagnostics.
//! 2. Reads every source file into a [`SourceMap`].
//! 3. Lexes and parses each file into a compilation unit, with
//!    best-effort recovery.
//! 4. Runs the per-unit analysis pipeline: symbol tables, unit-aware
//!    type checking, context conditions, equations analysis, and the
//!    solver exchange.
//! 5. Assembles a [`CompileResult`] with every unit, every diagnostic,
//!    and a severity summary.
//!
//! Units with errors keep their diagnostics but produce no analyzed IR;
//! other units in the same invocation are unaffected.

pub mod config;

pub use config::{CompilerConfig, LogLevel};
pub use nestml_analysis::{CompileSummary, FoldOutcome, NeuronOutcome, PipelineOptions};
pub use nestml_ast::{
    CompilationUnit, Diagnostic, DiagnosticFormatter, DiagnosticKind, Diagnostics, Severity,
    SourceMap,
};

use nestml_analysis::{process_unit, SolverTransport};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Everything one compiler invocation produced.
#[derive(Debug)]
pub struct CompileResult {
    /// Analyzed compilation units, in input order.
    pub units: Vec<CompilationUnit>,
    /// Per-neuron analysis outcomes, across all units.
    pub outcomes: Vec<NeuronOutcome>,
    /// Every diagnostic of the run.
    pub diagnostics: Vec<Diagnostic>,
    /// Source files, for diagnostic formatting.
    pub source_map: SourceMap,
}

impl CompileResult {
    /// True if any diagnostic is at ERROR or worse.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity >= Severity::Error)
    }

    /// Severity tallies.
    pub fn summary(&self) -> CompileSummary {
        let mut summary = CompileSummary::default();
        for diagnostic in &self.diagnostics {
            match diagnostic.severity {
                Severity::Info => summary.infos += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Error => summary.errors += 1,
                Severity::Fatal => summary.fatals += 1,
            }
        }
        summary
    }

    /// Process exit status: 0 clean, 1 on errors, 2 on fatals.
    pub fn exit_code(&self) -> i32 {
        self.summary().exit_code()
    }

    /// All diagnostics rendered with source snippets.
    pub fn format_diagnostics(&self) -> String {
        DiagnosticFormatter::new(&self.source_map).format_all(&self.diagnostics)
    }
}

/// Compile every `.nestml` file reachable from the configured input path.
pub fn compile(config: &CompilerConfig) -> CompileResult {
    let mut source_map = SourceMap::new();
    let mut diags = Diagnostics::new();
    let mut units = Vec::new();
    let mut outcomes = Vec::new();

    let files = discover_sources(&config.input_path, &mut diags);
    info!(count = files.len(), "discovered model files");

    let model_root = config.effective_model_root();
    let pipeline_options = PipelineOptions {
        resolution_ms: config.resolution_ms,
        solver_timeout: config.solver_timeout,
        dev: config.dev,
    };

    for path in files {
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                diags.push(Diagnostic::error(
                    DiagnosticKind::Internal,
                    nestml_ast::Span::zero(0),
                    format!("failed to read {}: {}", path.display(), e),
                ));
                continue;
            }
        };

        let file_id = source_map.add_file(path.clone(), source);
        let unit = compile_source(
            source_map.file(&nestml_ast::Span::zero(file_id)).source.as_str(),
            file_id,
            &path,
            model_root.as_deref(),
            &config.solver,
            &pipeline_options,
            &mut diags,
            &mut outcomes,
        );
        units.push(unit);
    }

    let result = CompileResult {
        units,
        outcomes,
        diagnostics: diags.into_entries(),
        source_map,
    };

    if config.store_log {
        store_log(config, &result);
    }

    info!("{}", result.summary());
    result
}

/// Lex, parse, and analyze a single source text.
///
/// Exposed for tests and embedders that hold sources in memory; `path`
/// only feeds package/artifact naming.
pub fn compile_string(
    source: &str,
    path: &Path,
    config: &CompilerConfig,
) -> (CompileResult, CompilationUnit) {
    let mut source_map = SourceMap::new();
    let mut diags = Diagnostics::new();
    let mut outcomes = Vec::new();

    let file_id = source_map.add_file(path.to_path_buf(), source.to_string());
    let pipeline_options = PipelineOptions {
        resolution_ms: config.resolution_ms,
        solver_timeout: config.solver_timeout,
        dev: config.dev,
    };

    let unit = compile_source(
        source,
        file_id,
        path,
        config.model_root.as_deref(),
        &config.solver,
        &pipeline_options,
        &mut diags,
        &mut outcomes,
    );

    let result = CompileResult {
        units: vec![unit.clone()],
        outcomes,
        diagnostics: diags.into_entries(),
        source_map,
    };
    (result, unit)
}

#[allow(clippy::too_many_arguments)]
fn compile_source(
    source: &str,
    file_id: u16,
    path: &Path,
    model_root: Option<&Path>,
    solver: &SolverTransport,
    pipeline_options: &PipelineOptions,
    diags: &mut Diagnostics,
    outcomes: &mut Vec<NeuronOutcome>,
) -> CompilationUnit {
    debug!(file = %path.display(), "lexing");
    let (tokens, invalid) = nestml_lexer::lex_with_spans(source);
    for bad in &invalid {
        diags.push(Diagnostic::error(
            DiagnosticKind::Syntax,
            nestml_ast::Span::new(file_id, bad.start as u32, bad.end as u32),
            "invalid token".to_string(),
        ));
    }

    debug!(file = %path.display(), "parsing");
    let (mut unit, parse_errors) =
        nestml_parser::parse_compilation_unit(&tokens, file_id, path, model_root);
    let had_syntax_errors = !parse_errors.is_empty() || !invalid.is_empty();
    for error in parse_errors {
        diags.push(error.into_diagnostic());
    }

    // A unit that failed to parse still carries its recovered neurons,
    // but analysis would only manufacture confusion on top of them.
    if had_syntax_errors {
        warn!(file = %path.display(), "skipping analysis due to syntax errors");
        return unit;
    }

    outcomes.extend(process_unit(&mut unit, solver, pipeline_options, diags));
    unit
}

/// Find every `.nestml` file under `input`, sorted by path.
fn discover_sources(input: &Path, diags: &mut Diagnostics) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input) {
        match entry {
            Ok(entry) => {
                if entry.path().extension().is_some_and(|ext| ext == "nestml") {
                    files.push(entry.path().to_path_buf());
                }
            }
            Err(e) => {
                diags.push(Diagnostic::error(
                    DiagnosticKind::Internal,
                    nestml_ast::Span::zero(0),
                    format!("directory traversal error: {}", e),
                ));
            }
        }
    }

    files.sort();
    files
}

fn store_log(config: &CompilerConfig, result: &CompileResult) {
    let log_path = config.target_path.join("nestml.log");
    if let Err(e) = std::fs::create_dir_all(&config.target_path)
        .and_then(|_| std::fs::write(&log_path, result.format_diagnostics()))
    {
        warn!("could not persist diagnostics to {}: {}", log_path.display(), e);
    }
}

/// Initialize tracing output for binaries and tests.
///
/// Respects `RUST_LOG`; falls back to the configured level.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
