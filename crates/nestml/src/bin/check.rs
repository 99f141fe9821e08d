//! Compiles NESTML models and reports diagnostics.
//!
//! Usage: `nestml-check <input-path> [--solver-cmd odetoolbox]`

use clap::Parser;
use nestml::{CompilerConfig, LogLevel};
use nestml_analysis::{SolverCommand, SolverTransport};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "nestml-check")]
#[command(about = "Compile NESTML models and report diagnostics")]
struct Args {
    /// A .nestml file or a directory searched recursively
    input_path: PathBuf,

    /// Output directory (generated artifacts and stored log)
    #[arg(long, default_value = "target")]
    target_path: PathBuf,

    /// Root for package name derivation (defaults to the input directory)
    #[arg(long)]
    model_root: Option<PathBuf>,

    /// Console verbosity: info, warn, or error
    #[arg(long, default_value = "info")]
    logging_level: LogLevel,

    /// Module name handed to the downstream generator
    #[arg(long, default_value = "nestmlmodule")]
    module_name: String,

    /// Suffix appended to generated model names
    #[arg(long, default_value = "")]
    suffix: String,

    /// Relax the constant-parameter condition
    #[arg(long)]
    dev: bool,

    /// Persist diagnostics to <target-path>/nestml.log
    #[arg(long)]
    store_log: bool,

    /// External ODE solver command; omit to skip analytic solving
    #[arg(long)]
    solver_cmd: Option<PathBuf>,

    /// Solver timeout in seconds
    #[arg(long, default_value_t = 60)]
    solver_timeout: u64,
}

fn main() {
    let args = Args::parse();
    nestml::init_logging(args.logging_level);

    if !args.input_path.exists() {
        error!("'{}' does not exist", args.input_path.display());
        process::exit(2);
    }

    let solver = match args.solver_cmd {
        Some(program) => SolverTransport::Available(SolverCommand {
            program,
            args: Vec::new(),
        }),
        None => SolverTransport::Unavailable,
    };

    let config = CompilerConfig {
        input_path: args.input_path,
        target_path: args.target_path,
        model_root: args.model_root,
        logging_level: args.logging_level,
        module_name: args.module_name,
        suffix: args.suffix,
        dev: args.dev,
        store_log: args.store_log,
        solver,
        solver_timeout: std::time::Duration::from_secs(args.solver_timeout),
        resolution_ms: 0.1,
    };

    let result = nestml::compile(&config);

    if !result.diagnostics.is_empty() {
        let rendered = result.format_diagnostics();
        if result.has_errors() {
            error!("\n{}", rendered);
        } else {
            warn!("\n{}", rendered);
        }
    }

    let summary = result.summary();
    info!(
        "{} unit(s), {} neuron(s): {}",
        result.units.len(),
        result.units.iter().map(|u| u.neurons.len()).sum::<usize>(),
        summary
    );

    process::exit(result.exit_code());
}
