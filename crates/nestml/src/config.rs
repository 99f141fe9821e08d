//! Compiler configuration.

use nestml_analysis::SolverTransport;
use std::path::PathBuf;
use std::time::Duration;

/// Diagnostic verbosity threshold for console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive for the tracing subscriber.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown logging level '{}'", other)),
        }
    }
}

/// Everything one compiler invocation can be told.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// A `.nestml` file or a directory searched recursively.
    pub input_path: PathBuf,
    /// Output directory for downstream generators and the stored log.
    pub target_path: PathBuf,
    /// Root against which package names are derived. Defaults to
    /// `input_path` when that is a directory.
    pub model_root: Option<PathBuf>,
    pub logging_level: LogLevel,
    /// Module name handed to the downstream generator.
    pub module_name: String,
    /// Suffix appended to generated model names.
    pub suffix: String,
    /// Developer mode: relax the constant-parameter condition.
    pub dev: bool,
    /// Persist formatted diagnostics to `<target_path>/nestml.log`.
    pub store_log: bool,
    /// How to reach the symbolic ODE solver.
    pub solver: SolverTransport,
    /// Deadline per solver exchange.
    pub solver_timeout: Duration,
    /// Simulation tick length in ms, forwarded to the solver.
    pub resolution_ms: f64,
}

impl CompilerConfig {
    /// A configuration with everything defaulted except the input path.
    pub fn for_path(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            target_path: PathBuf::from("target"),
            model_root: None,
            logging_level: LogLevel::default(),
            module_name: "nestmlmodule".to_string(),
            suffix: String::new(),
            dev: false,
            store_log: false,
            solver: SolverTransport::Unavailable,
            solver_timeout: Duration::from_secs(60),
            resolution_ms: 0.1,
        }
    }

    /// The effective model root: explicit root, or the input directory.
    pub fn effective_model_root(&self) -> Option<PathBuf> {
        self.model_root.clone().or_else(|| {
            self.input_path
                .is_dir()
                .then(|| self.input_path.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("chatty".parse::<LogLevel>().is_err());
    }

    #[test]
    fn defaults() {
        let config = CompilerConfig::for_path("models");
        assert_eq!(config.module_name, "nestmlmodule");
        assert!(!config.dev);
        assert_eq!(config.solver_timeout, Duration::from_secs(60));
        assert!(matches!(config.solver, SolverTransport::Unavailable));
    }
}
