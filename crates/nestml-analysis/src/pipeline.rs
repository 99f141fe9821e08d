//! Per-unit pipeline orchestration.
//!
//! Runs symbol table construction, type checking, and the context
//! conditions on every neuron of a unit — users should see as many
//! diagnostics as one invocation can produce — then gates equations
//! analysis and the solver exchange per neuron: a neuron with errors is
//! skipped, its siblings continue.

use crate::cocos::{check_context_conditions, CoCoOptions};
use crate::equations::collect_ode_system;
use crate::solver::{
    build_request, SolverFailure, SolverKind, SolverStatus, SolverTransport,
};
use crate::symbols::build_symbol_table;
use crate::transform::{fold_analytic_reply, FoldOutcome};
use crate::typing::check_types;
use nestml_ast::{CompilationUnit, Diagnostic, DiagnosticKind, Diagnostics, Severity};
use std::time::Duration;
use tracing::{debug, info};

/// Options steering one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Simulation tick length handed to the solver, in ms.
    pub resolution_ms: f64,
    /// Deadline for one solver exchange.
    pub solver_timeout: Duration,
    /// Developer mode: relax the constant-parameter condition.
    pub dev: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            resolution_ms: 0.1,
            solver_timeout: Duration::from_secs(60),
            dev: false,
        }
    }
}

/// Outcome of analyzing one neuron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeuronOutcome {
    pub neuron: String,
    pub fold: Option<FoldOutcome>,
}

/// Run the full analysis pipeline on one compilation unit.
///
/// The unit must already be parsed; diagnostics accumulate in `diags`.
/// Returns the per-neuron analysis outcomes.
pub fn process_unit(
    unit: &mut CompilationUnit,
    transport: &SolverTransport,
    options: &PipelineOptions,
    diags: &mut Diagnostics,
) -> Vec<NeuronOutcome> {
    info!(
        artifact = %unit.artifact_name,
        neurons = unit.neurons.len(),
        "analyzing compilation unit"
    );

    // Symbol tables, types, and context conditions always run so every
    // neuron surfaces its full set of diagnostics.
    debug!("building symbol tables");
    let mut table = build_symbol_table(unit, diags);

    debug!("type checking");
    check_types(unit, &mut table, diags);

    debug!("checking context conditions");
    check_context_conditions(unit, &table, CoCoOptions { dev: options.dev }, diags);

    let file_id = unit.span.file_id;
    let mut outcomes = Vec::new();

    for neuron in &mut unit.neurons {
        if neuron.scope.is_none() {
            diags.push(Diagnostic::fatal(
                DiagnosticKind::Internal,
                neuron.span,
                format!("neuron '{}' has no scope after symbol analysis", neuron.name),
            ));
            continue;
        }

        if diags.neuron_has_errors(&neuron.name) {
            debug!(neuron = %neuron.name, "skipping analysis; neuron has errors");
            outcomes.push(NeuronOutcome {
                neuron: neuron.name.clone(),
                fold: None,
            });
            continue;
        }

        let system = collect_ode_system(neuron);
        if system.is_empty() {
            outcomes.push(NeuronOutcome {
                neuron: neuron.name.clone(),
                fold: None,
            });
            continue;
        }

        debug!(
            neuron = %neuron.name,
            shapes = system.shapes.len(),
            odes = system.odes.len(),
            linear = system.is_linear(),
            "collected ODE system"
        );

        let request = build_request(neuron, &system, &table, options.resolution_ms);

        let fold = match transport.request(&request, options.solver_timeout) {
            Ok(reply) => match (reply.status, reply.solver) {
                (SolverStatus::Failure, _) => {
                    diags.push(
                        Diagnostic::warning(
                            DiagnosticKind::SolverFallback,
                            neuron.span,
                            format!(
                                "solver declined the ODE system of '{}'; falling back to numeric integration",
                                neuron.name
                            ),
                        )
                        .in_neuron(&neuron.name),
                    );
                    FoldOutcome::Numeric
                }
                (_, Some(SolverKind::Analytical)) => {
                    if let Some(stiffness) = &reply.stiffness {
                        diags.push(
                            Diagnostic::info(
                                DiagnosticKind::AnalysisNote,
                                neuron.span,
                                format!("stiffness test for '{}': {}", neuron.name, stiffness),
                            )
                            .in_neuron(&neuron.name),
                        );
                    }
                    match fold_analytic_reply(neuron, &system, &reply, file_id, diags) {
                        Ok(()) => FoldOutcome::Analytic,
                        // Protocol error already reported; the unit halts
                        // for this neuron.
                        Err(()) => {
                            outcomes.push(NeuronOutcome {
                                neuron: neuron.name.clone(),
                                fold: None,
                            });
                            continue;
                        }
                    }
                }
                _ => {
                    diags.push(
                        Diagnostic::info(
                            DiagnosticKind::AnalysisNote,
                            neuron.span,
                            format!("solver selected numeric integration for '{}'", neuron.name),
                        )
                        .in_neuron(&neuron.name),
                    );
                    FoldOutcome::Numeric
                }
            },
            Err(SolverFailure::Unavailable) => {
                diags.push(
                    Diagnostic::info(
                        DiagnosticKind::SolverFallback,
                        neuron.span,
                        format!(
                            "no ODE solver configured; '{}' keeps its symbolic ODE system",
                            neuron.name
                        ),
                    )
                    .in_neuron(&neuron.name),
                );
                FoldOutcome::Numeric
            }
            Err(SolverFailure::Timeout) => {
                diags.push(
                    Diagnostic::warning(
                        DiagnosticKind::SolverFallback,
                        neuron.span,
                        format!(
                            "solver timed out analyzing '{}'; falling back to numeric integration",
                            neuron.name
                        ),
                    )
                    .in_neuron(&neuron.name),
                );
                FoldOutcome::Numeric
            }
            Err(SolverFailure::Io(message)) => {
                diags.push(
                    Diagnostic::warning(
                        DiagnosticKind::SolverFallback,
                        neuron.span,
                        format!("solver unreachable ({}); falling back to numeric integration", message),
                    )
                    .in_neuron(&neuron.name),
                );
                FoldOutcome::Numeric
            }
            Err(SolverFailure::Protocol(message)) => {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::SolverProtocol,
                        neuron.span,
                        format!("malformed solver reply: {}", message),
                    )
                    .in_neuron(&neuron.name),
                );
                outcomes.push(NeuronOutcome {
                    neuron: neuron.name.clone(),
                    fold: None,
                });
                continue;
            }
        };

        outcomes.push(NeuronOutcome {
            neuron: neuron.name.clone(),
            fold: Some(fold),
        });
    }

    outcomes
}

/// Summary of a whole compilation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub infos: usize,
    pub warnings: usize,
    pub errors: usize,
    pub fatals: usize,
}

impl CompileSummary {
    /// Tally a diagnostics collector.
    pub fn of(diags: &Diagnostics) -> Self {
        Self {
            infos: diags.count(Severity::Info),
            warnings: diags.count(Severity::Warning),
            errors: diags.count(Severity::Error),
            fatals: diags.count(Severity::Fatal),
        }
    }

    /// Process exit status: 0 clean, 1 on errors, 2 on fatals.
    pub fn exit_code(&self) -> i32 {
        if self.fatals > 0 {
            2
        } else if self.errors > 0 {
            1
        } else {
            0
        }
    }
}

impl std::fmt::Display for CompileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s), {} note(s)",
            self.errors + self.fatals,
            self.warnings,
            self.infos
        )
    }
}
