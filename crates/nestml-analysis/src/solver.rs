//! External ODE solver coupling: protocol records, transport, and the
//! request builder.
//!
//! The exchange is JSON over a pipe to a solver subprocess. Unit
//! information never crosses the boundary: scales are folded into
//! numerical constants on the way out and expressions come back as plain
//! text that is re-parsed and re-typed on the way in. The checker knows
//! nothing about any of this; the transport is a plain sum type.

use crate::equations::{OdeSystem, ShapeForm};
use crate::symbols::{SymbolKind, SymbolTable};
use indexmap::IndexMap;
use nestml_ast::{Expr, ExprKind, LiteralValue, Neuron, UnaryOp};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Analysis request shipped to the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverRequest {
    pub dynamics: Vec<DynamicsEntry>,
    pub parameters: Vec<ParameterEntry>,
    pub options: SolverOptions,
}

/// One shape or state ODE row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsEntry {
    pub name: String,
    pub expression: String,
    pub initial_value: String,
    pub order: u32,
}

/// A parameter constant, scales folded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    pub sim_time_resolution: f64,
}

/// Solver reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverReply {
    pub status: SolverStatus,
    #[serde(default)]
    pub solver: Option<SolverKind>,
    /// Propagator matrix for the linear subsystem, row-major, entries as
    /// expression text ("0" marks structural zeros)
    #[serde(default)]
    pub propagator: Option<Vec<Vec<String>>>,
    /// Closed-form per-step update per generated state variable
    #[serde(default)]
    pub update_expressions: IndexMap<String, String>,
    /// Initial value (and per-spike jump amount) per generated variable
    #[serde(default)]
    pub initial_values: IndexMap<String, String>,
    /// Names of the generated state variables
    #[serde(default)]
    pub state_variables: Vec<String>,
    /// Informational stiffness test result
    #[serde(default)]
    pub stiffness: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Analytical,
    Numeric,
}

/// How (and whether) the solver can be reached.
#[derive(Debug, Clone)]
pub enum SolverTransport {
    /// Spawn this command and speak JSON over stdin/stdout.
    Available(SolverCommand),
    /// No solver configured; analysis falls through to numeric mode.
    Unavailable,
}

/// Command line of the solver subprocess.
#[derive(Debug, Clone)]
pub struct SolverCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Why a solver exchange produced no usable reply.
#[derive(Debug)]
pub enum SolverFailure {
    Unavailable,
    Timeout,
    Io(String),
    Protocol(String),
}

impl SolverTransport {
    /// Perform one blocking request/reply exchange.
    ///
    /// The subprocess gets the request on stdin, must reply on stdout,
    /// and is killed when `timeout` expires.
    pub fn request(
        &self,
        request: &SolverRequest,
        timeout: Duration,
    ) -> Result<SolverReply, SolverFailure> {
        let command = match self {
            SolverTransport::Available(command) => command,
            SolverTransport::Unavailable => return Err(SolverFailure::Unavailable),
        };

        let payload = serde_json::to_string(request)
            .map_err(|e| SolverFailure::Protocol(e.to_string()))?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SolverFailure::Io(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .map_err(|e| SolverFailure::Io(e.to_string()))?;
            // Closing stdin signals end-of-request.
        }

        // Drain stdout on a helper thread so a chatty solver cannot
        // deadlock on a full pipe while we poll for exit.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolverFailure::Io("solver stdout unavailable".to_string()))?;
        let reader = std::thread::spawn(move || {
            let mut output = String::new();
            let _ = stdout.read_to_string(&mut output);
            output
        });

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = reader.join();
                        return Err(SolverFailure::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(SolverFailure::Io(e.to_string()));
                }
            }
        }

        let output = reader.join().unwrap_or_default();
        serde_json::from_str(&output).map_err(|e| SolverFailure::Protocol(e.to_string()))
    }
}

/// Build the analysis request for one neuron's ODE system.
pub fn build_request(
    neuron: &Neuron,
    system: &OdeSystem,
    table: &SymbolTable,
    sim_time_resolution: f64,
) -> SolverRequest {
    let mut dynamics = Vec::new();

    for shape in &system.shapes {
        let initial_value = shape
            .initial_values
            .first()
            .and_then(|iv| iv.as_ref())
            .map(|iv| print_solver_expr(iv, table))
            .unwrap_or_else(|| match shape.form {
                // Pulse and closed-form kernels start at their defining
                // expression; a unit pulse jumps by one.
                ShapeForm::Delta | ShapeForm::Direct => "1".to_string(),
                ShapeForm::Ode => "0".to_string(),
            });
        dynamics.push(DynamicsEntry {
            name: shape.name.clone(),
            expression: print_solver_expr(&shape.rhs, table),
            initial_value,
            order: shape.order,
        });
    }

    for ode in &system.odes {
        dynamics.push(DynamicsEntry {
            name: ode.name.clone(),
            expression: print_solver_expr(&ode.rhs, table),
            initial_value: ode
                .initial_value
                .as_ref()
                .map(|iv| print_solver_expr(iv, table))
                .unwrap_or_else(|| "0".to_string()),
            order: ode.order,
        });
    }

    SolverRequest {
        dynamics,
        parameters: parameter_values(neuron, table),
        options: SolverOptions { sim_time_resolution },
    }
}

/// Print an expression for the solver, folding unit scales into
/// numerical constants.
pub fn print_solver_expr(expr: &Expr, table: &SymbolTable) -> String {
    match &expr.kind {
        ExprKind::Literal { value, unit } => {
            let folded = match unit
                .as_deref()
                .and_then(nestml_ast::unit::resolve_unit_name)
            {
                Some(resolved) => value.as_f64() * resolved.scale,
                None => value.as_f64(),
            };
            format_number(folded)
        }
        ExprKind::BoolLiteral(b) => format!("{}", b),
        ExprKind::StringLiteral(s) => format!("\"{}\"", s),
        ExprKind::Variable {
            name,
            order,
            symbol,
        } => {
            // Unit symbols used as values fold to their scale factor.
            if let Some(id) = symbol {
                let symbol = table.symbol(*id);
                if symbol.kind == SymbolKind::Unit {
                    return format_number(symbol.ty.unit.scale);
                }
            }
            format!("{}{}", name, "'".repeat(*order as usize))
        }
        ExprKind::Call { name, args } => {
            let args: Vec<String> = args.iter().map(|a| print_solver_expr(a, table)).collect();
            format!("{}({})", name, args.join(", "))
        }
        ExprKind::Unary { op, operand } => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "not ",
            };
            format!("{}({})", symbol, print_solver_expr(operand, table))
        }
        ExprKind::Binary { op, left, right } => format!(
            "({} {} {})",
            print_solver_expr(left, table),
            op.symbol(),
            print_solver_expr(right, table)
        ),
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => format!(
            "(({}) ? ({}) : ({}))",
            print_solver_expr(condition, table),
            print_solver_expr(then_expr, table),
            print_solver_expr(else_expr, table)
        ),
    }
}

fn format_number(x: f64) -> String {
    let s = format!("{}", x);
    if s.contains('.') || s.contains('e') || s.contains('E') || s.contains("inf") {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Evaluate every parameter initializer to a number, scales folded.
fn parameter_values(neuron: &Neuron, table: &SymbolTable) -> Vec<ParameterEntry> {
    let declarations: IndexMap<&str, &Expr> = neuron
        .parameter_blocks
        .iter()
        .flat_map(|b| b.declarations.iter())
        .flat_map(|d| {
            d.initializer
                .as_ref()
                .map(|init| d.names.iter().map(move |n| (n.as_str(), init)))
        })
        .flatten()
        .collect();

    declarations
        .iter()
        .filter_map(|(&name, &init)| {
            eval_const(init, table, &declarations, 0).map(|value| ParameterEntry {
                name: name.to_string(),
                value,
            })
        })
        .collect()
}

/// Constant-fold an expression over parameters and unit symbols.
fn eval_const(
    expr: &Expr,
    table: &SymbolTable,
    parameters: &IndexMap<&str, &Expr>,
    depth: u32,
) -> Option<f64> {
    use nestml_ast::BinaryOp;

    if depth > 16 {
        return None;
    }

    match &expr.kind {
        ExprKind::Literal { value, unit } => {
            let base = value.as_f64();
            match unit.as_deref() {
                Some(name) => Some(base * nestml_ast::unit::resolve_unit_name(name)?.scale),
                None => Some(base),
            }
        }
        ExprKind::Variable { name, symbol, .. } => {
            if let Some(id) = symbol {
                let symbol = table.symbol(*id);
                if symbol.kind == SymbolKind::Unit {
                    return Some(symbol.ty.unit.scale);
                }
            }
            if name == "e" {
                return Some(std::f64::consts::E);
            }
            parameters
                .get(name.as_str())
                .and_then(|init| eval_const(init, table, parameters, depth + 1))
        }
        ExprKind::Unary { op, operand } => {
            let value = eval_const(operand, table, parameters, depth)?;
            match op {
                UnaryOp::Neg => Some(-value),
                UnaryOp::Pos => Some(value),
                UnaryOp::Not => None,
            }
        }
        ExprKind::Binary { op, left, right } => {
            let l = eval_const(left, table, parameters, depth)?;
            let r = eval_const(right, table, parameters, depth)?;
            match op {
                BinaryOp::Add => Some(l + r),
                BinaryOp::Sub => Some(l - r),
                BinaryOp::Mul => Some(l * r),
                BinaryOp::Div => Some(l / r),
                BinaryOp::Pow => Some(l.powf(r)),
                _ => None,
            }
        }
        ExprKind::Call { name, args } => {
            let values: Vec<f64> = args
                .iter()
                .map(|a| eval_const(a, table, parameters, depth))
                .collect::<Option<_>>()?;
            match (name.as_str(), values.as_slice()) {
                ("exp", [x]) => Some(x.exp()),
                ("ln", [x]) => Some(x.ln()),
                ("log10", [x]) => Some(x.log10()),
                ("sqrt", [x]) => Some(x.sqrt()),
                ("abs", [x]) => Some(x.abs()),
                ("min", [a, b]) => Some(a.min(*b)),
                ("max", [a, b]) => Some(a.max(*b)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Literal helper shared with tests: true when an expression is the
/// number one (with or without a unit).
pub fn is_unit_pulse(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Literal { value, .. } => match value {
            LiteralValue::Integer(1) => true,
            LiteralValue::Float(x) => (*x - 1.0).abs() < 1e-12,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::collect_ode_system;
    use crate::symbols::build_symbol_table;
    use nestml_ast::Diagnostics;
    use nestml_lexer::lex_with_spans;
    use nestml_parser::parse_compilation_unit;
    use std::path::Path;

    fn setup(source: &str) -> (nestml_ast::CompilationUnit, SymbolTable) {
        let (tokens, _) = lex_with_spans(source);
        let (mut unit, errors) = parse_compilation_unit(&tokens, 0, Path::new("t.nestml"), None);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut diags = Diagnostics::new();
        let table = build_symbol_table(&mut unit, &mut diags);
        assert!(!diags.has_errors(), "{:?}", diags.entries());
        (unit, table)
    }

    const MODEL: &str = r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  initial_values:
    g_ex nS = 1 nS
  end
  parameters:
    tau ms = 2 ms
    C_m pF = 250 pF
  end
  equations:
    shape g_kernel = exp(-t / tau)
    g_ex' = -g_ex / tau
    V_m' = -V_m / tau + convolve(g_kernel, spikes) * (1 mV / (1 nS * 1 ms))
  end
  input:
    spikes nS <- excitatory spike
  end
end
"#;

    #[test]
    fn request_contains_all_rows_and_parameters() {
        let (unit, table) = setup(MODEL);
        let system = collect_ode_system(&unit.neurons[0]);
        let request = build_request(&unit.neurons[0], &system, &table, 0.1);

        let names: Vec<&str> = request.dynamics.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["g_kernel", "g_ex", "V_m"]);

        let tau = request
            .parameters
            .iter()
            .find(|p| p.name == "tau")
            .expect("tau present");
        assert!((tau.value - 2e-3).abs() < 1e-12);

        let c_m = request
            .parameters
            .iter()
            .find(|p| p.name == "C_m")
            .expect("C_m present");
        assert!((c_m.value - 250e-12).abs() < 1e-21);

        assert!((request.options.sim_time_resolution - 0.1).abs() < 1e-12);
    }

    #[test]
    fn scales_are_folded_out_of_expressions() {
        let (unit, table) = setup(MODEL);
        let system = collect_ode_system(&unit.neurons[0]);
        let request = build_request(&unit.neurons[0], &system, &table, 0.1);

        // g_ex initial value `1 nS` folds to 1e-9
        let g_ex = request.dynamics.iter().find(|d| d.name == "g_ex").unwrap();
        assert!(g_ex.initial_value.contains("0.000000001") || g_ex.initial_value.contains("1e-9"));

        // No unit symbols survive in any shipped expression
        for entry in &request.dynamics {
            assert!(!entry.expression.contains("mV"), "{}", entry.expression);
            assert!(!entry.expression.contains("nS"), "{}", entry.expression);
        }
    }

    #[test]
    fn request_serializes_to_protocol_json() {
        let (unit, table) = setup(MODEL);
        let system = collect_ode_system(&unit.neurons[0]);
        let request = build_request(&unit.neurons[0], &system, &table, 0.1);

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert!(json["dynamics"].is_array());
        assert!(json["parameters"].is_array());
        assert!(json["options"]["sim_time_resolution"].is_number());
        assert!(json["dynamics"][0]["name"].is_string());
        assert!(json["dynamics"][0]["order"].is_number());
    }

    #[test]
    fn reply_parses_all_statuses() {
        let analytic: SolverReply = serde_json::from_str(
            r#"{
                "status": "success",
                "solver": "analytical",
                "propagator": [["exp(-h/tau)", "0"], ["0", "exp(-h/tau)"]],
                "update_expressions": {"g_ex": "__P00 * g_ex"},
                "initial_values": {"g_ex": "1"},
                "state_variables": ["g_ex"]
            }"#,
        )
        .unwrap();
        assert_eq!(analytic.status, SolverStatus::Success);
        assert_eq!(analytic.solver, Some(SolverKind::Analytical));
        assert_eq!(analytic.state_variables, vec!["g_ex"]);

        let failure: SolverReply = serde_json::from_str(r#"{"status": "failure"}"#).unwrap();
        assert_eq!(failure.status, SolverStatus::Failure);
        assert!(failure.solver.is_none());

        assert!(serde_json::from_str::<SolverReply>(r#"{"status": "sideways"}"#).is_err());
    }

    #[test]
    fn unavailable_transport_reports_unavailable() {
        let (unit, table) = setup(MODEL);
        let system = collect_ode_system(&unit.neurons[0]);
        let request = build_request(&unit.neurons[0], &system, &table, 0.1);

        let result = SolverTransport::Unavailable.request(&request, Duration::from_secs(1));
        assert!(matches!(result, Err(SolverFailure::Unavailable)));
    }

    #[test]
    fn missing_binary_is_io_failure() {
        let transport = SolverTransport::Available(SolverCommand {
            program: PathBuf::from("/nonexistent/odetoolbox"),
            args: vec![],
        });
        let request = SolverRequest {
            dynamics: vec![],
            parameters: vec![],
            options: SolverOptions {
                sim_time_resolution: 0.1,
            },
        };
        let result = transport.request(&request, Duration::from_secs(1));
        assert!(matches!(result, Err(SolverFailure::Io(_))));
    }
}
