//! Folding solver results back into the model IR.
//!
//! On an analytic reply, every `shape` definition and `convolve(...)`
//! call is replaced by generated state variables with explicit
//! discrete-step update rules; propagator coefficients become new
//! internal declarations and spike arrivals become per-port jump
//! amounts. On the numeric path the ODE system is left intact and the
//! neuron is only annotated.

use crate::equations::OdeSystem;
use crate::solver::{is_unit_pulse, SolverReply};
use nestml_ast::{
    BinaryOp, BlockKind, DataTypeExpr, DeclBlock, Declaration, Diagnostic, DiagnosticKind,
    Diagnostics, Equation, Expr, ExprKind, Neuron, Span, SpikeUpdate, Stmt,
};

/// Result of applying the solver reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Shapes and convolve calls were rewritten to explicit updates.
    Analytic,
    /// The ODE system was left intact for a numeric integrator.
    Numeric,
}

/// Apply an analytic solver reply to a neuron.
///
/// Returns `Err(())` after reporting a protocol diagnostic when a reply
/// expression fails to parse; the neuron is left unchanged in that case.
pub fn fold_analytic_reply(
    neuron: &mut Neuron,
    system: &OdeSystem,
    reply: &SolverReply,
    file_id: u16,
    diags: &mut Diagnostics,
) -> Result<(), ()> {
    let span = neuron.span;

    // Parse everything up front so a malformed reply cannot leave the
    // neuron half-rewritten.
    let mut update_steps = Vec::new();
    for (variable, text) in &reply.update_expressions {
        update_steps.push((variable.clone(), parse_reply_expr(text, file_id, neuron, diags)?));
    }

    let mut initial_values = Vec::new();
    for (variable, text) in &reply.initial_values {
        initial_values.push((variable.clone(), parse_reply_expr(text, file_id, neuron, diags)?));
    }

    let mut propagators = Vec::new();
    if let Some(matrix) = &reply.propagator {
        for (i, row) in matrix.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                if entry.trim() == "0" || entry.trim() == "0.0" {
                    continue;
                }
                propagators.push((
                    format!("__P{}{}", i, j),
                    parse_reply_expr(entry, file_id, neuron, diags)?,
                ));
            }
        }
    }

    // Generated state variables, with their initial values.
    let mut generated = Vec::new();
    for name in &reply.state_variables {
        if neuron.declares_state_variable(name) {
            continue;
        }
        let initializer = initial_values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.clone());
        generated.push(Declaration {
            names: vec![name.clone()],
            datatype: DataTypeExpr::Real,
            initializer,
            recordable: false,
            is_alias: false,
            ty: None,
            span,
        });
    }
    if !generated.is_empty() {
        state_block_mut(neuron, span).declarations.extend(generated);
    }

    // Propagator coefficients become internals.
    if !propagators.is_empty() {
        let block = internals_block_mut(neuron, span);
        for (name, expr) in propagators {
            block.declarations.push(Declaration {
                names: vec![name],
                datatype: DataTypeExpr::Real,
                initializer: Some(expr),
                recordable: false,
                is_alias: false,
                ty: None,
                span,
            });
        }
    }

    // Remove the solved shapes; install the explicit update rules.
    for block in &mut neuron.equations_blocks {
        block.equations.retain(|eq| !matches!(eq, Equation::Shape(_)));
        // The solved state ODEs are superseded by their update rules.
        block.equations.retain(|eq| match eq {
            Equation::Ode(ode) => !reply.update_expressions.contains_key(&ode.name),
            _ => true,
        });
    }
    if let Some(block) = neuron.equations_blocks.first_mut() {
        for (variable, rhs) in update_steps {
            block.equations.push(Equation::UpdateStep {
                variable,
                rhs,
                span,
            });
        }
    }

    // Replace convolve calls by their generated state variable.
    let substitutions: Vec<(String, String, String)> = system
        .convolves
        .iter()
        .map(|occurrence| {
            let variable = generated_variable_for(&occurrence.shape, &reply.state_variables);
            (occurrence.shape.clone(), occurrence.port.clone(), variable)
        })
        .collect();

    rewrite_convolve_calls(neuron, &substitutions);

    // Spike arrivals bump each generated variable by its initial value,
    // weighted by the port.
    for (_, port, variable) in &substitutions {
        let increment = match initial_values.iter().find(|(n, _)| n == variable) {
            Some((_, iv)) if !is_unit_pulse(iv) => Expr::binary(
                BinaryOp::Mul,
                iv.clone(),
                Expr::variable(port.clone(), span),
                span,
            ),
            _ => Expr::variable(port.clone(), span),
        };
        if !neuron
            .spike_updates
            .iter()
            .any(|u| &u.variable == variable && &u.port == port)
        {
            neuron.spike_updates.push(SpikeUpdate {
                variable: variable.clone(),
                port: port.clone(),
                increment,
            });
        }
    }

    Ok(())
}

fn parse_reply_expr(
    text: &str,
    file_id: u16,
    neuron: &Neuron,
    diags: &mut Diagnostics,
) -> Result<Expr, ()> {
    match nestml_parser::parse_expression_str(text, file_id) {
        Ok(expr) => Ok(expr),
        Err(e) => {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::SolverProtocol,
                    Span::zero(file_id),
                    format!("solver reply contains unparseable expression '{}': {}", text, e),
                )
                .in_neuron(&neuron.name),
            );
            Err(())
        }
    }
}

/// Pick the generated state variable corresponding to a shape name.
///
/// The solver names generated variables after the shape, possibly with a
/// disambiguating suffix; prefix match is the contract.
fn generated_variable_for(shape: &str, state_variables: &[String]) -> String {
    state_variables
        .iter()
        .find(|v| v.as_str() == shape || v.starts_with(&format!("{}__", shape)))
        .cloned()
        .unwrap_or_else(|| shape.to_string())
}

fn state_block_mut(neuron: &mut Neuron, span: Span) -> &mut DeclBlock {
    if neuron.state_blocks.is_empty() {
        neuron.state_blocks.push(DeclBlock {
            kind: BlockKind::State,
            declarations: Vec::new(),
            span,
        });
    }
    neuron.state_blocks.last_mut().expect("just ensured")
}

fn internals_block_mut(neuron: &mut Neuron, span: Span) -> &mut DeclBlock {
    if neuron.internal_blocks.is_empty() {
        neuron.internal_blocks.push(DeclBlock {
            kind: BlockKind::Internals,
            declarations: Vec::new(),
            span,
        });
    }
    neuron.internal_blocks.last_mut().expect("just ensured")
}

/// Replace every `convolve(shape, port)` by a reference to the matching
/// generated state variable, throughout the neuron.
fn rewrite_convolve_calls(neuron: &mut Neuron, substitutions: &[(String, String, String)]) {
    let rewrite = |expr: &mut Expr| {
        expr.walk_mut(&mut |node| {
            let replacement = match &node.kind {
                ExprKind::Call { name, args } if name == "convolve" && args.len() == 2 => {
                    match (&args[0].kind, &args[1].kind) {
                        (
                            ExprKind::Variable { name: shape, .. },
                            ExprKind::Variable { name: port, .. },
                        ) => substitutions
                            .iter()
                            .find(|(s, p, _)| s == shape && p == port)
                            .map(|(_, _, variable)| variable.clone()),
                        _ => None,
                    }
                }
                _ => None,
            };
            if let Some(variable) = replacement {
                node.kind = ExprKind::Variable {
                    name: variable,
                    order: 0,
                    symbol: None,
                };
                node.ty = None;
                node.conversion_factor = None;
            }
        });
    };

    fn rewrite_stmts(stmts: &mut [Stmt], rewrite: &impl Fn(&mut Expr)) {
        for stmt in stmts {
            match stmt {
                Stmt::Declaration(decl) => {
                    if let Some(init) = &mut decl.initializer {
                        rewrite(init);
                    }
                }
                Stmt::Assignment { lhs, rhs, .. } => {
                    rewrite(lhs);
                    rewrite(rhs);
                }
                Stmt::Expr(expr) => rewrite(expr),
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        rewrite(value);
                    }
                }
                Stmt::If(if_stmt) => {
                    for (condition, body) in &mut if_stmt.branches {
                        rewrite(condition);
                        rewrite_stmts(body, rewrite);
                    }
                    if let Some(body) = &mut if_stmt.else_branch {
                        rewrite_stmts(body, rewrite);
                    }
                }
                Stmt::For(for_stmt) => {
                    rewrite(&mut for_stmt.from);
                    rewrite(&mut for_stmt.to);
                    if let Some(step) = &mut for_stmt.step {
                        rewrite(step);
                    }
                    rewrite_stmts(&mut for_stmt.body, rewrite);
                }
            }
        }
    }

    for block in &mut neuron.equations_blocks {
        for equation in &mut block.equations {
            match equation {
                Equation::Shape(shape) => rewrite(&mut shape.rhs),
                Equation::Ode(ode) => rewrite(&mut ode.rhs),
                Equation::Alias(decl) => {
                    if let Some(init) = &mut decl.initializer {
                        rewrite(init);
                    }
                }
                Equation::UpdateStep { rhs, .. } => rewrite(rhs),
            }
        }
    }
    for block in &mut neuron.update_blocks {
        rewrite_stmts(&mut block.statements, &rewrite);
    }
    for func in &mut neuron.functions {
        rewrite_stmts(&mut func.body, &rewrite);
    }
}

/// True if any expression anywhere in the neuron still contains a
/// `convolve` call or any `shape` definition remains.
pub fn has_unsolved_kernels(neuron: &Neuron) -> bool {
    let mut found = neuron
        .equations()
        .any(|eq| matches!(eq, Equation::Shape(_)));
    if found {
        return true;
    }

    for equation in neuron.equations() {
        let rhs = match equation {
            Equation::Ode(ode) => &ode.rhs,
            Equation::UpdateStep { rhs, .. } => rhs,
            Equation::Alias(decl) => match &decl.initializer {
                Some(init) => init,
                None => continue,
            },
            Equation::Shape(shape) => &shape.rhs,
        };
        rhs.walk(&mut |e| {
            if e.is_call_to("convolve") {
                found = true;
            }
        });
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::collect_ode_system;
    use crate::solver::{SolverKind, SolverStatus};
    use indexmap::IndexMap;
    use nestml_lexer::lex_with_spans;
    use nestml_parser::parse_compilation_unit;
    use std::path::Path;

    const MODEL: &str = r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  parameters:
    tau ms = 2 ms
    C_m pF = 250 pF
  end
  equations:
    shape g_ex = exp(-t / tau)
    V_m' = -V_m / tau + convolve(g_ex, spikeExc) * (1 mV / (1 nS * 1 ms))
  end
  input:
    spikeExc nS <- excitatory spike
  end
  update:
    integrate_odes()
  end
end
"#;

    fn model_neuron() -> Neuron {
        let (tokens, _) = lex_with_spans(MODEL);
        let (unit, errors) = parse_compilation_unit(&tokens, 0, Path::new("t.nestml"), None);
        assert!(errors.is_empty(), "{:?}", errors);
        unit.neurons.into_iter().next().unwrap()
    }

    fn analytic_reply() -> SolverReply {
        let mut update_expressions = IndexMap::new();
        update_expressions.insert("g_ex".to_string(), "__P00 * g_ex".to_string());
        let mut initial_values = IndexMap::new();
        initial_values.insert("g_ex".to_string(), "1".to_string());

        SolverReply {
            status: SolverStatus::Success,
            solver: Some(SolverKind::Analytical),
            propagator: Some(vec![vec!["exp(-h / tau)".to_string()]]),
            update_expressions,
            initial_values,
            state_variables: vec!["g_ex".to_string()],
            stiffness: None,
        }
    }

    #[test]
    fn analytic_fold_removes_shapes_and_convolve() {
        let mut neuron = model_neuron();
        let system = collect_ode_system(&neuron);
        let mut diags = Diagnostics::new();

        fold_analytic_reply(&mut neuron, &system, &analytic_reply(), 0, &mut diags)
            .expect("fold succeeds");

        assert!(!diags.has_errors(), "{:?}", diags.entries());
        assert!(!has_unsolved_kernels(&neuron));

        // Generated state variable g_ex with initial value 1
        assert!(neuron.declares_state_variable("g_ex"));

        // Propagator internal __P00 exists
        let internals: Vec<&str> = neuron
            .internal_blocks
            .iter()
            .flat_map(|b| b.declarations.iter())
            .flat_map(|d| d.names.iter().map(|s| s.as_str()))
            .collect();
        assert!(internals.contains(&"__P00"), "{:?}", internals);

        // Explicit update rule for g_ex is in the IR
        assert!(neuron.equations().any(|eq| matches!(
            eq,
            Equation::UpdateStep { variable, .. } if variable == "g_ex"
        )));

        // Spike arrival bumps g_ex by the port value (unit jump)
        assert_eq!(neuron.spike_updates.len(), 1);
        let jump = &neuron.spike_updates[0];
        assert_eq!(jump.variable, "g_ex");
        assert_eq!(jump.port, "spikeExc");
        assert!(matches!(
            &jump.increment.kind,
            ExprKind::Variable { name, .. } if name == "spikeExc"
        ));
    }

    #[test]
    fn remaining_ode_references_generated_variable() {
        let mut neuron = model_neuron();
        let system = collect_ode_system(&neuron);
        let mut diags = Diagnostics::new();
        fold_analytic_reply(&mut neuron, &system, &analytic_reply(), 0, &mut diags).unwrap();

        // V_m' survives (not in update_expressions) and now references
        // g_ex instead of convolve(...)
        let ode = neuron
            .equations()
            .find_map(|eq| match eq {
                Equation::Ode(ode) if ode.name == "V_m" => Some(ode),
                _ => None,
            })
            .expect("V_m ODE kept");

        let mut saw_generated = false;
        ode.rhs.walk(&mut |e| {
            if let ExprKind::Variable { name, .. } = &e.kind {
                if name == "g_ex" {
                    saw_generated = true;
                }
            }
        });
        assert!(saw_generated);
    }

    #[test]
    fn non_unit_initial_value_scales_the_jump() {
        let mut neuron = model_neuron();
        let system = collect_ode_system(&neuron);
        let mut reply = analytic_reply();
        reply
            .initial_values
            .insert("g_ex".to_string(), "2.5".to_string());
        let mut diags = Diagnostics::new();
        fold_analytic_reply(&mut neuron, &system, &reply, 0, &mut diags).unwrap();

        let jump = &neuron.spike_updates[0];
        assert!(matches!(
            &jump.increment.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn malformed_reply_expression_is_protocol_error() {
        let mut neuron = model_neuron();
        let system = collect_ode_system(&neuron);
        let mut reply = analytic_reply();
        reply
            .update_expressions
            .insert("g_ex".to_string(), "__P00 * (".to_string());
        let mut diags = Diagnostics::new();

        assert!(fold_analytic_reply(&mut neuron, &system, &reply, 0, &mut diags).is_err());
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::SolverProtocol));
        // Neuron untouched: shape still present
        assert!(has_unsolved_kernels(&neuron));
    }
}
