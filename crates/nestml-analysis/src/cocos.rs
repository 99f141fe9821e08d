//! Context conditions.
//!
//! Whole-program well-formedness rules that no grammar can express,
//! applied after type checking. Each rule is independent: it inspects the
//! neuron, appends diagnostics, and never rewrites. Violating exactly one
//! rule produces exactly one corresponding error.

use crate::symbols::{SymbolKind, SymbolTable};
use indexmap::{IndexMap, IndexSet};
use nestml_ast::{
    BlockKind, Diagnostic, DiagnosticKind, Diagnostics, Equation, Expr, ExprKind, Neuron,
    PortKind, Severity, Stmt,
};

/// Options for the context condition pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoCoOptions {
    /// Developer mode demotes the constant-parameter rule to a warning.
    pub dev: bool,
}

/// Run every context condition on every neuron of the unit.
pub fn check_context_conditions(
    unit: &nestml_ast::CompilationUnit,
    table: &SymbolTable,
    options: CoCoOptions,
    diags: &mut Diagnostics,
) {
    for neuron in &unit.neurons {
        check_blocks_unique(neuron, diags);
        check_derivatives_declared(neuron, table, diags);
        check_convolve_calls(neuron, table, diags);
        check_aliases(neuron, table, diags);
        check_update_only_calls(neuron, diags);
        check_parameters_constant(neuron, table, options, diags);
        check_port_units(neuron, diags);
        check_alias_cycles(neuron, diags);
        check_assignment_targets(neuron, table, diags);
    }
}

/// Visit every expression of a neuron. The callback receives the
/// expression and whether it sits inside an `update` block.
fn for_each_expr<'a>(neuron: &'a Neuron, f: &mut impl FnMut(&'a Expr, bool)) {
    fn walk_stmts<'a>(stmts: &'a [Stmt], in_update: bool, f: &mut impl FnMut(&'a Expr, bool)) {
        for stmt in stmts {
            match stmt {
                Stmt::Declaration(decl) => {
                    if let Some(init) = &decl.initializer {
                        init.walk(&mut |e| f(e, in_update));
                    }
                }
                Stmt::Assignment { lhs, rhs, .. } => {
                    lhs.walk(&mut |e| f(e, in_update));
                    rhs.walk(&mut |e| f(e, in_update));
                }
                Stmt::Expr(expr) => expr.walk(&mut |e| f(e, in_update)),
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        value.walk(&mut |e| f(e, in_update));
                    }
                }
                Stmt::If(if_stmt) => {
                    for (condition, body) in &if_stmt.branches {
                        condition.walk(&mut |e| f(e, in_update));
                        walk_stmts(body, in_update, f);
                    }
                    if let Some(body) = &if_stmt.else_branch {
                        walk_stmts(body, in_update, f);
                    }
                }
                Stmt::For(for_stmt) => {
                    for_stmt.from.walk(&mut |e| f(e, in_update));
                    for_stmt.to.walk(&mut |e| f(e, in_update));
                    if let Some(step) = &for_stmt.step {
                        step.walk(&mut |e| f(e, in_update));
                    }
                    walk_stmts(&for_stmt.body, in_update, f);
                }
            }
        }
    }

    for (_, decl) in neuron.declarations() {
        if let Some(init) = &decl.initializer {
            init.walk(&mut |e| f(e, false));
        }
    }
    for equation in neuron.equations() {
        match equation {
            Equation::Shape(shape) => shape.rhs.walk(&mut |e| f(e, false)),
            Equation::Ode(ode) => ode.rhs.walk(&mut |e| f(e, false)),
            Equation::Alias(decl) => {
                if let Some(init) = &decl.initializer {
                    init.walk(&mut |e| f(e, false));
                }
            }
            Equation::UpdateStep { rhs, .. } => rhs.walk(&mut |e| f(e, false)),
        }
    }
    for block in &neuron.update_blocks {
        walk_stmts(&block.statements, true, f);
    }
    for func in &neuron.functions {
        walk_stmts(&func.body, false, f);
    }
}

/// A neuron declares at most one block of each kind.
fn check_blocks_unique(neuron: &Neuron, diags: &mut Diagnostics) {
    let mut report = |count: usize, span, what: &str| {
        if count > 1 {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::BlockRepeated,
                    span,
                    format!("neuron '{}' declares more than one {} block", neuron.name, what),
                )
                .in_neuron(&neuron.name),
            );
        }
    };

    report(
        neuron.state_blocks.len(),
        neuron.state_blocks.last().map_or(neuron.span, |b| b.span),
        "state",
    );
    report(
        neuron.initial_blocks.len(),
        neuron.initial_blocks.last().map_or(neuron.span, |b| b.span),
        "initial_values",
    );
    report(
        neuron.parameter_blocks.len(),
        neuron.parameter_blocks.last().map_or(neuron.span, |b| b.span),
        "parameters",
    );
    report(
        neuron.internal_blocks.len(),
        neuron.internal_blocks.last().map_or(neuron.span, |b| b.span),
        "internals",
    );
    report(
        neuron.equations_blocks.len(),
        neuron.equations_blocks.last().map_or(neuron.span, |b| b.span),
        "equations",
    );
    report(
        neuron.input_blocks.len(),
        neuron.input_blocks.last().map_or(neuron.span, |b| b.span),
        "input",
    );
    report(
        neuron.output_blocks.len(),
        neuron.output_blocks.last().map_or(neuron.span, |b| b.span),
        "output",
    );
    report(
        neuron.update_blocks.len(),
        neuron.update_blocks.last().map_or(neuron.span, |b| b.span),
        "update",
    );
}

/// Every differential quotient on an equations LHS needs declarations in
/// `state`/`initial_values` for each lower derivative order, with
/// dimensions scaling by `1/s` per order.
fn check_derivatives_declared(neuron: &Neuron, table: &SymbolTable, diags: &mut Diagnostics) {
    let Some(scope) = neuron.scope else { return };

    let mut check_row = |name: &str, order: u32, span| {
        if order == 0 {
            return;
        }
        for k in 0..order {
            let wanted = format!("{}{}", name, "'".repeat(k as usize));
            if !neuron.declares_state_variable(&wanted) {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::DerivativeNotDeclared,
                        span,
                        format!(
                            "'{}{}' is defined by a differential equation but '{}' is not declared in state or initial_values",
                            name,
                            "'".repeat(order as usize),
                            wanted
                        ),
                    )
                    .in_neuron(&neuron.name),
                );
                return;
            }
        }

        // Declared orders must agree dimensionally: unit(x^(k)) ==
        // unit(x) / s^k.
        let Some(base_id) = table.lookup(scope, name) else { return };
        let base = table.symbol(base_id).ty;
        if !base.is_numeric() {
            return;
        }
        for k in 1..order {
            let primed = format!("{}{}", name, "'".repeat(k as usize));
            let Some(id) = table.lookup(scope, &primed) else { continue };
            let ty = table.symbol(id).ty;
            if !ty.is_numeric() {
                continue;
            }
            let mut expected = base.unit;
            for _ in 0..k {
                expected = expected.divide(&nestml_ast::Unit::coherent(
                    nestml_ast::Dimensions::TIME,
                ));
            }
            if expected.dims != ty.unit.dims {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::UnitMismatch,
                        table.symbol(id).span,
                        format!(
                            "'{}' is declared as [{}] but the derivative of '{}' has unit [{}]",
                            primed, ty.unit, name, expected
                        ),
                    )
                    .in_neuron(&neuron.name),
                );
            }
        }
    };

    for equation in neuron.equations() {
        match equation {
            Equation::Ode(ode) => check_row(&ode.name, ode.order, ode.span),
            Equation::Shape(shape) if shape.order >= 1 => {
                check_row(&shape.name, shape.order, shape.span)
            }
            _ => {}
        }
    }
}

/// `convolve(shape, port)`: the first argument must name a shape declared
/// in this neuron's equations, the second a spike input port.
fn check_convolve_calls(neuron: &Neuron, table: &SymbolTable, diags: &mut Diagnostics) {
    let shape_names: IndexSet<&str> = neuron
        .equations()
        .filter_map(|eq| match eq {
            Equation::Shape(shape) => Some(shape.name.as_str()),
            _ => None,
        })
        .collect();

    let mut check_arg_pair = |call: &Expr, args: &[Expr]| {
        let shape_ok = matches!(
            &args[0].kind,
            ExprKind::Variable { name, order: 0, .. } if shape_names.contains(name.as_str())
        );

        let port_ok = match &args[1].kind {
            ExprKind::Variable {
                symbol: Some(id), ..
            } => matches!(
                table.symbol(*id).kind,
                SymbolKind::InputPort { spike: true }
            ),
            _ => false,
        };

        if !shape_ok || !port_ok {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::ConvolveArgs,
                    call.span,
                    "convolve expects a shape and a spike input port".to_string(),
                )
                .in_neuron(&neuron.name),
            );
        }
    };

    for_each_expr(neuron, &mut |expr, _| {
        if let ExprKind::Call { name, args } = &expr.kind {
            if name == "convolve" && args.len() == 2 {
                check_arg_pair(expr, args);
            }
        }
    });
}

/// Alias declarations (`function x <dt> = expr`) need an initializer; in
/// `initial_values` the initializer may reference parameters and other
/// initial values but neither state variables nor the alias itself.
fn check_aliases(neuron: &Neuron, table: &SymbolTable, diags: &mut Diagnostics) {
    let mut check_decl = |decl: &nestml_ast::Declaration, restrict_initial: bool| {
        if !decl.is_alias {
            return;
        }
        let Some(init) = &decl.initializer else {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::AliasRestriction,
                    decl.span,
                    format!(
                        "alias '{}' needs a defining expression",
                        decl.names.join(", ")
                    ),
                )
                .in_neuron(&neuron.name),
            );
            return;
        };

        if !restrict_initial {
            return;
        }

        init.walk(&mut |e| {
            if let ExprKind::Variable {
                name,
                symbol: Some(id),
                ..
            } = &e.kind
            {
                let symbol = table.symbol(*id);
                let self_reference = decl.names.iter().any(|n| n == name);
                let illegal_block = symbol.block == Some(BlockKind::State);
                if self_reference || illegal_block {
                    diags.push(
                        Diagnostic::error(
                            DiagnosticKind::AliasRestriction,
                            e.span,
                            if self_reference {
                                format!("alias '{}' refers to itself", name)
                            } else {
                                format!(
                                    "alias in initial_values cannot reference state variable '{}'",
                                    name
                                )
                            },
                        )
                        .in_neuron(&neuron.name),
                    );
                }
            }
        });
    };

    for block in &neuron.initial_blocks {
        for decl in &block.declarations {
            check_decl(decl, true);
        }
    }
    for equation in neuron.equations() {
        if let Equation::Alias(decl) = equation {
            check_decl(decl, false);
        }
    }
}

/// `integrate_odes()` and `emit_spike()` are callable only inside `update`.
fn check_update_only_calls(neuron: &Neuron, diags: &mut Diagnostics) {
    for_each_expr(neuron, &mut |expr, in_update| {
        if let ExprKind::Call { name, .. } = &expr.kind {
            if (name == "integrate_odes" || name == "emit_spike") && !in_update {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::CallOutsideUpdate,
                        expr.span,
                        format!("'{}' may only be called inside update", name),
                    )
                    .in_neuron(&neuron.name),
                );
            }
        }
    });
}

/// Parameter initializers are constant expressions: variable references
/// may only name other parameters, unit symbols, or predefined constants.
fn check_parameters_constant(
    neuron: &Neuron,
    table: &SymbolTable,
    options: CoCoOptions,
    diags: &mut Diagnostics,
) {
    for block in &neuron.parameter_blocks {
        for decl in &block.declarations {
            let Some(init) = &decl.initializer else { continue };
            init.walk(&mut |e| {
                if let ExprKind::Variable {
                    name,
                    symbol: Some(id),
                    ..
                } = &e.kind
                {
                    let symbol = table.symbol(*id);
                    let constant = symbol.kind == SymbolKind::Unit
                        || symbol.block == Some(BlockKind::Parameters)
                        || (symbol.predefined && name == "e");
                    if !constant {
                        let mut diag = Diagnostic::error(
                            DiagnosticKind::NonConstantParameter,
                            e.span,
                            format!(
                                "parameter '{}' is initialized from non-parameter '{}'",
                                decl.names.join(", "),
                                name
                            ),
                        )
                        .in_neuron(&neuron.name);
                        if options.dev {
                            diag.severity = Severity::Warning;
                        }
                        diags.push(diag);
                    }
                }
            });
        }
    }
}

/// Inhibitory and excitatory spike ports must agree on their unit.
fn check_port_units(neuron: &Neuron, diags: &mut Diagnostics) {
    let spike_ports: Vec<_> = neuron
        .input_ports()
        .filter(|p| {
            matches!(
                p.kind,
                PortKind::Spike {
                    inhibitory: true,
                    ..
                } | PortKind::Spike {
                    excitatory: true,
                    ..
                }
            )
        })
        .collect();

    let inhibitory = spike_ports
        .iter()
        .find(|p| matches!(p.kind, PortKind::Spike { inhibitory: true, .. }));
    let excitatory = spike_ports
        .iter()
        .find(|p| matches!(p.kind, PortKind::Spike { excitatory: true, .. }));

    if let (Some(inh), Some(exc)) = (inhibitory, excitatory) {
        if let (Some(a), Some(b)) = (inh.ty, exc.ty) {
            if a.is_numeric() && b.is_numeric() && a.unit.dims != b.unit.dims {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::PortUnitMismatch,
                        exc.span,
                        format!(
                            "spike ports '{}' and '{}' disagree on their unit: [{}] vs [{}]",
                            inh.name, exc.name, a.unit, b.unit
                        ),
                    )
                    .with_label(inh.span, "other port declared here")
                    .in_neuron(&neuron.name),
                );
            }
        }
    }
}

/// No cyclic dependency among `function` aliases.
fn check_alias_cycles(neuron: &Neuron, diags: &mut Diagnostics) {
    // Collect alias name -> defining expression
    fn collect<'a>(
        decl: &'a nestml_ast::Declaration,
        aliases: &mut IndexMap<&'a str, (&'a Expr, nestml_ast::Span)>,
    ) {
        if decl.is_alias {
            if let (Some(name), Some(init)) = (decl.names.first(), decl.initializer.as_ref()) {
                aliases.insert(name.as_str(), (init, decl.span));
            }
        }
    }

    let mut aliases: IndexMap<&str, (&Expr, nestml_ast::Span)> = IndexMap::new();
    for block in &neuron.initial_blocks {
        for decl in &block.declarations {
            collect(decl, &mut aliases);
        }
    }
    for equation in neuron.equations() {
        if let Equation::Alias(decl) = equation {
            collect(decl, &mut aliases);
        }
    }

    let edges: IndexMap<&str, Vec<&str>> = aliases
        .iter()
        .map(|(&name, (init, _))| {
            let mut deps = Vec::new();
            init.walk(&mut |e| {
                if let ExprKind::Variable { name: dep, .. } = &e.kind {
                    if aliases.contains_key(dep.as_str()) {
                        deps.push(dep.as_str());
                    }
                }
            });
            (name, deps)
        })
        .collect();

    // Iterative depth-first marking
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }

    let mut marks: IndexMap<&str, Mark> =
        edges.keys().map(|&name| (name, Mark::White)).collect();
    let mut reported = false;

    for &start in edges.keys() {
        if marks[start] != Mark::White || reported {
            continue;
        }

        // Stack entries: (node, next child index)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Gray);

        while let Some((node, child)) = stack.pop() {
            let deps = &edges[node];
            if child < deps.len() {
                stack.push((node, child + 1));
                let next = deps[child];
                match marks[next] {
                    Mark::White => {
                        marks.insert(next, Mark::Gray);
                        stack.push((next, 0));
                    }
                    Mark::Gray => {
                        if !reported {
                            let span = aliases[next].1;
                            diags.push(
                                Diagnostic::error(
                                    DiagnosticKind::AliasCycle,
                                    span,
                                    format!("alias '{}' is defined in terms of itself", next),
                                )
                                .in_neuron(&neuron.name),
                            );
                            reported = true;
                        }
                    }
                    Mark::Black => {}
                }
            } else {
                marks.insert(node, Mark::Black);
            }
        }
    }
}

/// Assignments may not target parameters, input ports, or aliases.
fn check_assignment_targets(neuron: &Neuron, table: &SymbolTable, diags: &mut Diagnostics) {
    fn walk<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a Expr>) {
        for stmt in stmts {
            match stmt {
                Stmt::Assignment { lhs, .. } => out.push(lhs),
                Stmt::If(if_stmt) => {
                    for (_, body) in &if_stmt.branches {
                        walk(body, out);
                    }
                    if let Some(body) = &if_stmt.else_branch {
                        walk(body, out);
                    }
                }
                Stmt::For(for_stmt) => walk(&for_stmt.body, out),
                _ => {}
            }
        }
    }

    let mut targets = Vec::new();
    for block in &neuron.update_blocks {
        walk(&block.statements, &mut targets);
    }
    for func in &neuron.functions {
        walk(&func.body, &mut targets);
    }

    for lhs in targets {
        if let ExprKind::Variable {
            name,
            symbol: Some(id),
            ..
        } = &lhs.kind
        {
            let symbol = table.symbol(*id);
            let illegal = symbol.block == Some(BlockKind::Parameters)
                || matches!(symbol.kind, SymbolKind::InputPort { .. })
                || symbol.is_alias;
            if illegal {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::IllegalAssignment,
                        lhs.span,
                        format!("'{}' cannot be assigned to", name),
                    )
                    .in_neuron(&neuron.name),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::build_symbol_table;
    use crate::typing::check_types;
    use nestml_lexer::lex_with_spans;
    use nestml_parser::parse_compilation_unit;
    use std::path::Path;

    fn run_cocos(source: &str) -> Diagnostics {
        let (tokens, _) = lex_with_spans(source);
        let (mut unit, errors) =
            parse_compilation_unit(&tokens, 0, Path::new("test.nestml"), None);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut diags = Diagnostics::new();
        let mut table = build_symbol_table(&mut unit, &mut diags);
        check_types(&mut unit, &mut table, &mut diags);
        check_context_conditions(&unit, &table, CoCoOptions::default(), &mut diags);
        diags
    }

    fn errors_of_kind(diags: &Diagnostics, kind: DiagnosticKind) -> usize {
        diags
            .entries()
            .iter()
            .filter(|d| d.kind == kind && d.severity >= Severity::Error)
            .count()
    }

    const VALID: &str = r#"
neuron valid:
  state:
    V_m mV = 0 mV
  end
  initial_values:
    g_ex nS = 0 nS
  end
  parameters:
    tau ms = 10 ms
    C_m pF = 250 pF
  end
  equations:
    shape g_kernel = exp(-t / tau)
    g_ex' = -g_ex / tau
    V_m' = -V_m / tau + convolve(g_kernel, spikes) * (V_m / C_m) * (1 / V_m) * (1 mV)
  end
  input:
    spikes nS <- excitatory spike
  end
  output: spike
  update:
    integrate_odes()
    if V_m > 0 mV:
      emit_spike()
    end
  end
end
"#;

    #[test]
    fn valid_model_passes_every_coco() {
        let diags = run_cocos(VALID);
        assert!(!diags.has_errors(), "{:#?}", diags.entries());
    }

    #[test]
    fn repeated_block_is_one_error() {
        let diags = run_cocos(
            "neuron n:\n  state:\n    a mV = 0 mV\n  end\n  state:\n    b mV = 0 mV\n  end\nend",
        );
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::BlockRepeated), 1);
    }

    #[test]
    fn shape_ode_without_declaration_is_error() {
        let diags = run_cocos("neuron n:\n  equations:\n    shape f' = 0\n  end\nend");
        assert_eq!(
            errors_of_kind(&diags, DiagnosticKind::DerivativeNotDeclared),
            1
        );
    }

    #[test]
    fn ode_over_undeclared_state_is_error() {
        let diags = run_cocos(
            "neuron n:\n  parameters:\n    tau ms = 1 ms\n  end\n  equations:\n    x' = -x / tau\n  end\nend",
        );
        assert!(errors_of_kind(&diags, DiagnosticKind::DerivativeNotDeclared) >= 1);
    }

    #[test]
    fn convolve_with_state_variable_is_error() {
        // Second argument is a state variable, not a spike port
        let source = r#"
neuron n:
  state:
    g_ex nS = 0 nS
  end
  parameters:
    tau ms = 1 ms
  end
  equations:
    shape test = exp(-t / tau)
    g_ex' = convolve(test, g_ex) / (1 s)
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::ConvolveArgs), 1);
    }

    #[test]
    fn convolve_with_unknown_shape_is_error() {
        let source = r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  equations:
    V_m' = convolve(nope, spikes) * (1 mV / (1 s * 1 nS))
  end
  input:
    spikes nS <- excitatory spike
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::ConvolveArgs), 1);
    }

    #[test]
    fn emit_spike_outside_update_is_error() {
        let source = r#"
neuron n:
  update:
  end
  function f() void:
    emit_spike()
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::CallOutsideUpdate), 1);
    }

    #[test]
    fn parameter_referencing_state_is_error() {
        let source = r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  parameters:
    V_init mV = V_m
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(
            errors_of_kind(&diags, DiagnosticKind::NonConstantParameter),
            1
        );
    }

    #[test]
    fn parameter_rule_relaxed_in_dev_mode() {
        let source = "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  parameters:\n    V_init mV = V_m\n  end\nend";
        let (tokens, _) = lex_with_spans(source);
        let (mut unit, _) = parse_compilation_unit(&tokens, 0, Path::new("t.nestml"), None);
        let mut diags = Diagnostics::new();
        let mut table = build_symbol_table(&mut unit, &mut diags);
        check_types(&mut unit, &mut table, &mut diags);
        check_context_conditions(&unit, &table, CoCoOptions { dev: true }, &mut diags);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::NonConstantParameter), 0);
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::NonConstantParameter
                && d.severity == Severity::Warning));
    }

    #[test]
    fn mismatched_spike_port_units_is_error() {
        let source = r#"
neuron n:
  input:
    spikeInh mV <- inhibitory spike
    spikeExc nS <- excitatory spike
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::PortUnitMismatch), 1);
    }

    #[test]
    fn alias_cycle_is_error() {
        let source = r#"
neuron n:
  parameters:
    tau ms = 1 ms
  end
  equations:
    function a ms = b
    function b ms = a
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::AliasCycle), 1);
    }

    #[test]
    fn alias_in_initial_values_cannot_use_state() {
        let source = r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  initial_values:
    function start mV = V_m
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::AliasRestriction), 1);
    }

    #[test]
    fn assignment_to_parameter_is_error() {
        let source = r#"
neuron n:
  parameters:
    tau ms = 1 ms
  end
  update:
    tau = 2 ms
  end
end
"#;
        let diags = run_cocos(source);
        assert_eq!(errors_of_kind(&diags, DiagnosticKind::IllegalAssignment), 1);
    }
}
