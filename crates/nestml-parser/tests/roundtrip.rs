//! Parser integration tests: full models and print/re-parse round trips.

use nestml_ast::printer::print_unit;
use nestml_ast::{Equation, ExprKind, PortKind};
use nestml_lexer::lex_with_spans;
use nestml_parser::parse_compilation_unit;
use std::path::Path;

fn parse(source: &str) -> nestml_ast::CompilationUnit {
    let (tokens, invalid) = lex_with_spans(source);
    assert!(invalid.is_empty(), "lexer rejected input: {:?}", invalid);
    let (unit, errors) = parse_compilation_unit(&tokens, 0, Path::new("test.nestml"), None);
    assert!(errors.is_empty(), "parse errors: {:#?}", errors);
    unit
}

const IAF_COND: &str = r#"
neuron iaf_cond_alpha:
  state:
    recordable V_m mV = -70 mV
    r integer = 0
  end

  initial_values:
    g_ex nS = 0 nS
    g_ex' nS/ms = 0 nS/ms
  end

  parameters:
    C_m pF = 250 pF
    tau_syn_ex ms = 2 ms
    V_th mV = -55 mV
    E_L mV = -70 mV
    I_e pA = 0 pA
  end

  internals:
    h ms = resolution()
  end

  equations:
    shape g_in = exp(-t / tau_syn_ex)
    V_m' = -(V_m - E_L) / tau_syn_ex + (convolve(g_in, spikeInh) + I_e) / C_m
  end

  input:
    spikeInh nS <- inhibitory spike
    spikeExc nS <- excitatory spike
    currents pA <- current
  end

  output: spike

  update:
    integrate_odes()
    if V_m > V_th:
      V_m = E_L
      emit_spike()
    end
  end
end
"#;

#[test]
fn parses_full_conductance_model() {
    let unit = parse(IAF_COND);
    assert_eq!(unit.neurons.len(), 1);

    let neuron = &unit.neurons[0];
    assert_eq!(neuron.name, "iaf_cond_alpha");
    assert_eq!(neuron.state_blocks.len(), 1);
    assert_eq!(neuron.state_blocks[0].declarations.len(), 2);
    assert!(neuron.state_blocks[0].declarations[0].recordable);
    assert_eq!(neuron.initial_blocks[0].declarations.len(), 2);
    assert_eq!(neuron.parameter_blocks[0].declarations.len(), 5);
    assert_eq!(neuron.input_blocks[0].ports.len(), 3);
    assert_eq!(neuron.output_blocks.len(), 1);
    assert_eq!(neuron.update_blocks.len(), 1);

    // Derivative declaration in initial_values
    let g_prime = &neuron.initial_blocks[0].declarations[1];
    assert_eq!(g_prime.names, vec!["g_ex'"]);

    let ports: Vec<_> = neuron.input_ports().collect();
    assert!(matches!(
        ports[0].kind,
        PortKind::Spike {
            inhibitory: true,
            excitatory: false
        }
    ));
    assert!(matches!(ports[2].kind, PortKind::Current));

    let equations: Vec<_> = neuron.equations().collect();
    assert_eq!(equations.len(), 2);
    assert!(matches!(equations[0], Equation::Shape(s) if s.order == 0));
    assert!(matches!(equations[1], Equation::Ode(o) if o.order == 1 && o.name == "V_m"));
}

#[test]
fn parses_single_line_neuron() {
    let unit = parse("neuron N: state: V_m mV = 0 mV end update: end end");
    assert_eq!(unit.neurons.len(), 1);
    assert_eq!(unit.neurons[0].state_blocks[0].declarations.len(), 1);
}

#[test]
fn parses_ode_defined_shape() {
    let unit = parse(
        "neuron N:\n  equations:\n    shape g' = -g / tau\n    shape h'' = -h / tau2\n  end\nend",
    );
    let equations: Vec<_> = unit.neurons[0].equations().collect();
    assert!(matches!(equations[0], Equation::Shape(s) if s.order == 1));
    assert!(matches!(equations[1], Equation::Shape(s) if s.order == 2));
}

#[test]
fn parses_alias_in_equations() {
    let unit = parse(
        "neuron N:\n  equations:\n    function I_syn pA = g_ex * (V_m - E_ex)\n  end\nend",
    );
    let equations: Vec<_> = unit.neurons[0].equations().collect();
    match equations[0] {
        Equation::Alias(decl) => {
            assert!(decl.is_alias);
            assert_eq!(decl.names, vec!["I_syn"]);
        }
        other => panic!("expected alias, got {:?}", other),
    }
}

#[test]
fn parses_compound_assignment_desugared() {
    let unit = parse("neuron N:\n  update:\n    V_m += 2 mV\n  end\nend");
    let update = &unit.neurons[0].update_blocks[0];
    match &update.statements[0] {
        nestml_ast::Stmt::Assignment { rhs, .. } => {
            assert!(matches!(
                &rhs.kind,
                ExprKind::Binary {
                    op: nestml_ast::BinaryOp::Add,
                    ..
                }
            ));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn parses_elif_chain_and_for() {
    let source = r#"
neuron N:
  update:
    x integer = 0
    if x > 0:
      x = 1
    elif x < 0:
      x = 2
    else:
      x = 3
    end
    for i in 1 ... 10 step 2:
      x += i
    end
  end
end
"#;
    let unit = parse(source);
    let stmts = &unit.neurons[0].update_blocks[0].statements;
    assert_eq!(stmts.len(), 3);
    match &stmts[1] {
        nestml_ast::Stmt::If(if_stmt) => {
            assert_eq!(if_stmt.branches.len(), 2);
            assert!(if_stmt.else_branch.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
    assert!(matches!(&stmts[2], nestml_ast::Stmt::For(f) if f.step.is_some()));
}

#[test]
fn recovers_after_malformed_neuron() {
    let source = "neuron Bad:\n  state\n  end\nend\nneuron Good:\n  update:\n  end\nend";
    let (tokens, _) = lex_with_spans(source);
    let (unit, errors) = parse_compilation_unit(&tokens, 0, Path::new("x.nestml"), None);
    assert!(!errors.is_empty());
    assert!(unit.neurons.iter().any(|n| n.name == "Good"));
}

#[test]
fn print_reparse_is_fixpoint() {
    let unit = parse(IAF_COND);
    let printed = print_unit(&unit);
    let reparsed = parse(&printed);
    let printed_again = print_unit(&reparsed);
    assert_eq!(printed, printed_again);
}

#[test]
fn print_reparse_preserves_expression_structure() {
    let unit = parse(IAF_COND);
    let printed = print_unit(&unit);
    let reparsed = parse(&printed);

    let original: Vec<_> = unit.neurons[0].equations().collect();
    let round_tripped: Vec<_> = reparsed.neurons[0].equations().collect();
    assert_eq!(original.len(), round_tripped.len());

    for (a, b) in original.iter().zip(&round_tripped) {
        match (a, b) {
            (Equation::Shape(x), Equation::Shape(y)) => {
                assert_eq!(x.name, y.name);
                assert!(x.rhs.structurally_eq(&y.rhs));
            }
            (Equation::Ode(x), Equation::Ode(y)) => {
                assert_eq!((x.order, &x.name), (y.order, &y.name));
                assert!(x.rhs.structurally_eq(&y.rhs));
            }
            _ => {}
        }
    }
}
