//! Equations canonicalization and shape analysis.
//!
//! Turns the `equations` block into the canonical form the ODE analysis
//! driver consumes: classified shapes (direct, ODE-defined, delta), state
//! ODE rows, and an index of every `convolve` occurrence. Function
//! aliases are inlined into the analysis copies of each right-hand side;
//! the original alias declarations stay in the IR for code generation.

use indexmap::IndexSet;
use nestml_ast::{Declaration, Equation, Expr, ExprKind, Neuron, Span};

/// Canonical form of one neuron's equations.
#[derive(Debug, Clone, Default)]
pub struct OdeSystem {
    pub shapes: Vec<ShapeInfo>,
    pub odes: Vec<StateOde>,
    pub convolves: Vec<ConvolveUse>,
}

impl OdeSystem {
    /// True if there is nothing for the solver to do.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.odes.is_empty()
    }

    /// True if every row is linear in the dependent variables.
    pub fn is_linear(&self) -> bool {
        self.shapes.iter().all(|s| s.linear) && self.odes.iter().all(|o| o.linear)
    }
}

/// How a shape is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeForm {
    /// `shape f = expr(t)` — explicit closed form
    Direct,
    /// `shape f' = ...` / `shape f'' = ...` — defined by its own ODE
    Ode,
    /// `shape f = delta(t)`
    Delta,
}

/// A classified shape with its analysis copy of the defining expression.
#[derive(Debug, Clone)]
pub struct ShapeInfo {
    pub name: String,
    pub form: ShapeForm,
    /// Highest derivative order on the LHS (0 for direct and delta)
    pub order: u32,
    /// Defining expression, aliases inlined
    pub rhs: Expr,
    /// Initial value expression per derivative order, where declared
    pub initial_values: Vec<Option<Expr>>,
    /// Affine in the dependent variables
    pub linear: bool,
    pub span: Span,
}

/// An ODE row over a state variable, aliases inlined.
#[derive(Debug, Clone)]
pub struct StateOde {
    pub name: String,
    pub order: u32,
    pub rhs: Expr,
    pub initial_value: Option<Expr>,
    pub linear: bool,
    pub span: Span,
}

/// One `convolve(shape, port)` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvolveUse {
    pub shape: String,
    pub port: String,
    pub span: Span,
}

/// Collect and classify the ODE system of a neuron.
pub fn collect_ode_system(neuron: &Neuron) -> OdeSystem {
    let aliases = collect_aliases(neuron);
    let mut system = OdeSystem::default();

    // Dependent variable set: every shape and ODE state name, including
    // primed forms up to the row order.
    let mut dependents: IndexSet<String> = IndexSet::new();
    for equation in neuron.equations() {
        let (name, order) = match equation {
            Equation::Shape(shape) => (&shape.name, shape.order),
            Equation::Ode(ode) => (&ode.name, ode.order),
            _ => continue,
        };
        for k in 0..order.max(1) {
            dependents.insert(format!("{}{}", name, "'".repeat(k as usize)));
        }
    }

    for equation in neuron.equations() {
        match equation {
            Equation::Shape(shape) => {
                let rhs = inline_aliases(&shape.rhs, &aliases, 0);
                let form = if shape.order == 0 && rhs.is_call_to("delta") {
                    ShapeForm::Delta
                } else if shape.order == 0 {
                    ShapeForm::Direct
                } else {
                    ShapeForm::Ode
                };
                let linear = match form {
                    // Closed forms and pulses are forcing terms
                    ShapeForm::Direct | ShapeForm::Delta => true,
                    ShapeForm::Ode => is_affine(&rhs, &dependents),
                };
                let initial_values = (0..shape.order.max(1))
                    .map(|k| {
                        initial_value_of(
                            neuron,
                            &format!("{}{}", shape.name, "'".repeat(k as usize)),
                        )
                    })
                    .collect();

                system.shapes.push(ShapeInfo {
                    name: shape.name.clone(),
                    form,
                    order: shape.order,
                    rhs,
                    initial_values,
                    linear,
                    span: shape.span,
                });
            }
            Equation::Ode(ode) => {
                let rhs = inline_aliases(&ode.rhs, &aliases, 0);
                let linear = is_affine(&rhs, &dependents);
                system.odes.push(StateOde {
                    name: ode.name.clone(),
                    order: ode.order,
                    rhs,
                    initial_value: initial_value_of(neuron, &ode.name),
                    linear,
                    span: ode.span,
                });
            }
            _ => {}
        }
    }

    // Index every convolve occurrence in the equations.
    for equation in neuron.equations() {
        let rhs = match equation {
            Equation::Shape(shape) => &shape.rhs,
            Equation::Ode(ode) => &ode.rhs,
            Equation::Alias(decl) => match &decl.initializer {
                Some(init) => init,
                None => continue,
            },
            Equation::UpdateStep { rhs, .. } => rhs,
        };
        rhs.walk(&mut |expr| {
            if let ExprKind::Call { name, args } = &expr.kind {
                if name == "convolve" && args.len() == 2 {
                    if let (
                        ExprKind::Variable { name: shape, .. },
                        ExprKind::Variable { name: port, .. },
                    ) = (&args[0].kind, &args[1].kind)
                    {
                        let occurrence = ConvolveUse {
                            shape: shape.clone(),
                            port: port.clone(),
                            span: expr.span,
                        };
                        if !system.convolves.contains(&occurrence) {
                            system.convolves.push(occurrence);
                        }
                    }
                }
            }
        });
    }

    system
}

/// Alias name → defining expression, from equations and initial_values.
fn collect_aliases(neuron: &Neuron) -> Vec<(String, Expr)> {
    let mut aliases = Vec::new();
    let mut collect = |decl: &Declaration| {
        if decl.is_alias {
            if let (Some(name), Some(init)) = (decl.names.first(), &decl.initializer) {
                aliases.push((name.clone(), init.clone()));
            }
        }
    };

    for block in &neuron.initial_blocks {
        for decl in &block.declarations {
            collect(decl);
        }
    }
    for equation in neuron.equations() {
        if let Equation::Alias(decl) = equation {
            collect(decl);
        }
    }
    aliases
}

/// Replace references to aliases with their defining expressions.
///
/// Depth-bounded: alias cycles are a context-condition error, but the
/// inliner must not loop on rejected input.
fn inline_aliases(expr: &Expr, aliases: &[(String, Expr)], depth: u32) -> Expr {
    let mut result = expr.clone();
    if depth > 16 {
        return result;
    }
    result.walk_mut(&mut |node| {
        if let ExprKind::Variable { name, order: 0, .. } = &node.kind {
            if let Some((_, replacement)) = aliases.iter().find(|(n, _)| n == name) {
                *node = inline_aliases(replacement, aliases, depth + 1);
            }
        }
    });
    result
}

/// Look up the declared initial value of a (possibly primed) name.
fn initial_value_of(neuron: &Neuron, name: &str) -> Option<Expr> {
    neuron
        .state_blocks
        .iter()
        .chain(&neuron.initial_blocks)
        .flat_map(|b| b.declarations.iter())
        .find(|d| d.names.iter().any(|n| n == name))
        .and_then(|d| d.initializer.clone())
}

/// Degrees of an expression with respect to a variable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Degree {
    Constant,
    Linear,
}

/// Affine check: true iff the expression is `a + b·x` over the dependent
/// variables, with `a`, `b` free of them.
pub fn is_affine(expr: &Expr, variables: &IndexSet<String>) -> bool {
    degree(expr, variables).is_some()
}

fn degree(expr: &Expr, variables: &IndexSet<String>) -> Option<Degree> {
    use nestml_ast::BinaryOp;

    match &expr.kind {
        ExprKind::Literal { .. } | ExprKind::BoolLiteral(_) | ExprKind::StringLiteral(_) => {
            Some(Degree::Constant)
        }
        ExprKind::Variable { name, order, .. } => {
            let raw = format!("{}{}", name, "'".repeat(*order as usize));
            if variables.contains(&raw) {
                Some(Degree::Linear)
            } else {
                Some(Degree::Constant)
            }
        }
        ExprKind::Unary { operand, .. } => degree(operand, variables),
        ExprKind::Binary { op, left, right } => {
            let l = degree(left, variables)?;
            let r = degree(right, variables)?;
            match op {
                BinaryOp::Add | BinaryOp::Sub => Some(l.max_with(r)),
                BinaryOp::Mul => match (l, r) {
                    (Degree::Constant, d) | (d, Degree::Constant) => Some(d),
                    _ => None,
                },
                BinaryOp::Div => match (l, r) {
                    (d, Degree::Constant) => Some(d),
                    _ => None,
                },
                BinaryOp::Pow => match (l, r) {
                    (Degree::Constant, Degree::Constant) => Some(Degree::Constant),
                    _ => None,
                },
                // Comparisons and logic cannot appear linearly
                _ => match (l, r) {
                    (Degree::Constant, Degree::Constant) => Some(Degree::Constant),
                    _ => None,
                },
            }
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            let all_constant = [condition, then_expr, else_expr]
                .into_iter()
                .all(|e| degree(e, variables) == Some(Degree::Constant));
            all_constant.then_some(Degree::Constant)
        }
        ExprKind::Call { name, args } => {
            // convolve is replaced before code generation; as a forcing
            // term it never makes a row nonlinear.
            if name == "convolve" {
                return Some(Degree::Constant);
            }
            let all_constant = args
                .iter()
                .all(|a| degree(a, variables) == Some(Degree::Constant));
            all_constant.then_some(Degree::Constant)
        }
    }
}

impl Degree {
    fn max_with(self, other: Degree) -> Degree {
        if self == Degree::Linear || other == Degree::Linear {
            Degree::Linear
        } else {
            Degree::Constant
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestml_lexer::lex_with_spans;
    use nestml_parser::parse_compilation_unit;
    use std::path::Path;

    fn neuron_of(source: &str) -> Neuron {
        let (tokens, _) = lex_with_spans(source);
        let (unit, errors) = parse_compilation_unit(&tokens, 0, Path::new("t.nestml"), None);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        unit.neurons.into_iter().next().expect("one neuron")
    }

    #[test]
    fn classifies_direct_ode_and_delta_shapes() {
        let neuron = neuron_of(
            r#"
neuron n:
  initial_values:
    g nS = 0 nS
  end
  equations:
    shape a = exp(-t / tau)
    shape g' = -g / tau
    shape d = delta(t)
  end
end
"#,
        );
        let system = collect_ode_system(&neuron);
        assert_eq!(system.shapes.len(), 3);
        assert_eq!(system.shapes[0].form, ShapeForm::Direct);
        assert_eq!(system.shapes[1].form, ShapeForm::Ode);
        assert_eq!(system.shapes[1].order, 1);
        assert_eq!(system.shapes[2].form, ShapeForm::Delta);
    }

    #[test]
    fn both_decay_encodings_produce_one_canonical_row_each() {
        // The same exponential decay written directly and as an ODE; both
        // must come out as one shape row, one linear.
        let neuron = neuron_of(
            r#"
neuron n:
  initial_values:
    g_ode nS = 1 nS
  end
  equations:
    shape g_direct = exp(-t / tau)
    shape g_ode' = -g_ode / tau
  end
end
"#,
        );
        let system = collect_ode_system(&neuron);
        assert_eq!(system.shapes.len(), 2);
        assert!(system.shapes.iter().all(|s| s.linear));
        assert!(system.is_linear());
    }

    #[test]
    fn detects_linear_state_ode() {
        let neuron = neuron_of(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  equations:\n    V_m' = -V_m / tau + I_e / C_m\n  end\nend",
        );
        let system = collect_ode_system(&neuron);
        assert_eq!(system.odes.len(), 1);
        assert!(system.odes[0].linear);
        assert!(system.odes[0].initial_value.is_some());
    }

    #[test]
    fn detects_nonlinear_ode() {
        let neuron = neuron_of(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  equations:\n    V_m' = V_m * V_m / (1 mV * 1 s)\n  end\nend",
        );
        let system = collect_ode_system(&neuron);
        assert!(!system.odes[0].linear);
        assert!(!system.is_linear());
    }

    #[test]
    fn aliases_are_inlined_for_analysis() {
        let neuron = neuron_of(
            r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  equations:
    function leak mV = -V_m
    V_m' = leak / tau
  end
end
"#,
        );
        let system = collect_ode_system(&neuron);
        // After inlining, the rhs references V_m directly and is linear.
        let mut saw_v_m = false;
        system.odes[0].rhs.walk(&mut |e| {
            if let ExprKind::Variable { name, .. } = &e.kind {
                if name == "V_m" {
                    saw_v_m = true;
                }
            }
        });
        assert!(saw_v_m);
        assert!(system.odes[0].linear);
    }

    #[test]
    fn indexes_convolve_occurrences() {
        let neuron = neuron_of(
            r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  equations:
    shape g = exp(-t / tau)
    V_m' = convolve(g, spikes) / C_m
  end
  input:
    spikes nS <- excitatory spike
  end
end
"#,
        );
        let system = collect_ode_system(&neuron);
        assert_eq!(system.convolves.len(), 1);
        assert_eq!(system.convolves[0].shape, "g");
        assert_eq!(system.convolves[0].port, "spikes");
    }

    #[test]
    fn second_order_shape_collects_both_initials() {
        let neuron = neuron_of(
            r#"
neuron n:
  initial_values:
    g nS = 0 nS
    g' nS/ms = 1 nS / ms
  end
  equations:
    shape g'' = -g / (tau * tau) - g' / tau
  end
end
"#,
        );
        let system = collect_ode_system(&neuron);
        assert_eq!(system.shapes[0].order, 2);
        assert_eq!(system.shapes[0].initial_values.len(), 2);
        assert!(system.shapes[0].initial_values.iter().all(|i| i.is_some()));
        assert!(system.shapes[0].linear);
    }
}
