//! Pretty-printing of the AST back to NESTML source.
//!
//! Printing an accepted tree and re-parsing it yields a structurally equal
//! tree; the round-trip tests in the parser crate rely on that. Printed
//! output is also what the solver driver ships as expression strings.

use crate::expr::{Expr, ExprKind, LiteralValue, UnaryOp};
use crate::model::*;

/// Print an expression.
///
/// Composite subexpressions are parenthesized, which keeps the printer
/// independent of precedence bookkeeping without changing structure on
/// re-parse.
pub fn print_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal { value, unit } => {
            let num = match value {
                LiteralValue::Integer(n) => format!("{}", n),
                LiteralValue::Float(x) => format_float(*x),
            };
            match unit {
                Some(u) => format!("{} {}", num, u),
                None => num,
            }
        }
        ExprKind::BoolLiteral(b) => format!("{}", b),
        ExprKind::StringLiteral(s) => format!("\"{}\"", s),
        ExprKind::Variable { name, order, .. } => {
            format!("{}{}", name, "'".repeat(*order as usize))
        }
        ExprKind::Call { name, args } => {
            let args: Vec<String> = args.iter().map(print_expr).collect();
            format!("{}({})", name, args.join(", "))
        }
        ExprKind::Unary { op, operand } => {
            let op = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "not ",
            };
            format!("{}{}", op, print_operand(operand))
        }
        ExprKind::Binary { op, left, right } => {
            format!(
                "{} {} {}",
                print_operand(left),
                op.symbol(),
                print_operand(right)
            )
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => format!(
            "{} ? {} : {}",
            print_operand(condition),
            print_operand(then_expr),
            print_operand(else_expr)
        ),
    }
}

/// Print a subexpression, parenthesizing anything composite.
fn print_operand(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Binary { .. } | ExprKind::Conditional { .. } | ExprKind::Unary { .. } => {
            format!("({})", print_expr(expr))
        }
        _ => print_expr(expr),
    }
}

/// Format a float so that it re-lexes as a float, never an integer.
fn format_float(x: f64) -> String {
    let s = format!("{}", x);
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Print a unit expression.
pub fn print_unit_expr(unit: &UnitExpr) -> String {
    match unit {
        UnitExpr::Base(name) => name.clone(),
        UnitExpr::One => "1".to_string(),
        UnitExpr::Multiply(lhs, rhs) => {
            format!("{}*{}", print_unit_term(lhs), print_unit_term(rhs))
        }
        UnitExpr::Divide(lhs, rhs) => {
            format!("{}/{}", print_unit_term(lhs), print_unit_term(rhs))
        }
        UnitExpr::Power(base, exp) => format!("{}**{}", print_unit_term(base), exp),
    }
}

fn print_unit_term(unit: &UnitExpr) -> String {
    match unit {
        UnitExpr::Multiply(..) | UnitExpr::Divide(..) => {
            format!("({})", print_unit_expr(unit))
        }
        _ => print_unit_expr(unit),
    }
}

/// Print a datatype.
pub fn print_datatype(dt: &DataTypeExpr) -> String {
    match dt {
        DataTypeExpr::Real => "real".to_string(),
        DataTypeExpr::Integer => "integer".to_string(),
        DataTypeExpr::Boolean => "boolean".to_string(),
        DataTypeExpr::String => "string".to_string(),
        DataTypeExpr::Void => "void".to_string(),
        DataTypeExpr::Unit(u) => print_unit_expr(u),
    }
}

/// Print a declaration line (no indentation, no trailing newline).
pub fn print_declaration(decl: &Declaration) -> String {
    let mut out = String::new();
    if decl.recordable {
        out.push_str("recordable ");
    }
    if decl.is_alias {
        out.push_str("function ");
    }
    out.push_str(&decl.names.join(", "));
    out.push(' ');
    out.push_str(&print_datatype(&decl.datatype));
    if let Some(init) = &decl.initializer {
        out.push_str(" = ");
        out.push_str(&print_expr(init));
    }
    out
}

fn print_stmts(stmts: &[Stmt], indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    for stmt in stmts {
        match stmt {
            Stmt::Declaration(d) => {
                out.push_str(&format!("{}{}\n", pad, print_declaration(d)));
            }
            Stmt::Assignment { lhs, rhs, .. } => {
                out.push_str(&format!("{}{} = {}\n", pad, print_expr(lhs), print_expr(rhs)));
            }
            Stmt::Expr(e) => out.push_str(&format!("{}{}\n", pad, print_expr(e))),
            Stmt::Return { value, .. } => match value {
                Some(v) => out.push_str(&format!("{}return {}\n", pad, print_expr(v))),
                None => out.push_str(&format!("{}return\n", pad)),
            },
            Stmt::If(if_stmt) => {
                for (i, (cond, body)) in if_stmt.branches.iter().enumerate() {
                    let kw = if i == 0 { "if" } else { "elif" };
                    out.push_str(&format!("{}{} {}:\n", pad, kw, print_expr(cond)));
                    print_stmts(body, indent + 1, out);
                }
                if let Some(body) = &if_stmt.else_branch {
                    out.push_str(&format!("{}else:\n", pad));
                    print_stmts(body, indent + 1, out);
                }
                out.push_str(&format!("{}end\n", pad));
            }
            Stmt::For(for_stmt) => {
                out.push_str(&format!(
                    "{}for {} in {} ... {}",
                    pad,
                    for_stmt.variable,
                    print_expr(&for_stmt.from),
                    print_expr(&for_stmt.to)
                ));
                if let Some(step) = &for_stmt.step {
                    out.push_str(&format!(" step {}", print_expr(step)));
                }
                out.push_str(":\n");
                print_stmts(&for_stmt.body, indent + 1, out);
                out.push_str(&format!("{}end\n", pad));
            }
        }
    }
}

fn block_keyword(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::State => "state",
        BlockKind::InitialValues => "initial_values",
        BlockKind::Parameters => "parameters",
        BlockKind::Internals => "internals",
        BlockKind::Local => "",
    }
}

/// Print a whole neuron.
pub fn print_neuron(neuron: &Neuron) -> String {
    let mut out = format!("neuron {}:\n", neuron.name);

    for block in neuron
        .state_blocks
        .iter()
        .chain(&neuron.initial_blocks)
        .chain(&neuron.parameter_blocks)
        .chain(&neuron.internal_blocks)
    {
        out.push_str(&format!("  {}:\n", block_keyword(block.kind)));
        for decl in &block.declarations {
            out.push_str(&format!("    {}\n", print_declaration(decl)));
        }
        out.push_str("  end\n");
    }

    for block in &neuron.equations_blocks {
        out.push_str("  equations:\n");
        for eq in &block.equations {
            match eq {
                Equation::Shape(shape) => out.push_str(&format!(
                    "    shape {}{} = {}\n",
                    shape.name,
                    "'".repeat(shape.order as usize),
                    print_expr(&shape.rhs)
                )),
                Equation::Ode(ode) => out.push_str(&format!(
                    "    {}{} = {}\n",
                    ode.name,
                    "'".repeat(ode.order as usize),
                    print_expr(&ode.rhs)
                )),
                Equation::Alias(decl) => {
                    out.push_str(&format!("    {}\n", print_declaration(decl)))
                }
                Equation::UpdateStep { variable, rhs, .. } => {
                    out.push_str(&format!("    {} = {}\n", variable, print_expr(rhs)))
                }
            }
        }
        out.push_str("  end\n");
    }

    for block in &neuron.input_blocks {
        out.push_str("  input:\n");
        for port in &block.ports {
            out.push_str("    ");
            out.push_str(&port.name);
            if let Some(dt) = &port.datatype {
                out.push_str(&format!(" {}", print_datatype(dt)));
            }
            out.push_str(" <- ");
            match port.kind {
                PortKind::Spike {
                    inhibitory,
                    excitatory,
                } => {
                    if inhibitory {
                        out.push_str("inhibitory ");
                    }
                    if excitatory {
                        out.push_str("excitatory ");
                    }
                    out.push_str("spike");
                }
                PortKind::Current => out.push_str("current"),
            }
            out.push('\n');
        }
        out.push_str("  end\n");
    }

    for _ in &neuron.output_blocks {
        out.push_str("  output: spike\n");
    }

    for block in &neuron.update_blocks {
        out.push_str("  update:\n");
        print_stmts(&block.statements, 2, &mut out);
        out.push_str("  end\n");
    }

    for func in &neuron.functions {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|(name, dt)| format!("{} {}", name, print_datatype(dt)))
            .collect();
        out.push_str(&format!("  function {}({})", func.name, params.join(", ")));
        if let Some(ret) = &func.return_type {
            out.push_str(&format!(" {}", print_datatype(ret)));
        }
        out.push_str(":\n");
        print_stmts(&func.body, 2, &mut out);
        out.push_str("  end\n");
    }

    out.push_str("end\n");
    out
}

/// Print a whole compilation unit.
pub fn print_unit(unit: &CompilationUnit) -> String {
    unit.neurons.iter().map(print_neuron).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::span::Span;

    fn sp() -> Span {
        Span::zero(0)
    }

    #[test]
    fn test_print_literals() {
        let int = Expr::literal(LiteralValue::Integer(55), Some("mV".into()), sp());
        assert_eq!(print_expr(&int), "55 mV");

        let float = Expr::literal(LiteralValue::Float(1.0), None, sp());
        assert_eq!(print_expr(&float), "1.0");

        let sci = Expr::literal(LiteralValue::Float(5e-7), None, sp());
        assert!(print_expr(&sci).contains('e') || print_expr(&sci).contains('.'));
    }

    #[test]
    fn test_print_binary() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::variable("V_m", sp()),
            Expr::binary(
                BinaryOp::Mul,
                Expr::variable("a", sp()),
                Expr::variable("b", sp()),
                sp(),
            ),
            sp(),
        );
        assert_eq!(print_expr(&e), "V_m + (a * b)");
    }

    #[test]
    fn test_print_derivative() {
        let mut v = Expr::variable("V_m", sp());
        if let ExprKind::Variable { order, .. } = &mut v.kind {
            *order = 2;
        }
        assert_eq!(print_expr(&v), "V_m''");
    }

    #[test]
    fn test_print_unit_exprs() {
        let one_over_ms = UnitExpr::Divide(
            Box::new(UnitExpr::One),
            Box::new(UnitExpr::Base("ms".into())),
        );
        assert_eq!(print_unit_expr(&one_over_ms), "1/ms");

        let sq = UnitExpr::Power(Box::new(UnitExpr::Base("mV".into())), 2);
        assert_eq!(print_unit_expr(&sq), "mV**2");
    }

    #[test]
    fn test_print_declaration() {
        let decl = Declaration {
            names: vec!["V_m".into()],
            datatype: DataTypeExpr::Unit(UnitExpr::Base("mV".into())),
            initializer: Some(Expr::literal(
                LiteralValue::Integer(0),
                Some("mV".into()),
                sp(),
            )),
            recordable: true,
            is_alias: false,
            ty: None,
            span: sp(),
        };
        assert_eq!(print_declaration(&decl), "recordable V_m mV = 0 mV");
    }
}
