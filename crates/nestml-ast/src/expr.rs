//! Expression AST.
//!
//! Expressions are produced by the parser undecorated and mutated in place
//! by the later phases: symbol resolution fills [`ExprKind::Variable`]
//! symbol slots, type checking fills [`Expr::ty`] and, where a scale
//! conversion is inserted, [`Expr::conversion_factor`].

use crate::span::Span;
use crate::types::PhysicalType;
use crate::SymbolId;
use serde::{Deserialize, Serialize};

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Expression kind
    pub kind: ExprKind,
    /// Source location
    pub span: Span,
    /// Resolved type, set by the type checker
    pub ty: Option<PhysicalType>,
    /// Scale factor applied to this operand when the checker unified two
    /// dimensionally equal units with different scales
    pub conversion_factor: Option<f64>,
}

/// Numeric literal payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
}

impl LiteralValue {
    /// Numeric value as f64.
    pub fn as_f64(&self) -> f64 {
        match self {
            LiteralValue::Integer(n) => *n as f64,
            LiteralValue::Float(x) => *x,
        }
    }
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Numeric literal with optional unit symbol (`55 mV`, `0.1`)
    Literal {
        value: LiteralValue,
        unit: Option<String>,
    },
    /// Boolean literal
    BoolLiteral(bool),
    /// String literal
    StringLiteral(String),
    /// Variable reference; `order > 0` is a differential quotient
    /// (`V_m'` has order 1). `symbol` is filled by name resolution.
    Variable {
        name: String,
        order: u32,
        symbol: Option<SymbolId>,
    },
    /// Function call. `convolve(shape, port)` arrives here and is given
    /// special treatment by the checker and the equations analyzer.
    Call { name: String, args: Vec<Expr> },
    /// Unary operator
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Binary operator
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Ternary conditional `cond ? a : b`
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// True for `+ - * / % **`.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Pow
        )
    }

    /// True for `< <= > >= == !=`.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    /// True for `and` / `or`.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Source representation.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl Expr {
    /// Create a new undecorated expression.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
            conversion_factor: None,
        }
    }

    /// Create a numeric literal.
    pub fn literal(value: LiteralValue, unit: Option<String>, span: Span) -> Self {
        Self::new(ExprKind::Literal { value, unit }, span)
    }

    /// Create a plain variable reference.
    pub fn variable(name: impl Into<String>, span: Span) -> Self {
        Self::new(
            ExprKind::Variable {
                name: name.into(),
                order: 0,
                symbol: None,
            },
            span,
        )
    }

    /// Create a binary operator expression.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr, span: Span) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    /// Resolved type, or the error sentinel if the checker has not run.
    pub fn type_or_error(&self) -> PhysicalType {
        self.ty.unwrap_or(PhysicalType::ERROR)
    }

    /// True if this is a call to the named function.
    pub fn is_call_to(&self, name: &str) -> bool {
        matches!(&self.kind, ExprKind::Call { name: n, .. } if n == name)
    }

    /// Visit this expression and all subexpressions, depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Unary { operand, .. } => operand.walk(visit),
            ExprKind::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.walk(visit);
                then_expr.walk(visit);
                else_expr.walk(visit);
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// Visit this expression and all subexpressions mutably, depth-first.
    ///
    /// The callback runs on children first so that replacements performed
    /// on a parent see already-rewritten children.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Expr)) {
        match &mut self.kind {
            ExprKind::Unary { operand, .. } => operand.walk_mut(visit),
            ExprKind::Binary { left, right, .. } => {
                left.walk_mut(visit);
                right.walk_mut(visit);
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.walk_mut(visit);
                then_expr.walk_mut(visit);
                else_expr.walk_mut(visit);
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    arg.walk_mut(visit);
                }
            }
            _ => {}
        }
        visit(self);
    }

    /// Structural equality ignoring spans and decoration.
    ///
    /// Used by the print/re-parse round-trip tests, which cannot expect
    /// byte offsets to survive.
    pub fn structurally_eq(&self, other: &Expr) -> bool {
        match (&self.kind, &other.kind) {
            (
                ExprKind::Literal { value: a, unit: ua },
                ExprKind::Literal { value: b, unit: ub },
            ) => a == b && ua == ub,
            (ExprKind::BoolLiteral(a), ExprKind::BoolLiteral(b)) => a == b,
            (ExprKind::StringLiteral(a), ExprKind::StringLiteral(b)) => a == b,
            (
                ExprKind::Variable {
                    name: a, order: oa, ..
                },
                ExprKind::Variable {
                    name: b, order: ob, ..
                },
            ) => a == b && oa == ob,
            (
                ExprKind::Call { name: a, args: aa },
                ExprKind::Call { name: b, args: ba },
            ) => a == b && aa.len() == ba.len() && aa.iter().zip(ba).all(|(x, y)| x.structurally_eq(y)),
            (
                ExprKind::Unary { op: a, operand: oa },
                ExprKind::Unary { op: b, operand: ob },
            ) => a == b && oa.structurally_eq(ob),
            (
                ExprKind::Binary {
                    op: a,
                    left: la,
                    right: ra,
                },
                ExprKind::Binary {
                    op: b,
                    left: lb,
                    right: rb,
                },
            ) => a == b && la.structurally_eq(lb) && ra.structurally_eq(rb),
            (
                ExprKind::Conditional {
                    condition: ca,
                    then_expr: ta,
                    else_expr: ea,
                },
                ExprKind::Conditional {
                    condition: cb,
                    then_expr: tb,
                    else_expr: eb,
                },
            ) => ca.structurally_eq(cb) && ta.structurally_eq(tb) && ea.structurally_eq(eb),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::zero(0)
    }

    #[test]
    fn test_walk_counts_nodes() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::variable("V_m", sp()),
            Expr::literal(LiteralValue::Integer(1), Some("mV".into()), sp()),
            sp(),
        );
        let mut count = 0;
        expr.walk(&mut |_| count += 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_structural_eq_ignores_decoration() {
        let a = Expr::variable("V_m", sp());
        let mut b = Expr::variable("V_m", sp());
        b.ty = Some(PhysicalType::REAL);
        b.span = Span::new(0, 10, 13);
        assert!(a.structurally_eq(&b));

        let c = Expr::variable("V_th", sp());
        assert!(!a.structurally_eq(&c));
    }

    #[test]
    fn test_is_call_to() {
        let call = Expr::new(
            ExprKind::Call {
                name: "convolve".into(),
                args: vec![],
            },
            sp(),
        );
        assert!(call.is_call_to("convolve"));
        assert!(!call.is_call_to("exp"));
    }
}
