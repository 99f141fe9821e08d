//! Unit-aware type checking.
//!
//! Bottom-up decoration: every expression node receives a
//! [`PhysicalType`], computed from literals upward. Dimensional mismatches
//! are reported once and the offending node is typed with the error
//! sentinel, which silences all enclosing expressions — one mistake, one
//! diagnostic.
//!
//! Scale handling: operands whose dimensions match but whose scales differ
//! (`mV` vs `V`) unify to the left operand's unit; the factor applied to
//! the converted side is recorded on its node for the code generator.

use crate::builtins::Builtin;
use crate::symbols::{SymbolKind, SymbolTable};
use nestml_ast::unit::resolve_unit_name;
use nestml_ast::{
    BinaryOp, CompilationUnit, Diagnostic, DiagnosticKind, Diagnostics, Equation, Expr, ExprKind,
    LiteralValue, Neuron, PhysicalType, Rational, ScopeId, Span, Stmt, TypeBase, UnaryOp, Unit,
};

/// Type-check every expression of every neuron in the unit.
pub fn check_types(unit: &mut CompilationUnit, table: &mut SymbolTable, diags: &mut Diagnostics) {
    for neuron in &mut unit.neurons {
        let Some(scope) = neuron.scope else { continue };
        let mut checker = Checker {
            table: &mut *table,
            diags: &mut *diags,
            scope,
            neuron_name: neuron.name.clone(),
            return_type: None,
        };
        checker.check_neuron(neuron);
    }
}

struct Checker<'a> {
    table: &'a mut SymbolTable,
    diags: &'a mut Diagnostics,
    scope: ScopeId,
    neuron_name: String,
    /// Expected `return` type inside a function body
    return_type: Option<PhysicalType>,
}

impl Checker<'_> {
    fn error(&mut self, kind: DiagnosticKind, span: Span, message: String) {
        self.diags
            .push(Diagnostic::error(kind, span, message).in_neuron(&self.neuron_name));
    }

    fn check_neuron(&mut self, neuron: &mut Neuron) {
        for block in neuron
            .state_blocks
            .iter_mut()
            .chain(&mut neuron.initial_blocks)
            .chain(&mut neuron.parameter_blocks)
            .chain(&mut neuron.internal_blocks)
        {
            for decl in &mut block.declarations {
                self.check_declaration_init(decl);
            }
        }

        for block in &mut neuron.equations_blocks {
            for equation in &mut block.equations {
                match equation {
                    Equation::Shape(shape) => {
                        self.type_expr(&mut shape.rhs);
                    }
                    Equation::Ode(ode) => {
                        let rhs_ty = self.type_expr(&mut ode.rhs);
                        self.check_ode_dimensions(&ode.name, ode.order, rhs_ty, &ode.rhs);
                    }
                    Equation::Alias(decl) => self.check_declaration_init(decl),
                    Equation::UpdateStep { rhs, .. } => {
                        self.type_expr(rhs);
                    }
                }
            }
        }

        for block in &mut neuron.update_blocks {
            self.return_type = None;
            self.check_stmts(&mut block.statements);
        }

        for func in &mut neuron.functions {
            self.return_type = self
                .table
                .lookup(self.scope, &func.name)
                .map(|id| self.table.symbol(id).ty);
            let mut body = std::mem::take(&mut func.body);
            self.check_stmts(&mut body);
            func.body = body;
            self.return_type = None;
        }
    }

    /// An ODE `x^(n)' = rhs` must have rhs dimensions equal to
    /// `unit(x) / s^n`. Equations containing a `convolve` are exempt: the
    /// analyzer rewrites the call away and the rewritten form is what has
    /// to balance.
    fn check_ode_dimensions(
        &mut self,
        name: &str,
        order: u32,
        rhs_ty: PhysicalType,
        rhs: &Expr,
    ) {
        if rhs_ty.is_error() || contains_convolve(rhs) {
            return;
        }
        let Some(id) = self.table.lookup(self.scope, name) else {
            return;
        };
        let base = self.table.symbol(id).ty;
        if !base.is_numeric() || !rhs_ty.is_numeric() {
            return;
        }

        let expected = derived_unit(base.unit, order);
        if expected.dims != rhs_ty.unit.dims {
            self.error(
                DiagnosticKind::UnitMismatch,
                rhs.span,
                format!(
                    "right-hand side of '{}{}' has unit [{}], expected [{}]",
                    name,
                    "'".repeat(order as usize),
                    rhs_ty.unit,
                    expected
                ),
            );
        }
    }

    fn check_declaration_init(&mut self, decl: &mut nestml_ast::Declaration) {
        let target = decl.ty.unwrap_or(PhysicalType::ERROR);
        if let Some(init) = &mut decl.initializer {
            self.type_expr(init);
            self.unify_assignment(target, init);
        }
    }

    fn check_stmts(&mut self, statements: &mut [Stmt]) {
        for statement in statements {
            match statement {
                Stmt::Declaration(decl) => self.check_declaration_init(decl),
                Stmt::Assignment { lhs, rhs, .. } => {
                    let target = self.type_expr(lhs);
                    self.type_expr(rhs);
                    if !target.is_error() {
                        self.unify_assignment(target, rhs);
                    }
                }
                Stmt::Expr(expr) => {
                    self.type_expr(expr);
                }
                Stmt::Return { value, span } => {
                    let expected = self.return_type.unwrap_or(PhysicalType::VOID);
                    match value {
                        Some(value) => {
                            self.type_expr(value);
                            if expected.base == TypeBase::Void {
                                self.error(
                                    DiagnosticKind::TypeMismatch,
                                    *span,
                                    "return with a value in a void context".to_string(),
                                );
                            } else {
                                self.unify_assignment(expected, value);
                            }
                        }
                        None => {
                            if expected.is_numeric() {
                                self.error(
                                    DiagnosticKind::TypeMismatch,
                                    *span,
                                    format!("return without a value; expected {}", expected),
                                );
                            }
                        }
                    }
                }
                Stmt::If(if_stmt) => {
                    for (condition, body) in &mut if_stmt.branches {
                        let ty = self.type_expr(condition);
                        if !ty.is_error() && ty.base != TypeBase::Boolean {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                condition.span,
                                format!("condition must be boolean, found {}", ty),
                            );
                        }
                        self.check_stmts(body);
                    }
                    if let Some(body) = &mut if_stmt.else_branch {
                        self.check_stmts(body);
                    }
                }
                Stmt::For(for_stmt) => {
                    for bound in [&mut for_stmt.from, &mut for_stmt.to]
                        .into_iter()
                        .chain(for_stmt.step.as_mut())
                    {
                        let ty = self.type_expr(bound);
                        if !ty.is_error() && !ty.is_dimensionless_numeric() {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                bound.span,
                                format!("loop bound must be a plain number, found {}", ty),
                            );
                        }
                    }
                    self.check_stmts(&mut for_stmt.body);
                }
            }
        }
    }

    /// Check that `value` can initialize or be assigned to a target of
    /// type `target`, inserting a scale conversion where needed.
    fn unify_assignment(&mut self, target: PhysicalType, value: &mut Expr) {
        let value_ty = value.type_or_error();
        if target.is_error() || value_ty.is_error() {
            return;
        }

        match (target.base, value_ty.base) {
            (TypeBase::Real | TypeBase::Integer, TypeBase::Real | TypeBase::Integer) => {
                if target.unit.dims != value_ty.unit.dims {
                    self.error(
                        DiagnosticKind::UnitMismatch,
                        value.span,
                        format!("cannot assign {} to {}", value_ty, target),
                    );
                    return;
                }
                if target.base == TypeBase::Integer && value_ty.base == TypeBase::Real {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        value.span,
                        "cannot assign real to integer".to_string(),
                    );
                    return;
                }
                let factor = value_ty.unit.factor_to(&target.unit);
                if (factor - 1.0).abs() > 1e-12 {
                    value.conversion_factor = Some(factor);
                }
            }
            (a, b) if a == b => {}
            _ => {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    value.span,
                    format!("cannot assign {} to {}", value_ty, target),
                );
            }
        }
    }

    /// Decorate an expression bottom-up and return its type.
    fn type_expr(&mut self, expr: &mut Expr) -> PhysicalType {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Literal { value, unit } => match unit {
                None => match value {
                    LiteralValue::Integer(_) => PhysicalType::INTEGER,
                    LiteralValue::Float(_) => PhysicalType::REAL,
                },
                Some(name) => match resolve_unit_name(name) {
                    Some(unit) => PhysicalType::real(unit),
                    None => {
                        self.error(
                            DiagnosticKind::InvalidUnit,
                            span,
                            format!("unknown unit symbol '{}'", name),
                        );
                        PhysicalType::ERROR
                    }
                },
            },
            ExprKind::BoolLiteral(_) => PhysicalType::BOOLEAN,
            ExprKind::StringLiteral(_) => PhysicalType::STRING,
            ExprKind::Variable {
                name,
                order,
                symbol,
            } => match symbol {
                Some(id) => {
                    let symbol = self.table.symbol(*id);
                    if *order > 0 && symbol.name == *name {
                        // Resolved to the base variable: unit of the n-th
                        // derivative is the base unit over time^n.
                        if symbol.ty.is_numeric() {
                            PhysicalType::real(derived_unit(symbol.ty.unit, *order))
                        } else {
                            symbol.ty
                        }
                    } else {
                        symbol.ty
                    }
                }
                // Unresolved references were already reported.
                None => PhysicalType::ERROR,
            },
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_ty = self.type_expr(operand);
                if operand_ty.is_error() {
                    PhysicalType::ERROR
                } else {
                    match op {
                        UnaryOp::Neg | UnaryOp::Pos => {
                            if operand_ty.is_numeric() {
                                operand_ty
                            } else {
                                self.error(
                                    DiagnosticKind::TypeMismatch,
                                    span,
                                    format!("unary sign needs a numeric operand, found {}", operand_ty),
                                );
                                PhysicalType::ERROR
                            }
                        }
                        UnaryOp::Not => {
                            if operand_ty.base == TypeBase::Boolean {
                                PhysicalType::BOOLEAN
                            } else {
                                self.error(
                                    DiagnosticKind::TypeMismatch,
                                    span,
                                    format!("'not' needs a boolean operand, found {}", operand_ty),
                                );
                                PhysicalType::ERROR
                            }
                        }
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let left_ty = self.type_expr(left);
                let right_ty = self.type_expr(right);
                self.type_binary(op, left_ty, right_ty, left, right, span)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond_ty = self.type_expr(condition);
                if !cond_ty.is_error() && cond_ty.base != TypeBase::Boolean {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        condition.span,
                        format!("condition must be boolean, found {}", cond_ty),
                    );
                }
                let then_ty = self.type_expr(then_expr);
                let else_ty = self.type_expr(else_expr);
                if then_ty.is_error() || else_ty.is_error() {
                    PhysicalType::ERROR
                } else if then_ty.is_numeric()
                    && else_ty.is_numeric()
                    && then_ty.unit.dims == else_ty.unit.dims
                {
                    let factor = else_ty.unit.factor_to(&then_ty.unit);
                    if (factor - 1.0).abs() > 1e-12 {
                        else_expr.conversion_factor = Some(factor);
                    }
                    PhysicalType {
                        base: then_ty.promoted_base(&else_ty),
                        unit: then_ty.unit,
                    }
                } else if then_ty.base == else_ty.base && !then_ty.is_numeric() {
                    then_ty
                } else {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("conditional branches disagree: {} vs {}", then_ty, else_ty),
                    );
                    PhysicalType::ERROR
                }
            }
            ExprKind::Call { name, args } => {
                let name = name.clone();
                for arg in args.iter_mut() {
                    self.type_expr(arg);
                }
                self.type_call(&name, args, span)
            }
        };

        expr.ty = Some(ty);
        ty
    }

    fn type_binary(
        &mut self,
        op: BinaryOp,
        left_ty: PhysicalType,
        right_ty: PhysicalType,
        _left: &mut Expr,
        right: &mut Expr,
        span: Span,
    ) -> PhysicalType {
        if left_ty.is_error() || right_ty.is_error() {
            return PhysicalType::ERROR;
        }

        match op {
            BinaryOp::Add | BinaryOp::Sub => {
                if !left_ty.is_numeric() || !right_ty.is_numeric() {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("'{}' needs numeric operands: {} vs {}", op.symbol(), left_ty, right_ty),
                    );
                    return PhysicalType::ERROR;
                }
                if left_ty.unit.dims != right_ty.unit.dims {
                    self.error(
                        DiagnosticKind::UnitMismatch,
                        span,
                        format!(
                            "'{}' on incompatible units: {} vs {}",
                            op.symbol(),
                            left_ty,
                            right_ty
                        ),
                    );
                    return PhysicalType::ERROR;
                }
                let factor = right_ty.unit.factor_to(&left_ty.unit);
                if (factor - 1.0).abs() > 1e-12 {
                    right.conversion_factor = Some(factor);
                }
                PhysicalType {
                    base: left_ty.promoted_base(&right_ty),
                    unit: left_ty.unit,
                }
            }
            BinaryOp::Mul | BinaryOp::Div => {
                if !left_ty.is_numeric() || !right_ty.is_numeric() {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("'{}' needs numeric operands: {} vs {}", op.symbol(), left_ty, right_ty),
                    );
                    return PhysicalType::ERROR;
                }
                let unit = if op == BinaryOp::Mul {
                    left_ty.unit.multiply(&right_ty.unit)
                } else {
                    left_ty.unit.divide(&right_ty.unit)
                };
                PhysicalType {
                    base: left_ty.promoted_base(&right_ty),
                    unit,
                }
            }
            BinaryOp::Mod => {
                if left_ty.base == TypeBase::Integer
                    && right_ty.base == TypeBase::Integer
                    && left_ty.unit.dims.is_none()
                    && right_ty.unit.dims.is_none()
                {
                    PhysicalType::INTEGER
                } else {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("'%' needs plain integers: {} vs {}", left_ty, right_ty),
                    );
                    PhysicalType::ERROR
                }
            }
            BinaryOp::Pow => {
                if !left_ty.is_numeric() || !right_ty.is_numeric() {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("'**' needs numeric operands: {} vs {}", left_ty, right_ty),
                    );
                    return PhysicalType::ERROR;
                }
                if !right_ty.unit.dims.is_none() {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("exponent cannot carry a unit, found {}", right_ty),
                    );
                    return PhysicalType::ERROR;
                }

                if left_ty.unit.dims.is_none() {
                    let both_integer = left_ty.base == TypeBase::Integer
                        && right_ty.base == TypeBase::Integer;
                    if both_integer {
                        PhysicalType::INTEGER
                    } else {
                        PhysicalType::REAL
                    }
                } else {
                    // A dimensioned base needs a constant integer exponent
                    // so the result unit is known at compile time.
                    match const_int(right) {
                        Some(exponent) => {
                            PhysicalType::real(left_ty.unit.powi(exponent as i32))
                        }
                        None => {
                            self.error(
                                DiagnosticKind::NonIntegerExponent,
                                span,
                                format!(
                                    "power of a dimensioned base [{}] needs a constant integer exponent",
                                    left_ty.unit
                                ),
                            );
                            PhysicalType::ERROR
                        }
                    }
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
                if left_ty.is_numeric() && right_ty.is_numeric() {
                    if left_ty.unit.dims != right_ty.unit.dims {
                        self.error(
                            DiagnosticKind::UnitMismatch,
                            span,
                            format!(
                                "comparison of incompatible units: {} vs {}",
                                left_ty, right_ty
                            ),
                        );
                        return PhysicalType::ERROR;
                    }
                    PhysicalType::BOOLEAN
                } else if left_ty.base == right_ty.base
                    && matches!(op, BinaryOp::Eq | BinaryOp::Ne)
                {
                    PhysicalType::BOOLEAN
                } else {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("cannot compare {} with {}", left_ty, right_ty),
                    );
                    PhysicalType::ERROR
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                if left_ty.base == TypeBase::Boolean && right_ty.base == TypeBase::Boolean {
                    PhysicalType::BOOLEAN
                } else {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!(
                            "'{}' needs boolean operands: {} vs {}",
                            op.symbol(),
                            left_ty,
                            right_ty
                        ),
                    );
                    PhysicalType::ERROR
                }
            }
        }
    }

    fn type_call(&mut self, name: &str, args: &mut [Expr], span: Span) -> PhysicalType {
        if let Some(builtin) = Builtin::lookup(name) {
            return self.type_builtin(builtin, args, span);
        }

        // User-defined function
        let Some(id) = self.table.lookup(self.scope, name) else {
            // Unknown call, already reported during name resolution.
            return PhysicalType::ERROR;
        };
        let symbol = self.table.symbol(id);
        if symbol.kind != SymbolKind::Function {
            self.error(
                DiagnosticKind::BadCall,
                span,
                format!("'{}' is not a function", name),
            );
            return PhysicalType::ERROR;
        }
        let params = symbol.params.clone();
        let return_ty = symbol.ty;

        if args.len() != params.len() {
            self.error(
                DiagnosticKind::BadCall,
                span,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    name,
                    params.len(),
                    args.len()
                ),
            );
            return PhysicalType::ERROR;
        }

        for (arg, param) in args.iter_mut().zip(params) {
            self.unify_assignment(param, arg);
        }

        return_ty
    }

    fn type_builtin(&mut self, builtin: Builtin, args: &mut [Expr], span: Span) -> PhysicalType {
        if args.len() != builtin.arity() {
            self.error(
                DiagnosticKind::BadCall,
                span,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    builtin.name(),
                    builtin.arity(),
                    args.len()
                ),
            );
            return PhysicalType::ERROR;
        }
        if args.iter().any(|a| a.type_or_error().is_error()) {
            return PhysicalType::ERROR;
        }

        let arg_types: Vec<PhysicalType> = args.iter().map(|a| a.type_or_error()).collect();
        let arg_ty = |i: usize| arg_types[i];

        match builtin {
            Builtin::Exp
            | Builtin::Ln
            | Builtin::Log10
            | Builtin::Sin
            | Builtin::Cos
            | Builtin::Tan => {
                let ty = arg_ty(0);
                if !ty.is_dimensionless_numeric() {
                    self.error(
                        DiagnosticKind::UnitMismatch,
                        args[0].span,
                        format!(
                            "'{}' needs a dimensionless argument, found {}",
                            builtin.name(),
                            ty
                        ),
                    );
                    return PhysicalType::ERROR;
                }
                PhysicalType::REAL
            }
            Builtin::Sqrt => {
                let ty = arg_ty(0);
                if !ty.is_numeric() {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        args[0].span,
                        format!("'sqrt' needs a numeric argument, found {}", ty),
                    );
                    return PhysicalType::ERROR;
                }
                PhysicalType::real(ty.unit.pow(Rational::new(1, 2)))
            }
            Builtin::Abs => {
                let ty = arg_ty(0);
                if !ty.is_numeric() {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        args[0].span,
                        format!("'abs' needs a numeric argument, found {}", ty),
                    );
                    return PhysicalType::ERROR;
                }
                ty
            }
            Builtin::Min | Builtin::Max | Builtin::RandomNormal | Builtin::RandomUniform => {
                let (a, b) = (arg_ty(0), arg_ty(1));
                if !a.is_numeric() || !b.is_numeric() || a.unit.dims != b.unit.dims {
                    self.error(
                        DiagnosticKind::UnitMismatch,
                        span,
                        format!(
                            "'{}' needs two arguments of the same dimension: {} vs {}",
                            builtin.name(),
                            a,
                            b
                        ),
                    );
                    return PhysicalType::ERROR;
                }
                let factor = b.unit.factor_to(&a.unit);
                if (factor - 1.0).abs() > 1e-12 {
                    args[1].conversion_factor = Some(factor);
                }
                PhysicalType {
                    base: if matches!(builtin, Builtin::Min | Builtin::Max) {
                        a.promoted_base(&b)
                    } else {
                        TypeBase::Real
                    },
                    unit: a.unit,
                }
            }
            Builtin::Steps => {
                let ty = arg_ty(0);
                if ty.unit.dims != nestml_ast::Dimensions::TIME {
                    self.error(
                        DiagnosticKind::UnitMismatch,
                        args[0].span,
                        format!("'steps' needs a time argument, found {}", ty),
                    );
                    return PhysicalType::ERROR;
                }
                PhysicalType::INTEGER
            }
            Builtin::Resolution => {
                let ms = resolve_unit_name("ms").expect("ms is a known unit");
                PhysicalType::real(ms)
            }
            Builtin::EmitSpike | Builtin::IntegrateOdes => PhysicalType::VOID,
            Builtin::Delta => {
                let ty = arg_ty(0);
                if ty.unit.dims != nestml_ast::Dimensions::TIME {
                    self.error(
                        DiagnosticKind::UnitMismatch,
                        args[0].span,
                        format!("'delta' needs a time argument, found {}", ty),
                    );
                    return PhysicalType::ERROR;
                }
                PhysicalType::real(Unit::NONE.divide(&ty.unit))
            }
            Builtin::Convolve => {
                // Kind checking is a context condition; here the call is
                // opaque but unit-annotated: shape unit times port unit.
                let (a, b) = (arg_ty(0), arg_ty(1));
                if !a.is_numeric() || !b.is_numeric() {
                    self.error(
                        DiagnosticKind::BadCall,
                        span,
                        format!("'convolve' needs numeric arguments: {} vs {}", a, b),
                    );
                    return PhysicalType::ERROR;
                }
                PhysicalType::real(a.unit.multiply(&b.unit))
            }
        }
    }
}

/// Unit of the n-th time derivative of a quantity.
fn derived_unit(base: Unit, order: u32) -> Unit {
    let mut unit = base;
    for _ in 0..order {
        unit = unit.divide(&Unit::coherent(nestml_ast::Dimensions::TIME));
    }
    unit
}

/// Evaluate a constant integer expression (`2`, `-3`).
fn const_int(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal {
            value: LiteralValue::Integer(n),
            unit: None,
        } => Some(*n),
        ExprKind::Unary { op, operand } => {
            let inner = const_int(operand)?;
            match op {
                UnaryOp::Neg => Some(-inner),
                UnaryOp::Pos => Some(inner),
                UnaryOp::Not => None,
            }
        }
        _ => None,
    }
}

/// True if any subexpression is a `convolve(...)` call.
pub fn contains_convolve(expr: &Expr) -> bool {
    let mut found = false;
    expr.walk(&mut |e| {
        if e.is_call_to("convolve") {
            found = true;
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::build_symbol_table;
    use nestml_lexer::lex_with_spans;
    use nestml_parser::parse_compilation_unit;
    use std::path::Path;

    fn check(source: &str) -> (CompilationUnit, Diagnostics) {
        let (tokens, _) = lex_with_spans(source);
        let (mut unit, errors) =
            parse_compilation_unit(&tokens, 0, Path::new("test.nestml"), None);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut diags = Diagnostics::new();
        let mut table = build_symbol_table(&mut unit, &mut diags);
        check_types(&mut unit, &mut table, &mut diags);
        (unit, diags)
    }

    fn error_kinds(diags: &Diagnostics) -> Vec<DiagnosticKind> {
        diags
            .entries()
            .iter()
            .filter(|d| d.severity >= nestml_ast::Severity::Error)
            .map(|d| d.kind)
            .collect()
    }

    #[test]
    fn accepts_matching_units() {
        let (_, diags) = check(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  update:\n    V_m = V_m + 1 mV\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn rejects_unit_mismatch_in_initializer() {
        let (_, diags) = check("neuron n:\n  state:\n    V_m mV = 0 pA\n  end\nend");
        assert_eq!(error_kinds(&diags), vec![DiagnosticKind::UnitMismatch]);
        // The message names both canonical units
        let message = &diags.entries()[0].message;
        assert!(message.contains("real ["), "{}", message);
    }

    #[test]
    fn scale_conversion_is_recorded() {
        let (unit, diags) = check(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  update:\n    V_m = V_m + 1 V\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());

        // The V literal inside `V_m + 1 V` carries a conversion to mV
        let update = &unit.neurons[0].update_blocks[0];
        let Stmt::Assignment { rhs, .. } = &update.statements[0] else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { right, .. } = &rhs.kind else {
            panic!("expected binary rhs");
        };
        let factor = right.conversion_factor.expect("conversion recorded");
        assert!((factor - 1e3).abs() < 1e-6, "factor = {}", factor);
    }

    #[test]
    fn error_does_not_cascade() {
        // One bad initializer must produce exactly one error even though
        // the bad subexpression is nested in further arithmetic.
        let (_, diags) = check(
            "neuron n:\n  parameters:\n    a mV = (1 pA + 2 mV) * 3 + 4 mV\n  end\nend",
        );
        assert_eq!(error_kinds(&diags).len(), 1);
    }

    #[test]
    fn integer_promotes_to_real() {
        let (_, diags) = check(
            "neuron n:\n  parameters:\n    a real = 2\n    b real = 2 * a\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn power_of_dimensioned_base_needs_const_exponent() {
        let (_, diags) = check(
            "neuron n:\n  parameters:\n    n_exp integer = 2\n    a mV**2 = (1 mV) ** n_exp\n  end\nend",
        );
        assert!(error_kinds(&diags).contains(&DiagnosticKind::NonIntegerExponent));

        let (_, diags) = check(
            "neuron n:\n  parameters:\n    a mV**2 = (1 mV) ** 2\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn exp_requires_dimensionless() {
        let (_, diags) = check(
            "neuron n:\n  parameters:\n    a real = exp(1 ms)\n  end\nend",
        );
        assert!(error_kinds(&diags).contains(&DiagnosticKind::UnitMismatch));
    }

    #[test]
    fn steps_returns_integer() {
        let (_, diags) = check(
            "neuron n:\n  internals:\n    ticks integer = steps(10 ms)\n  end\n  update:\n    x integer = ticks\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn sqrt_halves_dimensions() {
        let (_, diags) = check(
            "neuron n:\n  parameters:\n    a mV = sqrt((2 mV) ** 2)\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn comparison_requires_same_dims() {
        let (_, diags) = check(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  update:\n    if V_m > 1 pA:\n      V_m = 0 mV\n    end\n  end\nend",
        );
        assert!(error_kinds(&diags).contains(&DiagnosticKind::UnitMismatch));
    }

    #[test]
    fn user_function_call_checked() {
        let source = r#"
neuron n:
  update:
    x mV = clamp(1 mV)
  end
  function clamp(v mV) mV:
    return v
  end
end
"#;
        let (_, diags) = check(source);
        assert!(!diags.has_errors(), "{:?}", diags.entries());

        let bad = r#"
neuron n:
  update:
    x mV = clamp(1 mV, 2 mV)
  end
  function clamp(v mV) mV:
    return v
  end
end
"#;
        let (_, diags) = check(bad);
        assert!(error_kinds(&diags).contains(&DiagnosticKind::BadCall));
    }

    #[test]
    fn ode_dimension_check() {
        // V_m' must be [V/s]; tau in ms makes -V_m/tau match
        let ok = "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  parameters:\n    tau ms = 10 ms\n  end\n  equations:\n    V_m' = -V_m / tau\n  end\nend";
        let (_, diags) = check(ok);
        assert!(!diags.has_errors(), "{:?}", diags.entries());

        let bad = "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  equations:\n    V_m' = V_m\n  end\nend";
        let (_, diags) = check(bad);
        assert!(error_kinds(&diags).contains(&DiagnosticKind::UnitMismatch));
    }

    #[test]
    fn convolve_is_unit_annotated_but_exempt_in_odes() {
        let source = r#"
neuron n:
  state:
    V_m mV = 0 mV
  end
  parameters:
    C_m pF = 250 pF
    tau ms = 10 ms
  end
  equations:
    shape g_ex = exp(-t / tau)
    V_m' = -V_m / tau + convolve(g_ex, spikes) * (V_m - 0 mV) / C_m
  end
  input:
    spikes nS <- excitatory spike
  end
end
"#;
        let (_, diags) = check(source);
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }
}
