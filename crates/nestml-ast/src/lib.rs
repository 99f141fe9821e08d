//! Core data model of the NESTML compiler front-end.
//!
//! This crate holds everything the pipeline phases share:
//!
//! - [`span`] — compact source locations and the [`span::SourceMap`]
//! - [`rational`] — exact rational arithmetic for dimensional exponents
//! - [`unit`] — SI dimension vectors, scales, and the unit symbol table
//! - [`types`] — [`types::PhysicalType`], the unit-aware type attached to
//!   every expression after type checking
//! - [`expr`] / [`model`] — the AST produced by the parser and decorated
//!   in place by the later phases
//! - [`printer`] — pretty-printing, also used to serialize expressions
//!   for the external ODE solver
//! - [`diagnostics`] — structured diagnostics and their formatter

pub mod diagnostics;
pub mod expr;
pub mod model;
pub mod printer;
pub mod rational;
pub mod span;
pub mod types;
pub mod unit;

pub use diagnostics::{Diagnostic, DiagnosticFormatter, DiagnosticKind, Diagnostics, Severity};
pub use expr::{BinaryOp, Expr, ExprKind, LiteralValue, UnaryOp};
pub use model::{
    BlockKind, CompilationUnit, DataTypeExpr, DeclBlock, Declaration, Equation, EquationsBlock,
    ForStmt, FunctionDef, IfStmt, InputBlock, InputPort, Neuron, OdeEquation, OdeShape, OutputBlock,
    PortKind, SpikeUpdate, Stmt, UnitExpr, UpdateBlock,
};
pub use rational::Rational;
pub use span::{SourceFile, SourceMap, Span};
pub use types::{PhysicalType, TypeBase};
pub use unit::{Dimensions, Unit};

/// Identifier of a symbol in the per-unit symbol table.
///
/// Defined here so AST nodes can carry resolved symbol references without
/// depending on the analysis crate that owns the table itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SymbolId(pub u32);

/// Identifier of a scope in the per-unit scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScopeId(pub u32);
