//! Declarations, blocks, neurons, and compilation units.
//!
//! One `.nestml` file parses into one [`CompilationUnit`] holding one or
//! more [`Neuron`]s. Block lists keep every occurrence the parser saw —
//! the context conditions report duplicates, so the parser never drops
//! them silently.

use crate::expr::Expr;
use crate::span::Span;
use crate::types::PhysicalType;
use crate::ScopeId;
use serde::{Deserialize, Serialize};

/// One parsed source file: a package qualifier, an artifact name derived
/// from the file path, and the neurons declared inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Dotted package path relative to the model root (may be empty)
    pub package_name: String,
    /// Source file stem
    pub artifact_name: String,
    pub neurons: Vec<Neuron>,
    pub span: Span,
}

/// A neuron model declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    pub name: String,
    pub state_blocks: Vec<DeclBlock>,
    pub initial_blocks: Vec<DeclBlock>,
    pub parameter_blocks: Vec<DeclBlock>,
    pub internal_blocks: Vec<DeclBlock>,
    pub equations_blocks: Vec<EquationsBlock>,
    pub input_blocks: Vec<InputBlock>,
    pub output_blocks: Vec<OutputBlock>,
    pub update_blocks: Vec<UpdateBlock>,
    pub functions: Vec<FunctionDef>,
    /// Per-spike state increments generated by the ODE analysis
    pub spike_updates: Vec<SpikeUpdate>,
    /// Scope installed by symbol table construction
    pub scope: Option<ScopeId>,
    pub span: Span,
}

impl Neuron {
    pub fn new(name: String, span: Span) -> Self {
        Self {
            name,
            state_blocks: Vec::new(),
            initial_blocks: Vec::new(),
            parameter_blocks: Vec::new(),
            internal_blocks: Vec::new(),
            equations_blocks: Vec::new(),
            input_blocks: Vec::new(),
            output_blocks: Vec::new(),
            update_blocks: Vec::new(),
            functions: Vec::new(),
            spike_updates: Vec::new(),
            scope: None,
            span,
        }
    }

    /// All declarations across state, initial_values, parameters, and
    /// internals blocks, paired with their block kind.
    pub fn declarations(&self) -> impl Iterator<Item = (BlockKind, &Declaration)> {
        fn tag<'a>(
            kind: BlockKind,
            blocks: &'a [DeclBlock],
        ) -> impl Iterator<Item = (BlockKind, &'a Declaration)> + 'a {
            blocks
                .iter()
                .flat_map(|b| b.declarations.iter())
                .map(move |d| (kind, d))
        }
        tag(BlockKind::State, &self.state_blocks)
            .chain(tag(BlockKind::InitialValues, &self.initial_blocks))
            .chain(tag(BlockKind::Parameters, &self.parameter_blocks))
            .chain(tag(BlockKind::Internals, &self.internal_blocks))
    }

    /// All equations across equations blocks.
    pub fn equations(&self) -> impl Iterator<Item = &Equation> {
        self.equations_blocks.iter().flat_map(|b| b.equations.iter())
    }

    /// All input ports across input blocks.
    pub fn input_ports(&self) -> impl Iterator<Item = &InputPort> {
        self.input_blocks.iter().flat_map(|b| b.ports.iter())
    }

    /// True if a declaration with this name exists in `state` or
    /// `initial_values`.
    pub fn declares_state_variable(&self, name: &str) -> bool {
        self.state_blocks
            .iter()
            .chain(self.initial_blocks.iter())
            .flat_map(|b| b.declarations.iter())
            .any(|d| d.names.iter().any(|n| n == name))
    }
}

/// Which declaration block a declaration lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    State,
    InitialValues,
    Parameters,
    Internals,
    /// Local declarations inside update or function bodies
    Local,
}

impl BlockKind {
    /// Forward references within the same block are legal only in
    /// `parameters` and `initial_values`.
    pub fn allows_forward_references(&self) -> bool {
        matches!(self, BlockKind::Parameters | BlockKind::InitialValues)
    }
}

/// One `state:`/`initial_values:`/`parameters:`/`internals:` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclBlock {
    pub kind: BlockKind,
    pub declarations: Vec<Declaration>,
    pub span: Span,
}

/// A variable declaration: one or more names, a datatype, an optional
/// initializer, and flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub names: Vec<String>,
    pub datatype: DataTypeExpr,
    pub initializer: Option<Expr>,
    /// Exposed to recording backends
    pub recordable: bool,
    /// `function` alias: recomputed on reference, never stored
    pub is_alias: bool,
    /// Resolved datatype, set during symbol table construction
    pub ty: Option<PhysicalType>,
    pub span: Span,
}

/// A datatype as written in source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataTypeExpr {
    Real,
    Integer,
    Boolean,
    String,
    Void,
    Unit(UnitExpr),
}

/// A physical unit expression as written in source (`mV`, `nS/ms`,
/// `1/ms`, `mV**2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitExpr {
    /// A unit symbol (`mV`, `ms`, `nS`)
    Base(String),
    /// The literal `1` numerator in forms like `1/ms`
    One,
    Multiply(Box<UnitExpr>, Box<UnitExpr>),
    Divide(Box<UnitExpr>, Box<UnitExpr>),
    Power(Box<UnitExpr>, i32),
}

/// One `equations:` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationsBlock {
    pub equations: Vec<Equation>,
    pub span: Span,
}

/// An entry of the equations block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Equation {
    /// `shape g = expr` / `shape g' = expr`
    Shape(OdeShape),
    /// `V_m' = expr` — an ODE over a state variable
    Ode(OdeEquation),
    /// `function h ms = expr` — alias, inlined during analysis
    Alias(Declaration),
    /// Discrete-step update rule produced by the ODE analysis; replaces
    /// shapes and convolve calls after a successful analytic solve
    UpdateStep {
        variable: String,
        rhs: Expr,
        span: Span,
    },
}

/// A `shape` definition. `order == 0` is a direct (closed-form) shape or
/// a delta pulse; `order >= 1` is ODE-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeShape {
    pub name: String,
    pub order: u32,
    pub rhs: Expr,
    pub span: Span,
}

/// An ODE row `x' = rhs` (order counted from the primes on the LHS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeEquation {
    pub name: String,
    pub order: u32,
    pub rhs: Expr,
    pub span: Span,
}

/// One `input:` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBlock {
    pub ports: Vec<InputPort>,
    pub span: Span,
}

/// An input port declaration.
///
/// The datatype is optional for spike ports; the checker infers
/// conductance or current from use sites when it is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPort {
    pub name: String,
    pub datatype: Option<DataTypeExpr>,
    pub kind: PortKind,
    /// Resolved port type, set during symbol table construction
    pub ty: Option<PhysicalType>,
    pub span: Span,
}

/// Input port kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    Spike { inhibitory: bool, excitatory: bool },
    Current,
}

impl PortKind {
    pub fn is_spike(&self) -> bool {
        matches!(self, PortKind::Spike { .. })
    }
}

/// The `output: spike` block. Spike output is the only kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBlock {
    pub span: Span,
}

/// The `update:` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBlock {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// A user-defined function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<(String, DataTypeExpr)>,
    pub return_type: Option<DataTypeExpr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Statements of update and function bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Local variable declaration
    Declaration(Declaration),
    /// Assignment. Compound forms (`+=` etc.) are desugared by the parser
    /// into the plain form with a binary RHS.
    Assignment { lhs: Expr, rhs: Expr, span: Span },
    /// Expression statement (function call)
    Expr(Expr),
    /// `return [expr]`
    Return { value: Option<Expr>, span: Span },
    If(IfStmt),
    For(ForStmt),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Declaration(d) => d.span,
            Stmt::Assignment { span, .. } => *span,
            Stmt::Expr(e) => e.span,
            Stmt::Return { span, .. } => *span,
            Stmt::If(s) => s.span,
            Stmt::For(s) => s.span,
        }
    }
}

/// `if`/`elif`/`else` chain. Each branch pairs a condition with its body;
/// the final `else` body has no condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub branches: Vec<(Expr, Vec<Stmt>)>,
    pub else_branch: Option<Vec<Stmt>>,
    pub span: Span,
}

/// `for x in a ... b [step s]:` loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStmt {
    pub variable: String,
    pub from: Expr,
    pub to: Expr,
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A per-spike jump generated by the ODE analysis: on arrival of a spike
/// at `port`, `variable` is incremented by `increment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeUpdate {
    pub variable: String,
    pub port: String,
    pub increment: Expr,
}
