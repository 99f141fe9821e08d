//! Semantic analysis for NESTML: symbol tables, unit-aware type
//! checking, context conditions, equations canonicalization, and the
//! external ODE solver driver, orchestrated per compilation unit.
//!
//! The analysis mutates the AST in place: symbol resolution fills symbol
//! slots, type checking fills types and conversion factors, and a
//! successful analytic solve replaces shapes and `convolve` calls with
//! generated state variables and explicit update rules.

pub mod builtins;
pub mod cocos;
pub mod equations;
pub mod pipeline;
pub mod solver;
pub mod symbols;
pub mod transform;
pub mod typing;

pub use cocos::{check_context_conditions, CoCoOptions};
pub use equations::{collect_ode_system, ConvolveUse, OdeSystem, ShapeForm, ShapeInfo, StateOde};
pub use pipeline::{process_unit, CompileSummary, NeuronOutcome, PipelineOptions};
pub use solver::{
    build_request, SolverCommand, SolverFailure, SolverKind, SolverReply, SolverRequest,
    SolverStatus, SolverTransport,
};
pub use symbols::{build_symbol_table, Symbol, SymbolKind, SymbolTable};
pub use transform::{fold_analytic_reply, has_unsolved_kernels, FoldOutcome};
pub use typing::check_types;
