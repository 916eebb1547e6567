//! Intraprocedural dataflow analyses for the Shrike bytecode optimizer.
//!
//! The central analysis decides, per method, whether each object parameter is
//! a candidate for class inlining (scalar replacement of the object's fields
//! at call sites). It is a forward abstract interpretation:
//! - a lattice of usage facts per parameter ([`lattice`])
//! - a per-context and per-parameter map structure ([`state`])
//! - a transfer function per IR instruction ([`transfer`])
//! - a worklist fixed-point solver over the CFG ([`solver`])
//! - an orchestrator producing a persisted call-site constraint
//!   ([`constraint`])

pub mod constraint;
pub mod context;
pub mod lattice;
pub mod solver;
pub mod state;
pub mod transfer;

pub use constraint::{ClassInlinerConstraintAnalysis, ClassInlinerMethodConstraint, ConstraintStore};
pub use context::AnalysisContext;
pub use lattice::{ExternalParameterUsage, ExternalUsageFacts, ParameterUsage, UsageFacts};
pub use solver::{DataflowResult, IntraproceduralSolver, SolveError, TransferFunction, TransferResult};
pub use state::{
    ExternalParameterUsagePerContext, ExternalParameterUsages, JoinLattice, LatticeMap,
    ParameterUsagePerContext, ParameterUsages,
};
pub use transfer::UsageTransferFunction;
