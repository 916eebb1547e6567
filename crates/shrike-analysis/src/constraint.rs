//! Method-level class-inlining constraints.
//!
//! [`ClassInlinerConstraintAnalysis`] runs the parameter-usage dataflow over
//! one method and condenses the result into a
//! [`ClassInlinerMethodConstraint`]: a persistable summary of whether calls
//! to the method block class inlining of their arguments, and under which
//! conditions.

use crate::solver::IntraproceduralSolver;
use crate::state::{ExternalParameterUsages, LatticeMap, ParameterUsages};
use crate::transfer::UsageTransferFunction;
use serde::{Deserialize, Serialize};
use shrike_ir::{AppView, IrCode, MethodRef};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// The effect one method has on class inlining of the values passed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassInlinerMethodConstraint {
    /// No argument usage blocks class inlining.
    AlwaysTrue,
    /// Calls to this method block class inlining of every argument.
    AlwaysFalse,
    /// Per-parameter, per-context conditions a caller must check.
    Conditional(ExternalParameterUsages),
}

impl ClassInlinerMethodConstraint {
    /// The conservative constraint for methods without an analysis result.
    pub fn default_constraint() -> Self {
        ClassInlinerMethodConstraint::AlwaysFalse
    }
}

/// Computes the [`ClassInlinerMethodConstraint`] of a single method.
pub struct ClassInlinerConstraintAnalysis<'a> {
    app_view: &'a AppView,
}

impl<'a> ClassInlinerConstraintAnalysis<'a> {
    pub fn new(app_view: &'a AppView) -> Self {
        ClassInlinerConstraintAnalysis { app_view }
    }

    /// Analyze `code` and condense the fixed point into a constraint.
    ///
    /// Class initializers and methods without arguments never receive an
    /// instance to inline, and a failed or diverged dataflow degrades to the
    /// conservative constraint.
    pub fn analyze(&self, code: &IrCode) -> ClassInlinerMethodConstraint {
        let method = code.method();
        if method.is_class_initializer() || method.argument_count() == 0 {
            return ClassInlinerMethodConstraint::AlwaysFalse;
        }

        let mut transfer = UsageTransferFunction::new(self.app_view, code);
        let result = match IntraproceduralSolver::new().solve(
            code,
            &mut transfer,
            ParameterUsages::Bottom,
        ) {
            Ok(result) => result,
            Err(error) => {
                debug!(method = %method.reference(), %error, "analysis gave up");
                return ClassInlinerMethodConstraint::AlwaysFalse;
            }
        };

        let exit_state = result.join_terminal_states(code.cfg());
        let external = exit_state.externalize(code);
        match external {
            LatticeMap::Bottom => ClassInlinerMethodConstraint::AlwaysTrue,
            LatticeMap::Top => ClassInlinerMethodConstraint::AlwaysFalse,
            known => {
                debug!(
                    method = %method.reference(),
                    parameters = known.len(),
                    "conditional class inlining constraint"
                );
                ClassInlinerMethodConstraint::Conditional(known)
            }
        }
    }
}

/// Write-once store of the constraints computed for a compilation unit.
///
/// Shared across analysis workers; reads of unanalyzed methods fall back to
/// the conservative constraint.
#[derive(Debug, Default)]
pub struct ConstraintStore {
    constraints: RwLock<HashMap<MethodRef, ClassInlinerMethodConstraint>>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        ConstraintStore::default()
    }

    /// Record the constraint of `method`. The first write wins; a method is
    /// analyzed at most once per compilation.
    pub fn record(&self, method: MethodRef, constraint: ClassInlinerMethodConstraint) {
        let mut constraints = self
            .constraints
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = constraints.insert(method, constraint);
        debug_assert!(previous.is_none(), "constraint recorded twice");
    }

    /// The recorded constraint, or the conservative default.
    pub fn get(&self, method: &MethodRef) -> ClassInlinerMethodConstraint {
        let constraints = self
            .constraints
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        constraints
            .get(method)
            .cloned()
            .unwrap_or_else(ClassInlinerMethodConstraint::default_constraint)
    }

    pub fn len(&self) -> usize {
        self.constraints
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
