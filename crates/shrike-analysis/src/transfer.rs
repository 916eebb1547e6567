//! Per-instruction transfer function of the parameter-usage analysis.
//!
//! Decides, instruction by instruction, how each object-typed parameter is
//! used. Most instructions are irrelevant: only the users (through
//! `Assume`/`CheckCast` aliases) of the tracked arguments can affect the
//! outcome, so everything else passes the state through untouched.
//!
//! The rules per instruction kind:
//! - `If` zero/null tests are transparent; other comparisons abandon their
//!   tracked inputs.
//! - `InstanceGet` records a field read when the field resolves uniquely.
//! - `InstancePut` abandons a tracked value being stored and records a
//!   mutation on a tracked receiver.
//! - `InvokeDirect` abandons tracked arguments, except for a single
//!   forwarding or parent constructor call on `this` inside an instance
//!   initializer whose callee is known not to leak the receiver.
//! - `InvokeVirtual`/`InvokeInterface` record a call with the parameter as
//!   receiver when the method resolves uniquely; tracked non-receiver
//!   arguments are abandoned.
//! - `InvokeStatic` is transparent only for `Objects.requireNonNull`.
//! - `Monitor` records lock usage, `Return` records the return.
//! - Anything else abandons all tracked operands.

use crate::lattice::ParameterUsage;
use crate::solver::{TransferFunction, TransferResult};
use crate::state::{JoinLattice, LatticeMap, ParameterUsagePerContext, ParameterUsages};
use shrike_ir::{
    AppView, ClassDef, InstrId, InstrKind, Instruction, IrCode, TypeRef, ValueId,
};
use std::collections::HashSet;
use tracing::trace;

// Context forking is not implemented yet, so a parameter's per-context map
// never grows past the default context.
const MAX_CONTEXTS: usize = 1;

/// Transfer function computing [`ParameterUsages`] for one method.
pub struct UsageTransferFunction<'a> {
    app_view: &'a AppView,
    code: &'a IrCode,
    last_argument: Option<InstrId>,
    /// The forwarding or parent constructor call, once seen. Only one such
    /// call is allowed per instance initializer.
    constructor_invoke: Option<InstrId>,
    /// Argument values (alias roots) the analysis tracks. Primitive and
    /// otherwise ineligible arguments are never added.
    arguments_of_interest: HashSet<ValueId>,
    /// Users of the tracked arguments, including users of their aliases.
    instructions_of_interest: HashSet<InstrId>,
}

impl<'a> UsageTransferFunction<'a> {
    pub fn new(app_view: &'a AppView, code: &'a IrCode) -> Self {
        UsageTransferFunction {
            app_view,
            code,
            last_argument: code.last_argument(),
            constructor_invoke: None,
            arguments_of_interest: HashSet::new(),
            instructions_of_interest: HashSet::new(),
        }
    }

    fn analyze_argument(&mut self, instruction: &Instruction, state: ParameterUsages) -> ParameterUsages {
        let index = instruction
            .argument_index()
            .unwrap_or_default();
        let Some(out) = instruction.out else {
            return state.put(index, ParameterUsagePerContext::top());
        };
        let value = self.code.value(out);

        // Only track arguments that could hold an instance eligible for
        // class inlining. Values flowing into phis cannot be tracked through
        // a single alias chain.
        if !self.is_maybe_eligible_for_class_inlining(&value.ty) || value.has_phi_users {
            return state.put(index, ParameterUsagePerContext::top());
        }

        self.arguments_of_interest.insert(out);
        self.instructions_of_interest
            .extend(self.code.aliased_users(out));
        state.put(index, ParameterUsagePerContext::create_initial())
    }

    fn analyze_assume(&self, instruction: &Instruction, state: ParameterUsages) -> ParameterUsages {
        let has_phi_users = instruction
            .out
            .is_some_and(|out| self.code.value(out).has_phi_users);
        if has_phi_users {
            self.abandon_in_values(instruction, state)
        } else {
            state
        }
    }

    fn analyze_check_cast(
        &self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        let InstrKind::CheckCast { object, ref target } = instruction.kind else {
            return state;
        };
        let has_phi_users = instruction
            .out
            .is_some_and(|out| self.code.value(out).has_phi_users);
        if has_phi_users {
            return self.abandon_in_values(instruction, state);
        }
        let target = target.clone();
        self.rebuild_value(state, object, |usage| {
            usage.add_cast_with_parameter(target.clone())
        })
    }

    fn analyze_if(&self, instruction: &Instruction, state: ParameterUsages) -> ParameterUsages {
        let InstrKind::If { lhs, rhs } = instruction.kind else {
            return state;
        };
        // Null and not-null tests do not observe the instance.
        if rhs.is_none() {
            debug_assert!(self.is_argument_of_interest(self.code.aliased_root(lhs)));
            return state;
        }
        self.abandon_in_values(instruction, state)
    }

    fn analyze_instance_get(
        &self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        let InstrKind::InstanceGet { object, ref field } = instruction.kind else {
            return state;
        };
        // Field reads are fine when the field resolves uniquely: the read
        // can later be replaced by the field's value.
        if self.app_view.resolve_field(field).is_some() {
            let field = field.clone();
            self.rebuild_value(state, object, |usage| {
                usage.add_field_read_from_parameter(field.clone())
            })
        } else {
            self.abandon_in_values(instruction, state)
        }
    }

    fn analyze_instance_put(
        &self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        let InstrKind::InstancePut {
            object,
            value,
            ref field,
        } = instruction.kind
        else {
            return state;
        };
        // A tracked value being stored into a field escapes.
        let value_root = self.code.aliased_root(value);
        let state = self.abandon_value(state, value_root);

        let object_root = self.code.aliased_root(object);
        if !self.is_argument_of_interest(object_root) {
            return state;
        }
        if self.app_view.resolve_field(field).is_some() {
            self.rebuild_value(state, object_root, |usage| usage.set_parameter_mutated())
        } else {
            self.abandon_value(state, object_root)
        }
    }

    fn analyze_invoke_direct(
        &mut self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        // Instances escaping through invoke-direct are abandoned, with one
        // exception: a forwarding or parent constructor call that does not
        // leak the receiver.
        let state = self.abandon_values(state, instruction.non_receiver_arguments());

        let Some(receiver) = instruction.receiver() else {
            return state;
        };
        let receiver_root = self.code.aliased_root(receiver);
        if !self.is_argument_of_interest(receiver_root) {
            return state;
        }

        if !self.code.value(receiver_root).is_this
            || !self.code.method().is_instance_initializer()
            || !instruction.is_constructor_invoke()
        {
            return self.abandon_value(state, receiver_root);
        }

        let Some(invoked) = instruction.invoked_method() else {
            return self.abandon_value(state, receiver_root);
        };
        let Some(resolved) = self.app_view.resolve_method(invoked) else {
            return self.abandon_value(state, receiver_root);
        };
        if resolved
            .initializer_info
            .receiver_may_escape_outside_constructor_chain
        {
            return self.abandon_value(state, receiver_root);
        }

        // Exactly one forwarding or parent constructor call is allowed.
        if self
            .constructor_invoke
            .is_some_and(|seen| seen != instruction.id)
        {
            return self.abandon_value(state, receiver_root);
        }
        self.constructor_invoke = Some(instruction.id);
        state
    }

    fn analyze_invoke_static(
        &self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        // Only Objects.requireNonNull is known not to observe the instance.
        let transparent = instruction
            .invoked_method()
            .is_some_and(|invoked| self.app_view.resolves_to_require_non_null(invoked));
        if transparent {
            state
        } else {
            self.abandon_in_values(instruction, state)
        }
    }

    fn analyze_invoke_with_receiver(
        &self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        // The parameter may only appear in receiver position.
        let state = self.abandon_values(state, instruction.non_receiver_arguments());

        let Some(receiver) = instruction.receiver() else {
            return state;
        };
        let receiver_root = self.code.aliased_root(receiver);
        if !self.is_argument_of_interest(receiver_root) {
            return state;
        }

        let resolves = instruction
            .invoked_method()
            .is_some_and(|invoked| self.app_view.resolve_method(invoked).is_some());
        if resolves {
            let call = instruction.id;
            self.rebuild_value(state, receiver_root, |usage| {
                usage.add_method_call_with_parameter_as_receiver(call)
            })
        } else {
            self.abandon_value(state, receiver_root)
        }
    }

    fn analyze_monitor(&self, instruction: &Instruction, state: ParameterUsages) -> ParameterUsages {
        let InstrKind::Monitor { object, .. } = instruction.kind else {
            return state;
        };
        self.rebuild_value(state, object, |usage| usage.set_parameter_used_as_lock())
    }

    fn analyze_return(&self, instruction: &Instruction, state: ParameterUsages) -> ParameterUsages {
        let InstrKind::Return { value: Some(value) } = instruction.kind else {
            return state;
        };
        self.rebuild_value(state, value, |usage| usage.set_parameter_returned())
    }

    /// Abandon every tracked operand of an instruction the analysis has no
    /// better rule for.
    fn abandon_in_values(
        &self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        self.abandon_values(state, &instruction.in_values())
    }

    fn abandon_values(&self, state: ParameterUsages, values: &[ValueId]) -> ParameterUsages {
        let mut state = state;
        for &value in values {
            let root = self.code.aliased_root(value);
            state = self.abandon_value(state, root);
        }
        state
    }

    fn abandon_value(&self, state: ParameterUsages, root: ValueId) -> ParameterUsages {
        if !self.is_argument_of_interest(root) {
            return state;
        }
        match self.code.value(root).argument_index {
            Some(parameter) => state.abandon_parameter(parameter),
            None => state,
        }
    }

    /// Apply a fact to the parameter `value` aliases, if it is tracked.
    fn rebuild_value(
        &self,
        state: ParameterUsages,
        value: ValueId,
        transform: impl Fn(&ParameterUsage) -> ParameterUsage,
    ) -> ParameterUsages {
        let root = self.code.aliased_root(value);
        if !self.is_argument_of_interest(root) {
            return state;
        }
        match self.code.value(root).argument_index {
            Some(parameter) => state.rebuild_parameter(parameter, |_, usage| transform(usage)),
            None => state,
        }
    }

    fn is_argument_of_interest(&self, root: ValueId) -> bool {
        debug_assert_eq!(self.code.aliased_root(root), root);
        self.code.is_argument(root) && self.arguments_of_interest.contains(&root)
    }

    /// A parameter may be eligible only when its static type is a class type
    /// whose instances could be under the compiler's control.
    fn is_maybe_eligible_for_class_inlining(&self, ty: &TypeRef) -> bool {
        if !ty.is_class_type() {
            // Primitives and arrays are never class inlined.
            return false;
        }
        let Some(class) = self.app_view.definition_for(ty) else {
            // Missing classes block class inlining.
            return false;
        };
        if class.is_program_class() {
            self.program_class_maybe_eligible(class)
        } else {
            // Instances of program classes can still flow into parameters
            // typed at java.lang.Object or at an interface.
            class.ty.is_object() || class.is_interface
        }
    }

    /// A program class is only eligible when its super chain leaves the
    /// program exactly at java.lang.Object.
    fn program_class_maybe_eligible(&self, class: &ClassDef) -> bool {
        let mut super_type = class.super_type.clone();
        loop {
            let Some(ty) = super_type else {
                return false;
            };
            let Some(super_class) = self.app_view.definition_for(&ty) else {
                return false;
            };
            if !super_class.is_program_class() {
                return super_class.ty.is_object();
            }
            super_type = super_class.super_type.clone();
        }
    }

    fn apply_of_interest(
        &mut self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> ParameterUsages {
        match instruction.kind {
            InstrKind::Assume { .. } => self.analyze_assume(instruction, state),
            InstrKind::CheckCast { .. } => self.analyze_check_cast(instruction, state),
            InstrKind::If { .. } => self.analyze_if(instruction, state),
            InstrKind::InstanceGet { .. } => self.analyze_instance_get(instruction, state),
            InstrKind::InstancePut { .. } => self.analyze_instance_put(instruction, state),
            InstrKind::InvokeDirect { .. } => self.analyze_invoke_direct(instruction, state),
            InstrKind::InvokeInterface { .. } | InstrKind::InvokeVirtual { .. } => {
                self.analyze_invoke_with_receiver(instruction, state)
            }
            InstrKind::InvokeStatic { .. } => self.analyze_invoke_static(instruction, state),
            InstrKind::Monitor { .. } => self.analyze_monitor(instruction, state),
            InstrKind::Return { .. } => self.analyze_return(instruction, state),
            InstrKind::Argument { .. } => state,
            InstrKind::Other { .. } => self.abandon_in_values(instruction, state),
        }
    }

    /// Collapse a parameter whose contexts have all degraded to `Top`, and
    /// give up entirely once every tracked parameter is `Top`.
    fn widen(&self, state: ParameterUsages) -> TransferResult<ParameterUsages> {
        let widened = state.rebuild(|_, per_context| {
            if !per_context.is_bottom()
                && !per_context.is_top()
                && per_context.len() == MAX_CONTEXTS
                && per_context.is_all_top()
            {
                Some(LatticeMap::Top)
            } else {
                Some(per_context.clone())
            }
        });
        if !widened.is_bottom() && !widened.is_top() && widened.is_all_top() {
            trace!("every parameter degraded to top");
            return TransferResult::Fail;
        }
        TransferResult::State(widened)
    }
}

impl TransferFunction for UsageTransferFunction<'_> {
    type State = ParameterUsages;

    fn transfer(
        &mut self,
        instruction: &Instruction,
        state: ParameterUsages,
    ) -> TransferResult<ParameterUsages> {
        if instruction.is_argument() {
            let result = self.analyze_argument(instruction, state);
            // After the last argument, only proceed when at least one
            // parameter may still be eligible.
            if Some(instruction.id) == self.last_argument && result.is_all_top() {
                trace!("no parameter is eligible for tracking");
                return TransferResult::Fail;
            }
            return TransferResult::State(result);
        }
        if !self.instructions_of_interest.contains(&instruction.id) {
            // The instruction uses none of the tracked arguments.
            return TransferResult::State(state);
        }
        debug_assert!(!state.is_bottom());
        debug_assert!(!state.is_top());
        let out_state = self.apply_of_interest(instruction, state.clone());
        if out_state != state {
            self.widen(out_state)
        } else {
            TransferResult::State(out_state)
        }
    }
}
