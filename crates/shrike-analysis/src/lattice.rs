//! The parameter-usage lattice.
//!
//! [`ParameterUsage`] describes how one parameter is used in one analysis
//! context:
//! - `Bottom` (⊥): no usage observed; the parameter is unconditionally
//!   eligible for class inlining as far as known.
//! - `Facts`: concrete, non-trivial usage (never all-empty by invariant).
//! - `Top` (⊤): unknown or unsafe usage; unconditionally ineligible.
//!
//! Two representations exist over a parameter's lifetime. The *internal*
//! form holds ids of the call instructions that produced each fact; it is
//! scoped to one method's analysis because the ids die with the IR. The
//! *external* form ([`ExternalParameterUsage`]) holds only resolved method
//! references and is what gets persisted in optimization info. Conversion is
//! one-way via `externalize` and idempotent on the external side.

use crate::state::JoinLattice;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use shrike_ir::{FieldRef, InstrId, IrCode, MethodRef, TypeRef};

/// Concrete usage facts for one parameter, internal form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageFacts {
    /// Types the parameter was cast to.
    pub casts: IndexSet<TypeRef>,
    /// Fields read from the parameter.
    pub fields_read: IndexSet<FieldRef>,
    /// Invoke instructions with the parameter in receiver position.
    pub calls_with_receiver: IndexSet<InstrId>,
    pub mutated: bool,
    pub returned: bool,
    pub used_as_lock: bool,
}

impl UsageFacts {
    pub fn is_empty(&self) -> bool {
        self.casts.is_empty()
            && self.fields_read.is_empty()
            && self.calls_with_receiver.is_empty()
            && !self.mutated
            && !self.returned
            && !self.used_as_lock
    }
}

/// Usage of one parameter in one analysis context. See the module docs for
/// the variant meanings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterUsage {
    Bottom,
    Facts(UsageFacts),
    Top,
}

impl ParameterUsage {
    /// Functional update: `Top` absorbs, `Bottom` seeds a fresh fact set,
    /// `Facts` gets the fact added. The original is never modified.
    fn with(&self, add: impl FnOnce(&mut UsageFacts)) -> ParameterUsage {
        match self {
            ParameterUsage::Top => ParameterUsage::Top,
            ParameterUsage::Bottom => {
                let mut facts = UsageFacts::default();
                add(&mut facts);
                // A no-op update on Bottom would violate the non-empty
                // invariant of the Facts variant.
                debug_assert!(!facts.is_empty());
                ParameterUsage::Facts(facts)
            }
            ParameterUsage::Facts(existing) => {
                let mut facts = existing.clone();
                add(&mut facts);
                ParameterUsage::Facts(facts)
            }
        }
    }

    pub fn add_cast_with_parameter(&self, target: TypeRef) -> ParameterUsage {
        self.with(|facts| {
            facts.casts.insert(target);
        })
    }

    pub fn add_field_read_from_parameter(&self, field: FieldRef) -> ParameterUsage {
        self.with(|facts| {
            facts.fields_read.insert(field);
        })
    }

    pub fn add_method_call_with_parameter_as_receiver(&self, call: InstrId) -> ParameterUsage {
        self.with(|facts| {
            facts.calls_with_receiver.insert(call);
        })
    }

    pub fn set_parameter_mutated(&self) -> ParameterUsage {
        self.with(|facts| facts.mutated = true)
    }

    pub fn set_parameter_returned(&self) -> ParameterUsage {
        self.with(|facts| facts.returned = true)
    }

    pub fn set_parameter_used_as_lock(&self) -> ParameterUsage {
        self.with(|facts| facts.used_as_lock = true)
    }

    pub fn is_parameter_mutated(&self) -> bool {
        match self {
            ParameterUsage::Bottom => false,
            ParameterUsage::Facts(facts) => facts.mutated,
            ParameterUsage::Top => true,
        }
    }

    pub fn is_parameter_returned(&self) -> bool {
        match self {
            ParameterUsage::Bottom => false,
            ParameterUsage::Facts(facts) => facts.returned,
            ParameterUsage::Top => true,
        }
    }

    pub fn is_parameter_used_as_lock(&self) -> bool {
        match self {
            ParameterUsage::Bottom => false,
            ParameterUsage::Facts(facts) => facts.used_as_lock,
            ParameterUsage::Top => true,
        }
    }

    /// Project the internal, instruction-referencing value to the
    /// persistable external form. Call sites become a multiset of invoked
    /// method references, sorted for stable equality.
    pub fn externalize(&self, code: &IrCode) -> ExternalParameterUsage {
        match self {
            ParameterUsage::Bottom => ExternalParameterUsage::Bottom,
            ParameterUsage::Top => ExternalParameterUsage::Top,
            ParameterUsage::Facts(facts) => {
                let mut calls: Vec<MethodRef> = facts
                    .calls_with_receiver
                    .iter()
                    .filter_map(|&call| {
                        let invoked = code.instruction(call).invoked_method();
                        debug_assert!(invoked.is_some(), "recorded call site is not an invoke");
                        invoked.cloned()
                    })
                    .collect();
                calls.sort();
                ExternalParameterUsage::Facts(ExternalUsageFacts {
                    casts: facts.casts.clone(),
                    fields_read: facts.fields_read.clone(),
                    calls_with_receiver: calls,
                    mutated: facts.mutated,
                    returned: facts.returned,
                    used_as_lock: facts.used_as_lock,
                })
            }
        }
    }
}

impl JoinLattice for ParameterUsage {
    fn bottom() -> Self {
        ParameterUsage::Bottom
    }

    fn top() -> Self {
        ParameterUsage::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ParameterUsage::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, ParameterUsage::Top)
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (ParameterUsage::Bottom, other) => other.clone(),
            (this, ParameterUsage::Bottom) => this.clone(),
            (ParameterUsage::Top, _) | (_, ParameterUsage::Top) => ParameterUsage::Top,
            (ParameterUsage::Facts(lhs), ParameterUsage::Facts(rhs)) => {
                let mut facts = lhs.clone();
                facts.casts.extend(rhs.casts.iter().cloned());
                facts.fields_read.extend(rhs.fields_read.iter().cloned());
                facts
                    .calls_with_receiver
                    .extend(rhs.calls_with_receiver.iter().copied());
                facts.mutated |= rhs.mutated;
                facts.returned |= rhs.returned;
                facts.used_as_lock |= rhs.used_as_lock;
                ParameterUsage::Facts(facts)
            }
        }
    }
}

/// Concrete usage facts, external form. Safe to persist beyond the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUsageFacts {
    pub casts: IndexSet<TypeRef>,
    pub fields_read: IndexSet<FieldRef>,
    /// Multiset of methods invoked with the parameter as receiver, sorted.
    pub calls_with_receiver: Vec<MethodRef>,
    pub mutated: bool,
    pub returned: bool,
    pub used_as_lock: bool,
}

/// Externalized usage of one parameter in one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalParameterUsage {
    Bottom,
    Facts(ExternalUsageFacts),
    Top,
}

impl ExternalParameterUsage {
    /// Externalizing an already-external value is the identity.
    pub fn externalize(&self) -> ExternalParameterUsage {
        self.clone()
    }

    pub fn is_parameter_mutated(&self) -> bool {
        match self {
            ExternalParameterUsage::Bottom => false,
            ExternalParameterUsage::Facts(facts) => facts.mutated,
            ExternalParameterUsage::Top => true,
        }
    }

    pub fn is_parameter_returned(&self) -> bool {
        match self {
            ExternalParameterUsage::Bottom => false,
            ExternalParameterUsage::Facts(facts) => facts.returned,
            ExternalParameterUsage::Top => true,
        }
    }

    pub fn is_parameter_used_as_lock(&self) -> bool {
        match self {
            ExternalParameterUsage::Bottom => false,
            ExternalParameterUsage::Facts(facts) => facts.used_as_lock,
            ExternalParameterUsage::Top => true,
        }
    }
}

impl JoinLattice for ExternalParameterUsage {
    fn bottom() -> Self {
        ExternalParameterUsage::Bottom
    }

    fn top() -> Self {
        ExternalParameterUsage::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ExternalParameterUsage::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, ExternalParameterUsage::Top)
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (ExternalParameterUsage::Bottom, other) => other.clone(),
            (this, ExternalParameterUsage::Bottom) => this.clone(),
            (ExternalParameterUsage::Top, _) | (_, ExternalParameterUsage::Top) => {
                ExternalParameterUsage::Top
            }
            (ExternalParameterUsage::Facts(lhs), ExternalParameterUsage::Facts(rhs)) => {
                let mut facts = lhs.clone();
                facts.casts.extend(rhs.casts.iter().cloned());
                facts.fields_read.extend(rhs.fields_read.iter().cloned());
                facts.calls_with_receiver =
                    join_multisets(&lhs.calls_with_receiver, &rhs.calls_with_receiver);
                facts.mutated |= rhs.mutated;
                facts.returned |= rhs.returned;
                facts.used_as_lock |= rhs.used_as_lock;
                ExternalParameterUsage::Facts(facts)
            }
        }
    }
}

/// Least upper bound of two sorted multisets: per-element maximum
/// multiplicity. Keeps join idempotent.
fn join_multisets(lhs: &[MethodRef], rhs: &[MethodRef]) -> Vec<MethodRef> {
    let mut result = Vec::with_capacity(lhs.len().max(rhs.len()));
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() && j < rhs.len() {
        match lhs[i].cmp(&rhs[j]) {
            std::cmp::Ordering::Less => {
                result.push(lhs[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                result.push(rhs[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                result.push(lhs[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    result.extend_from_slice(&lhs[i..]);
    result.extend(rhs[j..].iter().cloned());
    result
}
