//! Property tests for the usage lattices.
//!
//! The solver relies on the join being a least upper bound: commutative,
//! associative, idempotent, with `Bottom` as identity and `Top` absorbing.
//! These laws are checked here over generated values at both the single-usage
//! level and the map level, for the internal and the external forms.

use proptest::prelude::*;
use shrike_analysis::{
    AnalysisContext, ExternalParameterUsage, ExternalUsageFacts, JoinLattice, LatticeMap,
    ParameterUsage, ParameterUsagePerContext,
};
use shrike_ir::{FieldRef, InstrId, MethodRef, TypeRef};

fn type_pool() -> impl Strategy<Value = TypeRef> {
    prop_oneof![
        Just(TypeRef::new("Lfoo/A;")),
        Just(TypeRef::new("Lfoo/B;")),
        Just(TypeRef::new("Lfoo/C;")),
    ]
}

fn field_pool() -> impl Strategy<Value = FieldRef> {
    (type_pool(), prop_oneof![Just("f"), Just("g")]).prop_map(|(holder, name)| {
        FieldRef::new(holder, name, TypeRef::new("I"))
    })
}

fn method_pool() -> impl Strategy<Value = MethodRef> {
    (type_pool(), prop_oneof![Just("m"), Just("n")])
        .prop_map(|(holder, name)| MethodRef::new(holder, name, "()V"))
}

/// One fact-adding update, applied to build non-trivial usages.
#[derive(Debug, Clone)]
enum Update {
    Cast(TypeRef),
    FieldRead(FieldRef),
    Call(InstrId),
    Mutated,
    Returned,
    UsedAsLock,
}

fn update() -> impl Strategy<Value = Update> {
    prop_oneof![
        type_pool().prop_map(Update::Cast),
        field_pool().prop_map(Update::FieldRead),
        (0u32..4).prop_map(|id| Update::Call(InstrId(id))),
        Just(Update::Mutated),
        Just(Update::Returned),
        Just(Update::UsedAsLock),
    ]
}

fn apply(usage: ParameterUsage, update: Update) -> ParameterUsage {
    match update {
        Update::Cast(ty) => usage.add_cast_with_parameter(ty),
        Update::FieldRead(field) => usage.add_field_read_from_parameter(field),
        Update::Call(id) => usage.add_method_call_with_parameter_as_receiver(id),
        Update::Mutated => usage.set_parameter_mutated(),
        Update::Returned => usage.set_parameter_returned(),
        Update::UsedAsLock => usage.set_parameter_used_as_lock(),
    }
}

fn parameter_usage() -> impl Strategy<Value = ParameterUsage> {
    prop_oneof![
        1 => Just(ParameterUsage::Bottom),
        1 => Just(ParameterUsage::Top),
        4 => prop::collection::vec(update(), 1..5).prop_map(|updates| {
            updates
                .into_iter()
                .fold(ParameterUsage::Bottom, apply)
        }),
    ]
}

fn external_usage() -> impl Strategy<Value = ExternalParameterUsage> {
    prop_oneof![
        1 => Just(ExternalParameterUsage::Bottom),
        1 => Just(ExternalParameterUsage::Top),
        4 => (prop::collection::vec(method_pool(), 0..4), any::<bool>(), any::<bool>()).prop_map(
            |(mut calls, mutated, returned)| {
                calls.sort();
                let facts = ExternalUsageFacts {
                    calls_with_receiver: calls,
                    // Keep the facts non-empty.
                    mutated: mutated || !returned,
                    returned,
                    ..Default::default()
                };
                ExternalParameterUsage::Facts(facts)
            }
        ),
    ]
}

fn context_pool() -> impl Strategy<Value = AnalysisContext> {
    prop_oneof![
        2 => Just(AnalysisContext::default_context()),
        1 => (field_pool(), 0i64..3).prop_map(|(field, value)| {
            AnalysisContext::FieldValue { field, value }
        }),
    ]
}

fn per_context() -> impl Strategy<Value = ParameterUsagePerContext> {
    prop_oneof![
        1 => Just(LatticeMap::Bottom),
        1 => Just(LatticeMap::Top),
        4 => prop::collection::vec((context_pool(), parameter_usage()), 1..3).prop_map(|entries| {
            entries
                .into_iter()
                .fold(LatticeMap::Bottom, |map, (context, usage)| {
                    map.put(context, usage)
                })
        }),
    ]
}

proptest! {
    #[test]
    fn join_commutative(a in parameter_usage(), b in parameter_usage()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn join_associative(
        a in parameter_usage(),
        b in parameter_usage(),
        c in parameter_usage(),
    ) {
        prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }

    #[test]
    fn join_idempotent(a in parameter_usage()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn bottom_is_identity(a in parameter_usage()) {
        prop_assert_eq!(ParameterUsage::Bottom.join(&a), a.clone());
        prop_assert_eq!(a.join(&ParameterUsage::Bottom), a);
    }

    #[test]
    fn top_absorbs(a in parameter_usage()) {
        prop_assert_eq!(ParameterUsage::Top.join(&a), ParameterUsage::Top);
        prop_assert_eq!(a.join(&ParameterUsage::Top), ParameterUsage::Top);
    }

    #[test]
    fn join_is_an_upper_bound(a in parameter_usage(), b in parameter_usage()) {
        // a ⊑ a ⊔ b, expressed as absorption.
        let joined = a.join(&b);
        prop_assert_eq!(a.join(&joined), joined.clone());
        prop_assert_eq!(b.join(&joined), joined);
    }

    #[test]
    fn external_join_commutative(a in external_usage(), b in external_usage()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn external_join_associative(
        a in external_usage(),
        b in external_usage(),
        c in external_usage(),
    ) {
        prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }

    #[test]
    fn external_join_idempotent(a in external_usage()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn external_externalize_is_identity(a in external_usage()) {
        prop_assert_eq!(a.externalize(), a);
    }

    #[test]
    fn map_join_commutative(a in per_context(), b in per_context()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn map_join_idempotent(a in per_context()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn map_bottom_identity_and_top_absorbing(a in per_context()) {
        prop_assert_eq!(LatticeMap::Bottom.join(&a), a.clone());
        prop_assert_eq!(LatticeMap::Top.join(&a), LatticeMap::Top);
    }
}
