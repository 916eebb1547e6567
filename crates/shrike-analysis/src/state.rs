//! Map-shaped lattices: per-context and per-parameter state.
//!
//! One generic [`LatticeMap`] serves both levels of the analysis state:
//! - [`ParameterUsagePerContext`]: analysis context → usage of one parameter
//! - [`ParameterUsages`]: parameter index → per-context map
//!
//! Lookup of a missing key in a known map yields `Top` (the conservative
//! default), while the pointwise `join` treats a missing key as `Bottom` so
//! facts from either side survive the merge. Both rules follow from keeping
//! only informative entries in the map.

use crate::context::AnalysisContext;
use crate::lattice::{ExternalParameterUsage, ParameterUsage};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shrike_ir::IrCode;
use std::hash::Hash;

/// A join-semilattice with distinguished extremes.
pub trait JoinLattice: Clone + PartialEq {
    fn bottom() -> Self;
    fn top() -> Self;
    fn is_bottom(&self) -> bool;
    fn is_top(&self) -> bool;
    /// Least upper bound. Commutative, associative, idempotent; `bottom` is
    /// the identity and `top` absorbs.
    fn join(&self, other: &Self) -> Self;
}

/// A map from keys to lattice values, itself a lattice.
///
/// `Bottom` is the empty map, `Top` maps every key to `V::top()`, and
/// `Known` holds explicit entries. All updates are functional; the map is
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatticeMap<K: Hash + Eq, V> {
    Bottom,
    Known(IndexMap<K, V>),
    Top,
}

impl<K, V> LatticeMap<K, V>
where
    K: Clone + Hash + Eq,
    V: JoinLattice,
{
    /// Value for `key`. Missing keys in a known map are `Top`: the map only
    /// keeps informative entries. Looking up in `Bottom` yields `Bottom` and
    /// is a contract violation in practice, asserted in debug builds.
    pub fn get(&self, key: &K) -> V {
        match self {
            LatticeMap::Bottom => {
                debug_assert!(false, "lookup in a bottom state");
                V::bottom()
            }
            LatticeMap::Known(entries) => entries.get(key).cloned().unwrap_or_else(V::top),
            LatticeMap::Top => V::top(),
        }
    }

    /// Functional insert. `Top` absorbs.
    pub fn put(&self, key: K, value: V) -> Self {
        match self {
            LatticeMap::Top => LatticeMap::Top,
            LatticeMap::Bottom => {
                let mut entries = IndexMap::new();
                entries.insert(key, value);
                LatticeMap::Known(entries)
            }
            LatticeMap::Known(existing) => {
                let mut entries = existing.clone();
                entries.insert(key, value);
                LatticeMap::Known(entries)
            }
        }
    }

    /// Per-entry functional transform. Returning `None` removes the entry;
    /// a map left without entries collapses to `Bottom`.
    pub fn rebuild(&self, transform: impl Fn(&K, &V) -> Option<V>) -> Self {
        match self {
            LatticeMap::Bottom => LatticeMap::Bottom,
            LatticeMap::Top => LatticeMap::Top,
            LatticeMap::Known(entries) => {
                let rebuilt: IndexMap<K, V> = entries
                    .iter()
                    .filter_map(|(key, value)| {
                        transform(key, value).map(|new_value| (key.clone(), new_value))
                    })
                    .collect();
                if rebuilt.is_empty() {
                    LatticeMap::Bottom
                } else {
                    LatticeMap::Known(rebuilt)
                }
            }
        }
    }

    /// True when every tracked entry is `Top` (and for the `Top` variant).
    pub fn is_all_top(&self) -> bool {
        match self {
            LatticeMap::Bottom => false,
            LatticeMap::Known(entries) => entries.values().all(JoinLattice::is_top),
            LatticeMap::Top => true,
        }
    }

    /// True when every tracked entry is `Bottom` (and for the `Bottom`
    /// variant).
    pub fn is_all_bottom(&self) -> bool {
        match self {
            LatticeMap::Bottom => true,
            LatticeMap::Known(entries) => entries.values().all(JoinLattice::is_bottom),
            LatticeMap::Top => false,
        }
    }

    /// Number of explicit entries.
    pub fn len(&self) -> usize {
        match self {
            LatticeMap::Known(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        match self {
            LatticeMap::Known(entries) => Some(entries.iter()).into_iter().flatten(),
            _ => None.into_iter().flatten(),
        }
    }
}

impl<K, V> JoinLattice for LatticeMap<K, V>
where
    K: Clone + Hash + Eq,
    V: JoinLattice,
{
    fn bottom() -> Self {
        LatticeMap::Bottom
    }

    fn top() -> Self {
        LatticeMap::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, LatticeMap::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, LatticeMap::Top)
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (LatticeMap::Bottom, other) => other.clone(),
            (this, LatticeMap::Bottom) => this.clone(),
            (LatticeMap::Top, _) | (_, LatticeMap::Top) => LatticeMap::Top,
            (LatticeMap::Known(lhs), LatticeMap::Known(rhs)) => {
                // Pointwise join over the key union; a key missing on one
                // side contributes Bottom to the merge.
                let mut joined = lhs.clone();
                for (key, value) in rhs {
                    match joined.get_mut(key) {
                        Some(existing) => *existing = existing.join(value),
                        None => {
                            joined.insert(key.clone(), value.clone());
                        }
                    }
                }
                LatticeMap::Known(joined)
            }
        }
    }
}

/// Usage of one parameter across analysis contexts.
pub type ParameterUsagePerContext = LatticeMap<AnalysisContext, ParameterUsage>;

/// Working state of the whole analysis: parameter index → per-context usage.
pub type ParameterUsages = LatticeMap<usize, ParameterUsagePerContext>;

/// Externalized per-context usage, safe to persist.
pub type ExternalParameterUsagePerContext = LatticeMap<AnalysisContext, ExternalParameterUsage>;

/// Externalized whole-method state, safe to persist.
pub type ExternalParameterUsages = LatticeMap<usize, ExternalParameterUsagePerContext>;

impl ParameterUsagePerContext {
    /// The seed for a newly tracked parameter: `Bottom` under the default
    /// context only.
    pub fn create_initial() -> Self {
        let mut entries = IndexMap::new();
        entries.insert(AnalysisContext::default_context(), ParameterUsage::Bottom);
        LatticeMap::Known(entries)
    }

    /// Externalize each context's usage, then keep only informative entries:
    /// uniform maps collapse to `Bottom`/`Top`, and entries that externalize
    /// to `Top` are dropped since absent contexts already read back as `Top`.
    pub fn externalize(&self, code: &IrCode) -> ExternalParameterUsagePerContext {
        match self {
            LatticeMap::Bottom => LatticeMap::Bottom,
            LatticeMap::Top => LatticeMap::Top,
            LatticeMap::Known(entries) => {
                let externalized: IndexMap<AnalysisContext, ExternalParameterUsage> = entries
                    .iter()
                    .map(|(context, usage)| (context.clone(), usage.externalize(code)))
                    .collect();
                collapse_externalized(externalized)
            }
        }
    }
}

impl ParameterUsages {
    /// Set every context of `parameter` to `Top`: the parameter escaped and
    /// is no longer eligible for class inlining anywhere in this method.
    pub fn abandon_parameter(&self, parameter: usize) -> Self {
        self.rebuild(|&index, per_context| {
            if index == parameter {
                Some(per_context.rebuild(|_, _| Some(ParameterUsage::Top)))
            } else {
                Some(per_context.clone())
            }
        })
    }

    /// Apply a fact-adding transform to `parameter` in every context.
    pub fn rebuild_parameter(
        &self,
        parameter: usize,
        transform: impl Fn(&AnalysisContext, &ParameterUsage) -> ParameterUsage,
    ) -> Self {
        self.rebuild(|&index, per_context| {
            if index == parameter {
                Some(per_context.rebuild(|context, usage| Some(transform(context, usage))))
            } else {
                Some(per_context.clone())
            }
        })
    }

    /// Externalize the whole state with the same minimal-entry rules as the
    /// per-context level.
    pub fn externalize(&self, code: &IrCode) -> ExternalParameterUsages {
        match self {
            LatticeMap::Bottom => LatticeMap::Bottom,
            LatticeMap::Top => LatticeMap::Top,
            LatticeMap::Known(entries) => {
                let externalized: IndexMap<usize, ExternalParameterUsagePerContext> = entries
                    .iter()
                    .map(|(&parameter, per_context)| (parameter, per_context.externalize(code)))
                    .collect();
                collapse_externalized(externalized)
            }
        }
    }
}

/// Shared collapse rule for externalized maps: all-`Bottom` → `Bottom`,
/// all-`Top` → `Top`, otherwise drop `Top` entries.
fn collapse_externalized<K: Clone + Hash + Eq, V: JoinLattice>(
    entries: IndexMap<K, V>,
) -> LatticeMap<K, V> {
    if entries.values().all(JoinLattice::is_bottom) {
        LatticeMap::Bottom
    } else if entries.values().all(JoinLattice::is_top) {
        LatticeMap::Top
    } else {
        let informative: IndexMap<K, V> = entries
            .into_iter()
            .filter(|(_, value)| !value.is_top())
            .collect();
        LatticeMap::Known(informative)
    }
}
