//! Analysis contexts: the sensitivity key of the parameter-usage analysis.

use serde::{Deserialize, Serialize};
use shrike_ir::FieldRef;

/// A sensitivity key under which facts about a parameter are tracked.
///
/// Only [`AnalysisContext::Default`] is produced today; the analysis is
/// context-insensitive. The enum is `#[non_exhaustive]` and the lattice map
/// machinery is generic over its key, so forking additional contexts (for
/// example per known field value after a class-id test) needs no change to
/// the lattice layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnalysisContext {
    /// The unconditional context every analysis starts in.
    Default,
    /// Facts valid only when `field` holds the given constant. Reserved for
    /// context forking at class-id tests; not produced yet.
    FieldValue { field: FieldRef, value: i64 },
}

impl AnalysisContext {
    pub fn default_context() -> Self {
        AnalysisContext::Default
    }
}
