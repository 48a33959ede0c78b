//! Small shared types: arena handles, variable kinds and the planning
//! strategy enums that are selected from configuration.

use serde::{Deserialize, Serialize};

/// Handle to a variable node owned by a [`FactorGraph`](crate::graph::FactorGraph).
///
/// Handles are never reused: removing a branch leaves a hole in the arena, so
/// a stale id resolves to [`HopiError::UnknownVar`](crate::HopiError::UnknownVar)
/// instead of silently pointing at a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub(crate) usize);

/// Handle to a factor node owned by a [`FactorGraph`](crate::graph::FactorGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactorId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl FactorId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

impl std::fmt::Display for FactorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "factor#{}", self.0)
    }
}

/// Whether a variable is inferred (hidden) or clamped to evidence (observed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Hidden,
    Observed,
}

impl std::fmt::Display for VarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarKind::Hidden => write!(f, "hidden"),
            VarKind::Observed => write!(f, "observed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Planning strategies
// ---------------------------------------------------------------------------

/// How an imagined (state, observation) pair is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationType {
    /// Expected free energy: risk over observations plus ambiguity.
    Efe,
    /// Risk over observations plus risk over states.
    DoubleKl,
}

/// How the tree-search planner picks the next node to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSelection {
    /// Lowest cost first.
    Min,
    /// Sample with weight proportional to how far below the worst cost a node is.
    Sampling,
    /// Sample from `softmax(-G)`.
    SoftmaxSampling,
}

/// How costs flow through the tree after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackPropagation {
    /// Only visit counts are updated.
    No,
    /// Each ancestor accumulates the cost of the node below it.
    Upward,
    /// The evaluated node first accumulates its parent's cost.
    Downward,
}
