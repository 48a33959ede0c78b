//! Variable nodes and the planning statistics they carry.

use crate::distributions::Distribution;
use crate::types::{FactorId, VarKind};
use serde::Serialize;

/// Statistics a planner attaches to an imagined state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeData {
    /// Number of times the node was visited during planning (N).
    pub visits: u32,
    /// Accumulated cost (G). Lower is better.
    pub cost: f64,
    /// Action that led from the parent state to this one, if any.
    pub action: Option<usize>,
    pub pruned: bool,
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            visits: 0,
            cost: -1.0,
            action: None,
            pruned: false,
        }
    }
}

/// A random variable in the factor graph.
///
/// Every variable has exactly one parent factor (the factor that generates
/// it) and any number of child factors (factors it conditions).
#[derive(Debug, Clone)]
pub struct VarNode {
    pub(crate) kind: VarKind,
    pub(crate) name: Option<String>,
    pub(crate) prior: Option<Distribution>,
    pub(crate) posterior: Distribution,
    pub(crate) biased: Option<Distribution>,
    pub(crate) parent: FactorId,
    pub(crate) children: Vec<FactorId>,
    pub data: NodeData,
}

impl VarNode {
    pub(crate) fn new(
        parent: FactorId,
        prior: Option<Distribution>,
        posterior: Distribution,
    ) -> Self {
        Self {
            kind: VarKind::Hidden,
            name: None,
            prior,
            posterior,
            biased: None,
            parent,
            children: Vec::new(),
            data: NodeData::default(),
        }
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: VarKind) {
        self.kind = kind;
    }

    pub fn is_hidden(&self) -> bool {
        self.kind == VarKind::Hidden
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn prior(&self) -> Option<&Distribution> {
        self.prior.as_ref()
    }

    pub fn prior_mut(&mut self) -> Option<&mut Distribution> {
        self.prior.as_mut()
    }

    pub fn posterior(&self) -> &Distribution {
        &self.posterior
    }

    pub fn posterior_mut(&mut self) -> &mut Distribution {
        &mut self.posterior
    }

    pub fn set_posterior(&mut self, posterior: Distribution) {
        self.posterior = posterior;
    }

    pub fn biased(&self) -> Option<&Distribution> {
        self.biased.as_ref()
    }

    pub fn set_biased(&mut self, biased: Distribution) {
        self.biased = Some(biased);
    }

    /// The factor this variable is the child of.
    pub fn parent(&self) -> FactorId {
        self.parent
    }

    /// Factors this variable is a parent of, in attachment order.
    pub fn children(&self) -> &[FactorId] {
        &self.children
    }

    /// Children first, then the parent: the order messages are summed in.
    pub fn adjacent_factors(&self) -> impl Iterator<Item = FactorId> + '_ {
        self.children.iter().copied().chain(std::iter::once(self.parent))
    }
}
