//! The factor graph: an arena that owns every variable and factor.
//!
//! # Architecture
//!
//! ```text
//!   vars:    [Some(VarNode), Some(VarNode), None, ...]   ← VarId indexes
//!   factors: [Some(Factor),  Some(Factor),  None, ...]   ← FactorId indexes
//!
//!   VarNode.parent   ──► the factor generating the variable
//!   VarNode.children ──► factors the variable conditions
//!   Factor.kind      ──► parent/child VarIds
//! ```
//!
//! Removed nodes leave `None` holes so that handles stay stable while a
//! planner prunes imagined branches and the agent integrates new slices.
//!
//! Every constructor adds exactly one hidden variable together with the
//! factor that generates it, and registers that factor as a child of each
//! of its parents.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::distributions::Distribution;
use crate::error::{HopiError, Result};
use crate::factors::{Factor, FactorKind};
use crate::nodes::VarNode;
use crate::ops;
use crate::tensor::Tensor;
use crate::types::{FactorId, VarId, VarKind};

/// Parameters of a factor: either a fixed tensor or a Dirichlet variable
/// whose posterior is learned.
#[derive(Debug, Clone, Copy)]
pub enum Param<'a> {
    Fixed(&'a Tensor),
    Learned(VarId),
}

#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    vars: Vec<Option<VarNode>>,
    factors: Vec<Option<Factor>>,
    tree_root: Option<VarId>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// `X ~ Cat(param)` with a fixed parameter vector.
    pub fn categorical(&mut self, param: Tensor) -> Result<VarId> {
        let prior = Distribution::categorical(param)?;
        let posterior = uniform_categorical(prior.params().len())?;
        self.add_var(|child| FactorKind::Categorical { child, d: None }, Some(prior), posterior)
    }

    /// `X ~ Cat(D)` where `D` is a Dirichlet variable.
    pub fn categorical_with(&mut self, d: VarId) -> Result<VarId> {
        let size = self.dirichlet_params(d)?.last_dim();
        let posterior = uniform_categorical(size)?;
        self.add_var(|child| FactorKind::Categorical { child, d: Some(d) }, None, posterior)
    }

    /// `X ~ Cat(param · s)` with a fixed `[to, from]` matrix.
    pub fn transition(&mut self, s: VarId, param: Tensor) -> Result<VarId> {
        let prior = Distribution::transition(param)?;
        expect_dim("FactorGraph::transition", prior.params(), 1, self.var_len(s)?)?;
        let posterior = uniform_categorical(prior.params().shape()[0])?;
        self.add_var(
            |to| FactorKind::Transition { from: s, to, a: None },
            Some(prior),
            posterior,
        )
    }

    /// `X ~ Cat(A · s)` where `A` is a Dirichlet variable over `[from, to]`.
    pub fn transition_with(&mut self, s: VarId, a: VarId) -> Result<VarId> {
        let params = self.dirichlet_params(a)?;
        expect_rank("FactorGraph::transition_with", params, 2)?;
        expect_dim("FactorGraph::transition_with", params, 0, self.var_len(s)?)?;
        let posterior = uniform_categorical(params.last_dim())?;
        self.add_var(
            |to| FactorKind::Transition { from: s, to, a: Some(a) },
            None,
            posterior,
        )
    }

    /// `X ~ Cat(param · s · a)` with a fixed `[to, from, action]` tensor.
    pub fn active_transition(&mut self, s: VarId, a: VarId, param: Tensor) -> Result<VarId> {
        let prior = Distribution::active_transition(param)?;
        expect_dim("FactorGraph::active_transition", prior.params(), 1, self.var_len(s)?)?;
        expect_dim("FactorGraph::active_transition", prior.params(), 2, self.var_len(a)?)?;
        let posterior = uniform_categorical(prior.params().shape()[0])?;
        self.add_var(
            |to| FactorKind::ActiveTransition {
                from: s,
                action: a,
                to,
                b: None,
            },
            Some(prior),
            posterior,
        )
    }

    /// `X ~ Cat(B · s · a)` where `B` is a Dirichlet variable over
    /// `[from, action, to]`.
    pub fn active_transition_with(&mut self, s: VarId, a: VarId, b: VarId) -> Result<VarId> {
        let params = self.dirichlet_params(b)?;
        expect_rank("FactorGraph::active_transition_with", params, 3)?;
        expect_dim("FactorGraph::active_transition_with", params, 0, self.var_len(s)?)?;
        expect_dim("FactorGraph::active_transition_with", params, 1, self.var_len(a)?)?;
        let posterior = uniform_categorical(params.last_dim())?;
        self.add_var(
            |to| FactorKind::ActiveTransition {
                from: s,
                action: a,
                to,
                b: Some(b),
            },
            None,
            posterior,
        )
    }

    /// `X ~ Dir(param)`. The posterior starts equal to the prior.
    pub fn dirichlet(&mut self, param: Tensor) -> Result<VarId> {
        let prior = Distribution::dirichlet(param)?;
        let posterior = prior.clone();
        self.add_var(|child| FactorKind::Dirichlet { child }, Some(prior), posterior)
    }

    fn add_var(
        &mut self,
        make: impl FnOnce(VarId) -> FactorKind,
        prior: Option<Distribution>,
        posterior: Distribution,
    ) -> Result<VarId> {
        let id = VarId(self.vars.len());
        let factor_id = FactorId(self.factors.len());
        let factor = Factor::new(factor_id, make(id));

        let parents = factor.parents();
        for &p in &parents {
            self.var(p)?;
        }
        for p in parents {
            self.var_mut(p)?.children.push(factor_id);
        }

        self.vars.push(Some(VarNode::new(factor_id, prior, posterior)));
        self.factors.push(Some(factor));
        Ok(id)
    }

    /// Clamp `var` to `observation` and mark it observed.
    pub fn observe(&mut self, var: VarId, observation: Tensor) -> Result<()> {
        let posterior = Distribution::categorical(observation)?;
        let node = self.var_mut(var)?;
        node.kind = VarKind::Observed;
        node.posterior = posterior;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn var(&self, id: VarId) -> Result<&VarNode> {
        self.vars
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(HopiError::UnknownVar(id))
    }

    pub fn var_mut(&mut self, id: VarId) -> Result<&mut VarNode> {
        self.vars
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(HopiError::UnknownVar(id))
    }

    pub fn factor(&self, id: FactorId) -> Result<&Factor> {
        self.factors
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(HopiError::UnknownFactor(id))
    }

    pub fn factor_mut(&mut self, id: FactorId) -> Result<&mut Factor> {
        self.factors
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(HopiError::UnknownFactor(id))
    }

    /// Live variables in creation order.
    pub fn var_ids(&self) -> Vec<VarId> {
        live_ids(&self.vars).map(VarId).collect()
    }

    /// Live factors in creation order.
    pub fn factor_ids(&self) -> Vec<FactorId> {
        live_ids(&self.factors).map(FactorId).collect()
    }

    pub fn hidden_vars(&self) -> Vec<VarId> {
        self.vars_of_kind(VarKind::Hidden)
    }

    pub fn observed_vars(&self) -> Vec<VarId> {
        self.vars_of_kind(VarKind::Observed)
    }

    fn vars_of_kind(&self, kind: VarKind) -> Vec<VarId> {
        self.vars
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().filter(|v| v.kind == kind).map(|_| VarId(i)))
            .collect()
    }

    pub fn n_nodes(&self) -> usize {
        self.vars.iter().flatten().count()
    }

    pub fn n_factors(&self) -> usize {
        self.factors.iter().flatten().count()
    }

    pub fn n_hidden(&self) -> usize {
        self.hidden_vars().len()
    }

    pub fn n_observed(&self) -> usize {
        self.observed_vars().len()
    }

    pub fn tree_root(&self) -> Result<VarId> {
        self.tree_root.ok_or(HopiError::NoTreeRoot)
    }

    pub fn set_tree_root(&mut self, root: VarId) -> Result<()> {
        self.var(root)?;
        self.tree_root = Some(root);
        Ok(())
    }

    /// First parent of the factor generating `var` (the previous state for a
    /// transition). `None` for variables at the top of the graph.
    pub fn parent_var(&self, var: VarId) -> Result<Option<VarId>> {
        let parent = self.var(var)?.parent;
        Ok(self.factor(parent)?.first_parent())
    }

    /// Variables generated by the factors `var` conditions.
    pub fn child_vars(&self, var: VarId) -> Result<Vec<VarId>> {
        self.var(var)?
            .children
            .iter()
            .map(|&f| self.factor(f).map(Factor::child))
            .collect()
    }

    /// Children of `var` reached through a planned action.
    pub fn action_children(&self, var: VarId) -> Result<Vec<VarId>> {
        let mut out = Vec::new();
        for child in self.child_vars(var)? {
            if self.var(child)?.data.action.is_some() {
                out.push(child);
            }
        }
        Ok(out)
    }

    pub fn adjacent_factors(&self, var: VarId) -> Result<Vec<FactorId>> {
        Ok(self.var(var)?.adjacent_factors().collect())
    }

    pub fn find_by_name(&self, name: &str) -> Option<VarId> {
        self.vars
            .iter()
            .position(|v| v.as_ref().and_then(VarNode::name) == Some(name))
            .map(VarId)
    }

    fn var_len(&self, var: VarId) -> Result<usize> {
        Ok(self.var(var)?.posterior.params().len())
    }

    fn dirichlet_params(&self, var: VarId) -> Result<&Tensor> {
        match self.var(var)?.posterior() {
            Distribution::Dirichlet(p) => Ok(p),
            other => Err(HopiError::Unsupported {
                op: "dirichlet parameter",
                kind: other.kind(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Evidence
    // -----------------------------------------------------------------------

    /// Load `name index` lines from a file and clamp every observed variable
    /// with a matching name to `one_hot(n_obs, index)`.
    pub fn load_evidence(&mut self, n_obs: usize, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        self.load_evidence_from(n_obs, reader, &path.display().to_string())
    }

    pub fn load_evidence_from<R: BufRead>(
        &mut self,
        n_obs: usize,
        reader: R,
        source_name: &str,
    ) -> Result<()> {
        let invalid = |line: usize, reason: String| HopiError::InvalidEvidence {
            source_name: source_name.to_string(),
            line,
            reason,
        };

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (name, index) = line
                .split_once(' ')
                .ok_or_else(|| invalid(i + 1, format!("expected `name index`, got {line:?}")))?;
            let index: usize = index
                .trim()
                .parse()
                .map_err(|e| invalid(i + 1, format!("bad observation {index:?}: {e}")))?;
            let observation = ops::one_hot(n_obs, index)?;

            for id in self.observed_vars() {
                let var = self.var_mut(id)?;
                if var.name() == Some(name) {
                    var.posterior = Distribution::Categorical(observation.clone());
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pruning
    // -----------------------------------------------------------------------

    /// Remove every branch below `var` whose child variable is hidden.
    pub fn remove_hidden_children(&mut self, var: VarId) -> Result<()> {
        let mut hidden = Vec::new();
        for &f in &self.var(var)?.children {
            if self.var(self.factor(f)?.child())?.is_hidden() {
                hidden.push(f);
            }
        }
        for f in hidden {
            self.remove_branch(f)?;
        }
        Ok(())
    }

    /// Remove `factor`, its child variable and, recursively, every branch
    /// hanging below that variable.
    pub fn remove_branch(&mut self, factor: FactorId) -> Result<()> {
        let removed = self
            .factors
            .get_mut(factor.0)
            .and_then(Option::take)
            .ok_or(HopiError::UnknownFactor(factor))?;

        for p in removed.parents() {
            if let Some(Some(parent)) = self.vars.get_mut(p.0) {
                parent.children.retain(|&c| c != factor);
            }
        }

        let child = removed.child();
        if let Some(var) = self.vars.get_mut(child.0).and_then(Option::take) {
            if self.tree_root == Some(child) {
                self.tree_root = None;
            }
            for grandchild in var.children {
                self.remove_branch(grandchild)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Integration of new evidence
    // -----------------------------------------------------------------------

    /// Append an action/state/observation slice after the tree root.
    ///
    /// Planning branches hanging below the root are discarded first. The
    /// action is encoded as a categorical with `0.9` on `action`. The new
    /// state becomes the tree root.
    pub fn integrate(
        &mut self,
        action: usize,
        observation: &Tensor,
        a: Param<'_>,
        b: Param<'_>,
    ) -> Result<VarId> {
        let root = self.tree_root()?;
        let n_actions = self.n_actions(b)?;
        let action_var = self.categorical(action_prior(n_actions, action)?)?;
        self.integrate_slice(root, action_var, observation, a, b)
    }

    /// Like [`integrate`](Self::integrate) but the action is drawn from a
    /// learned Dirichlet prior `u`, whose `action` count is incremented first.
    pub fn integrate_with_prior(
        &mut self,
        u: VarId,
        action: usize,
        observation: &Tensor,
        a: Param<'_>,
        b: Param<'_>,
    ) -> Result<VarId> {
        let root = self.tree_root()?;
        match self.var_mut(u)?.prior.as_mut() {
            Some(Distribution::Dirichlet(params)) => {
                let count = params.get(&[action])?;
                params.set(&[action], count + 1.0)?;
            }
            Some(other) => {
                return Err(HopiError::Unsupported {
                    op: "integrate_with_prior",
                    kind: other.kind(),
                })
            }
            None => return Err(HopiError::MissingDistribution { var: u, what: "prior" }),
        }

        let action_var = self.categorical_with(u)?;
        self.integrate_slice(root, action_var, observation, a, b)
    }

    fn integrate_slice(
        &mut self,
        root: VarId,
        action_var: VarId,
        observation: &Tensor,
        a: Param<'_>,
        b: Param<'_>,
    ) -> Result<VarId> {
        self.remove_hidden_children(root)?;

        let state = match b {
            Param::Fixed(b) => self.active_transition(root, action_var, b.clone())?,
            Param::Learned(b) => self.active_transition_with(root, action_var, b)?,
        };
        let obs = match a {
            Param::Fixed(a) => self.transition(state, a.clone())?,
            Param::Learned(a) => self.transition_with(state, a)?,
        };
        self.observe(obs, observation.clone())?;
        self.tree_root = Some(state);

        debug!(%root, new_root = %state, nodes = self.n_nodes(), "integrated new slice");
        Ok(state)
    }

    fn n_actions(&self, b: Param<'_>) -> Result<usize> {
        match b {
            Param::Fixed(t) => {
                expect_rank("FactorGraph::integrate", t, 3)?;
                Ok(t.shape()[2])
            }
            Param::Learned(v) => {
                let params = self.dirichlet_params(v)?;
                expect_rank("FactorGraph::integrate", params, 3)?;
                Ok(params.shape()[1])
            }
        }
    }
}

fn live_ids<T>(slots: &[Option<T>]) -> impl Iterator<Item = usize> + '_ {
    slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
}

fn uniform_categorical(size: usize) -> Result<Distribution> {
    Distribution::categorical(ops::uniform_vec(size)?)
}

/// `0.9` on `action`, the rest spread evenly.
fn action_prior(n_actions: usize, action: usize) -> Result<Tensor> {
    if action >= n_actions {
        return Err(HopiError::IndexOutOfRange {
            op: "FactorGraph::integrate",
            index: action,
            len: n_actions,
        });
    }
    if n_actions == 1 {
        return Tensor::from_vec(vec![1.0]);
    }
    let mut param = Tensor::full(&[n_actions], 0.1 / (n_actions - 1) as f64)?;
    param.set(&[action], 0.9)?;
    Ok(param)
}

fn expect_rank(op: &'static str, t: &Tensor, rank: usize) -> Result<()> {
    if t.rank() == rank {
        Ok(())
    } else {
        Err(HopiError::InvalidRank { op, rank: t.rank() })
    }
}

fn expect_dim(op: &'static str, t: &Tensor, axis: usize, len: usize) -> Result<()> {
    if t.shape().get(axis) == Some(&len) {
        Ok(())
    } else {
        let mut expected = t.shape().to_vec();
        if let Some(d) = expected.get_mut(axis) {
            *d = len;
        }
        Err(HopiError::ShapeMismatch {
            op,
            expected,
            actual: t.shape().to_vec(),
        })
    }
}
