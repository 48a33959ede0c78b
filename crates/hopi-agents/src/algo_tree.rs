//! Best-first tree search, one imagined action at a time.
//!
//! Unlike [`Mcts`](crate::mcts::Mcts), which expands every action of the
//! selected node at once, `AlgoTree` keeps a frontier of unexplored
//! `(state, observation)` pairs and grows the tree by a single random
//! unexplored action per iteration. Imagined variables carry a *biased*
//! distribution (the preferences), and the evaluation compares posteriors
//! against it.
//!
//! # Architecture
//!
//! ```text
//!   unexplored: [(root, o0), (s3, o3), (s5, o5), ...]
//!        │
//!        ▼ node_selection (root first, then Min | Sampling | SoftmaxSampling on G)
//!   expansion(n) ──► s = Transition(n, B[:, :, a]) ──► o = Transition(s, A)
//!        │                 biased = Cat(state_pref)      biased = Cat(obs_pref)
//!        ▼
//!   evaluation(s, o) ──► propagation(s, root) ──► action_selection(root)
//! ```

use hopi_core::config::AlgoTreeSettings;
use hopi_core::distributions::{dirichlet_expected_log, kl, Distribution};
use hopi_core::{
    ops, BackPropagation, EvaluationType, FactorGraph, HopiError, NodeSelection, Tensor, VarId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone)]
pub struct AlgoTreeConfig {
    pub n_actions: usize,
    /// `None` means the tree may grow without bound.
    pub max_tree_depth: Option<usize>,
    pub node_selection: NodeSelection,
    pub evaluation: EvaluationType,
    pub back_propagation: BackPropagation,
    /// Preferences over hidden states, already normalised.
    pub state_pref: Tensor,
    /// Preferences over observations, already normalised.
    pub obs_pref: Tensor,
}

impl AlgoTreeConfig {
    /// Softmax sampling, double KL, upward propagation and no depth limit.
    pub fn new(n_actions: usize, state_pref: Tensor, obs_pref: Tensor) -> Self {
        Self {
            n_actions,
            max_tree_depth: None,
            node_selection: NodeSelection::SoftmaxSampling,
            evaluation: EvaluationType::DoubleKl,
            back_propagation: BackPropagation::Upward,
            state_pref,
            obs_pref,
        }
    }

    pub fn from_settings(
        n_actions: usize,
        state_pref: Tensor,
        obs_pref: Tensor,
        settings: &AlgoTreeSettings,
    ) -> Self {
        Self {
            max_tree_depth: settings.max_tree_depth,
            node_selection: settings.node_selection,
            evaluation: settings.evaluation,
            back_propagation: settings.back_propagation,
            ..Self::new(n_actions, state_pref, obs_pref)
        }
    }
}

#[derive(Debug)]
pub struct AlgoTree {
    config: AlgoTreeConfig,
    rng: StdRng,
    /// Frontier of nodes that still have unexpanded actions, paired with
    /// their observation child.
    unexplored: Vec<(VarId, Option<VarId>)>,
    root: Option<VarId>,
    last_expansion: Option<(VarId, VarId)>,
}

impl AlgoTree {
    pub fn new(config: AlgoTreeConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            unexplored: Vec::new(),
            root: None,
            last_expansion: None,
        }
    }

    pub fn config(&self) -> &AlgoTreeConfig {
        &self.config
    }

    pub fn unexplored(&self) -> &[(VarId, Option<VarId>)] {
        &self.unexplored
    }

    // -----------------------------------------------------------------------
    // Step 1: node selection
    // -----------------------------------------------------------------------

    /// Pick the next node to expand. The first call registers the graph's
    /// tree root; the root is then returned until all its actions are
    /// expanded. `None` once every frontier node is fully expanded, which a
    /// depth limit makes reachable before the planning budget is spent.
    pub fn node_selection(&mut self, graph: &mut FactorGraph) -> Result<Option<VarId>> {
        if self.unexplored.is_empty() {
            if self.root.is_some() {
                return Ok(None);
            }
            let root = graph.tree_root()?;
            let first_child = graph.child_vars(root)?.first().copied();
            graph.var_mut(root)?.data.cost = 0.0;
            self.unexplored.push((root, first_child));
            self.root = Some(root);
            debug!(%root, "registered tree root");
            return Ok(Some(root));
        }
        if let (Some(root), Some(&(first, _))) = (self.root, self.unexplored.first()) {
            if first == root {
                return Ok(Some(root));
            }
        }

        let costs = self.frontier_costs(graph)?;
        let picked = match self.config.node_selection {
            NodeSelection::Min => costs
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .ok_or(AgentError::NoCandidate("node_selection"))?,
            NodeSelection::Sampling => {
                let worst = costs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mut weights: Vec<f64> = costs.iter().map(|g| worst - g).collect();
                if weights.iter().sum::<f64>() <= 0.0 {
                    weights = vec![1.0; costs.len()];
                }
                ops::sample(&weights, &mut self.rng)?
            }
            NodeSelection::SoftmaxSampling => {
                let weights = ops::softmax(&Tensor::from_vec(costs.iter().map(|g| -g).collect())?)?;
                ops::sample(&weights.to_vec()?, &mut self.rng)?
            }
        };
        Ok(Some(self.unexplored[picked].0))
    }

    fn frontier_costs(&self, graph: &FactorGraph) -> Result<Vec<f64>> {
        if self.unexplored.is_empty() {
            return Err(AgentError::NoCandidate("node_selection"));
        }
        self.unexplored
            .iter()
            .map(|&(s, _)| Ok(graph.var(s)?.data.cost))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Step 2: expansion
    // -----------------------------------------------------------------------

    /// Expand one random unexplored action of `n` with fixed `A`
    /// `[obs, states]` and `B` `[to, from, action]`.
    pub fn expansion(&mut self, graph: &mut FactorGraph, n: VarId, a: &Tensor, b: &Tensor) -> Result<()> {
        let remaining = self.unexplored_actions(graph, n)?;
        let action = remaining[self.rng.gen_range(0..remaining.len())];

        let s = graph.transition(n, b.select(2, action)?)?;
        let o = graph.transition(s, a.clone())?;
        {
            let state = graph.var_mut(s)?;
            state.data.action = Some(action);
            state.set_biased(Distribution::categorical(self.config.state_pref.clone())?);
        }
        graph
            .var_mut(o)?
            .set_biased(Distribution::categorical(self.config.obs_pref.clone())?);
        self.last_expansion = Some((s, o));
        trace!(node = %n, action, state = %s, "expanded");

        if remaining.len() == 1 {
            self.unexplored.retain(|&(u, _)| u != n);
        }
        let depth_ok = match self.config.max_tree_depth {
            None => true,
            Some(max) => self.distance_from_root(graph, s)? < max,
        };
        if depth_ok {
            self.unexplored.push((s, Some(o)));
        }
        Ok(())
    }

    /// Same as [`expansion`](Self::expansion), with `A` and `B` taken as
    /// `exp(E[ln ·])` of learned Dirichlet variables stored `[from, to]` and
    /// `[from, action, to]`.
    pub fn expansion_learned(&mut self, graph: &mut FactorGraph, n: VarId, a: VarId, b: VarId) -> Result<()> {
        let a_param = dirichlet_expected_log(graph.var(a)?.posterior().params())?
            .permute(&[1, 0])?
            .exp()?;
        let b_param = dirichlet_expected_log(graph.var(b)?.posterior().params())?
            .permute(&[2, 0, 1])?
            .exp()?;
        self.expansion(graph, n, &a_param, &b_param)
    }

    /// Actions not yet expanded below `n`.
    pub fn unexplored_actions(&self, graph: &FactorGraph, n: VarId) -> Result<Vec<usize>> {
        let mut taken = vec![false; self.config.n_actions];
        for child in graph.child_vars(n)? {
            if let Some(action) = graph.var(child)?.data.action {
                if let Some(slot) = taken.get_mut(action) {
                    *slot = true;
                }
            }
        }
        let remaining: Vec<usize> = (0..self.config.n_actions).filter(|&a| !taken[a]).collect();
        if remaining.is_empty() {
            return Err(AgentError::NoUnexploredAction(n));
        }
        Ok(remaining)
    }

    /// The `[state, observation]` pair created by the last expansion.
    pub fn last_expanded_nodes(&self) -> Vec<VarId> {
        self.last_expansion.map(|(s, o)| vec![s, o]).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Step 3: evaluation
    // -----------------------------------------------------------------------

    /// Score the last expanded pair and store the result as the state's `G`.
    pub fn evaluation(&self, graph: &mut FactorGraph) -> Result<f64> {
        let (s, o) = self.last_expansion.ok_or(AgentError::NoCandidate("evaluation"))?;
        let g = {
            let state = graph.var(s)?;
            let obs = graph.var(o)?;
            let obs_biased = obs
                .biased()
                .ok_or(HopiError::MissingDistribution { var: o, what: "biased" })?;
            let risk = kl(obs.posterior(), obs_biased)?;
            match self.config.evaluation {
                EvaluationType::DoubleKl => {
                    let state_biased = state
                        .biased()
                        .ok_or(HopiError::MissingDistribution { var: s, what: "biased" })?;
                    risk + kl(state.posterior(), state_biased)?
                }
                EvaluationType::Efe => {
                    let likelihood = obs
                        .prior()
                        .ok_or(HopiError::MissingDistribution { var: o, what: "prior" })?;
                    risk + ops::ambiguity(likelihood.params(), state.posterior().params())?
                }
            }
        };
        graph.var_mut(s)?.data.cost = g;
        Ok(g)
    }

    // -----------------------------------------------------------------------
    // Step 4: propagation
    // -----------------------------------------------------------------------

    /// Count a visit on every node from `node` up to `root`, moving costs
    /// according to the configured back-propagation rule.
    pub fn propagation(&self, graph: &mut FactorGraph, node: VarId, root: VarId) -> Result<()> {
        if self.config.back_propagation == BackPropagation::Downward && node != root {
            if let Some(parent) = graph.parent_var(node)? {
                let parent_g = graph.var(parent)?.data.cost;
                graph.var_mut(node)?.data.cost += parent_g;
            }
        }

        let mut current = node;
        while current != root {
            graph.var_mut(current)?.data.visits += 1;
            let parent = graph
                .parent_var(current)?
                .ok_or(AgentError::NoCandidate("propagation"))?;
            if self.config.back_propagation == BackPropagation::Upward {
                let g = graph.var(current)?.data.cost;
                graph.var_mut(parent)?.data.cost += g;
            }
            current = parent;
        }
        graph.var_mut(root)?.data.visits += 1;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step 5: action selection
    // -----------------------------------------------------------------------

    /// Most visited hidden child of `root`, ties broken by the lowest `G`.
    pub fn action_selection(&self, graph: &FactorGraph, root: VarId) -> Result<usize> {
        let mut best: Option<(usize, u32, f64)> = None;
        for child in graph.child_vars(root)? {
            let var = graph.var(child)?;
            if !var.is_hidden() {
                continue;
            }
            let Some(action) = var.data.action else { continue };
            let (n, g) = (var.data.visits, var.data.cost);
            let better = match best {
                None => true,
                Some((_, best_n, best_g)) => n > best_n || (n == best_n && g < best_g),
            };
            if better {
                best = Some((action, n, g));
            }
        }
        best.map(|(a, _, _)| a)
            .ok_or(AgentError::NoCandidate("action_selection"))
    }

    /// Number of transitions between `n` and the registered root.
    pub fn distance_from_root(&self, graph: &FactorGraph, n: VarId) -> Result<usize> {
        let root = self.root.ok_or(HopiError::NoTreeRoot)?;
        let mut depth = 0;
        let mut current = n;
        while current != root {
            current = graph
                .parent_var(current)?
                .ok_or(AgentError::NoCandidate("distance_from_root"))?;
            depth += 1;
        }
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopi_core::VarKind;
    use pretty_assertions::assert_eq;

    fn model() -> (FactorGraph, VarId, Tensor, Tensor) {
        let mut g = FactorGraph::new();
        let a = Tensor::matrix(&[&[0.9, 0.1], &[0.1, 0.9]]).unwrap();
        let mut b = Tensor::full(&[2, 2, 2], 0.1).unwrap();
        for from in 0..2 {
            b.set(&[0, from, 0], 0.9).unwrap();
            b.set(&[1, from, 1], 0.9).unwrap();
        }
        let s = g.categorical(Tensor::from_vec(vec![0.5, 0.5]).unwrap()).unwrap();
        let o = g.transition(s, a.clone()).unwrap();
        g.observe(o, Tensor::from_vec(vec![1.0, 0.0]).unwrap()).unwrap();
        g.set_tree_root(s).unwrap();
        (g, s, a, b)
    }

    fn tree() -> AlgoTree {
        let pref = Tensor::from_vec(vec![0.9, 0.1]).unwrap();
        AlgoTree::new(AlgoTreeConfig::new(2, pref.clone(), pref), 7)
    }

    #[test]
    fn root_is_selected_until_fully_expanded() {
        let (mut g, root, a, b) = model();
        let mut algo = tree();

        assert_eq!(algo.node_selection(&mut g).unwrap(), Some(root));
        algo.expansion(&mut g, root, &a, &b).unwrap();
        assert_eq!(algo.node_selection(&mut g).unwrap(), Some(root));
        algo.expansion(&mut g, root, &a, &b).unwrap();

        assert!(algo.unexplored().iter().all(|&(s, _)| s != root));
        assert_eq!(algo.unexplored().len(), 2);
        assert!(matches!(
            algo.expansion(&mut g, root, &a, &b),
            Err(AgentError::NoUnexploredAction(v)) if v == root
        ));
    }

    #[test]
    fn expansion_sets_biased_distributions() {
        let (mut g, root, a, b) = model();
        let mut algo = tree();
        algo.node_selection(&mut g).unwrap();
        algo.expansion(&mut g, root, &a, &b).unwrap();

        let nodes = algo.last_expanded_nodes();
        assert_eq!(nodes.len(), 2);
        assert!(g.var(nodes[0]).unwrap().biased().is_some());
        assert_eq!(g.var(nodes[1]).unwrap().kind(), VarKind::Hidden);
        assert!(algo.evaluation(&mut g).unwrap() >= 0.0);
    }

    #[test]
    fn depth_limit_keeps_leaves_off_the_frontier() {
        let (mut g, root, a, b) = model();
        let pref = Tensor::from_vec(vec![0.5, 0.5]).unwrap();
        let mut config = AlgoTreeConfig::new(2, pref.clone(), pref);
        config.max_tree_depth = Some(1);
        let mut algo = AlgoTree::new(config, 1);

        algo.node_selection(&mut g).unwrap();
        algo.expansion(&mut g, root, &a, &b).unwrap();
        assert_eq!(algo.unexplored().len(), 1);
    }

    #[test]
    fn exhausted_frontier_selects_nothing() {
        let (mut g, root, a, b) = model();
        let pref = Tensor::from_vec(vec![0.5, 0.5]).unwrap();
        let mut config = AlgoTreeConfig::new(2, pref.clone(), pref);
        config.max_tree_depth = Some(1);
        let mut algo = AlgoTree::new(config, 1);

        for _ in 0..2 {
            let n = algo.node_selection(&mut g).unwrap().unwrap();
            algo.expansion(&mut g, n, &a, &b).unwrap();
        }

        assert!(algo.unexplored().is_empty());
        assert_eq!(algo.node_selection(&mut g).unwrap(), None);
        // the root is not registered a second time
        assert!(algo.unexplored().is_empty());
        assert_eq!(g.action_children(root).unwrap().len(), 2);
    }

    #[test]
    fn upward_propagation_accumulates_costs() {
        let (mut g, root, a, b) = model();
        let mut algo = tree();
        algo.node_selection(&mut g).unwrap();
        algo.expansion(&mut g, root, &a, &b).unwrap();
        let s = algo.last_expanded_nodes()[0];
        g.var_mut(s).unwrap().data.cost = 2.5;

        algo.propagation(&mut g, s, root).unwrap();

        assert_eq!(g.var(s).unwrap().data.visits, 1);
        assert_eq!(g.var(root).unwrap().data.visits, 1);
        assert_eq!(g.var(root).unwrap().data.cost, 2.5);
    }

    #[test]
    fn action_selection_prefers_visits_then_cost() {
        let (mut g, root, a, b) = model();
        let mut algo = tree();
        algo.node_selection(&mut g).unwrap();
        algo.expansion(&mut g, root, &a, &b).unwrap();
        algo.expansion(&mut g, root, &a, &b).unwrap();
        for child in g.action_children(root).unwrap() {
            let data = &mut g.var_mut(child).unwrap().data;
            data.visits = 3;
            data.cost = if data.action == Some(1) { 0.5 } else { 1.5 };
        }
        assert_eq!(algo.action_selection(&g, root).unwrap(), 1);
    }
}
