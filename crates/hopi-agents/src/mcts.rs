//! Monte Carlo tree search over imagined futures.
//!
//! # Architecture
//!
//! ```text
//!             select_node ──► expansion ──► (VMP) ──► evaluation ──► propagation
//!                 ▲                                                     │
//!                 └─────────────────── planning_steps ──────────────────┘
//!                                                                      │
//!                                                         select_action(root)
//! ```
//!
//! Each expansion adds, for every action `a`, an imagined state
//! `s_a ~ Cat(B[:, :, a] · node)` and its observation `o_a ~ Cat(A · s_a)`.
//! The pair is scored and the best child's cost is pushed up to the root.

use hopi_core::config::MctsSettings;
use hopi_core::{ops, EvaluationType, FactorGraph, HopiError, Tensor, VarId};
use rand::Rng;
use tracing::trace;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// `softmax(pref_obs · pref_precision)`.
    pub obs_pref: Tensor,
    /// `softmax(pref_states · pref_precision)`.
    pub state_pref: Tensor,
    pub planning_steps: usize,
    pub exploration_constant: f64,
    pub pref_precision: f64,
    pub action_precision: f64,
    pub evaluation: EvaluationType,
}

impl MctsConfig {
    /// Normalise raw preferences with the configured precision.
    pub fn new(obs_pref: &Tensor, state_pref: &Tensor, settings: &MctsSettings) -> Result<Self> {
        Ok(Self {
            obs_pref: ops::softmax(&obs_pref.scale(settings.pref_precision)?)?,
            state_pref: ops::softmax(&state_pref.scale(settings.pref_precision)?)?,
            planning_steps: settings.planning_steps,
            exploration_constant: settings.exploration_constant,
            pref_precision: settings.pref_precision,
            action_precision: settings.action_precision,
            evaluation: settings.evaluation,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Mcts {
    config: MctsConfig,
}

impl Mcts {
    pub fn new(config: MctsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    /// Walk down from `root` while the current node is fully expanded,
    /// following the child with the highest UCT score.
    pub fn select_node(&self, graph: &FactorGraph, root: VarId, n_actions: usize) -> Result<VarId> {
        let mut current = root;
        loop {
            let children = graph.action_children(current)?;
            if children.len() != n_actions || children.is_empty() {
                return Ok(current);
            }
            let parent_visits = graph.var(current)?.data.visits;
            let mut best: Option<(VarId, f64)> = None;
            for child in children {
                let score = self.uct(graph, child, parent_visits)?;
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((child, score));
                }
            }
            current = best.map(|(c, _)| c).ok_or(AgentError::NoCandidate("select_node"))?;
        }
    }

    /// `−G/N + c · sqrt(ln N_parent / N)`.
    fn uct(&self, graph: &FactorGraph, node: VarId, parent_visits: u32) -> Result<f64> {
        let data = &graph.var(node)?.data;
        let n = f64::from(data.visits);
        let exploration = (f64::from(parent_visits).ln() / n).sqrt();
        Ok(-data.cost / n + self.config.exploration_constant * exploration)
    }

    /// Expand every action below `node`. Returns `[s0, o0, s1, o1, ...]`.
    pub fn expansion(&self, graph: &mut FactorGraph, node: VarId, a: &Tensor, b: &Tensor) -> Result<Vec<VarId>> {
        let n_actions = b.shape().get(2).copied().ok_or(HopiError::InvalidRank {
            op: "Mcts::expansion",
            rank: b.rank(),
        })?;

        let mut expanded = Vec::with_capacity(2 * n_actions);
        for action in 0..n_actions {
            let s = graph.transition(node, b.select(2, action)?)?;
            let data = &mut graph.var_mut(s)?.data;
            data.action = Some(action);
            data.cost = 0.0;
            data.visits = 1;
            let o = graph.transition(s, a.clone())?;
            expanded.push(s);
            expanded.push(o);
        }
        Ok(expanded)
    }

    /// Score each `(state, observation)` pair of `nodes` and store the result
    /// as the state's cost.
    pub fn evaluation(&self, graph: &mut FactorGraph, nodes: &[VarId], a: &Tensor) -> Result<()> {
        for pair in nodes.chunks_exact(2) {
            let (s, o) = (pair[0], pair[1]);
            let s_post = graph.var(s)?.posterior().params();
            let o_post = graph.var(o)?.posterior().params();
            let cost = match self.config.evaluation {
                EvaluationType::Efe => efe(s_post, o_post, a, &self.config.obs_pref)?,
                EvaluationType::DoubleKl => {
                    double_kl(s_post, o_post, &self.config.state_pref, &self.config.obs_pref)?
                }
            };
            trace!(state = %s, cost, "evaluated imagined state");
            graph.var_mut(s)?.data.cost = cost;
        }
        Ok(())
    }

    /// Add the cost of the best expanded state to every ancestor, from its
    /// parent up to and including `root`, and count a visit for each.
    pub fn propagation(&self, graph: &mut FactorGraph, nodes: &[VarId], root: VarId) -> Result<()> {
        let mut best: Option<(VarId, f64)> = None;
        for &node in nodes {
            let data = &graph.var(node)?.data;
            if data.action.is_some() && best.map_or(true, |(_, c)| data.cost < c) {
                best = Some((node, data.cost));
            }
        }
        let (best, cost) = best.ok_or(AgentError::NoCandidate("propagation"))?;

        let mut current = graph.parent_var(best)?;
        while let Some(node) = current {
            let data = &mut graph.var_mut(node)?.data;
            data.cost += cost;
            data.visits += 1;
            if node == root {
                break;
            }
            current = graph.parent_var(node)?;
        }
        Ok(())
    }

    /// Sample an action from `softmax(−γ · G / N)` over the root's children.
    pub fn select_action<R: Rng + ?Sized>(&self, graph: &FactorGraph, root: VarId, rng: &mut R) -> Result<usize> {
        let mut actions = Vec::new();
        let mut scores = Vec::new();
        for child in graph.action_children(root)? {
            let data = &graph.var(child)?.data;
            if let Some(action) = data.action {
                actions.push(action);
                scores.push(-self.config.action_precision * data.cost / f64::from(data.visits.max(1)));
            }
        }
        if actions.is_empty() {
            return Err(AgentError::NoCandidate("select_action"));
        }
        let weights = ops::softmax(&Tensor::from_vec(scores)?)?;
        let picked = ops::sample(&weights.to_vec()?, rng)?;
        Ok(actions[picked])
    }
}

/// Risk over observations plus ambiguity.
pub fn efe(s: &Tensor, o: &Tensor, a: &Tensor, obs_pref: &Tensor) -> Result<f64> {
    Ok(ops::kl_categorical(o, obs_pref)? + ops::ambiguity(a, s)?)
}

/// Risk over observations plus risk over states.
pub fn double_kl(s: &Tensor, o: &Tensor, state_pref: &Tensor, obs_pref: &Tensor) -> Result<f64> {
    Ok(ops::kl_categorical(o, obs_pref)? + ops::kl_categorical(s, state_pref)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopi_core::config::Config;

    fn config() -> MctsConfig {
        MctsConfig::new(
            &Tensor::from_vec(vec![0.0, 0.0]).unwrap(),
            &Tensor::from_vec(vec![0.0, 0.0]).unwrap(),
            &Config::defaults().mcts,
        )
        .unwrap()
    }

    fn root_graph() -> (FactorGraph, VarId) {
        let mut g = FactorGraph::new();
        let s = g.categorical(Tensor::from_vec(vec![0.5, 0.5]).unwrap()).unwrap();
        g.set_tree_root(s).unwrap();
        (g, s)
    }

    #[test]
    fn expansion_creates_state_observation_pairs() {
        let (mut g, root) = root_graph();
        let a = Tensor::full(&[2, 2], 0.5).unwrap();
        let b = Tensor::full(&[2, 2, 3], 0.5).unwrap();
        let nodes = Mcts::new(config()).expansion(&mut g, root, &a, &b).unwrap();

        assert_eq!(nodes.len(), 6);
        assert_eq!(g.action_children(root).unwrap(), vec![nodes[0], nodes[2], nodes[4]]);
        assert_eq!(g.var(nodes[2]).unwrap().data.action, Some(1));
        assert_eq!(g.var(nodes[2]).unwrap().data.visits, 1);
        assert_eq!(g.var(nodes[3]).unwrap().data.action, None);
    }

    #[test]
    fn propagation_stops_at_root() {
        let (mut g, root) = root_graph();
        let mcts = Mcts::new(config());
        let a = Tensor::full(&[2, 2], 0.5).unwrap();
        let b = Tensor::full(&[2, 2, 2], 0.5).unwrap();
        let first = mcts.expansion(&mut g, root, &a, &b).unwrap();
        let second = mcts.expansion(&mut g, first[0], &a, &b).unwrap();
        g.var_mut(second[0]).unwrap().data.cost = 3.0;
        g.var_mut(second[2]).unwrap().data.cost = 1.0;

        mcts.propagation(&mut g, &second, first[0]).unwrap();

        assert_eq!(g.var(first[0]).unwrap().data.cost, 1.0);
        assert_eq!(g.var(first[0]).unwrap().data.visits, 2);
        assert_eq!(g.var(root).unwrap().data.visits, 0);
    }
}
