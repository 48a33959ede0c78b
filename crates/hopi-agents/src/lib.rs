//! hopi-agents — planners and agents that act in a [`hopi_envs::Environment`].
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────── Agent::step ───────────────┐
//!   │ VMP(graph) ─► plan ─► action ─► execute  │
//!   │                 │                  │     │
//!   │      Mcts | AlgoTree          integrate  │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! | agent | planner | model |
//! |-------|---------|-------|
//! | [`Btai`] | [`Mcts`] | environment `A`, `B`, `D` |
//! | [`TreeAgent`] | [`AlgoTree`] | environment model, or learned Dirichlet counts |
//! | [`Human`] | none | none |

pub mod algo_tree;
pub mod btai;
pub mod error;
pub mod human;
pub mod mcts;
pub mod tree_agent;

pub use algo_tree::{AlgoTree, AlgoTreeConfig};
pub use btai::Btai;
pub use error::{AgentError, Result};
pub use human::Human;
pub use mcts::{Mcts, MctsConfig};
pub use tree_agent::TreeAgent;

use hopi_core::{FactorGraph, HopiError, Tensor, VarId};
use hopi_envs::Environment;
use serde::Serialize;

/// What happened during one action-perception cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepOutcome {
    pub action: usize,
    /// Index of the observation received after acting.
    pub observation: usize,
    /// Free energy of the model before planning, for agents that keep one.
    pub vfe: Option<f64>,
}

pub trait Agent {
    /// Run one action-perception cycle in `env`.
    fn step(&mut self, env: &mut dyn Environment) -> Result<StepOutcome>;

    /// Start a new trial from the first observation `obs` of a freshly
    /// reset environment. Agents that learn carry their posterior counts
    /// over as the priors of the new model.
    fn start_trial(&mut self, _obs: &Tensor) -> Result<()> {
        Ok(())
    }

    /// The agent's generative model, if it has one.
    fn graph(&self) -> Option<&FactorGraph> {
        None
    }

    fn graph_mut(&mut self) -> Option<&mut FactorGraph> {
        None
    }

    fn name(&self) -> &'static str;
}

pub(crate) fn observation_index(obs: &Tensor) -> Result<usize> {
    Ok(obs.argmax()?.ok_or(HopiError::InvalidRank {
        op: "observation_index",
        rank: obs.rank(),
    })?)
}

/// Clamp `o0` to `obs`, name the first slice and make `s0` the tree root.
pub(crate) fn root_slice(graph: &mut FactorGraph, s0: VarId, o0: VarId, obs: &Tensor) -> Result<()> {
    graph.observe(o0, obs.clone())?;
    graph.var_mut(s0)?.set_name("s0");
    graph.var_mut(o0)?.set_name("o0");
    graph.set_tree_root(s0)?;
    Ok(())
}

/// Name the state and observation of the slice integrated at cycle `t`,
/// so evidence files and Graphviz output can refer to them.
pub(crate) fn name_slice(graph: &mut FactorGraph, state: VarId, t: usize) -> Result<()> {
    graph.var_mut(state)?.set_name(format!("s{t}"));
    if let Some(&obs) = graph.child_vars(state)?.first() {
        graph.var_mut(obs)?.set_name(format!("o{t}"));
    }
    Ok(())
}
