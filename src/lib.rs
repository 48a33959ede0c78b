//! hopi — active inference agents.
//!
//! The workspace is split along the same lines as the runtime data flow:
//!
//! # Architecture
//!
//! ```text
//!   hopi-envs ──A, B, D, pref──► hopi-agents ──► hopi-core
//!   (Maze, Graph, FrozenLake)    (Btai, TreeAgent)  (FactorGraph, Vmp)
//!        ▲                            │
//!        └──── execute(action) ◄──────┘        episode::run_trials
//! ```
//!
//! This crate re-exports the three library crates and adds the episode
//! runner and the agent factory the `hopi` binary is built on.

pub mod episode;

pub use hopi_agents as agents;
pub use hopi_core as core;
pub use hopi_envs as envs;

pub use episode::{run_episode, run_trials, EpisodeReport};

use std::path::Path;

use hopi_agents::{Agent, Btai, Human, MctsConfig, TreeAgent};
use hopi_core::{Config, Tensor, Vmp};
use hopi_envs::{EnvError, EnvKind, Environment, FrozenLakeEnv, GraphEnv, MazeEnv};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Branching-time active inference with MCTS.
    Btai,
    /// AlgoTree planning with the environment's model.
    Tree,
    /// AlgoTree planning with Dirichlet parameters learned online.
    TreeLearning,
    /// Actions read from stdin.
    Human,
}

/// Build an environment. Maze and frozen lake need a grid file; the graph
/// environment takes its layout from `graph_paths` (`n_good = len`).
pub fn make_env(
    kind: EnvKind,
    file: Option<&Path>,
    graph_paths: &[usize],
    n_bad: usize,
) -> hopi_envs::Result<Box<dyn Environment>> {
    let need_file = || {
        file.ok_or_else(|| EnvError::Invalid(format!("the {kind} environment needs a grid file")))
    };
    Ok(match kind {
        EnvKind::Maze => Box::new(MazeEnv::from_file(need_file()?)?),
        EnvKind::FrozenLake => Box::new(FrozenLakeEnv::from_file(need_file()?)?),
        EnvKind::Graph => Box::new(GraphEnv::new(graph_paths.len(), n_bad, graph_paths)?),
    })
}

/// Build an agent for `env` from its first observation `obs`.
pub fn make_agent(
    kind: AgentKind,
    env: &dyn Environment,
    obs: &Tensor,
    config: &Config,
    seed: u64,
) -> hopi_agents::Result<Box<dyn Agent>> {
    let vmp = Vmp::from(&config.inference);
    Ok(match kind {
        AgentKind::Btai => {
            let mcts = MctsConfig::new(&env.pref_obs()?, &env.pref_states()?, &config.mcts)?;
            Box::new(Btai::new(env, obs, mcts, vmp, seed)?)
        }
        AgentKind::Tree => Box::new(TreeAgent::new(env, obs, config.algo_tree.clone(), vmp, seed)?),
        AgentKind::TreeLearning => {
            Box::new(TreeAgent::learning(env, obs, config.algo_tree.clone(), vmp, seed)?)
        }
        AgentKind::Human => Box::new(Human::new(std::io::stdin().lock(), std::io::stderr())),
    })
}
