//! hopi-envs — environments an active inference agent can act in.
//!
//! Every environment exposes both its *dynamics* (`reset`, `execute`) and
//! the *true generative model* an agent can be seeded with:
//!
//! | method | shape | meaning |
//! |--------|-------|---------|
//! | [`Environment::a`] | `[observations, states]` | likelihood of observations |
//! | [`Environment::b`] | `[states, states, actions]` | `B[to, from, action]` |
//! | [`Environment::d`] | `[states]` | initial state prior |
//!
//! Observations are returned as one-hot vectors over
//! [`Environment::observations`].

pub mod error;
pub mod frozen_lake;
pub mod graph;
pub mod grid;
pub mod maze;

pub use error::{EnvError, Result};
pub use frozen_lake::FrozenLakeEnv;
pub use graph::GraphEnv;
pub use maze::MazeEnv;

use hopi_core::{ops, Tensor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvKind {
    Maze,
    Graph,
    FrozenLake,
}

impl std::fmt::Display for EnvKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvKind::Maze => write!(f, "maze"),
            EnvKind::Graph => write!(f, "graph"),
            EnvKind::FrozenLake => write!(f, "frozen_lake"),
        }
    }
}

pub trait Environment {
    /// Put the agent back at its starting point and return the first
    /// observation.
    fn reset(&mut self) -> Result<Tensor>;

    /// Perform `action` and return the resulting observation.
    fn execute(&mut self, action: usize) -> Result<Tensor>;

    /// Human-readable picture of the current state.
    fn render(&self) -> String;

    fn actions(&self) -> usize;
    fn states(&self) -> usize;
    fn observations(&self) -> usize;

    fn a(&self) -> Result<Tensor>;
    fn b(&self) -> Result<Tensor>;
    fn d(&self) -> Result<Tensor>;

    /// Unnormalised preferences over hidden states.
    fn pref_states(&self) -> Result<Tensor> {
        Ok(ops::uniform_vec(self.states())?)
    }

    /// Unnormalised preferences over observations (higher is better).
    fn pref_obs(&self) -> Result<Tensor>;

    fn solved(&self) -> bool;

    fn kind(&self) -> EnvKind;

    /// Running score, for environments that keep one.
    fn score(&self) -> Option<f64> {
        None
    }
}

/// Tensor filled with `noise / (shape[0] - 1)`: the off-target mass of a
/// column whose target entry holds `1 - noise`.
pub(crate) fn noisy_background(shape: &[usize], noise: f64) -> Result<Tensor> {
    let spread = *shape.first().unwrap_or(&0);
    if spread < 2 {
        return Err(EnvError::Invalid(format!(
            "need at least two values along the first axis, got shape {shape:?}"
        )));
    }
    Ok(Tensor::full(shape, noise / (spread - 1) as f64)?)
}

pub(crate) fn check_action(action: usize, n_actions: usize) -> Result<()> {
    if action < n_actions {
        Ok(())
    } else {
        Err(EnvError::InvalidAction { action, n_actions })
    }
}
