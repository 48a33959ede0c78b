//! Error types for hopi-agents.

use hopi_core::{HopiError, VarId};
use hopi_envs::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] HopiError),

    #[error(transparent)]
    Env(#[from] EnvError),

    /// Every action below this node has already been expanded.
    #[error("node {0} has no unexplored action")]
    NoUnexploredAction(VarId),

    /// A planner step needs at least one candidate node or action.
    #[error("{0}: nothing to choose from")]
    NoCandidate(&'static str),

    /// The operation needs a generative model the agent does not keep.
    #[error("the {0} agent has no generative model")]
    NoModel(&'static str),

    /// The human agent could not read an action.
    #[error("invalid action input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
