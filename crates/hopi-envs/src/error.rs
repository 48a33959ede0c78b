//! Error types for hopi-envs.

use hopi_core::HopiError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("could not open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A grid file line could not be parsed.
    #[error("invalid grid in {source_name} at line {line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// A required cell (start, exit, goal) is absent from the grid.
    #[error("{source_name} has no '{cell}' cell")]
    MissingCell { source_name: String, cell: char },

    #[error("invalid action {action}, environment has {n_actions} actions")]
    InvalidAction { action: usize, n_actions: usize },

    /// Environment parameters are inconsistent.
    #[error("invalid environment: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] HopiError),
}

pub type Result<T> = std::result::Result<T, EnvError>;
