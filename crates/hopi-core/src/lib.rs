//! hopi-core — generative models for branching-time active inference.
//!
//! This crate holds everything an agent needs to *represent* and *update*
//! beliefs: a small dense tensor type, the categorical and Dirichlet
//! distributions built on it, a factor graph that owns variable and factor
//! nodes, and variational message passing over that graph.
//!
//! # Architecture
//!
//! ```text
//! Tensor ──► ops ──► Distribution ──► VarNode / Factor ──► FactorGraph
//!                                                             │
//!                                          Vmp::run ◄─────────┤
//!                                     write_graphviz ◄────────┘
//! ```
//!
//! Planning and environments live in `hopi-agents` and `hopi-envs`; both
//! speak to the graph only through [`FactorGraph`] and the [`VarId`] /
//! [`FactorId`] handles it hands out.

pub mod config;
pub mod distributions;
pub mod error;
pub mod factors;
pub mod graph;
pub mod graphviz;
pub mod inference;
pub mod nodes;
pub mod ops;
pub mod tensor;
pub mod types;

pub use config::Config;
pub use distributions::{Distribution, DistributionKind};
pub use error::{HopiError, Result};
pub use factors::{Factor, FactorKind};
pub use graph::{FactorGraph, Param};
pub use graphviz::{write_graphviz, NodeAttr};
pub use inference::{Vmp, VmpReport};
pub use nodes::{NodeData, VarNode};
pub use tensor::Tensor;
pub use types::{BackPropagation, EvaluationType, FactorId, NodeSelection, VarId, VarKind};
