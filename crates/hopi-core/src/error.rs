//! Error types for hopi-core.
//!
//! Every fallible operation in the crate returns [`Result`]. Shape and rank
//! problems carry the operation name so that a failure deep inside message
//! passing still points at the tensor op that rejected its input.

use crate::distributions::DistributionKind;
use crate::types::{FactorId, VarId};
use thiserror::Error;

/// Errors raised by tensor maths, distributions and the factor graph.
#[derive(Debug, Error)]
pub enum HopiError {
    /// Two tensors that must agree in shape do not.
    #[error("{op}: shape mismatch, expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor has a rank the operation cannot handle.
    #[error("{op}: unsupported rank {rank}")]
    InvalidRank { op: &'static str, rank: usize },

    /// An axis or element index is out of bounds.
    #[error("{op}: index {index} out of range for length {len}")]
    IndexOutOfRange {
        op: &'static str,
        index: usize,
        len: usize,
    },

    /// A function defined on strictly positive reals received `value`.
    #[error("{op}: input must be strictly positive, got {value}")]
    NonPositive { op: &'static str, value: f64 },

    /// Sampling weights are empty, negative or sum to zero.
    #[error("invalid sampling weights: {0}")]
    InvalidWeights(String),

    /// The distribution kind does not support the requested operation.
    #[error("{op} is not supported for {kind} distributions")]
    Unsupported {
        op: &'static str,
        kind: DistributionKind,
    },

    /// Two distributions must be of the same kind (e.g. for a KL divergence).
    #[error("distribution kinds differ: {left} vs {right}")]
    KindMismatch {
        left: DistributionKind,
        right: DistributionKind,
    },

    #[error("unknown variable {0}")]
    UnknownVar(VarId),

    #[error("unknown factor {0}")]
    UnknownFactor(FactorId),

    /// A factor was asked for a message towards a variable it does not touch.
    #[error("factor {factor} is not connected to variable {var}")]
    NotAdjacent { factor: FactorId, var: VarId },

    /// A variable is missing a distribution required by the operation.
    #[error("variable {var} has no {what}")]
    MissingDistribution { var: VarId, what: &'static str },

    #[error("factor graph has no tree root")]
    NoTreeRoot,

    /// A line of an evidence file could not be parsed.
    #[error("invalid evidence in {source_name} at line {line}: {reason}")]
    InvalidEvidence {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// The tensor backend rejected an operation.
    #[error("tensor backend: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout hopi-core.
pub type Result<T> = std::result::Result<T, HopiError>;
