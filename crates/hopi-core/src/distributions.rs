//! Probability distributions attached to variable nodes.
//!
//! A variable carries up to three of these: a *prior* (the parameters of its
//! parent factor when they are fixed), a *posterior* (the variational
//! approximation updated by message passing) and an optional *biased*
//! distribution (a prior preference used when scoring imagined futures).
//!
//! Parameter layouts:
//!
//! | kind | rank | layout |
//! |------|------|--------|
//! | Categorical | 1 | `[outcome]` |
//! | Transition | 2 | `[to, from]` |
//! | ActiveTransition | 3 | `[to, from, action]` |
//! | Dirichlet | 1–3 | pseudo-counts, the last axis is the simplex |

use crate::error::{HopiError, Result};
use crate::ops;
use crate::tensor::Tensor;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DistributionKind {
    Categorical,
    Transition,
    ActiveTransition,
    Dirichlet,
}

impl std::fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionKind::Categorical => write!(f, "categorical"),
            DistributionKind::Transition => write!(f, "transition"),
            DistributionKind::ActiveTransition => write!(f, "active transition"),
            DistributionKind::Dirichlet => write!(f, "dirichlet"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Categorical(Tensor),
    Transition(Tensor),
    ActiveTransition(Tensor),
    Dirichlet(Tensor),
}

fn require_rank(params: &Tensor, op: &'static str, allowed: &[usize]) -> Result<()> {
    if allowed.contains(&params.rank()) {
        Ok(())
    } else {
        Err(HopiError::InvalidRank {
            op,
            rank: params.rank(),
        })
    }
}

impl Distribution {
    pub fn categorical(params: Tensor) -> Result<Self> {
        require_rank(&params, "Distribution::categorical", &[1])?;
        Ok(Distribution::Categorical(params))
    }

    pub fn transition(params: Tensor) -> Result<Self> {
        require_rank(&params, "Distribution::transition", &[2])?;
        Ok(Distribution::Transition(params))
    }

    pub fn active_transition(params: Tensor) -> Result<Self> {
        require_rank(&params, "Distribution::active_transition", &[3])?;
        Ok(Distribution::ActiveTransition(params))
    }

    pub fn dirichlet(params: Tensor) -> Result<Self> {
        require_rank(&params, "Distribution::dirichlet", &[1, 2, 3])?;
        Ok(Distribution::Dirichlet(params))
    }

    pub fn kind(&self) -> DistributionKind {
        match self {
            Distribution::Categorical(_) => DistributionKind::Categorical,
            Distribution::Transition(_) => DistributionKind::Transition,
            Distribution::ActiveTransition(_) => DistributionKind::ActiveTransition,
            Distribution::Dirichlet(_) => DistributionKind::Dirichlet,
        }
    }

    pub fn params(&self) -> &Tensor {
        match self {
            Distribution::Categorical(p)
            | Distribution::Transition(p)
            | Distribution::ActiveTransition(p)
            | Distribution::Dirichlet(p) => p,
        }
    }

    pub fn log_params(&self) -> Result<Tensor> {
        self.params().ln()
    }

    /// Replace the parameters from an accumulated message.
    ///
    /// Categorical posteriors normalise the message with a softmax; Dirichlet
    /// posteriors take the message as their new pseudo-counts. Transition
    /// kinds are fixed and refuse updates.
    pub fn update(&mut self, message: Tensor) -> Result<()> {
        match self {
            Distribution::Categorical(p) => {
                require_rank(&message, "Categorical::update", &[1])?;
                *p = ops::softmax(&message)?;
                Ok(())
            }
            Distribution::Dirichlet(p) => {
                if p.shape() != message.shape() {
                    return Err(HopiError::ShapeMismatch {
                        op: "Dirichlet::update",
                        expected: p.shape().to_vec(),
                        actual: message.shape().to_vec(),
                    });
                }
                *p = message;
                Ok(())
            }
            other => Err(HopiError::Unsupported {
                op: "update",
                kind: other.kind(),
            }),
        }
    }

    pub fn entropy(&self) -> Result<f64> {
        match self {
            Distribution::Categorical(p) => Ok(-p
                .to_vec()?
                .into_iter()
                .filter(|x| *x != 0.0)
                .map(|x| x * x.ln())
                .sum::<f64>()),
            Distribution::Dirichlet(p) => p
                .last_axis_fibers()?
                .iter()
                .map(|fiber| dirichlet_entropy(fiber))
                .sum::<Result<f64>>(),
            other => Err(HopiError::Unsupported {
                op: "entropy",
                kind: other.kind(),
            }),
        }
    }
}

/// Entropy of a single Dirichlet with pseudo-counts `p`.
pub fn dirichlet_entropy(p: &[f64]) -> Result<f64> {
    let sum: f64 = p.iter().sum();
    let mut acc = 0.0;
    for &pk in p {
        acc += (pk - 1.0) * ops::digamma(pk)?;
    }
    Ok(ops::log_beta(p) + (sum - p.len() as f64) * ops::digamma(sum)? - acc)
}

/// `E[ln x]` under `Dir(p)`, fiber-wise along the last axis:
/// `ψ(p_k) − ψ(Σ_k p_k)`.
pub fn dirichlet_expected_log(p: &Tensor) -> Result<Tensor> {
    p.try_map_fibers(|fiber| {
        let psi_sum = ops::digamma(fiber.iter().sum())?;
        fiber
            .iter()
            .map(|&pk| -> Result<f64> { Ok(ops::digamma(pk)? - psi_sum) })
            .collect()
    })
}

/// `KL(d1 ‖ d2)` for two categorical or two Dirichlet distributions.
pub fn kl(d1: &Distribution, d2: &Distribution) -> Result<f64> {
    match (d1, d2) {
        (Distribution::Categorical(p), Distribution::Categorical(q)) => ops::kl_categorical(p, q),
        (Distribution::Dirichlet(p), Distribution::Dirichlet(q)) => ops::kl_dirichlet(p, q),
        _ if d1.kind() != d2.kind() => Err(HopiError::KindMismatch {
            left: d1.kind(),
            right: d2.kind(),
        }),
        _ => Err(HopiError::Unsupported {
            op: "kl",
            kind: d1.kind(),
        }),
    }
}
