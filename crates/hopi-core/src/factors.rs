//! Factor nodes: the local message and free-energy rules of VMP.
//!
//! Each factor links one child variable to its parents. When the factor's
//! parameters are themselves random (a Dirichlet variable `D`, `A` or `B`),
//! the factor uses the expected log parameters of that variable's posterior;
//! otherwise it uses the log of the child's fixed prior.
//!
//! # Messages
//!
//! ```text
//! Categorical(child | D)            child ← log D            D ← child
//! Transition(to | from, A)          to    ← log A · from     from ← log Aᵀ · to
//!                                   A     ← from ⊗ to
//! ActiveTransition(to | from, a, B) to, from, a ← log B averaged over the others
//!                                   B     ← from ⊗ a ⊗ to
//! Dirichlet(child)                  child ← prior pseudo-counts
//! ```
//!
//! Learned parameters are stored in "from-major" layout (`A: [from, to]`,
//! `B: [from, action, to]`) so that the last axis is the simplex. They are
//! permuted into the `[to, from, ...]` layout of the fixed priors before use.

use crate::distributions::dirichlet_expected_log;
use crate::error::{HopiError, Result};
use crate::graph::FactorGraph;
use crate::ops::{self, average, outer_product};
use crate::tensor::Tensor;
use crate::types::{FactorId, VarId};

#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    Categorical {
        child: VarId,
        d: Option<VarId>,
    },
    Transition {
        from: VarId,
        to: VarId,
        a: Option<VarId>,
    },
    ActiveTransition {
        from: VarId,
        action: VarId,
        to: VarId,
        b: Option<VarId>,
    },
    Dirichlet {
        child: VarId,
    },
}

#[derive(Debug, Clone)]
pub struct Factor {
    pub(crate) id: FactorId,
    pub(crate) kind: FactorKind,
    pub(crate) name: Option<String>,
}

impl Factor {
    pub(crate) fn new(id: FactorId, kind: FactorKind) -> Self {
        Self {
            id,
            kind,
            name: None,
        }
    }

    pub fn id(&self) -> FactorId {
        self.id
    }

    pub fn kind(&self) -> &FactorKind {
        &self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// The variable this factor generates.
    pub fn child(&self) -> VarId {
        match self.kind {
            FactorKind::Categorical { child, .. } | FactorKind::Dirichlet { child } => child,
            FactorKind::Transition { to, .. } | FactorKind::ActiveTransition { to, .. } => to,
        }
    }

    /// Parent variables in positional order (state, action, parameters).
    pub fn parents(&self) -> Vec<VarId> {
        match self.kind {
            FactorKind::Categorical { d, .. } => d.into_iter().collect(),
            FactorKind::Transition { from, a, .. } => std::iter::once(from).chain(a).collect(),
            FactorKind::ActiveTransition { from, action, b, .. } => {
                [from, action].into_iter().chain(b).collect()
            }
            FactorKind::Dirichlet { .. } => Vec::new(),
        }
    }

    /// First positional parent; for transitions this is the previous state.
    pub fn first_parent(&self) -> Option<VarId> {
        self.parents().first().copied()
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Message from this factor towards `target`.
    pub fn message(&self, graph: &FactorGraph, target: VarId) -> Result<Tensor> {
        match self.kind {
            FactorKind::Categorical { child, d } => {
                if target == child {
                    self.log_d(graph, child, d)
                } else if d == Some(target) {
                    Ok(posterior(graph, child)?.clone())
                } else {
                    Err(self.not_adjacent(target))
                }
            }
            FactorKind::Transition { from, to, a } => {
                if target == to {
                    self.log_a(graph, to, a)?.matvec(posterior(graph, from)?)
                } else if target == from {
                    self.log_a(graph, to, a)?
                        .permute(&[1, 0])?
                        .matvec(posterior(graph, to)?)
                } else if a == Some(target) {
                    outer_product(&[posterior(graph, from)?, posterior(graph, to)?])
                } else {
                    Err(self.not_adjacent(target))
                }
            }
            FactorKind::ActiveTransition { from, action, to, b } => {
                let action_post = posterior(graph, action)?;
                let from_post = posterior(graph, from)?;
                let to_post = posterior(graph, to)?;
                if target == to {
                    let b_bar = average(&self.log_b(graph, to, b)?, action_post, &[2], &[])?;
                    average(&b_bar, from_post, &[1], &[])
                } else if target == from {
                    let b_bar = average(&self.log_b(graph, to, b)?, action_post, &[2], &[])?;
                    average(&b_bar, to_post, &[0], &[])
                } else if target == action {
                    let b_bar = average(&self.log_b(graph, to, b)?, from_post, &[1], &[])?;
                    average(&b_bar, to_post, &[0], &[])
                } else if b == Some(target) {
                    outer_product(&[from_post, action_post, to_post])
                } else {
                    Err(self.not_adjacent(target))
                }
            }
            FactorKind::Dirichlet { child } => {
                if target == child {
                    Ok(prior(graph, child)?.clone())
                } else {
                    Err(self.not_adjacent(target))
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Variational free energy
    // -----------------------------------------------------------------------

    /// Contribution of this factor to the variational free energy:
    /// the negative entropy of a hidden child minus the expected log
    /// likelihood of the child under the factor.
    pub fn vfe(&self, graph: &FactorGraph) -> Result<f64> {
        let child = graph.var(self.child())?;
        let mut vfe = if child.is_hidden() {
            -child.posterior().entropy()?
        } else {
            0.0
        };

        match self.kind {
            FactorKind::Categorical { child, d } => {
                vfe -= posterior(graph, child)?.dot(&self.log_d(graph, child, d)?)?;
            }
            FactorKind::Transition { from, to, a } => {
                let lp = average(&self.log_a(graph, to, a)?, posterior(graph, from)?, &[1], &[])?;
                vfe -= average(&lp, posterior(graph, to)?, &[0], &[])?.item()?;
            }
            FactorKind::ActiveTransition { from, action, to, b } => {
                let lp = average(&self.log_b(graph, to, b)?, posterior(graph, action)?, &[2], &[])?;
                let lp = average(&lp, posterior(graph, from)?, &[1], &[])?;
                vfe -= average(&lp, posterior(graph, to)?, &[0], &[])?.item()?;
            }
            FactorKind::Dirichlet { child } => {
                let prior = prior(graph, child)?;
                let post = posterior(graph, child)?;
                if prior.shape() != post.shape() {
                    return Err(HopiError::ShapeMismatch {
                        op: "Dirichlet::vfe",
                        expected: prior.shape().to_vec(),
                        actual: post.shape().to_vec(),
                    });
                }
                for (prior_fiber, post_fiber) in prior.last_axis_fibers()?.iter().zip(post.last_axis_fibers()?) {
                    vfe -= dirichlet_energy(prior_fiber, &post_fiber)?;
                }
            }
        }
        Ok(vfe)
    }

    // -----------------------------------------------------------------------
    // Log parameters
    // -----------------------------------------------------------------------

    fn log_d(&self, graph: &FactorGraph, child: VarId, d: Option<VarId>) -> Result<Tensor> {
        match d {
            Some(d) => dirichlet_expected_log(posterior(graph, d)?),
            None => prior(graph, child)?.ln(),
        }
    }

    /// `[to, from]` log likelihood.
    fn log_a(&self, graph: &FactorGraph, to: VarId, a: Option<VarId>) -> Result<Tensor> {
        match a {
            Some(a) => dirichlet_expected_log(posterior(graph, a)?)?.permute(&[1, 0]),
            None => prior(graph, to)?.ln(),
        }
    }

    /// `[to, from, action]` log transition.
    fn log_b(&self, graph: &FactorGraph, to: VarId, b: Option<VarId>) -> Result<Tensor> {
        match b {
            Some(b) => dirichlet_expected_log(posterior(graph, b)?)?.permute(&[2, 0, 1]),
            None => prior(graph, to)?.ln(),
        }
    }

    fn not_adjacent(&self, target: VarId) -> HopiError {
        HopiError::NotAdjacent {
            factor: self.id,
            var: target,
        }
    }
}

/// Expected log density of `Dir(prior)` under `Dir(post)`.
fn dirichlet_energy(prior: &[f64], post: &[f64]) -> Result<f64> {
    let psi_sum = ops::digamma(post.iter().sum())?;
    let mut acc = 0.0;
    for (&a, &p) in prior.iter().zip(post) {
        acc += (a - 1.0) * (ops::digamma(p)? - psi_sum);
    }
    Ok(acc - ops::log_beta(prior))
}

fn posterior(graph: &FactorGraph, var: VarId) -> Result<&Tensor> {
    Ok(graph.var(var)?.posterior().params())
}

fn prior(graph: &FactorGraph, var: VarId) -> Result<&Tensor> {
    graph
        .var(var)?
        .prior()
        .map(|d| d.params())
        .ok_or(HopiError::MissingDistribution { var, what: "prior" })
}
