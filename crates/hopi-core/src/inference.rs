//! Variational message passing.
//!
//! One sweep updates every hidden variable in the given order: the messages
//! from its adjacent factors are summed and handed to
//! [`Distribution::update`](crate::Distribution::update). Sweeps repeat
//! until the variational free energy stops decreasing by at least
//! `epsilon`, or until `max_iter` sweeps have run.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::error::Result;
use crate::graph::FactorGraph;
use crate::tensor::Tensor;
use crate::types::VarId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vmp {
    pub epsilon: f64,
    pub max_iter: usize,
}

impl Default for Vmp {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            max_iter: 100,
        }
    }
}

impl From<&InferenceConfig> for Vmp {
    fn from(cfg: &InferenceConfig) -> Self {
        Self {
            epsilon: cfg.epsilon,
            max_iter: cfg.max_iter,
        }
    }
}

/// Outcome of a [`Vmp::run`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VmpReport {
    /// Number of full sweeps performed.
    pub iterations: usize,
    /// Free energy after the last sweep.
    pub vfe: f64,
    /// `false` when the run stopped on `max_iter`.
    pub converged: bool,
}

impl Vmp {
    pub fn new(epsilon: f64, max_iter: usize) -> Self {
        Self { epsilon, max_iter }
    }

    /// Run inference over every live variable of the graph.
    pub fn run_all(&self, graph: &mut FactorGraph) -> Result<VmpReport> {
        let vars = graph.var_ids();
        self.run(graph, &vars)
    }

    /// Run inference over `vars`. Observed variables in the list are skipped
    /// during updates but still contribute to the free energy.
    pub fn run(&self, graph: &mut FactorGraph, vars: &[VarId]) -> Result<VmpReport> {
        let mut previous = f64::MAX;
        let mut iterations = 0;

        loop {
            for &var in vars {
                if graph.var(var)?.is_hidden() {
                    update_var(graph, var)?;
                }
            }
            iterations += 1;

            let current = vfe(graph, vars)?;
            if previous - current < self.epsilon {
                debug!(iterations, vfe = current, "vmp converged");
                return Ok(VmpReport {
                    iterations,
                    vfe: current,
                    converged: true,
                });
            }
            previous = current;

            if iterations >= self.max_iter {
                warn!(iterations, vfe = current, "vmp stopped before convergence");
                return Ok(VmpReport {
                    iterations,
                    vfe: current,
                    converged: false,
                });
            }
        }
    }
}

/// Replace the posterior of `var` with the normalised sum of the messages
/// its adjacent factors send it.
pub fn update_var(graph: &mut FactorGraph, var: VarId) -> Result<()> {
    let mut sum: Option<Tensor> = None;
    for factor in graph.adjacent_factors(var)? {
        let msg = graph.factor(factor)?.message(graph, var)?;
        match sum.as_mut() {
            Some(acc) => acc.add_assign(&msg)?,
            None => sum = Some(msg),
        }
    }
    if let Some(sum) = sum {
        graph.var_mut(var)?.posterior_mut().update(sum)?;
    }
    Ok(())
}

/// Variational free energy of `vars`: the sum of the contributions of the
/// factors generating them.
pub fn vfe(graph: &FactorGraph, vars: &[VarId]) -> Result<f64> {
    let mut total = 0.0;
    for &var in vars {
        let parent = graph.var(var)?.parent();
        total += graph.factor(parent)?.vfe(graph)?;
    }
    Ok(total)
}
