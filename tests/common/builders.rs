//! Test builders: small generative models and on-disk environment files.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use std::path::PathBuf;

use hopi_core::{ops, FactorGraph, Tensor, VarId};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Tensors
// ---------------------------------------------------------------------------

/// `n x n` likelihood with `p` on the diagonal and the rest spread evenly.
pub fn sharp_likelihood(n: usize, p: f64) -> Tensor {
    let mut a = Tensor::full(&[n, n], (1.0 - p) / (n - 1) as f64).unwrap();
    for i in 0..n {
        a.set(&[i, i], p).unwrap();
    }
    a
}

/// `[to, from, action]` transitions where action `k` moves every state to
/// `target(from, k)` with probability `p`.
pub fn transitions(n_states: usize, n_actions: usize, p: f64, target: impl Fn(usize, usize) -> usize) -> Tensor {
    let mut b = Tensor::full(&[n_states, n_states, n_actions], (1.0 - p) / (n_states - 1) as f64).unwrap();
    for from in 0..n_states {
        for k in 0..n_actions {
            b.set(&[target(from, k), from, k], p).unwrap();
        }
    }
    b
}

// ---------------------------------------------------------------------------
// ModelBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for the `s0 ~ Cat(D)`, `o0 ~ Cat(A · s0)` seed model every
/// agent starts from.
///
/// ```rust
/// let model = ModelBuilder::new(3).observe(2).build();
/// ```
pub struct ModelBuilder {
    n: usize,
    d: Option<Tensor>,
    a: Option<Tensor>,
    observation: Option<usize>,
}

pub struct Model {
    pub graph: FactorGraph,
    pub s0: VarId,
    pub o0: VarId,
    pub a: Tensor,
}

impl ModelBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            d: None,
            a: None,
            observation: None,
        }
    }

    pub fn prior(mut self, d: Tensor) -> Self {
        self.d = Some(d);
        self
    }

    pub fn likelihood(mut self, a: Tensor) -> Self {
        self.a = Some(a);
        self
    }

    pub fn observe(mut self, index: usize) -> Self {
        self.observation = Some(index);
        self
    }

    pub fn build(self) -> Model {
        let mut graph = FactorGraph::new();
        let d = self.d.unwrap_or_else(|| ops::uniform_vec(self.n).unwrap());
        let a = self.a.unwrap_or_else(|| sharp_likelihood(self.n, 0.9));
        let s0 = graph.categorical(d).unwrap();
        let o0 = graph.transition(s0, a.clone()).unwrap();
        if let Some(index) = self.observation {
            let n_obs = a.shape()[0];
            graph.observe(o0, ops::one_hot(n_obs, index).unwrap()).unwrap();
        }
        graph.var_mut(s0).unwrap().set_name("s0");
        graph.var_mut(o0).unwrap().set_name("o0");
        graph.set_tree_root(s0).unwrap();
        Model { graph, s0, o0, a }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// A temporary directory holding one file; the directory lives as long as
/// the returned guard.
pub struct TempFile {
    pub dir: TempDir,
    pub path: PathBuf,
}

pub fn temp_file(name: &str, contents: &str) -> TempFile {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    TempFile { dir, path }
}
