//! A decision graph with good paths and an absorbing bad state.
//!
//! ```text
//!             ┌─ a0 ─► 2 ─► 3 ─► 4 ─► 5 (goal, absorbing)
//!   state 0 ──┼─ a1 ─► 6 ─► 7 ─► 1
//!             └─ a2.. ───────────► 1 (bad, absorbing)
//! ```
//!
//! State 0 is the start. From it, action `i < n_good` enters path `i`; any
//! other action leads to the bad state 1. On a path, action 0 advances and
//! every other action falls into state 1. The end of the longest path is the
//! goal; the end of a shorter path falls into state 1.

use hopi_core::{ops, Tensor};

use crate::error::{EnvError, Result};
use crate::{check_action, noisy_background, EnvKind, Environment};

const GOOD: usize = 0;
const BAD: usize = 1;

#[derive(Debug, Clone)]
pub struct GraphEnv {
    n_good: usize,
    n_bad: usize,
    paths: Vec<Vec<usize>>,
    n_states: usize,
    goal: usize,
    agent: usize,
}

impl GraphEnv {
    pub fn new(n_good: usize, n_bad: usize, path_sizes: &[usize]) -> Result<Self> {
        if path_sizes.len() != n_good {
            return Err(EnvError::Invalid(format!(
                "{n_good} good actions but {} path sizes",
                path_sizes.len()
            )));
        }
        if path_sizes.is_empty() || path_sizes.contains(&0) {
            return Err(EnvError::Invalid(
                "graph needs at least one non-empty good path".to_string(),
            ));
        }

        let mut next = 2;
        let paths: Vec<Vec<usize>> = path_sizes
            .iter()
            .map(|&size| {
                let path = (next..next + size).collect();
                next += size;
                path
            })
            .collect();

        let longest = path_sizes.iter().copied().max().unwrap_or(0);
        let goal = paths
            .iter()
            .find(|p| p.len() == longest)
            .and_then(|p| p.last().copied())
            .ok_or_else(|| EnvError::Invalid("no goal state".to_string()))?;

        Ok(Self {
            n_good,
            n_bad,
            paths,
            n_states: next,
            goal,
            agent: 0,
        })
    }

    pub fn agent_state(&self) -> usize {
        self.agent
    }

    pub fn goal_state(&self) -> usize {
        self.goal
    }

    pub fn n_bad(&self) -> usize {
        self.n_bad
    }

    /// Successor of `state` under `action`.
    pub fn transition(&self, action: usize, state: usize) -> usize {
        if state == 0 && action < self.n_good {
            return self.paths[action][0];
        }
        if state <= 1 || action > 0 {
            return BAD;
        }
        for path in &self.paths {
            if let Some(i) = path.iter().position(|&s| s == state) {
                return match path.get(i + 1) {
                    Some(&next) => next,
                    None if state == self.goal => state,
                    None => BAD,
                };
            }
        }
        BAD
    }

    fn observe(&self) -> Result<Tensor> {
        let obs = if self.agent == BAD { BAD } else { GOOD };
        Ok(ops::one_hot(self.observations(), obs)?)
    }
}

impl Environment for GraphEnv {
    fn reset(&mut self) -> Result<Tensor> {
        self.agent = 0;
        self.observe()
    }

    fn execute(&mut self, action: usize) -> Result<Tensor> {
        check_action(action, self.actions())?;
        self.agent = self.transition(action, self.agent);
        self.observe()
    }

    fn render(&self) -> String {
        let mut out = String::from("| States | 0 | 1 |");
        for (i, path) in self.paths.iter().enumerate() {
            let states: Vec<String> = path.iter().map(usize::to_string).collect();
            out.push_str(&format!(" Path_{i}: {} |", states.join(" ")));
        }
        out.push_str(&format!("\nAgent is in state: {}\n", self.agent));
        out
    }

    fn actions(&self) -> usize {
        self.n_good + self.n_bad
    }

    fn states(&self) -> usize {
        self.n_states
    }

    fn observations(&self) -> usize {
        2
    }

    fn a(&self) -> Result<Tensor> {
        let mut a = noisy_background(&[self.observations(), self.states()], 0.1)?;
        for s in 0..self.states() {
            let obs = if s == BAD { BAD } else { GOOD };
            a.set(&[obs, s], 0.9)?;
        }
        Ok(a)
    }

    fn b(&self) -> Result<Tensor> {
        let mut b = noisy_background(&[self.states(), self.states(), self.actions()], 0.1)?;
        for s in 0..self.states() {
            for action in 0..self.actions() {
                b.set(&[self.transition(action, s), s, action], 0.9)?;
            }
        }
        Ok(b)
    }

    fn d(&self) -> Result<Tensor> {
        let mut d = noisy_background(&[self.states()], 0.1)?;
        d.set(&[0], 0.9)?;
        Ok(d)
    }

    fn pref_obs(&self) -> Result<Tensor> {
        Ok(Tensor::from_vec(vec![1.0, 0.0])?)
    }

    fn solved(&self) -> bool {
        self.agent == self.goal || self.agent == BAD
    }

    fn kind(&self) -> EnvKind {
        EnvKind::Graph
    }
}
