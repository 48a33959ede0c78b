//! Frozen lake: reach the goal without falling into holes.
//!
//! Grid files use `F` frozen, `H` hole, `S` start and `G` goal; short rows
//! are padded with holes. Every cell is a state and the agent observes its
//! own cell (with 1% noise). Entering a hole costs one point, reaching the
//! goal earns ten.

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use hopi_core::{ops, Tensor};
use tracing::debug;

use crate::error::{EnvError, Result};
use crate::grid::{manhattan, Grid, Move, Pos};
use crate::{check_action, noisy_background, EnvKind, Environment};

const CELLS: [char; 4] = ['F', 'H', 'S', 'G'];
const HOLE_PENALTY: f64 = -10.0;

#[derive(Debug, Clone)]
pub struct FrozenLakeEnv {
    rows: usize,
    cols: usize,
    holes: Vec<Vec<bool>>,
    start: Pos,
    goal: Pos,
    agent: Pos,
    score: f64,
}

impl FrozenLakeEnv {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::parse(Grid::open(path)?, &path.display().to_string())
    }

    pub fn parse<R: BufRead>(reader: R, source_name: &str) -> Result<Self> {
        let grid = Grid::parse(reader, source_name, &CELLS, 'H')?;
        let start = grid.require('S', source_name)?;
        let goal = grid.require('G', source_name)?;
        if grid.rows.checked_mul(grid.cols).map_or(true, |cells| cells < 2) {
            return Err(EnvError::Invalid(format!("{source_name}: lake needs at least two cells")));
        }
        let holes: Vec<Vec<bool>> = grid
            .cells
            .iter()
            .map(|row| row.iter().map(|&c| c == 'H').collect())
            .collect();

        debug!(source_name, rows = grid.rows, cols = grid.cols, "loaded frozen lake");
        Ok(Self {
            rows: grid.rows,
            cols: grid.cols,
            holes,
            start,
            goal,
            agent: start,
            score: 0.0,
        })
    }

    pub fn agent_position(&self) -> Pos {
        self.agent
    }

    pub fn goal_position(&self) -> Pos {
        self.goal
    }

    fn state_of(&self, (r, c): Pos) -> usize {
        r * self.cols + c
    }

    fn is_hole(&self, (r, c): Pos) -> bool {
        self.holes[r][c]
    }

    fn cells(&self) -> impl Iterator<Item = Pos> {
        let cols = self.cols;
        (0..self.rows).flat_map(move |r| (0..cols).map(move |c| (r, c)))
    }

    /// Holes do not block movement; only the border does.
    pub fn step_from(&self, mv: Move, pos: Pos) -> Pos {
        mv.apply(pos, self.rows, self.cols).unwrap_or(pos)
    }

    fn observe(&self) -> Result<Tensor> {
        Ok(ops::one_hot(self.observations(), self.state_of(self.agent))?)
    }
}

impl FromStr for FrozenLakeEnv {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.as_bytes(), "<inline>")
    }
}

impl Environment for FrozenLakeEnv {
    fn reset(&mut self) -> Result<Tensor> {
        self.agent = self.start;
        self.score = 0.0;
        self.observe()
    }

    fn execute(&mut self, action: usize) -> Result<Tensor> {
        check_action(action, self.actions())?;
        let mv = Move::from_index(action).ok_or(EnvError::InvalidAction {
            action,
            n_actions: self.actions(),
        })?;
        self.agent = self.step_from(mv, self.agent);
        if self.is_hole(self.agent) {
            self.score -= 1.0;
        }
        if self.agent == self.goal {
            self.score += 10.0;
        }
        self.observe()
    }

    fn render(&self) -> String {
        let mut out = format!("Current score: {}\n", self.score);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.push(if (r, c) == self.agent {
                    'A'
                } else if (r, c) == self.goal {
                    'G'
                } else if self.is_hole((r, c)) {
                    'H'
                } else {
                    '.'
                });
            }
            out.push('\n');
        }
        out.push_str("A = agent position\nG = goal position\nH = hole\n");
        out
    }

    /// Up, down, left, right. There is no idle action on the lake.
    fn actions(&self) -> usize {
        4
    }

    fn states(&self) -> usize {
        self.rows * self.cols
    }

    fn observations(&self) -> usize {
        self.states()
    }

    fn a(&self) -> Result<Tensor> {
        let n = self.observations();
        let mut a = noisy_background(&[n, n], 0.01)?;
        for i in 0..n {
            a.set(&[i, i], 0.99)?;
        }
        Ok(a)
    }

    fn b(&self) -> Result<Tensor> {
        let mut b = noisy_background(&[self.states(), self.states(), self.actions()], 0.1)?;
        for pos in self.cells() {
            let from = self.state_of(pos);
            for (k, &mv) in Move::ALL[..self.actions()].iter().enumerate() {
                let to = self.state_of(self.step_from(mv, pos));
                b.set(&[to, from, k], 0.9)?;
            }
        }
        Ok(b)
    }

    fn d(&self) -> Result<Tensor> {
        let mut d = noisy_background(&[self.states()], 0.1)?;
        d.set(&[self.state_of(self.start)], 0.9)?;
        Ok(d)
    }

    /// Holes are heavily penalised, then closer to the goal is better.
    fn pref_obs(&self) -> Result<Tensor> {
        let mut pref = vec![0.0; self.states()];
        for pos in self.cells() {
            let hole = if self.is_hole(pos) { HOLE_PENALTY } else { 0.0 };
            pref[self.state_of(pos)] = hole - manhattan(pos, self.goal) as f64;
        }
        Ok(Tensor::from_vec(pref)?)
    }

    fn solved(&self) -> bool {
        self.agent == self.goal
    }

    fn kind(&self) -> EnvKind {
        EnvKind::FrozenLake
    }

    fn score(&self) -> Option<f64> {
        Some(self.score)
    }
}
