//! Maze navigation.
//!
//! ```text
//! 7 8
//! WWWWWWWW
//! W.....EW      W  wall
//! W.WWWW.W      .  free cell
//! W....W.W      S  start
//! W.WW.W.W      E  exit
//! WS.....W
//! WWWWWWWW
//! ```
//!
//! The agent observes only its Manhattan distance to the exit. Free cells
//! are numbered row by row to give the hidden states.

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use hopi_core::{ops, Tensor};
use tracing::debug;

use crate::error::{EnvError, Result};
use crate::grid::{manhattan, Grid, Move, Pos};
use crate::{noisy_background, EnvKind, Environment};

const CELLS: [char; 4] = ['W', '.', 'E', 'S'];

#[derive(Debug, Clone)]
pub struct MazeEnv {
    rows: usize,
    cols: usize,
    /// `Some(state index)` for free cells, `None` for walls.
    states_idx: Vec<Vec<Option<usize>>>,
    n_states: usize,
    start: Pos,
    exit: Pos,
    agent: Pos,
}

impl MazeEnv {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::parse(Grid::open(path)?, &path.display().to_string())
    }

    pub fn parse<R: BufRead>(reader: R, source_name: &str) -> Result<Self> {
        let grid = Grid::parse(reader, source_name, &CELLS, 'W')?;
        let start = grid.require('S', source_name)?;
        let exit = grid.require('E', source_name)?;
        if grid.rows + grid.cols < 7 {
            return Err(EnvError::Invalid(format!(
                "{source_name}: a {}x{} maze is too small",
                grid.rows, grid.cols
            )));
        }

        let mut n_states = 0;
        let mut states_idx = vec![vec![None; grid.cols]; grid.rows];
        for (r, row) in grid.cells.iter().enumerate() {
            for (c, &cell) in row.iter().enumerate() {
                if cell != 'W' {
                    states_idx[r][c] = Some(n_states);
                    n_states += 1;
                }
            }
        }

        debug!(source_name, rows = grid.rows, cols = grid.cols, n_states, "loaded maze");
        Ok(Self {
            rows: grid.rows,
            cols: grid.cols,
            states_idx,
            n_states,
            start,
            exit,
            agent: start,
        })
    }

    pub fn agent_position(&self) -> Pos {
        self.agent
    }

    pub fn exit_position(&self) -> Pos {
        self.exit
    }

    pub fn is_wall(&self, (r, c): Pos) -> bool {
        self.states_idx[r][c].is_none()
    }

    fn state_of(&self, (r, c): Pos) -> Option<usize> {
        self.states_idx.get(r).and_then(|row| row.get(c)).copied().flatten()
    }

    fn free_cells(&self) -> impl Iterator<Item = (Pos, usize)> + '_ {
        self.states_idx.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(c, s)| s.map(|s| ((r, c), s)))
        })
    }

    /// Where `mv` takes the agent from `pos`. Walls and the border block.
    pub fn step_from(&self, mv: Move, pos: Pos) -> Pos {
        match mv.apply(pos, self.rows, self.cols) {
            Some(next) if !self.is_wall(next) => next,
            _ => pos,
        }
    }

    fn observe(&self) -> Result<Tensor> {
        Ok(ops::one_hot(self.observations(), manhattan(self.agent, self.exit))?)
    }
}

impl FromStr for MazeEnv {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.as_bytes(), "<inline>")
    }
}

impl Environment for MazeEnv {
    fn reset(&mut self) -> Result<Tensor> {
        self.agent = self.start;
        self.execute(Move::Idle as usize)
    }

    fn execute(&mut self, action: usize) -> Result<Tensor> {
        let mv = Move::from_index(action).ok_or(EnvError::InvalidAction {
            action,
            n_actions: self.actions(),
        })?;
        self.agent = self.step_from(mv, self.agent);
        self.observe()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.push(if (r, c) == self.agent {
                    'A'
                } else if (r, c) == self.exit {
                    'E'
                } else if self.is_wall((r, c)) {
                    'W'
                } else {
                    ' '
                });
            }
            out.push('\n');
        }
        out.push_str("A = agent position\nE = exit position\nW = wall\n");
        out
    }

    fn actions(&self) -> usize {
        Move::ALL.len()
    }

    fn states(&self) -> usize {
        self.n_states
    }

    fn observations(&self) -> usize {
        self.rows + self.cols - 5
    }

    fn a(&self) -> Result<Tensor> {
        let mut a = noisy_background(&[self.observations(), self.states()], 0.1)?;
        for (pos, s) in self.free_cells() {
            a.set(&[manhattan(pos, self.exit), s], 0.9)?;
        }
        Ok(a)
    }

    fn b(&self) -> Result<Tensor> {
        let mut b = noisy_background(&[self.states(), self.states(), self.actions()], 0.1)?;
        for (pos, s) in self.free_cells() {
            for (k, &mv) in Move::ALL.iter().enumerate() {
                let dest = self.step_from(mv, pos);
                if let Some(d) = self.state_of(dest) {
                    b.set(&[d, s, k], 0.9)?;
                }
            }
        }
        Ok(b)
    }

    fn d(&self) -> Result<Tensor> {
        let mut d = noisy_background(&[self.states()], 0.1)?;
        if let Some(s) = self.state_of(self.start) {
            d.set(&[s], 0.9)?;
        }
        Ok(d)
    }

    /// Closer to the exit is better.
    fn pref_obs(&self) -> Result<Tensor> {
        let n = self.observations();
        Ok(Tensor::from_vec((0..n).map(|i| (n - i) as f64).collect())?)
    }

    fn solved(&self) -> bool {
        self.agent == self.exit
    }

    fn kind(&self) -> EnvKind {
        EnvKind::Maze
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MAZE: &str = "7 8\n\
        WWWWWWWW\n\
        W.....EW\n\
        W.WWWW.W\n\
        W....W.W\n\
        W.WW.W.W\n\
        WS.....W\n\
        WWWWWWWW\n";

    #[test]
    fn counts_states_and_observations() {
        let env: MazeEnv = MAZE.parse().unwrap();
        assert_eq!(env.states(), 22);
        assert_eq!(env.observations(), 10);
        assert_eq!(env.agent_position(), (5, 1));
        assert_eq!(env.exit_position(), (1, 6));
    }

    #[test]
    fn walls_block_movement() {
        let mut env: MazeEnv = MAZE.parse().unwrap();
        let obs = env.execute(Move::Down as usize).unwrap();
        assert_eq!(env.agent_position(), (5, 1));
        assert_eq!(obs.argmax().unwrap(), Some(9));
    }

    #[test]
    fn missing_exit_is_an_error() {
        let err = "3 3\nWWW\nWSW\nWWW\n".parse::<MazeEnv>().unwrap_err();
        assert!(matches!(err, EnvError::MissingCell { cell: 'E', .. }));
    }

    #[test]
    fn b_columns_sum_to_one() {
        let env: MazeEnv = MAZE.parse().unwrap();
        let b = env.b().unwrap();
        for from in 0..env.states() {
            for a in 0..env.actions() {
                let col: f64 = (0..env.states()).map(|to| b.get(&[to, from, a]).unwrap()).sum();
                assert!((col - 1.0).abs() < 1e-9, "column ({from}, {a}) sums to {col}");
            }
        }
    }
}
