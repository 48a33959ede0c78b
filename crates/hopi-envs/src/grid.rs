//! Shared plumbing for grid worlds: the text file format and moves.
//!
//! A grid file starts with a `rows cols` header followed by one line per
//! row. Characters past `cols` are ignored, short or missing rows are
//! padded with the environment's padding cell. Neither side may exceed
//! [`MAX_SIDE`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{EnvError, Result};

pub type Pos = (usize, usize);

/// Largest accepted number of rows or columns.
pub const MAX_SIDE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Vec<char>>,
}

impl Grid {
    pub fn open(path: &Path) -> Result<BufReader<File>> {
        File::open(path).map(BufReader::new).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse<R: BufRead>(reader: R, source_name: &str, allowed: &[char], pad: char) -> Result<Self> {
        let parse_err = |line: usize, reason: String| EnvError::Parse {
            source_name: source_name.to_string(),
            line,
            reason,
        };

        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|e| parse_err(1, e.to_string()))?,
            None => return Err(parse_err(1, "empty file".to_string())),
        };
        let dims: Vec<usize> = header
            .split_whitespace()
            .map(str::parse::<usize>)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| parse_err(1, format!("bad header {header:?}: {e}")))?;
        let &[rows, cols] = dims.as_slice() else {
            return Err(parse_err(1, format!("expected `rows cols`, got {header:?}")));
        };
        if rows > MAX_SIDE || cols > MAX_SIDE {
            return Err(parse_err(1, format!("grid {rows}x{cols} exceeds {MAX_SIDE}x{MAX_SIDE}")));
        }

        let mut cells = Vec::new();
        for row in 0..rows {
            let line = match lines.next() {
                Some(line) => line.map_err(|e| parse_err(row + 2, e.to_string()))?,
                None => String::new(),
            };
            let mut cells_row: Vec<char> = line.trim_end_matches('\r').chars().take(cols).collect();
            if let Some(bad) = cells_row.iter().find(|c| !allowed.contains(*c)) {
                return Err(parse_err(row + 2, format!("unexpected character {bad:?}")));
            }
            cells_row.resize(cols, pad);
            cells.push(cells_row);
        }

        Ok(Self { rows, cols, cells })
    }

    /// Position of the first cell equal to `c`, scanning row by row.
    pub fn find(&self, c: char) -> Option<Pos> {
        self.cells.iter().enumerate().find_map(|(i, row)| {
            row.iter().position(|&x| x == c).map(|j| (i, j))
        })
    }

    pub fn require(&self, c: char, source_name: &str) -> Result<Pos> {
        self.find(c).ok_or_else(|| EnvError::MissingCell {
            source_name: source_name.to_string(),
            cell: c,
        })
    }
}

/// Grid moves, in action-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
    Idle,
}

impl Move {
    pub const ALL: [Move; 5] = [Move::Up, Move::Down, Move::Left, Move::Right, Move::Idle];

    pub fn from_index(action: usize) -> Option<Move> {
        Self::ALL.get(action).copied()
    }

    /// Neighbouring position inside a `rows × cols` grid, or `None` when the
    /// move leaves the grid.
    pub fn apply(self, (r, c): Pos, rows: usize, cols: usize) -> Option<Pos> {
        match self {
            Move::Up => r.checked_sub(1).map(|r| (r, c)),
            Move::Down => (r + 1 < rows).then_some((r + 1, c)),
            Move::Left => c.checked_sub(1).map(|c| (r, c)),
            Move::Right => (c + 1 < cols).then_some((r, c + 1)),
            Move::Idle => Some((r, c)),
        }
    }
}

pub fn manhattan((r1, c1): Pos, (r2, c2): Pos) -> usize {
    r1.abs_diff(r2) + c1.abs_diff(c2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rows_are_padded() {
        let grid = Grid::parse("2 3\nS.\n".as_bytes(), "inline", &['S', '.', 'W'], 'W').unwrap();
        assert_eq!(grid.cells, vec![vec!['S', '.', 'W'], vec!['W', 'W', 'W']]);
    }

    #[test]
    fn unknown_character_reports_line() {
        let err = Grid::parse("1 2\nSx\n".as_bytes(), "inline", &['S'], 'W').unwrap_err();
        assert!(matches!(err, EnvError::Parse { line: 2, .. }));
    }

    #[test]
    fn oversized_header_is_rejected_before_reading_rows() {
        let err = Grid::parse("18446744073709551615 3\n...\n".as_bytes(), "inline", &['.'], 'W').unwrap_err();
        assert!(matches!(err, EnvError::Parse { line: 1, .. }));
        let err = Grid::parse("2 65\n".as_bytes(), "inline", &['.'], 'W').unwrap_err();
        assert!(matches!(err, EnvError::Parse { line: 1, .. }));
    }

    #[test]
    fn moves_stop_at_the_border() {
        assert_eq!(Move::Up.apply((0, 0), 2, 2), None);
        assert_eq!(Move::Right.apply((0, 0), 2, 2), Some((0, 1)));
        assert_eq!(Move::Down.apply((1, 1), 2, 2), None);
    }
}
