//! Static environment layouts and evidence files used across harnesses.

/// The reference maze: 22 free cells, 10 distance observations.
pub const MAZE_1: &str = "7 8
WWWWWWWW
W.....EW
W.WWWW.W
W....W.W
W.WW.W.W
WS.....W
WWWWWWWW
";

/// A corridor maze where the exit is four moves to the right of the start.
pub const MAZE_CORRIDOR: &str = "3 7
WWWWWWW
WS...EW
WWWWWWW
";

/// Short rows are padded with walls.
pub const MAZE_RAGGED: &str = "4 6
WWWWWW
WS.E
W..W
WWWWWW
";

/// 4x4 frozen lake with four holes.
pub const LAKE_4X4: &str = "4 4
SFFF
FHFH
FFFH
HFFG
";

/// Evidence for the first two observations of [`MAZE_1`].
pub const EVIDENCE_MAZE_1: &str = "o0 9

o1 8
";

/// Layouts that must be rejected, with the reason in the case name.
pub const BAD_MAZES: &[(&str, &str)] = &[
    ("missing_start", "3 7\nWWWWWWW\nW....EW\nWWWWWWW\n"),
    ("missing_exit", "3 7\nWWWWWWW\nWS....W\nWWWWWWW\n"),
    ("unknown_cell", "3 7\nWWWWWWW\nWS.X.EW\nWWWWWWW\n"),
    ("bad_header", "three seven\nWWWWWWW\n"),
    ("oversized_header", "18446744073709551615 3\n...\n"),
];

/// Reference numbers checked against independent computations.
pub mod reference {
    pub const BETA_1_5_0_2: f64 = 4.4776;
    pub const BETA_0_01_3_5: f64 = 98.34;
    pub const DIGAMMA_0_3458: f64 = -3.0103;
    pub const KL_DIR_HALF_VS_SKEWED: f64 = 1.1743590056;
    pub const DIRICHLET_ENTROPY_1D: f64 = -8.7865433793;
    pub const DIRICHLET_ENTROPY_2D: f64 = -10.0308877284;
}
