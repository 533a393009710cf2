use serde::{Deserialize, Serialize};

use lanecl_runtime::TieBreak;

/// Nearest distance of every point before the first selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedDistance {
    /// `1e10`, large enough for coordinates in any sensible unit.
    #[default]
    Large,
    /// Positive infinity.
    Infinity,
}

impl SeedDistance {
    pub fn value(&self) -> f64 {
        match self {
            SeedDistance::Large => 1e10,
            SeedDistance::Infinity => f64::INFINITY,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpsOptions {
    pub seed: SeedDistance,
    /// Which point is selected when several are equally far.
    pub tie_break: TieBreak,
}

impl FpsOptions {
    pub fn with_seed(mut self, seed: SeedDistance) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}
