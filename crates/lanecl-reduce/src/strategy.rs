use serde::{Deserialize, Serialize};

use lanecl_runtime::TieBreak;

/// How output rows are produced.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum ScatterStrategy {
    /// Every lane owns a contiguous range of output rows and keeps them in scratch while scanning
    /// the index rows that may target them. Rows larger than scratch are cut in column chunks owned
    /// by the same lane. Writes are plain and results are bit-reproducible for any lane count or
    /// scratch budget.
    OwnedRows,
    /// Index rows are split over lanes and contributions are combined in global memory with atomic
    /// updates. Rows larger than scratch are streamed in chunks. Float sums depend on the order
    /// lanes reach the atomics, so results may differ in the last bits between runs.
    Streaming,
}

impl ScatterStrategy {
    /// Strategy used when none is requested: owned rows whenever a single output element with its
    /// bookkeeping fits in scratch.
    pub fn fallback(element_fits: bool) -> Self {
        if element_fits {
            ScatterStrategy::OwnedRows
        } else {
            ScatterStrategy::Streaming
        }
    }
}

/// Options shared by every scatter reduction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScatterOptions {
    /// Forced strategy, picked from the scratch budget when `None`.
    pub strategy: Option<ScatterStrategy>,
    /// Winner among equal values of a max reduction.
    pub tie_break: TieBreak,
}

impl ScatterOptions {
    pub fn with_strategy(mut self, strategy: ScatterStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}
