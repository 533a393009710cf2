mod max;
mod mean;
mod sum;

pub use max::*;
pub use mean::*;
pub use sum::*;

use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::TieBreak;

/// The reduction applied by a scatter, recorded in the tiling key of every launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ScatterKind {
    #[display("sum")]
    Sum,
    #[display("mean")]
    Mean,
    #[display("max")]
    Max,
}

/// What a reduction keeps next to the accumulated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterRequirements {
    /// Contributions are counted per output row.
    pub counts: bool,
    /// The position of the winning contribution is tracked per output element.
    pub args: bool,
}

/// Combining function of a scatter reduction.
///
/// Reductions without args combine by addition, which lets the streaming strategy fold them with
/// atomic adds.
pub trait ScatterInstruction<F: FloatElement>: Send + Sync + 'static {
    const KIND: ScatterKind;

    fn requirements() -> ScatterRequirements;

    /// Folds `value`, found at `position` along the scattered axis, into `acc`.
    ///
    /// `winner` is the position of the contribution currently held by `acc`, `None` while `acc`
    /// still holds the caller's initial value. Returns whether `value` became the winner.
    fn combine(acc: &mut F, value: F, position: usize, winner: Option<usize>, tie: TieBreak)
    -> bool;

    /// Finishes a row once all of its `count` contributions were folded.
    fn finalize(_row: &mut [F], _count: F) {}
}

/// Position held by an argmax element, `None` for the "no contributor" sentinel.
pub(crate) fn winner_of<I: IndexElement>(arg: I, dim: usize) -> Option<usize> {
    arg.as_index().filter(|position| *position < dim)
}
