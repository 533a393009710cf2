use lanecl_common::FloatElement;
use lanecl_runtime::TieBreak;

use super::{ScatterInstruction, ScatterKind, ScatterRequirements, Sum};

/// Sum divided by the number of contributions.
///
/// The initial value of the output takes part in the sum but not in the count, so a row without
/// contributions keeps its initial value.
#[derive(Debug, Clone, Copy)]
pub struct Mean;

impl<F: FloatElement> ScatterInstruction<F> for Mean {
    const KIND: ScatterKind = ScatterKind::Mean;

    fn requirements() -> ScatterRequirements {
        ScatterRequirements {
            counts: true,
            args: false,
        }
    }

    fn combine(
        acc: &mut F,
        value: F,
        position: usize,
        winner: Option<usize>,
        tie: TieBreak,
    ) -> bool {
        <Sum as ScatterInstruction<F>>::combine(acc, value, position, winner, tie)
    }

    fn finalize(row: &mut [F], count: F) {
        if count > F::zero() {
            for value in row.iter_mut() {
                *value = *value / count;
            }
        }
    }
}
