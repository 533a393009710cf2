use lanecl_common::FloatElement;
use lanecl_runtime::TieBreak;

use super::{ScatterInstruction, ScatterKind, ScatterRequirements};

/// Maximum with the position of the winning contribution.
///
/// A contribution only displaces the initial value of the output when strictly greater. Among
/// contributions, equal values are settled by the [TieBreak], so the winner doesn't depend on the
/// order in which lanes deliver them.
#[derive(Debug, Clone, Copy)]
pub struct Max;

impl<F: FloatElement> ScatterInstruction<F> for Max {
    const KIND: ScatterKind = ScatterKind::Max;

    fn requirements() -> ScatterRequirements {
        ScatterRequirements {
            counts: false,
            args: true,
        }
    }

    fn combine(
        acc: &mut F,
        value: F,
        position: usize,
        winner: Option<usize>,
        tie: TieBreak,
    ) -> bool {
        let wins = match winner {
            None => value > *acc,
            Some(best) => tie.replaces(value, position, *acc, best),
        };
        if wins {
            *acc = value;
        }
        wins
    }
}
