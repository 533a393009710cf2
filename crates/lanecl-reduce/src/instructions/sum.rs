use lanecl_common::FloatElement;
use lanecl_runtime::TieBreak;

use super::{ScatterInstruction, ScatterKind, ScatterRequirements};

#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl<F: FloatElement> ScatterInstruction<F> for Sum {
    const KIND: ScatterKind = ScatterKind::Sum;

    fn requirements() -> ScatterRequirements {
        ScatterRequirements {
            counts: false,
            args: false,
        }
    }

    fn combine(
        acc: &mut F,
        value: F,
        _position: usize,
        _winner: Option<usize>,
        _tie: TieBreak,
    ) -> bool {
        *acc = *acc + value;
        false
    }
}
