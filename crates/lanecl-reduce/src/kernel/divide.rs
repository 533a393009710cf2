use core::marker::PhantomData;

use lanecl_common::FloatElement;
use lanecl_runtime::{
    GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TileAxis, TileDescriptor,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in, copy_out},
};

use super::is_aligned_launch;
use crate::{FinalizeTiling, ScatterInstruction};

/// Finishes streamed reductions once every contribution landed, each output row being finalized
/// with its count.
pub(crate) struct FinalizeKernel<'a, F: FloatElement, Inst> {
    pub out: &'a GlobalTensor<F>,
    pub counts: &'a GlobalTensor<F>,
    pub _instruction: PhantomData<Inst>,
}

pub(crate) struct FinalizeSlot<F> {
    values: Vec<F>,
    counts: Vec<F>,
}

struct FinalizeLane<'a, F: FloatElement, Inst, const ALIGNED: bool> {
    kernel: &'a FinalizeKernel<'a, F, Inst>,
    tail: usize,
    block: usize,
}

impl<F: FloatElement, Inst: ScatterInstruction<F>> LaneKernel for FinalizeKernel<'_, F, Inst> {
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<FinalizeTiling>();
        let tail = tiling.tail as usize;

        if is_aligned_launch(lane) {
            self.run_lane::<true>(lane, &plan, tail);
        } else {
            self.run_lane::<false>(lane, &plan, tail);
        }
    }
}

impl<F: FloatElement, Inst: ScatterInstruction<F>> FinalizeKernel<'_, F, Inst> {
    fn run_lane<const ALIGNED: bool>(&self, lane: &LaneContext<'_>, plan: &PartitionPlan, tail: usize) {
        let assignment = plan.lane(lane.lane_id);
        let (rows, width) = match plan.axis {
            TileAxis::Tasks => (plan.tile_size, plan.tile_size * tail),
            TileAxis::Tail { .. } => (1, plan.tile_size),
        };

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| FinalizeSlot {
            values: scratch.alloc::<F>(width),
            counts: scratch.alloc::<F>(rows),
        });
        let mut tiles = FinalizeLane::<F, Inst, ALIGNED> {
            kernel: self,
            tail,
            block: lane.properties().block_elements(F::DTYPE),
        };

        TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut tiles, &mut ring);
    }
}

impl<F, Inst, const ALIGNED: bool> TileKernel for FinalizeLane<'_, F, Inst, ALIGNED>
where
    F: FloatElement,
    Inst: ScatterInstruction<F>,
{
    type Slot = FinalizeSlot<F>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let columns = tile.columns(self.tail);
        let offset = tile.offset * self.tail + columns.start;

        copy_in::<F, ALIGNED>(
            self.kernel.out,
            offset,
            tile.count * columns.len(),
            &mut slot.values,
            self.block,
        );
        self.kernel
            .counts
            .read_into(tile.offset, &mut slot.counts[..tile.count]);
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let width = tile.columns(self.tail).len();
        for local in 0..tile.count {
            Inst::finalize(
                &mut slot.values[local * width..(local + 1) * width],
                slot.counts[local],
            );
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let columns = tile.columns(self.tail);
        let offset = tile.offset * self.tail + columns.start;

        copy_out::<F, ALIGNED>(
            &slot.values,
            self.kernel.out,
            offset,
            tile.count * columns.len(),
            self.block,
        );
    }
}
