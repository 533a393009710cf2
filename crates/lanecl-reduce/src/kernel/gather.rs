use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TileAxis, TileDescriptor,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in, copy_out},
};

use super::is_aligned_launch;
use crate::{ScatterExtents, ScatterGradTiling};

/// Gradient of additive scatters: every source row gathers the gradient of the output row it was
/// scattered to, divided by that row's count when counts are given.
///
/// Source rows are owned by a single lane, so every write is plain.
pub(crate) struct GatherKernel<'a, F: FloatElement, I: IndexElement> {
    pub grad_out: &'a GlobalTensor<F>,
    pub index: &'a GlobalTensor<I>,
    pub counts: Option<&'a GlobalTensor<F>>,
    pub grad_src: &'a GlobalTensor<F>,
}

pub(crate) struct GatherSlot<F, I> {
    values: Vec<F>,
    groups: Vec<I>,
    scales: Vec<F>,
}

struct GatherLane<'a, F: FloatElement, I: IndexElement, const ALIGNED: bool> {
    kernel: &'a GatherKernel<'a, F, I>,
    extents: ScatterExtents,
    block: usize,
}

impl<F: FloatElement, I: IndexElement> LaneKernel for GatherKernel<'_, F, I> {
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<ScatterGradTiling>();

        if is_aligned_launch(lane) {
            self.run_lane::<true>(lane, &tiling, &plan);
        } else {
            self.run_lane::<false>(lane, &tiling, &plan);
        }
    }
}

impl<F: FloatElement, I: IndexElement> GatherKernel<'_, F, I> {
    fn run_lane<const ALIGNED: bool>(
        &self,
        lane: &LaneContext<'_>,
        tiling: &ScatterGradTiling,
        plan: &PartitionPlan,
    ) {
        let extents = tiling.extents.extents();
        let assignment = plan.lane(lane.lane_id);
        let (rows, width) = match plan.axis {
            TileAxis::Tasks => (plan.tile_size, plan.tile_size * extents.tail()),
            TileAxis::Tail { .. } => (1, plan.tile_size),
        };

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| GatherSlot {
            values: scratch.alloc::<F>(width),
            groups: scratch.alloc::<I>(rows),
            scales: match self.counts {
                Some(_) => scratch.alloc::<F>(rows),
                None => Vec::new(),
            },
        });
        let mut tiles = GatherLane::<F, I, ALIGNED> {
            kernel: self,
            extents,
            block: lane.properties().block_elements(F::DTYPE),
        };

        TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut tiles, &mut ring);
    }
}

impl<F: FloatElement, I: IndexElement, const ALIGNED: bool> TileKernel for GatherLane<'_, F, I, ALIGNED> {
    type Slot = GatherSlot<F, I>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let tail = self.extents.tail();
        let columns = tile.columns(tail);
        let width = columns.len();

        for (local, row) in tile.tasks().enumerate() {
            let group = self.kernel.index.load(self.extents.index_element(row));
            slot.groups[local] = group;

            let values = &mut slot.values[local * width..(local + 1) * width];
            let Some(target) = self.extents.target(row, group.as_index()) else {
                values.fill(F::zero());
                continue;
            };
            copy_in::<F, ALIGNED>(
                self.kernel.grad_out,
                target * tail + columns.start,
                width,
                values,
                self.block,
            );
            if let Some(counts) = self.kernel.counts {
                slot.scales[local] = counts.load(target);
            }
        }
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        if self.kernel.counts.is_none() {
            return;
        }

        let width = tile.columns(self.extents.tail()).len();
        for local in 0..tile.count {
            if self
                .extents
                .target(tile.offset + local, slot.groups[local].as_index())
                .is_none()
            {
                continue;
            }
            // Counts below one only come from callers mixing up tensors, clamp like an empty row.
            let count = slot.scales[local].max(F::one());
            for value in &mut slot.values[local * width..(local + 1) * width] {
                *value = *value / count;
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let tail = self.extents.tail();
        let columns = tile.columns(tail);

        copy_out::<F, ALIGNED>(
            &slot.values,
            self.kernel.grad_src,
            tile.offset * tail + columns.start,
            tile.count * columns.len(),
            self.block,
        );
    }
}
