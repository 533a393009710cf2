use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TileDescriptor,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in},
};

use crate::{ScatterExtents, ScatterGradTiling, winner_of};

/// Gradient of the max scatter: every output element sends its gradient to the source element
/// recorded as its argmax. Elements without a contributor send nothing.
///
/// A source element wins at most one output element, so writes never collide.
pub(crate) struct RouteKernel<'a, F: FloatElement, I: IndexElement> {
    pub grad_out: &'a GlobalTensor<F>,
    pub args: &'a GlobalTensor<I>,
    pub grad_src: &'a GlobalTensor<F>,
}

pub(crate) struct RouteSlot<F, I> {
    grads: Vec<F>,
    args: Vec<I>,
}

struct RouteLane<'a, F: FloatElement, I: IndexElement> {
    kernel: &'a RouteKernel<'a, F, I>,
    extents: ScatterExtents,
    block: usize,
    index_block: usize,
}

impl<F: FloatElement, I: IndexElement> LaneKernel for RouteKernel<'_, F, I> {
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<ScatterGradTiling>();
        self.run_lane(lane, &tiling, &plan);
    }
}

impl<F: FloatElement, I: IndexElement> RouteKernel<'_, F, I> {
    fn run_lane(&self, lane: &LaneContext<'_>, tiling: &ScatterGradTiling, plan: &PartitionPlan) {
        let assignment = plan.lane(lane.lane_id);
        let elements = plan.tile_size;

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| RouteSlot {
            grads: scratch.alloc::<F>(elements),
            args: scratch.alloc::<I>(elements),
        });
        let mut tiles = RouteLane {
            kernel: self,
            extents: tiling.extents.extents(),
            block: lane.properties().block_elements(F::DTYPE),
            index_block: lane.properties().block_elements(I::DTYPE),
        };

        TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut tiles, &mut ring);
    }
}

impl<F: FloatElement, I: IndexElement> TileKernel for RouteLane<'_, F, I> {
    type Slot = RouteSlot<F, I>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        copy_in::<F, false>(
            self.kernel.grad_out,
            tile.offset,
            tile.count,
            &mut slot.grads,
            self.block,
        );
        copy_in::<I, false>(
            self.kernel.args,
            tile.offset,
            tile.count,
            &mut slot.args,
            self.index_block,
        );
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let dim = self.extents.decomposition.dim;
        for local in 0..tile.count {
            if winner_of(slot.args[local], dim).is_none() {
                slot.grads[local] = F::zero();
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let decomposition = self.extents.decomposition;
        let (dim, body) = (decomposition.dim, decomposition.body);
        let per_head = self.extents.out_dim * body;

        for (local, element) in tile.tasks().enumerate() {
            let Some(position) = winner_of(slot.args[local], dim) else {
                continue;
            };
            let head = element / per_head;
            let body_index = element % body;
            self.kernel
                .grad_src
                .store((head * dim + position) * body + body_index, slot.grads[local]);
        }
    }
}
