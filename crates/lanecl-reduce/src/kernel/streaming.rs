use core::marker::PhantomData;

use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    CellLocks, GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TieBreak, TileAxis,
    TileDescriptor,
    config::execution::ExecutionLogLevel,
    pipeline::{SlotRing, TileExecutor, TileKernel, accumulate_out, copy_in},
};

use super::scatter_variant;
use crate::{ScatterExtents, ScatterInstruction, ScatterTiling, winner_of};

/// Scatter where every lane walks a contiguous range of index rows and folds them into global
/// memory.
///
/// Additive reductions use atomic adds. Reductions tracking args lock the value and its arg
/// together, since both must change at once.
pub(crate) struct StreamingKernel<'a, F: FloatElement, I: IndexElement, Inst> {
    pub src: &'a GlobalTensor<F>,
    pub index: &'a GlobalTensor<I>,
    pub out: &'a GlobalTensor<F>,
    pub args: Option<&'a GlobalTensor<I>>,
    pub counts: Option<&'a GlobalTensor<F>>,
    pub locks: &'a CellLocks,
    pub tie: TieBreak,
    pub _instruction: PhantomData<Inst>,
}

pub(crate) struct StreamingSlot<F, I> {
    values: Vec<F>,
    groups: Vec<I>,
}

struct StreamingLane<'a, F: FloatElement, I: IndexElement, Inst, const ALIGNED: bool> {
    kernel: &'a StreamingKernel<'a, F, I, Inst>,
    extents: ScatterExtents,
    block: usize,
}

impl<F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>> LaneKernel
    for StreamingKernel<'_, F, I, Inst>
{
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<ScatterTiling>();
        let variant = scatter_variant(lane);
        debug_assert_eq!(variant.kind, Inst::KIND);

        if variant.aligned {
            self.run_lane::<true>(lane, &tiling, &plan);
        } else {
            self.run_lane::<false>(lane, &tiling, &plan);
        }
    }
}

impl<F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>> StreamingKernel<'_, F, I, Inst> {
    fn run_lane<const ALIGNED: bool>(
        &self,
        lane: &LaneContext<'_>,
        tiling: &ScatterTiling,
        plan: &PartitionPlan,
    ) {
        let extents = tiling.extents.extents();
        let assignment = plan.lane(lane.lane_id);
        let (rows, width) = match plan.axis {
            TileAxis::Tasks => (plan.tile_size, plan.tile_size * extents.tail()),
            TileAxis::Tail { .. } => (1, plan.tile_size),
        };

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| StreamingSlot {
            values: scratch.alloc::<F>(width),
            groups: scratch.alloc::<I>(rows),
        });

        let mut tiles = StreamingLane::<F, I, Inst, ALIGNED> {
            kernel: self,
            extents,
            block: lane.properties().block_elements(F::DTYPE),
        };
        let count = TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut tiles, &mut ring);

        lane.log(ExecutionLogLevel::Basic, || {
            format!(
                "scatter {} streamed {} index rows in {count} tiles",
                Inst::KIND,
                assignment.task_count
            )
        });
    }
}

impl<F, I, Inst, const ALIGNED: bool> TileKernel for StreamingLane<'_, F, I, Inst, ALIGNED>
where
    F: FloatElement,
    I: IndexElement,
    Inst: ScatterInstruction<F>,
{
    type Slot = StreamingSlot<F, I>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let tail = self.extents.tail();
        let columns = tile.columns(tail);
        let offset = tile.offset * tail + columns.start;

        copy_in::<F, ALIGNED>(
            self.kernel.src,
            offset,
            tile.count * columns.len(),
            &mut slot.values,
            self.block,
        );
        for (local, row) in tile.tasks().enumerate() {
            slot.groups[local] = self.kernel.index.load(self.extents.index_element(row));
        }
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        // Masked rows are rewritten to the first group past the output.
        let masked = I::from_index(self.extents.out_dim);
        for (local, row) in tile.tasks().enumerate() {
            if self
                .extents
                .target(row, slot.groups[local].as_index())
                .is_none()
            {
                slot.groups[local] = masked;
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let decomposition = self.extents.decomposition;
        let tail = decomposition.tail;
        let columns = tile.columns(tail);
        let width = columns.len();

        for (local, row) in tile.tasks().enumerate() {
            let Some(target) = self.extents.target(row, slot.groups[local].as_index()) else {
                continue;
            };
            let values = &slot.values[local * width..(local + 1) * width];
            let offset = target * tail + columns.start;

            match self.kernel.args {
                Some(args) => {
                    let position = decomposition.position_along_axis(row);
                    for (column, value) in values.iter().enumerate() {
                        let cell = offset + column;
                        self.kernel.locks.with(cell, || {
                            let mut acc = self.kernel.out.load(cell);
                            let winner = winner_of(args.load(cell), decomposition.dim);
                            if Inst::combine(&mut acc, *value, position, winner, self.kernel.tie) {
                                self.kernel.out.store(cell, acc);
                                args.store(cell, I::from_index(position));
                            }
                        });
                    }
                }
                None => accumulate_out(values, self.kernel.out, offset, width),
            }

            // A streamed row is counted once, by its first chunk.
            if columns.start == 0 {
                if let Some(counts) = self.kernel.counts {
                    counts.atomic_add(target, F::one());
                }
            }
        }
    }
}
