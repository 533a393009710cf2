use core::marker::PhantomData;

use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TieBreak, TileAxis, TileDescriptor,
    config::execution::ExecutionLogLevel,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in, copy_out},
};

use super::scatter_variant;
use crate::{ScatterExtents, ScatterInstruction, ScatterTiling, winner_of};

/// Scatter where every lane owns a contiguous range of output rows.
///
/// A tile loads its output rows as the initial accumulator, then scans the index rows of every
/// head it touches in increasing position, folding the source rows that target it. When a row
/// doesn't fit, the tile is one column chunk of it and the scan repeats per chunk.
pub(crate) struct OwnedRowsKernel<'a, F: FloatElement, I: IndexElement, Inst> {
    pub src: &'a GlobalTensor<F>,
    pub index: &'a GlobalTensor<I>,
    pub out: &'a GlobalTensor<F>,
    pub args: Option<&'a GlobalTensor<I>>,
    pub counts: Option<&'a GlobalTensor<F>>,
    pub tie: TieBreak,
    pub _instruction: PhantomData<Inst>,
}

pub(crate) struct OwnedRowsSlot<F, I> {
    acc: Vec<F>,
    args: Vec<I>,
    counts: Vec<F>,
    staging: Vec<F>,
}

struct OwnedRowsLane<'a, F: FloatElement, I: IndexElement, Inst, const ALIGNED: bool> {
    kernel: &'a OwnedRowsKernel<'a, F, I, Inst>,
    extents: ScatterExtents,
    block: usize,
    index_block: usize,
}

impl<F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>> LaneKernel
    for OwnedRowsKernel<'_, F, I, Inst>
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

impl<F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>> OwnedRowsKernel<'_, F, I, Inst> {
    fn run_lane<const ALIGNED: bool>(
        &self,
        lane: &LaneContext<'_>,
        tiling: &ScatterTiling,
        plan: &PartitionPlan,
    ) {
        let extents = tiling.extents.extents();
        let assignment = plan.lane(lane.lane_id);
        let requirements = Inst::requirements();
        let (rows, width) = match plan.axis {
            TileAxis::Tasks => (plan.tile_size, extents.tail()),
            TileAxis::Tail { .. } => (1, plan.tile_size),
        };

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| OwnedRowsSlot {
            acc: scratch.alloc::<F>(rows * width),
            args: match requirements.args {
                true => scratch.alloc::<I>(rows * width),
                false => Vec::new(),
            },
            counts: match requirements.counts {
                true => scratch.alloc::<F>(rows),
                false => Vec::new(),
            },
            staging: scratch.alloc::<F>(width),
        });

        let mut tiles = OwnedRowsLane::<F, I, Inst, ALIGNED> {
            kernel: self,
            extents,
            block: lane.properties().block_elements(F::DTYPE),
            index_block: lane.properties().block_elements(I::DTYPE),
        };
        let count = TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut tiles, &mut ring);

        lane.log(ExecutionLogLevel::Basic, || {
            format!(
                "scatter {} owned rows {:?} in {count} tiles",
                Inst::KIND,
                assignment.task_offset..assignment.task_offset + assignment.task_count
            )
        });
    }
}

impl<F, I, Inst, const ALIGNED: bool> TileKernel for OwnedRowsLane<'_, F, I, Inst, ALIGNED>
where
    F: FloatElement,
    I: IndexElement,
    Inst: ScatterInstruction<F>,
{
    type Slot = OwnedRowsSlot<F, I>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let tail = self.extents.tail();
        let columns = tile.columns(tail);
        let len = tile.count * columns.len();
        let offset = tile.offset * tail + columns.start;

        copy_in::<F, ALIGNED>(self.kernel.out, offset, len, &mut slot.acc, self.block);
        if self.kernel.args.is_some() {
            slot.args[..len].fill(I::from_index(self.extents.decomposition.dim));
        }
        if self.kernel.counts.is_some() {
            slot.counts[..tile.count].fill(F::zero());
        }
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let rows = tile.tasks();
        if rows.is_empty() {
            return;
        }

        let decomposition = self.extents.decomposition;
        let (dim, body, tail) = (decomposition.dim, decomposition.body, decomposition.tail);
        let columns = tile.columns(tail);
        let width = columns.len();
        let first_head = decomposition.head_of_output_row(rows.start, self.extents.out_dim);
        let last_head = decomposition.head_of_output_row(rows.end - 1, self.extents.out_dim);
        let tracks_args = self.kernel.args.is_some();

        for head in first_head..=last_head {
            for position in 0..dim {
                for body_index in 0..body {
                    let index_row = (head * dim + position) * body + body_index;
                    let group = self
                        .kernel
                        .index
                        .load(self.extents.index_element(index_row))
                        .as_index();
                    let Some(target) = self.extents.target(index_row, group) else {
                        continue;
                    };
                    if !rows.contains(&target) {
                        continue;
                    }

                    copy_in::<F, ALIGNED>(
                        self.kernel.src,
                        index_row * tail + columns.start,
                        width,
                        &mut slot.staging,
                        self.block,
                    );

                    let local = target - rows.start;
                    for column in 0..width {
                        let element = local * width + column;
                        let winner = match tracks_args {
                            true => winner_of(slot.args[element], dim),
                            false => None,
                        };
                        let wins = Inst::combine(
                            &mut slot.acc[element],
                            slot.staging[column],
                            position,
                            winner,
                            self.kernel.tie,
                        );
                        if wins && tracks_args {
                            slot.args[element] = I::from_index(position);
                        }
                    }
                    if self.kernel.counts.is_some() {
                        slot.counts[local] = slot.counts[local] + F::one();
                    }
                }
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let tail = self.extents.tail();
        let columns = tile.columns(tail);
        let width = columns.len();
        let len = tile.count * width;
        let offset = tile.offset * tail + columns.start;

        if let Some(counts) = self.kernel.counts {
            for local in 0..tile.count {
                Inst::finalize(&mut slot.acc[local * width..(local + 1) * width], slot.counts[local]);
            }
            // Every chunk of a row counts the same contributions and rewrites the same value.
            copy_out::<F, false>(&slot.counts, counts, tile.offset, tile.count, self.block);
        }
        copy_out::<F, ALIGNED>(&slot.acc, self.kernel.out, offset, len, self.block);
        if let Some(args) = self.kernel.args {
            copy_out::<I, false>(&slot.args, args, offset, len, self.index_block);
        }
    }
}
