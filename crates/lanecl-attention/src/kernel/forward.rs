use lanecl_common::FloatElement;
use lanecl_runtime::{
    GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TileDescriptor,
    config::execution::ExecutionLogLevel,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in, copy_out},
};

use super::{ValueRows, boundary_of};
use crate::{BoundaryMode, MsdaLevel, MsdaShape, MsdaTiling, bilinear};

/// Forward pass, every lane owning the output rows of its queries.
pub(crate) struct ForwardKernel<'a, F: FloatElement> {
    pub value: &'a GlobalTensor<F>,
    pub levels: &'a [MsdaLevel],
    pub locations: &'a GlobalTensor<F>,
    pub weights: &'a GlobalTensor<F>,
    pub output: &'a GlobalTensor<F>,
}

pub(crate) struct ForwardSlot<F> {
    locations: Vec<F>,
    weights: Vec<F>,
    output: Vec<F>,
    corners: Vec<F>,
}

struct ForwardLane<'a, F: FloatElement, const ALIGNED: bool> {
    kernel: &'a ForwardKernel<'a, F>,
    rows: ValueRows<'a, F>,
    boundary: BoundaryMode,
}

impl<F: FloatElement> LaneKernel for ForwardKernel<'_, F> {
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<MsdaTiling>();
        if lane.tiling().key().variant & 1 == 1 {
            self.run_lane::<true>(lane, &tiling, &plan);
        } else {
            self.run_lane::<false>(lane, &tiling, &plan);
        }
    }
}

impl<F: FloatElement> ForwardKernel<'_, F> {
    fn run_lane<const ALIGNED: bool>(
        &self,
        lane: &LaneContext<'_>,
        tiling: &MsdaTiling,
        plan: &PartitionPlan,
    ) {
        let shape = tiling.shape.shape();
        let assignment = plan.lane(lane.lane_id);
        let samples = shape.samples_per_query();
        let row = shape.heads * shape.channels;

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| ForwardSlot {
            locations: scratch.alloc::<F>(plan.tile_size * 2 * samples),
            weights: scratch.alloc::<F>(plan.tile_size * samples),
            output: scratch.alloc::<F>(plan.tile_size * row),
            corners: scratch.alloc::<F>(4 * shape.channels),
        });

        let mut tiles = ForwardLane::<F, ALIGNED> {
            kernel: self,
            rows: ValueRows {
                value: self.value,
                levels: self.levels,
                shape,
                block: lane.properties().block_elements(F::DTYPE),
            },
            boundary: boundary_of(lane, &tiling.shape),
        };
        let count = TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut tiles, &mut ring);

        lane.log(ExecutionLogLevel::Basic, || {
            format!(
                "deformable attention over queries {:?} in {count} tiles",
                assignment.task_offset..assignment.task_offset + assignment.task_count
            )
        });
    }
}

impl<F: FloatElement, const ALIGNED: bool> TileKernel for ForwardLane<'_, F, ALIGNED> {
    type Slot = ForwardSlot<F>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let samples = self.rows.shape.samples_per_query();
        let block = self.rows.block;

        copy_in::<F, false>(
            self.kernel.locations,
            tile.offset * 2 * samples,
            tile.count * 2 * samples,
            &mut slot.locations,
            block,
        );
        copy_in::<F, false>(
            self.kernel.weights,
            tile.offset * samples,
            tile.count * samples,
            &mut slot.weights,
            block,
        );
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let MsdaShape {
            heads,
            channels,
            levels,
            queries,
            points,
            ..
        } = self.rows.shape;
        let samples = self.rows.shape.samples_per_query();
        let row = heads * channels;
        slot.output[..tile.count * row].fill(F::zero());

        for local in 0..tile.count {
            let batch = (tile.offset + local) / queries;
            for head in 0..heads {
                for level in 0..levels {
                    let extent = self.rows.levels[level];
                    for point in 0..points {
                        let sample_index = local * samples + (head * levels + level) * points + point;
                        let (x, y) = (
                            slot.locations[sample_index * 2],
                            slot.locations[sample_index * 2 + 1],
                        );
                        let Some(sample) =
                            bilinear(self.boundary, x, y, extent.height, extent.width)
                        else {
                            continue;
                        };

                        self.rows
                            .gather::<ALIGNED>(&sample, batch, head, level, &mut slot.corners);
                        let attention = slot.weights[sample_index];
                        let output = &mut slot.output[local * row + head * channels..][..channels];

                        for (index, corner) in sample.corners.iter().enumerate() {
                            if corner.position.is_none() {
                                continue;
                            }
                            let weight = attention * corner.weight;
                            let values = &slot.corners[index * channels..(index + 1) * channels];
                            for (out, value) in output.iter_mut().zip(values) {
                                *out = *out + weight * *value;
                            }
                        }
                    }
                }
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let row = self.rows.shape.heads * self.rows.shape.channels;
        copy_out::<F, ALIGNED>(
            &slot.output,
            self.kernel.output,
            tile.offset * row,
            tile.count * row,
            self.rows.block,
        );
    }
}
