use lanecl_common::FloatElement;
use lanecl_runtime::{
    GlobalTensor, LaneContext, LaneKernel, PartitionPlan, TileDescriptor,
    config::execution::ExecutionLogLevel,
    pipeline::{SlotRing, TileExecutor, TileKernel, accumulate_out, copy_in, copy_out},
};

use super::{ValueRows, boundary_of};
use crate::{BoundaryMode, MsdaGradTiling, MsdaLevel, MsdaShape, bilinear};

/// Backward pass over the queries of every lane.
///
/// Several queries can sample the same cell, so value gradients are accumulated in global memory.
/// Location and weight gradients have a single producer and are written plainly.
pub(crate) struct BackwardKernel<'a, F: FloatElement> {
    pub value: &'a GlobalTensor<F>,
    pub levels: &'a [MsdaLevel],
    pub locations: &'a GlobalTensor<F>,
    pub weights: &'a GlobalTensor<F>,
    pub grad_output: &'a GlobalTensor<F>,
    pub grad_value: &'a GlobalTensor<F>,
    pub grad_locations: &'a GlobalTensor<F>,
    pub grad_weights: &'a GlobalTensor<F>,
}

pub(crate) struct BackwardSlot<F> {
    locations: Vec<F>,
    weights: Vec<F>,
    grad_output: Vec<F>,
    grad_locations: Vec<F>,
    grad_weights: Vec<F>,
    corners: Vec<F>,
    corner_grads: Vec<F>,
}

struct BackwardLane<'a, F: FloatElement, const ALIGNED: bool> {
    kernel: &'a BackwardKernel<'a, F>,
    rows: ValueRows<'a, F>,
    boundary: BoundaryMode,
}

impl<F: FloatElement> LaneKernel for BackwardKernel<'_, F> {
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<MsdaGradTiling>();
        if lane.tiling().key().variant & 1 == 1 {
            self.run_lane::<true>(lane, &tiling, &plan);
        } else {
            self.run_lane::<false>(lane, &tiling, &plan);
        }
    }
}

impl<F: FloatElement> BackwardKernel<'_, F> {
    fn run_lane<const ALIGNED: bool>(
        &self,
        lane: &LaneContext<'_>,
        tiling: &MsdaGradTiling,
        plan: &PartitionPlan,
    ) {
        let shape = tiling.shape.shape();
        let assignment = plan.lane(lane.lane_id);
        let samples = shape.samples_per_query();
        let tile = plan.tile_size;

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| BackwardSlot {
            locations: scratch.alloc::<F>(tile * 2 * samples),
            weights: scratch.alloc::<F>(tile * samples),
            grad_output: scratch.alloc::<F>(tile * shape.heads * shape.channels),
            grad_locations: scratch.alloc::<F>(tile * 2 * samples),
            grad_weights: scratch.alloc::<F>(tile * samples),
            corners: scratch.alloc::<F>(4 * shape.channels),
            corner_grads: scratch.alloc::<F>(4 * shape.channels),
        });

        let mut tiles = BackwardLane::<F, ALIGNED> {
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
                "deformable attention gradients over queries {:?} in {count} tiles",
                assignment.task_offset..assignment.task_offset + assignment.task_count
            )
        });
    }
}

impl<F: FloatElement, const ALIGNED: bool> TileKernel for BackwardLane<'_, F, ALIGNED> {
    type Slot = BackwardSlot<F>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let shape = self.rows.shape;
        let samples = shape.samples_per_query();
        let row = shape.heads * shape.channels;
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
        copy_in::<F, ALIGNED>(
            self.kernel.grad_output,
            tile.offset * row,
            tile.count * row,
            &mut slot.grad_output,
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
        slot.grad_locations[..tile.count * 2 * samples].fill(F::zero());
        slot.grad_weights[..tile.count * samples].fill(F::zero());

        for local in 0..tile.count {
            let batch = (tile.offset + local) / queries;
            for head in 0..heads {
                let top = &slot.grad_output[local * row + head * channels..][..channels];
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
                        let (weight_x, weight_y) = (sample.weight_grad_x(), sample.weight_grad_y());

                        let (mut grad_attention, mut grad_x, mut grad_y) =
                            (F::zero(), F::zero(), F::zero());
                        for (channel, top) in top.iter().enumerate() {
                            let (mut sampled, mut along_x, mut along_y) =
                                (F::zero(), F::zero(), F::zero());
                            for (index, corner) in sample.corners.iter().enumerate() {
                                if corner.position.is_none() {
                                    continue;
                                }
                                let value = slot.corners[index * channels + channel];
                                sampled = sampled + corner.weight * value;
                                along_x = along_x + weight_x[index] * value;
                                along_y = along_y + weight_y[index] * value;
                                slot.corner_grads[index * channels + channel] =
                                    attention * corner.weight * *top;
                            }
                            grad_attention = grad_attention + *top * sampled;
                            grad_x = grad_x + *top * attention * along_x;
                            grad_y = grad_y + *top * attention * along_y;
                        }

                        for (index, corner) in sample.corners.iter().enumerate() {
                            if let Some(position) = corner.position {
                                accumulate_out(
                                    &slot.corner_grads[index * channels..(index + 1) * channels],
                                    self.kernel.grad_value,
                                    self.rows.offset(batch, head, level, position),
                                    channels,
                                );
                            }
                        }
                        slot.grad_weights[sample_index] = grad_attention;
                        slot.grad_locations[sample_index * 2] = grad_x * sample.slope_x;
                        slot.grad_locations[sample_index * 2 + 1] = grad_y * sample.slope_y;
                    }
                }
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let samples = self.rows.shape.samples_per_query();
        let block = self.rows.block;

        copy_out::<F, false>(
            &slot.grad_locations,
            self.kernel.grad_locations,
            tile.offset * 2 * samples,
            tile.count * 2 * samples,
            block,
        );
        copy_out::<F, false>(
            &slot.grad_weights,
            self.kernel.grad_weights,
            tile.offset * samples,
            tile.count * samples,
            block,
        );
    }
}
