use lanecl_common::FloatElement;
use lanecl_runtime::{
    GlobalTensor, LaneAssignment, LaneContext, LaneExchange, LaneKernel, PartitionPlan, TieBreak,
    TileDescriptor,
    config::execution::ExecutionLogLevel,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in, copy_out},
};

use crate::{FpsExtents, FpsTiling, FpsVariant, PointSource};

/// Farthest candidate seen so far: its nearest distance and its index.
pub(crate) type Candidate<F> = Option<(F, usize)>;

/// Keeps the farther of two candidates.
pub(crate) fn farther<F: FloatElement>(
    current: Candidate<F>,
    other: Candidate<F>,
    tie: TieBreak,
) -> Candidate<F> {
    match (current, other) {
        (None, candidate) | (candidate, None) => candidate,
        (Some(best), Some((distance, index))) => {
            if tie.replaces(distance, index, best.0, best.1) {
                other
            } else {
                current
            }
        }
    }
}

/// Selection loop run by every lane.
///
/// Lanes own a contiguous range of candidates. Every iteration, each lane refreshes the nearest
/// distance of its candidates to the last selected point, then all lanes agree on the farthest
/// candidate through the exchange.
pub(crate) struct FpsKernel<'a, F: FloatElement> {
    pub input: &'a GlobalTensor<F>,
    pub seeds: Option<&'a GlobalTensor<F>>,
    /// Workspace holding the running distances of spilled launches.
    pub nearest: Option<&'a GlobalTensor<F>>,
    pub indices: &'a GlobalTensor<i32>,
    pub distances: &'a GlobalTensor<F>,
    pub exchange: &'a LaneExchange<Candidate<F>>,
    pub tie: TieBreak,
}

pub(crate) struct FpsSlot<F> {
    input: Vec<F>,
    nearest: Vec<F>,
}

struct FpsLane<'a, F: FloatElement, const ALIGNED: bool> {
    kernel: &'a FpsKernel<'a, F>,
    source: PointSource,
    extents: FpsExtents,
    batch: usize,
    last: usize,
    anchor: [F; 3],
    lane_offset: usize,
    resident: &'a mut [F],
    best: Candidate<F>,
    block: usize,
}

impl<F: FloatElement> LaneKernel for FpsKernel<'_, F> {
    fn run(&self, lane: &LaneContext<'_>) {
        let _guard = self.exchange.guard();
        let (tiling, plan) = lane.decode::<FpsTiling>();
        let key = lane.tiling().key().variant;
        let Some(variant) = FpsVariant::from_key(key) else {
            panic!("Lane {} received an unknown sampling variant {key:#x}", lane.lane_id);
        };
        assert_eq!(
            variant.spilled,
            self.nearest.is_some(),
            "Spilled launches need a workspace"
        );

        if variant.aligned {
            self.run_lane::<true>(lane, &tiling, &plan, variant);
        } else {
            self.run_lane::<false>(lane, &tiling, &plan, variant);
        }
    }
}

impl<F: FloatElement> FpsKernel<'_, F> {
    fn run_lane<const ALIGNED: bool>(
        &self,
        lane: &LaneContext<'_>,
        tiling: &FpsTiling,
        plan: &PartitionPlan,
        variant: FpsVariant,
    ) {
        let extents = FpsExtents {
            batch: tiling.batch as usize,
            points: tiling.points as usize,
            samples: tiling.samples as usize,
        };
        let assignment = plan.lane(lane.lane_id);
        let per_point = match variant.source {
            PointSource::Coordinates => 3,
            PointSource::Distances => 1,
        };

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| FpsSlot {
            input: scratch.alloc::<F>(plan.tile_size * per_point),
            nearest: match variant.spilled {
                true => scratch.alloc::<F>(plan.tile_size),
                false => Vec::new(),
            },
        });
        let mut resident = match variant.spilled {
            true => Vec::new(),
            false => scratch.alloc::<F>(assignment.task_count),
        };
        let block = lane.properties().block_elements(F::DTYPE);
        let seed = F::from_f64(tiling.seed);

        for batch in 0..extents.batch {
            self.seed_lane(&assignment, &extents, batch, seed, &mut resident);

            let first = batch * extents.samples;
            if lane.lane_id == 0 {
                self.indices.store(first, 0);
                self.distances.store(first, F::infinity());
            }

            let mut selected = 0;
            for sample in 1..extents.samples {
                let mut tiles = FpsLane::<F, ALIGNED> {
                    kernel: self,
                    source: variant.source,
                    extents,
                    batch,
                    last: selected,
                    anchor: self.anchor(variant.source, &extents, batch, selected),
                    lane_offset: assignment.task_offset,
                    resident: &mut resident,
                    best: None,
                    block,
                };
                TileExecutor::new(&assignment)
                    .traced(lane)
                    .run(&mut tiles, &mut ring);

                let tie = self.tie;
                let best = self
                    .exchange
                    .all_reduce(lane.lane_id, tiles.best, |a, b| farther(a, b, tie));
                let Some((distance, index)) = best else {
                    unreachable!("Every used lane holds at least one candidate");
                };

                selected = index;
                if lane.lane_id == 0 {
                    self.indices.store(first + sample, index as i32);
                    self.distances.store(first + sample, distance);
                }
            }

            lane.log(ExecutionLogLevel::Basic, || {
                format!(
                    "batch {batch}: refreshed points {:?} over {} selections",
                    assignment.task_offset..assignment.task_offset + assignment.task_count,
                    extents.samples
                )
            });
        }
    }

    fn seed_lane(
        &self,
        assignment: &LaneAssignment,
        extents: &FpsExtents,
        batch: usize,
        seed: F,
        resident: &mut [F],
    ) {
        for local in 0..assignment.task_count {
            let point = batch * extents.points + assignment.task_offset + local;
            let value = match self.seeds {
                Some(seeds) => seeds.load(point),
                None => seed,
            };
            match self.nearest {
                Some(nearest) => nearest.store(point, value),
                None => resident[local] = value,
            }
        }
    }

    fn anchor(&self, source: PointSource, extents: &FpsExtents, batch: usize, point: usize) -> [F; 3] {
        match source {
            PointSource::Coordinates => {
                let offset = (batch * extents.points + point) * 3;
                [
                    self.input.load(offset),
                    self.input.load(offset + 1),
                    self.input.load(offset + 2),
                ]
            }
            PointSource::Distances => [F::zero(); 3],
        }
    }
}

impl<F: FloatElement, const ALIGNED: bool> FpsLane<'_, F, ALIGNED> {
    fn distance(&self, slot: &FpsSlot<F>, local: usize) -> F {
        match self.source {
            PointSource::Coordinates => {
                let point = &slot.input[local * 3..local * 3 + 3];
                let dx = point[0] - self.anchor[0];
                let dy = point[1] - self.anchor[1];
                let dz = point[2] - self.anchor[2];
                dx * dx + dy * dy + dz * dz
            }
            PointSource::Distances => slot.input[local],
        }
    }
}

impl<F: FloatElement, const ALIGNED: bool> TileKernel for FpsLane<'_, F, ALIGNED> {
    type Slot = FpsSlot<F>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let first = self.batch * self.extents.points + tile.offset;
        match self.source {
            PointSource::Coordinates => copy_in::<F, ALIGNED>(
                self.kernel.input,
                first * 3,
                tile.count * 3,
                &mut slot.input,
                self.block,
            ),
            PointSource::Distances => copy_in::<F, ALIGNED>(
                self.kernel.input,
                (self.batch * self.extents.points + self.last) * self.extents.points + tile.offset,
                tile.count,
                &mut slot.input,
                self.block,
            ),
        }
        if let Some(nearest) = self.kernel.nearest {
            copy_in::<F, ALIGNED>(nearest, first, tile.count, &mut slot.nearest, self.block);
        }
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        let spilled = self.kernel.nearest.is_some();

        for local in 0..tile.count {
            let distance = self.distance(slot, local);
            let cell = match spilled {
                true => &mut slot.nearest[local],
                false => &mut self.resident[tile.offset - self.lane_offset + local],
            };
            *cell = (*cell).min(distance);

            let candidate = Some((*cell, tile.offset + local));
            self.best = farther(self.best, candidate, self.kernel.tie);
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot) {
        if let Some(nearest) = self.kernel.nearest {
            let first = self.batch * self.extents.points + tile.offset;
            copy_out::<F, ALIGNED>(&slot.nearest, nearest, first, tile.count, self.block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_follow_the_configured_rule() {
        let low = Some((2.0f32, 1));
        let high = Some((2.0f32, 4));

        assert_eq!(farther(low, high, TieBreak::LowestIndex), low);
        assert_eq!(farther(high, low, TieBreak::LowestIndex), low);
        assert_eq!(farther(low, high, TieBreak::HighestIndex), high);
        assert_eq!(farther(None, high, TieBreak::LowestIndex), high);
        assert_eq!(farther(Some((3.0, 9)), low, TieBreak::LowestIndex), Some((3.0, 9)));
    }
}
