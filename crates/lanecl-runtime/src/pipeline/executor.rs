use super::{SlotRing, TileStage};
use crate::{LaneAssignment, LaneContext, TileDescriptor, config::execution::ExecutionLogLevel};

/// The three stages of a tile, plugged into a [TileExecutor].
pub trait TileKernel {
    /// The scratch buffers of one ring slot.
    type Slot;

    /// Moves the tile's inputs from global memory into `slot`.
    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot);

    /// Computes the tile's results in `slot`.
    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot);

    /// Moves the tile's results from `slot` back to global memory.
    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Self::Slot);
}

/// Walks the tiles of one lane through copy-in, compute and copy-out.
///
/// With a ring of `depth` slots, the copy-in of up to `depth - 1` following tiles is issued
/// before a tile computes. A tile only computes once its own copy-in completed and only copies
/// out once its compute completed; tiles otherwise only depend on each other through slot reuse.
pub struct TileExecutor<'a> {
    assignment: &'a LaneAssignment,
    lane: Option<&'a LaneContext<'a>>,
}

impl<'a> TileExecutor<'a> {
    pub fn new(assignment: &'a LaneAssignment) -> Self {
        Self {
            assignment,
            lane: None,
        }
    }

    /// Reports every stage on the execution logger of `lane`.
    pub fn traced(mut self, lane: &'a LaneContext<'a>) -> Self {
        self.lane = Some(lane);
        self
    }

    /// Runs every tile of the lane and returns how many were processed.
    pub fn run<K: TileKernel>(&self, kernel: &mut K, ring: &mut SlotRing<K::Slot>) -> usize {
        let tiles = self.assignment.num_tiles();
        let depth = ring.depth();
        let mut issued = 0;

        for index in 0..tiles {
            while issued < (index + depth).min(tiles) {
                let tile = self.assignment.tile(issued);
                self.trace(&tile, TileStage::PendingCopyIn);
                kernel.copy_in(&tile, ring.acquire(issued));
                issued += 1;
            }

            let tile = self.assignment.tile(index);
            self.trace(&tile, TileStage::Computing);
            kernel.compute(&tile, ring.advance(index, TileStage::Computing));
            self.trace(&tile, TileStage::PendingCopyOut);
            kernel.copy_out(&tile, ring.advance(index, TileStage::PendingCopyOut));
            ring.advance(index, TileStage::Done);
        }

        debug_assert!(ring.is_drained());
        tiles
    }

    fn trace(&self, tile: &TileDescriptor, stage: TileStage) {
        if let Some(lane) = self.lane {
            lane.log(ExecutionLogLevel::Full, || {
                format!(
                    "tile {} tasks {:?} chunk {:?}: {stage:?}",
                    tile.tile_index,
                    tile.tasks(),
                    tile.chunk
                )
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LaneTiling, TileAxis};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(&'static str, usize, usize)>,
    }

    impl TileKernel for Recorder {
        type Slot = usize;

        fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut usize) {
            *slot = tile.tile_index;
            self.events.push(("in", tile.tile_index, *slot));
        }

        fn compute(&mut self, tile: &TileDescriptor, slot: &mut usize) {
            assert_eq!(*slot, tile.tile_index);
            self.events.push(("compute", tile.tile_index, *slot));
        }

        fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut usize) {
            self.events.push(("out", tile.tile_index, *slot));
        }
    }

    fn assignment(task_count: usize, tile_size: usize) -> LaneAssignment {
        LaneAssignment {
            lane_id: 0,
            task_offset: 0,
            task_count,
            tiling: LaneTiling::over(task_count, tile_size),
            axis: TileAxis::Tasks,
        }
    }

    #[test]
    fn double_buffering_prefetches_the_next_tile() {
        let assignment = assignment(10, 4);
        let mut kernel = Recorder::default();
        let mut ring = SlotRing::from_fn(2, |_| usize::MAX);

        let tiles = TileExecutor::new(&assignment).run(&mut kernel, &mut ring);

        assert_eq!(tiles, 3);
        let order: Vec<_> = kernel
            .events
            .iter()
            .map(|(stage, tile, _)| (*stage, *tile))
            .collect();
        assert_eq!(
            order,
            vec![
                ("in", 0),
                ("in", 1),
                ("compute", 0),
                ("out", 0),
                ("in", 2),
                ("compute", 1),
                ("out", 1),
                ("compute", 2),
                ("out", 2),
            ]
        );
    }

    #[test]
    fn single_slot_is_strictly_sequential() {
        let assignment = assignment(3, 1);
        let mut kernel = Recorder::default();
        let mut ring = SlotRing::from_fn(1, |_| 0);

        TileExecutor::new(&assignment).run(&mut kernel, &mut ring);

        let stages: Vec<_> = kernel.events.iter().map(|(stage, _, _)| *stage).collect();
        assert_eq!(stages, ["in", "compute", "out"].repeat(3));
    }

    #[test]
    fn idle_lane_runs_nothing() {
        let assignment = assignment(0, 4);
        let mut kernel = Recorder::default();
        let mut ring = SlotRing::from_fn(2, |_| 0);

        assert_eq!(TileExecutor::new(&assignment).run(&mut kernel, &mut ring), 0);
        assert!(kernel.events.is_empty());
    }
}
