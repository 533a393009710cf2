use core::fmt::Display;

use lanecl_common::DType;

use crate::{ConfigurationError, DeviceProperties, config::execution::MAX_DOUBLE_BUFFER_DEPTH};

/// One scratch buffer a kernel needs for every task of a tile.
///
/// A role costs `per_task` elements for every task, plus `per_tail_element` elements for every
/// tail element of that task's row. Each role is rounded up to whole transfer blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRole {
    pub name: &'static str,
    pub dtype: DType,
    pub per_task: usize,
    pub per_tail_element: usize,
}

impl BufferRole {
    /// A buffer holding `elements` values per task, independent of the tail.
    pub fn per_task(name: &'static str, dtype: DType, elements: usize) -> Self {
        Self {
            name,
            dtype,
            per_task: elements,
            per_tail_element: 0,
        }
    }

    /// A buffer holding `elements` values per tail element of each task's row.
    pub fn per_tail_element(name: &'static str, dtype: DType, elements: usize) -> Self {
        Self {
            name,
            dtype,
            per_task: 0,
            per_tail_element: elements,
        }
    }

    /// Number of elements this role holds for `tasks` tasks with rows of `tail` elements.
    pub fn elements(&self, tasks: usize, tail: usize) -> usize {
        tasks.saturating_mul(
            self.per_task
                .saturating_add(self.per_tail_element.saturating_mul(tail)),
        )
    }

    /// Scratch bytes of this role, rounded up to whole blocks.
    pub fn bytes(&self, tasks: usize, tail: usize, block_bytes: usize) -> usize {
        self.elements(tasks, tail)
            .saturating_mul(self.dtype.size_bytes())
            .next_multiple_of(block_bytes)
    }
}

/// What an operator asks the [partitioner](WorkPartitioner) to split.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    /// Independent units of work, e.g. output rows, candidate points or queries.
    pub total_tasks: usize,
    /// Scratch buffers that scale with the tile.
    pub roles: Vec<BufferRole>,
    /// Scratch bytes that don't scale with the tile, counted once per slot.
    pub fixed_bytes: usize,
    /// Number of elements in every task's row.
    pub tail: usize,
    /// Whether rows too large for scratch may be processed in tail chunks.
    pub streaming: bool,
    /// Deepest scratch ring the operator can use.
    pub max_depth: usize,
}

impl WorkRequest {
    pub fn new(total_tasks: usize) -> Self {
        Self {
            total_tasks,
            roles: Vec::new(),
            fixed_bytes: 0,
            tail: 1,
            streaming: false,
            max_depth: 2,
        }
    }

    pub fn with_role(mut self, role: BufferRole) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_fixed_bytes(mut self, bytes: usize) -> Self {
        self.fixed_bytes = bytes;
        self
    }

    /// Every task covers a row of `tail` elements. With `streaming`, rows that don't fit in
    /// scratch are processed in chunks.
    pub fn with_tail(mut self, tail: usize, streaming: bool) -> Self {
        self.tail = tail.max(1);
        self.streaming = streaming;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Scratch bytes of one slot holding `tasks` tasks of `tail` elements each.
    pub fn footprint(&self, tasks: usize, tail: usize, block_bytes: usize) -> usize {
        self.roles
            .iter()
            .map(|role| role.bytes(tasks, tail, block_bytes))
            .fold(self.fixed_bytes.next_multiple_of(block_bytes), usize::saturating_add)
    }
}

/// Dimension along which a lane's tiles are cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileAxis {
    /// Tiles group whole tasks.
    Tasks,
    /// Each task's row of `extent` elements is cut into chunks, one task at a time.
    Tail { extent: usize },
}

/// How the tasks of one class of lanes are cut into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LaneTiling {
    pub tile_count: usize,
    pub tile_size: usize,
    pub tail_tile_size: usize,
}

impl LaneTiling {
    /// Cut `extent` items into tiles of `tile_size`, the last one possibly smaller.
    pub fn over(extent: usize, tile_size: usize) -> Self {
        if extent == 0 || tile_size == 0 {
            return Self {
                tile_count: 0,
                tile_size,
                tail_tile_size: 0,
            };
        }

        let tile_count = extent.div_ceil(tile_size);
        Self {
            tile_count,
            tile_size,
            tail_tile_size: extent - tile_size * (tile_count - 1),
        }
    }

    /// Size of the tile at `index`.
    pub fn size_of(&self, index: usize) -> usize {
        if index + 1 == self.tile_count {
            self.tail_tile_size
        } else {
            self.tile_size
        }
    }
}

/// The partition of an operator's tasks over lanes, and of every lane's tasks into tiles.
///
/// The first `big_lane_count` lanes hold `big_lane_task_count` tasks, the remaining used lanes
/// hold `small_lane_task_count`, which is either equal or one less.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionPlan {
    pub lane_count: usize,
    pub used_lanes: usize,
    pub big_lane_count: usize,
    pub big_lane_task_count: usize,
    pub small_lane_task_count: usize,
    pub tile_count: usize,
    pub tile_size: usize,
    pub tail_tile_size: usize,
    pub small_tile_count: usize,
    pub small_tail_tile_size: usize,
    pub double_buffer_depth: usize,
    pub axis: TileAxis,
    /// Scratch bytes of one ring slot.
    pub slot_bytes: usize,
}

impl PartitionPlan {
    /// The plan of an invocation without any work: no lane runs.
    pub fn noop(lane_count: usize) -> Self {
        Self {
            lane_count,
            used_lanes: 0,
            big_lane_count: 0,
            big_lane_task_count: 0,
            small_lane_task_count: 0,
            tile_count: 0,
            tile_size: 0,
            tail_tile_size: 0,
            small_tile_count: 0,
            small_tail_tile_size: 0,
            double_buffer_depth: 1,
            axis: TileAxis::Tasks,
            slot_bytes: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.used_lanes == 0
    }

    pub fn total_tasks(&self) -> usize {
        self.big_lane_count * self.big_lane_task_count
            + (self.used_lanes - self.big_lane_count) * self.small_lane_task_count
    }

    /// Scratch bytes a lane needs for its whole ring.
    pub fn scratch_bytes(&self) -> usize {
        self.slot_bytes * self.double_buffer_depth
    }

    /// Number of tasks assigned to `lane_id`.
    ///
    /// # Panics
    /// If the lane isn't used by this plan.
    pub fn lane_task_count(&self, lane_id: usize) -> usize {
        self.check_lane(lane_id);
        if lane_id < self.big_lane_count {
            self.big_lane_task_count
        } else {
            self.small_lane_task_count
        }
    }

    /// First task assigned to `lane_id`.
    pub fn lane_task_offset(&self, lane_id: usize) -> usize {
        self.check_lane(lane_id);
        if lane_id < self.big_lane_count {
            lane_id * self.big_lane_task_count
        } else {
            self.big_lane_count * self.big_lane_task_count
                + (lane_id - self.big_lane_count) * self.small_lane_task_count
        }
    }

    /// The slice of work of `lane_id`.
    pub fn lane(&self, lane_id: usize) -> LaneAssignment {
        let task_count = self.lane_task_count(lane_id);
        let big = lane_id < self.big_lane_count;
        let tiling = match (self.axis, big) {
            (TileAxis::Tasks, false) => LaneTiling {
                tile_count: self.small_tile_count,
                tile_size: self.tile_size,
                tail_tile_size: self.small_tail_tile_size,
            },
            _ => LaneTiling {
                tile_count: self.tile_count,
                tile_size: self.tile_size,
                tail_tile_size: self.tail_tile_size,
            },
        };

        LaneAssignment {
            lane_id,
            task_offset: self.lane_task_offset(lane_id),
            task_count,
            tiling,
            axis: self.axis,
        }
    }

    /// Every used lane's assignment, in lane order.
    pub fn lanes(&self) -> impl Iterator<Item = LaneAssignment> + '_ {
        (0..self.used_lanes).map(|lane_id| self.lane(lane_id))
    }

    fn check_lane(&self, lane_id: usize) {
        assert!(
            lane_id < self.used_lanes,
            "Lane {lane_id} is outside the {} lanes used by the plan",
            self.used_lanes
        );
    }
}

impl Display for PartitionPlan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_noop() {
            return write!(f, "PartitionPlan(noop, lanes={})", self.lane_count);
        }
        write!(
            f,
            "PartitionPlan(lanes={}/{}, tasks={}x{} + {}x{}, tiles={}x{} tail {} | small {} tail {}, depth={}, axis={:?}, slot={}B)",
            self.used_lanes,
            self.lane_count,
            self.big_lane_count,
            self.big_lane_task_count,
            self.used_lanes - self.big_lane_count,
            self.small_lane_task_count,
            self.tile_count,
            self.tile_size,
            self.tail_tile_size,
            self.small_tile_count,
            self.small_tail_tile_size,
            self.double_buffer_depth,
            self.axis,
            self.slot_bytes,
        )
    }
}

/// The work of one lane, derived from a [PartitionPlan].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneAssignment {
    pub lane_id: usize,
    pub task_offset: usize,
    pub task_count: usize,
    pub tiling: LaneTiling,
    pub axis: TileAxis,
}

/// A chunk of a row's tail elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnChunk {
    pub offset: usize,
    pub count: usize,
}

/// One pass of a lane through its scratch. Recomputed from the plan, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileDescriptor {
    pub lane_id: usize,
    pub tile_index: usize,
    /// First task of the tile.
    pub offset: usize,
    /// Number of tasks in the tile.
    pub count: usize,
    /// Part of the row covered by the tile when rows are streamed in chunks.
    pub chunk: Option<ColumnChunk>,
}

impl TileDescriptor {
    /// Tasks covered by the tile.
    pub fn tasks(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + self.count
    }

    /// Columns covered by the tile, the whole row of `tail` elements when not streaming.
    pub fn columns(&self, tail: usize) -> core::ops::Range<usize> {
        match self.chunk {
            Some(chunk) => chunk.offset..chunk.offset + chunk.count,
            None => 0..tail,
        }
    }
}

impl LaneAssignment {
    pub fn is_idle(&self) -> bool {
        self.task_count == 0
    }

    /// Number of tiles the lane walks through.
    pub fn num_tiles(&self) -> usize {
        match self.axis {
            TileAxis::Tasks => self.tiling.tile_count,
            TileAxis::Tail { .. } => self.task_count * self.tiling.tile_count,
        }
    }

    /// Descriptor of the tile at `tile_index`.
    ///
    /// # Panics
    /// If the tile index is outside the lane's tiles.
    pub fn tile(&self, tile_index: usize) -> TileDescriptor {
        assert!(
            tile_index < self.num_tiles(),
            "Tile {tile_index} is outside the {} tiles of lane {}",
            self.num_tiles(),
            self.lane_id
        );

        match self.axis {
            TileAxis::Tasks => TileDescriptor {
                lane_id: self.lane_id,
                tile_index,
                offset: self.task_offset + tile_index * self.tiling.tile_size,
                count: self.tiling.size_of(tile_index),
                chunk: None,
            },
            TileAxis::Tail { .. } => {
                let task = tile_index / self.tiling.tile_count;
                let chunk = tile_index % self.tiling.tile_count;
                TileDescriptor {
                    lane_id: self.lane_id,
                    tile_index,
                    offset: self.task_offset + task,
                    count: 1,
                    chunk: Some(ColumnChunk {
                        offset: chunk * self.tiling.tile_size,
                        count: self.tiling.size_of(chunk),
                    }),
                }
            }
        }
    }

    pub fn tiles(&self) -> impl Iterator<Item = TileDescriptor> + '_ {
        (0..self.num_tiles()).map(|index| self.tile(index))
    }
}

/// Splits tasks over lanes and cuts each lane's share into tiles that fit its scratch.
#[derive(Debug, Clone)]
pub struct WorkPartitioner {
    lane_count: usize,
    scratch_budget_bytes: usize,
    block_bytes: usize,
}

impl WorkPartitioner {
    pub fn new(properties: &DeviceProperties) -> Self {
        Self {
            lane_count: properties.lane_count,
            scratch_budget_bytes: properties.scratch_budget_bytes,
            block_bytes: properties.block_bytes.max(1),
        }
    }

    /// Plan the request.
    ///
    /// An empty request yields a [no-op plan](PartitionPlan::noop). Fails when the device has no
    /// lane or no scratch, or when not a single task (or tail chunk) fits in scratch.
    pub fn plan(&self, request: &WorkRequest) -> Result<PartitionPlan, ConfigurationError> {
        if self.lane_count == 0 {
            return Err(ConfigurationError::NoLanes);
        }
        if self.scratch_budget_bytes == 0 {
            return Err(ConfigurationError::NoScratch);
        }
        if request.total_tasks == 0 {
            log::debug!("Nothing to plan, emitting a no-op plan");
            return Ok(PartitionPlan::noop(self.lane_count));
        }

        let split = TaskSplit::new(request.total_tasks, self.lane_count);
        let max_depth = request.max_depth.clamp(1, MAX_DOUBLE_BUFFER_DEPTH);
        let block = self.block_bytes;

        let resident = self.select_tile(max_depth, split.big_lane_task_count, |tasks| {
            request.footprint(tasks, request.tail, block)
        });

        let plan = match resident {
            Some((tile_size, depth)) => {
                let big = LaneTiling::over(split.big_lane_task_count, tile_size);
                let small = LaneTiling::over(split.small_lane_task_count, tile_size);
                split.into_plan(
                    self.lane_count,
                    big,
                    small,
                    depth,
                    TileAxis::Tasks,
                    request.footprint(tile_size, request.tail, block),
                )
            }
            None if request.streaming && request.tail > 1 => {
                let Some((chunk, depth)) = self.select_tile(max_depth, request.tail, |chunk| {
                    request.footprint(1, chunk, block)
                }) else {
                    return Err(ConfigurationError::ScratchTooSmall {
                        required: request.footprint(1, 1, block),
                        available: self.scratch_budget_bytes,
                    });
                };
                log::warn!(
                    "Rows of {} elements exceed the scratch budget of {} bytes, streaming them in chunks of {chunk}",
                    request.tail,
                    self.scratch_budget_bytes
                );
                let tiling = LaneTiling::over(request.tail, chunk);
                split.into_plan(
                    self.lane_count,
                    tiling,
                    tiling,
                    depth,
                    TileAxis::Tail {
                        extent: request.tail,
                    },
                    request.footprint(1, chunk, block),
                )
            }
            None => {
                return Err(ConfigurationError::ScratchTooSmall {
                    required: request.footprint(1, request.tail, block),
                    available: self.scratch_budget_bytes,
                });
            }
        };

        log::debug!("{plan}");
        Ok(plan)
    }

    // Picks the deepest ring that still holds a tile and that the lane can keep busy, then the
    // largest tile fitting that ring.
    fn select_tile<F: Fn(usize) -> usize>(
        &self,
        max_depth: usize,
        extent: usize,
        footprint: F,
    ) -> Option<(usize, usize)> {
        for depth in (1..=max_depth).rev() {
            let Some(tile) = self.largest_tile(depth, extent, &footprint) else {
                continue;
            };
            if depth == 1 || extent.div_ceil(tile) >= depth {
                return Some((tile, depth));
            }
        }
        None
    }

    fn largest_tile<F: Fn(usize) -> usize>(
        &self,
        depth: usize,
        extent: usize,
        footprint: &F,
    ) -> Option<usize> {
        let fits = |tile: usize| footprint(tile).saturating_mul(depth) <= self.scratch_budget_bytes;

        if extent == 0 || !fits(1) {
            return None;
        }

        let (mut low, mut high) = (1, extent);
        while low < high {
            let mid = low + (high - low).div_ceil(2);
            if fits(mid) {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        Some(low)
    }
}

/// Task counts per lane, before tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskSplit {
    used_lanes: usize,
    big_lane_count: usize,
    big_lane_task_count: usize,
    small_lane_task_count: usize,
}

impl TaskSplit {
    fn new(total_tasks: usize, lane_count: usize) -> Self {
        let big_lane_task_count = total_tasks.div_ceil(lane_count);
        let small_lane_task_count = if total_tasks % lane_count == 0 {
            big_lane_task_count
        } else {
            big_lane_task_count - 1
        };
        let used_lanes = total_tasks.div_ceil(big_lane_task_count);
        let big_lane_count = total_tasks - small_lane_task_count * used_lanes;

        Self {
            used_lanes,
            big_lane_count,
            big_lane_task_count,
            small_lane_task_count,
        }
    }

    fn into_plan(
        self,
        lane_count: usize,
        big: LaneTiling,
        small: LaneTiling,
        depth: usize,
        axis: TileAxis,
        slot_bytes: usize,
    ) -> PartitionPlan {
        PartitionPlan {
            lane_count,
            used_lanes: self.used_lanes,
            big_lane_count: self.big_lane_count,
            big_lane_task_count: self.big_lane_task_count,
            small_lane_task_count: self.small_lane_task_count,
            tile_count: big.tile_count,
            tile_size: big.tile_size,
            tail_tile_size: big.tail_tile_size,
            small_tile_count: small.tile_count,
            small_tail_tile_size: small.tail_tile_size,
            double_buffer_depth: depth,
            axis,
            slot_bytes,
        }
    }
}
