//! Serialization of plans between the planning entry point and the lanes.
//!
//! Every operator defines a `#[repr(C)]` tiling layout whose first field is a
//! [PartitionPlanRaw]. The layout is copied into a flat [TilingBuffer] on the host and decoded
//! again by each lane before it starts working.

use bytemuck::{Pod, Zeroable};

use crate::{DecodeError, PartitionPlan, TileAxis};

/// Identifies the operator and kernel variant a tiling buffer was encoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilingKey {
    pub operator: u32,
    pub variant: u32,
}

/// A fixed-size tiling layout shared by the planner and the lanes of one operator.
pub trait TilingData: Pod {
    /// Identifier of the operator, recorded in every buffer.
    const OPERATOR: u32;

    /// The partition plan embedded in the layout.
    fn raw_plan(&self) -> &PartitionPlanRaw;

    /// Decodes and validates the embedded plan.
    fn plan(&self) -> Result<PartitionPlan, DecodeError> {
        PartitionPlan::try_from(*self.raw_plan())
    }
}

/// The flat byte buffer handed from the planner to the lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingBuffer {
    key: TilingKey,
    bytes: Vec<u8>,
}

impl TilingBuffer {
    /// Encodes `data` for the kernel `variant`.
    pub fn encode<T: TilingData>(data: &T, variant: u32) -> Self {
        Self {
            key: TilingKey {
                operator: T::OPERATOR,
                variant,
            },
            bytes: bytemuck::bytes_of(data).to_vec(),
        }
    }

    /// Wraps bytes received from elsewhere.
    pub fn from_bytes(key: TilingKey, bytes: Vec<u8>) -> Self {
        Self { key, bytes }
    }

    pub fn key(&self) -> TilingKey {
        self.key
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the buffer as the tiling layout `T`.
    pub fn decode<T: TilingData>(&self) -> Result<T, DecodeError> {
        if self.key.operator != T::OPERATOR {
            return Err(DecodeError::WrongOperator {
                expected: T::OPERATOR,
                actual: self.key.operator,
            });
        }

        let expected = core::mem::size_of::<T>();
        if self.bytes.len() != expected {
            return Err(DecodeError::WrongLength {
                expected,
                actual: self.bytes.len(),
            });
        }

        Ok(bytemuck::pod_read_unaligned(&self.bytes))
    }
}

/// Wire form of a [PartitionPlan].
///
/// `tail_extent` is zero when tiles group whole tasks.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PartitionPlanRaw {
    pub lane_count: u64,
    pub used_lanes: u64,
    pub big_lane_count: u64,
    pub big_lane_task_count: u64,
    pub small_lane_task_count: u64,
    pub tile_count: u64,
    pub tile_size: u64,
    pub tail_tile_size: u64,
    pub small_tile_count: u64,
    pub small_tail_tile_size: u64,
    pub double_buffer_depth: u64,
    pub tail_extent: u64,
    pub slot_bytes: u64,
}

impl From<&PartitionPlan> for PartitionPlanRaw {
    fn from(plan: &PartitionPlan) -> Self {
        Self {
            lane_count: plan.lane_count as u64,
            used_lanes: plan.used_lanes as u64,
            big_lane_count: plan.big_lane_count as u64,
            big_lane_task_count: plan.big_lane_task_count as u64,
            small_lane_task_count: plan.small_lane_task_count as u64,
            tile_count: plan.tile_count as u64,
            tile_size: plan.tile_size as u64,
            tail_tile_size: plan.tail_tile_size as u64,
            small_tile_count: plan.small_tile_count as u64,
            small_tail_tile_size: plan.small_tail_tile_size as u64,
            double_buffer_depth: plan.double_buffer_depth as u64,
            tail_extent: match plan.axis {
                TileAxis::Tasks => 0,
                TileAxis::Tail { extent } => extent as u64,
            },
            slot_bytes: plan.slot_bytes as u64,
        }
    }
}

impl TryFrom<PartitionPlanRaw> for PartitionPlan {
    type Error = DecodeError;

    fn try_from(raw: PartitionPlanRaw) -> Result<Self, Self::Error> {
        let plan = PartitionPlan {
            lane_count: raw.lane_count as usize,
            used_lanes: raw.used_lanes as usize,
            big_lane_count: raw.big_lane_count as usize,
            big_lane_task_count: raw.big_lane_task_count as usize,
            small_lane_task_count: raw.small_lane_task_count as usize,
            tile_count: raw.tile_count as usize,
            tile_size: raw.tile_size as usize,
            tail_tile_size: raw.tail_tile_size as usize,
            small_tile_count: raw.small_tile_count as usize,
            small_tail_tile_size: raw.small_tail_tile_size as usize,
            double_buffer_depth: raw.double_buffer_depth as usize,
            axis: match raw.tail_extent {
                0 => TileAxis::Tasks,
                extent => TileAxis::Tail {
                    extent: extent as usize,
                },
            },
            slot_bytes: raw.slot_bytes as usize,
        };

        if plan.used_lanes > plan.lane_count {
            return Err(DecodeError::CorruptPlan("more used lanes than lanes"));
        }
        if plan.big_lane_count > plan.used_lanes {
            return Err(DecodeError::CorruptPlan("more big lanes than used lanes"));
        }
        if plan.big_lane_task_count < plan.small_lane_task_count
            || plan.big_lane_task_count - plan.small_lane_task_count > 1
        {
            return Err(DecodeError::CorruptPlan("lane imbalance above one task"));
        }
        if plan.tail_tile_size > plan.tile_size || plan.small_tail_tile_size > plan.tile_size {
            return Err(DecodeError::CorruptPlan("tail tile larger than tile"));
        }
        if !plan.is_noop() && (plan.tile_size == 0 || plan.double_buffer_depth == 0) {
            return Err(DecodeError::CorruptPlan("empty tiles"));
        }

        Ok(plan)
    }
}
