use bytemuck::{Pod, Zeroable};
use lanecl_runtime::{PartitionPlanRaw, TilingData};

use crate::{BoundaryMode, MsdaShape};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MsdaShapeRaw {
    pub batch: u64,
    pub keys: u64,
    pub heads: u64,
    pub channels: u64,
    pub levels: u64,
    pub queries: u64,
    pub points: u64,
    pub boundary: u64,
}

impl MsdaShapeRaw {
    pub fn new(shape: &MsdaShape, boundary: BoundaryMode) -> Self {
        Self {
            batch: shape.batch as u64,
            keys: shape.keys as u64,
            heads: shape.heads as u64,
            channels: shape.channels as u64,
            levels: shape.levels as u64,
            queries: shape.queries as u64,
            points: shape.points as u64,
            boundary: boundary.code(),
        }
    }

    pub fn shape(&self) -> MsdaShape {
        MsdaShape {
            batch: self.batch as usize,
            keys: self.keys as usize,
            heads: self.heads as usize,
            channels: self.channels as usize,
            levels: self.levels as usize,
            queries: self.queries as usize,
            points: self.points as usize,
        }
    }

    pub fn boundary(&self) -> Option<BoundaryMode> {
        BoundaryMode::from_code(self.boundary)
    }
}

/// Tiling of the forward launch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MsdaTiling {
    pub plan: PartitionPlanRaw,
    pub shape: MsdaShapeRaw,
}

impl TilingData for MsdaTiling {
    const OPERATOR: u32 = 0xD5A0;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

/// Tiling of the backward launch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MsdaGradTiling {
    pub plan: PartitionPlanRaw,
    pub shape: MsdaShapeRaw,
}

impl TilingData for MsdaGradTiling {
    const OPERATOR: u32 = 0xD5A1;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

/// Whether rows of `channels` elements move as whole transfer blocks.
pub fn channels_are_aligned(channels: usize, block: usize) -> bool {
    channels % block.max(1) == 0
}
