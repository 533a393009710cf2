use bytemuck::{Pod, Zeroable};
use lanecl_runtime::{PartitionPlan, PartitionPlanRaw, TilingData};

/// Where the distance to a candidate point comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointSource {
    /// Squared euclidean distances between `[B, N, 3]` coordinates.
    Coordinates,
    /// Rows of a precomputed `[B, N, N]` distance matrix.
    Distances,
}

/// Kernel variant of a sampling launch, recorded in the tiling key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpsVariant {
    pub source: PointSource,
    /// Running distances live in the workspace instead of scratch.
    pub spilled: bool,
    pub aligned: bool,
}

impl FpsVariant {
    pub fn key(&self) -> u32 {
        let source = match self.source {
            PointSource::Coordinates => 0,
            PointSource::Distances => 1,
        };
        self.aligned as u32 | (source << 1) | ((self.spilled as u32) << 2)
    }

    pub fn from_key(key: u32) -> Option<Self> {
        if key >> 3 != 0 {
            return None;
        }
        Some(Self {
            source: match (key >> 1) & 1 {
                0 => PointSource::Coordinates,
                _ => PointSource::Distances,
            },
            spilled: (key >> 2) & 1 == 1,
            aligned: key & 1 == 1,
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FpsTiling {
    pub plan: PartitionPlanRaw,
    pub batch: u64,
    pub points: u64,
    pub samples: u64,
    /// Initial nearest distance, unused when a seed tensor is given.
    pub seed: f64,
}

impl TilingData for FpsTiling {
    const OPERATOR: u32 = 0xF95;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

/// Whether every tile of `plan` moves whole transfer blocks.
pub fn tiles_are_aligned(plan: &PartitionPlan, block: usize) -> bool {
    [plan.tile_size, plan.tail_tile_size, plan.small_tail_tile_size]
        .into_iter()
        .filter(|size| *size > 0)
        .all(|size| size % block.max(1) == 0)
}
