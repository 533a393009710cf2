use bytemuck::{Pod, Zeroable};
use lanecl_runtime::{AxisDecomposition, PartitionPlanRaw, TilingData};

use crate::{ScatterKind, ScatterStrategy};

/// Extents shared by every scatter launch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ScatterExtentsRaw {
    pub head: u64,
    pub dim: u64,
    pub body: u64,
    pub tail: u64,
    pub out_dim: u64,
    /// Number of index elements, one when a single index covers the whole axis.
    pub index_len: u64,
}

impl ScatterExtentsRaw {
    pub fn new(decomposition: &AxisDecomposition, out_dim: usize, index_len: usize) -> Self {
        Self {
            head: decomposition.head as u64,
            dim: decomposition.dim as u64,
            body: decomposition.body as u64,
            tail: decomposition.tail as u64,
            out_dim: out_dim as u64,
            index_len: index_len as u64,
        }
    }

    pub fn extents(&self) -> ScatterExtents {
        ScatterExtents {
            decomposition: AxisDecomposition::new(
                self.head as usize,
                self.dim as usize,
                self.body as usize,
                self.tail as usize,
            ),
            out_dim: self.out_dim as usize,
            index_len: self.index_len as usize,
        }
    }
}

/// Decoded [ScatterExtentsRaw], as used by the lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterExtents {
    pub decomposition: AxisDecomposition,
    pub out_dim: usize,
    pub index_len: usize,
}

impl ScatterExtents {
    pub fn tail(&self) -> usize {
        self.decomposition.tail
    }

    /// Element of the index tensor addressing `index_row`.
    pub fn index_element(&self, index_row: usize) -> usize {
        if self.index_len == 1 { 0 } else { index_row }
    }

    /// Output row targeted by `index_row` holding `group`, `None` when the group is masked.
    pub fn target(&self, index_row: usize, group: Option<usize>) -> Option<usize> {
        let group = group.filter(|group| *group < self.out_dim)?;
        Some(
            self.decomposition
                .output_row(index_row, group, self.out_dim),
        )
    }
}

/// Tiling of the forward scatter launches.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ScatterTiling {
    pub plan: PartitionPlanRaw,
    pub extents: ScatterExtentsRaw,
}

impl TilingData for ScatterTiling {
    const OPERATOR: u32 = 0x5CA7;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

/// Tiling of the pass finalizing streamed rows with their counts.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FinalizeTiling {
    pub plan: PartitionPlanRaw,
    pub tail: u64,
}

impl TilingData for FinalizeTiling {
    const OPERATOR: u32 = 0x5CA8;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

/// Tiling of the gradient launches.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ScatterGradTiling {
    pub plan: PartitionPlanRaw,
    pub extents: ScatterExtentsRaw,
}

impl TilingData for ScatterGradTiling {
    const OPERATOR: u32 = 0x5CA9;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

/// Kernel variant selected on the host and recorded in the tiling key.
///
/// Bits 0-1 hold the reduction, bit 2 the strategy and bit 3 whether every copy moves whole
/// transfer blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScatterVariant {
    pub kind: ScatterKind,
    pub strategy: ScatterStrategy,
    pub aligned: bool,
}

impl ScatterVariant {
    pub fn key(&self) -> u32 {
        let kind = match self.kind {
            ScatterKind::Sum => 0,
            ScatterKind::Mean => 1,
            ScatterKind::Max => 2,
        };
        let strategy = match self.strategy {
            ScatterStrategy::OwnedRows => 0,
            ScatterStrategy::Streaming => 1,
        };
        kind | (strategy << 2) | ((self.aligned as u32) << 3)
    }

    pub fn from_key(key: u32) -> Option<Self> {
        let kind = match key & 0b11 {
            0 => ScatterKind::Sum,
            1 => ScatterKind::Mean,
            2 => ScatterKind::Max,
            _ => return None,
        };
        let strategy = match (key >> 2) & 1 {
            0 => ScatterStrategy::OwnedRows,
            _ => ScatterStrategy::Streaming,
        };
        if key >> 4 != 0 {
            return None;
        }

        Some(Self {
            kind,
            strategy,
            aligned: (key >> 3) & 1 == 1,
        })
    }
}

/// Whether every copy of rows of `tail` elements, cut in chunks of `chunk` when streamed, moves
/// whole blocks of `block` elements.
pub fn is_aligned(tail: usize, chunk: Option<usize>, block: usize) -> bool {
    tail % block == 0 && chunk.is_none_or(|chunk| chunk % block == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_key_is_reversible() {
        for kind in [ScatterKind::Sum, ScatterKind::Mean, ScatterKind::Max] {
            for strategy in [ScatterStrategy::OwnedRows, ScatterStrategy::Streaming] {
                for aligned in [false, true] {
                    let variant = ScatterVariant {
                        kind,
                        strategy,
                        aligned,
                    };
                    assert_eq!(ScatterVariant::from_key(variant.key()), Some(variant));
                }
            }
        }
        assert_eq!(ScatterVariant::from_key(3), None);
        assert_eq!(ScatterVariant::from_key(1 << 4), None);
    }

    #[test]
    fn masked_groups_have_no_target() {
        let extents = ScatterExtentsRaw::new(&AxisDecomposition::new(2, 3, 1, 4), 5, 6).extents();

        assert_eq!(extents.target(4, Some(2)), Some(7));
        assert_eq!(extents.target(4, Some(5)), None);
        assert_eq!(extents.target(4, None), None);
    }

    #[test]
    fn aligned_only_when_every_copy_is_whole() {
        assert!(is_aligned(16, None, 8));
        assert!(!is_aligned(12, None, 8));
        assert!(!is_aligned(64, Some(12), 8));
        assert!(is_aligned(64, Some(16), 8));
    }
}
