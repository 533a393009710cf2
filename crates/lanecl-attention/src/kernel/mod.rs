mod backward;
mod forward;

pub(crate) use backward::*;
pub(crate) use forward::*;

use lanecl_common::FloatElement;
use lanecl_runtime::{GlobalTensor, LaneContext, pipeline::copy_in};

use crate::{BilinearSample, BoundaryMode, MsdaLevel, MsdaShape, MsdaShapeRaw};

pub(crate) fn boundary_of(lane: &LaneContext<'_>, shape: &MsdaShapeRaw) -> BoundaryMode {
    match shape.boundary() {
        Some(boundary) => boundary,
        None => panic!(
            "Lane {} received an unknown boundary mode {}",
            lane.lane_id, shape.boundary
        ),
    }
}

/// Layout of the value pyramid as seen by one lane.
pub(crate) struct ValueRows<'a, F: FloatElement> {
    pub value: &'a GlobalTensor<F>,
    pub levels: &'a [MsdaLevel],
    pub shape: MsdaShape,
    pub block: usize,
}

impl<F: FloatElement> ValueRows<'_, F> {
    /// Offset of the `channels` values of `head` at `position` of `level`.
    pub fn offset(&self, batch: usize, head: usize, level: usize, position: usize) -> usize {
        let key = self.levels[level].start + position;
        ((batch * self.shape.keys + key) * self.shape.heads + head) * self.shape.channels
    }

    /// Copies the rows of the corners inside the level into consecutive rows of `corners`.
    pub fn gather<const ALIGNED: bool>(
        &self,
        sample: &BilinearSample<F>,
        batch: usize,
        head: usize,
        level: usize,
        corners: &mut [F],
    ) {
        let channels = self.shape.channels;
        for (index, corner) in sample.corners.iter().enumerate() {
            if let Some(position) = corner.position {
                copy_in::<F, ALIGNED>(
                    self.value,
                    self.offset(batch, head, level, position),
                    channels,
                    &mut corners[index * channels..(index + 1) * channels],
                    self.block,
                );
            }
        }
    }
}
