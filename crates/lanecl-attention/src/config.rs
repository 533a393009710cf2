use lanecl_common::FloatElement;
use lanecl_runtime::{BufferRole, LaneDevice, PartitionPlan, WorkPartitioner, WorkRequest};

use crate::{AttentionError, MsdaShape, channels_are_aligned};

/// Direction of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsdaPass {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct MsdaConfig {
    pub plan: PartitionPlan,
    pub aligned: bool,
}

impl MsdaConfig {
    /// Splits the queries of every batch over lanes.
    pub fn generate<F: FloatElement>(
        device: &LaneDevice,
        shape: &MsdaShape,
        pass: MsdaPass,
    ) -> Result<Self, AttentionError> {
        let samples = shape.samples_per_query();
        let row = shape.heads * shape.channels;
        let corner_rows = match pass {
            MsdaPass::Forward => 4,
            MsdaPass::Backward => 8,
        };

        let mut request = WorkRequest::new(shape.total_queries())
            .with_role(BufferRole::per_task("locations", F::DTYPE, 2 * samples))
            .with_role(BufferRole::per_task("weights", F::DTYPE, samples))
            .with_fixed_bytes(corner_rows * shape.channels * F::size())
            .with_max_depth(device.max_buffer_depth());
        request = match pass {
            MsdaPass::Forward => request.with_role(BufferRole::per_task("output", F::DTYPE, row)),
            MsdaPass::Backward => request
                .with_role(BufferRole::per_task("grad_output", F::DTYPE, row))
                .with_role(BufferRole::per_task("grad_locations", F::DTYPE, 2 * samples))
                .with_role(BufferRole::per_task("grad_weights", F::DTYPE, samples)),
        };

        let plan = WorkPartitioner::new(device.properties()).plan(&request)?;
        let aligned = channels_are_aligned(
            shape.channels,
            device.properties().block_elements(F::DTYPE),
        );
        log::debug!("Deformable attention {pass:?} over {shape:?}, aligned: {aligned}");
        device.log_plan(
            match pass {
                MsdaPass::Forward => "multi_scale_deformable_attn",
                MsdaPass::Backward => "multi_scale_deformable_attn_grad",
            },
            &plan,
        );

        Ok(Self { plan, aligned })
    }
}
