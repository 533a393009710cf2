use serde::{Deserialize, Serialize};

use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{GlobalTensor, LaneDevice, PartitionPlanRaw, TilingBuffer};

use crate::{
    AttentionError, BoundaryMode, MsdaConfig, MsdaGradTiling, MsdaLevel, MsdaPass, MsdaShape,
    MsdaShapeRaw, MsdaTiling,
    kernel::{BackwardKernel, ForwardKernel},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsdaOptions {
    pub boundary: BoundaryMode,
}

impl MsdaOptions {
    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }
}

/// The tensors read by both passes.
#[derive(Debug, Clone, Copy)]
pub struct MsdaInputs<'a, F: FloatElement, I: IndexElement> {
    /// `[batch, keys, heads, channels]`, the levels flattened one after the other.
    pub value: &'a GlobalTensor<F>,
    /// `[levels, 2]` height and width of every level.
    pub spatial_shapes: &'a GlobalTensor<I>,
    /// `[levels]` first key of every level.
    pub level_start_index: &'a GlobalTensor<I>,
    /// `[batch, queries, heads, levels, points, 2]` normalized `(x, y)`.
    pub sampling_locations: &'a GlobalTensor<F>,
    /// `[batch, queries, heads, levels, points]`.
    pub attention_weights: &'a GlobalTensor<F>,
}

impl<F: FloatElement, I: IndexElement> MsdaInputs<'_, F, I> {
    /// Validates every input against the others and reads the level table.
    pub fn validate(&self) -> Result<(MsdaShape, Vec<MsdaLevel>), AttentionError> {
        let shape = MsdaShape::new(
            self.value.shape(),
            self.spatial_shapes.shape(),
            self.level_start_index.shape(),
            self.sampling_locations.shape(),
            self.attention_weights.shape(),
        )?;
        let levels = shape.levels(self.spatial_shapes, self.level_start_index)?;
        Ok((shape, levels))
    }
}

/// Gradients of the differentiable inputs.
#[derive(Debug)]
pub struct MsdaGrads<F: FloatElement> {
    pub grad_value: GlobalTensor<F>,
    pub grad_sampling_locations: GlobalTensor<F>,
    pub grad_attention_weights: GlobalTensor<F>,
}

/// Samples every level of `value` around the sampling locations of every query and head, and sums
/// the samples weighted by the attention weights.
///
/// Returns the `[batch, queries, heads * channels]` output.
pub fn multi_scale_deformable_attn<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    inputs: &MsdaInputs<'_, F, I>,
    options: MsdaOptions,
) -> Result<GlobalTensor<F>, AttentionError> {
    let (shape, levels) = inputs.validate()?;
    let config = MsdaConfig::generate::<F>(device, &shape, MsdaPass::Forward)?;
    let output = GlobalTensor::zeros(shape.output_shape());

    let tiling = MsdaTiling {
        plan: PartitionPlanRaw::from(&config.plan),
        shape: MsdaShapeRaw::new(&shape, options.boundary),
    };
    let kernel = ForwardKernel {
        value: inputs.value,
        levels: &levels,
        locations: inputs.sampling_locations,
        weights: inputs.attention_weights,
        output: &output,
    };
    device.launch(
        config.plan.used_lanes,
        &TilingBuffer::encode(&tiling, config.aligned as u32),
        &kernel,
    );

    Ok(output)
}

/// Gradients of [multi_scale_deformable_attn] given the gradient of its output.
pub fn multi_scale_deformable_attn_backward<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    inputs: &MsdaInputs<'_, F, I>,
    grad_output: &GlobalTensor<F>,
    options: MsdaOptions,
) -> Result<MsdaGrads<F>, AttentionError> {
    let (shape, levels) = inputs.validate()?;
    if grad_output.shape() != &shape.output_shape() {
        return Err(AttentionError::Shape {
            name: "grad_output",
            expected: shape.output_shape(),
            actual: grad_output.shape().clone(),
        });
    }
    let config = MsdaConfig::generate::<F>(device, &shape, MsdaPass::Backward)?;

    let grads = MsdaGrads {
        grad_value: GlobalTensor::zeros(inputs.value.shape().clone()),
        grad_sampling_locations: GlobalTensor::zeros(inputs.sampling_locations.shape().clone()),
        grad_attention_weights: GlobalTensor::zeros(inputs.attention_weights.shape().clone()),
    };

    let tiling = MsdaGradTiling {
        plan: PartitionPlanRaw::from(&config.plan),
        shape: MsdaShapeRaw::new(&shape, options.boundary),
    };
    let kernel = BackwardKernel {
        value: inputs.value,
        levels: &levels,
        locations: inputs.sampling_locations,
        weights: inputs.attention_weights,
        grad_output,
        grad_value: &grads.grad_value,
        grad_locations: &grads.grad_sampling_locations,
        grad_weights: &grads.grad_attention_weights,
    };
    device.launch(
        config.plan.used_lanes,
        &TilingBuffer::encode(&tiling, config.aligned as u32),
        &kernel,
    );

    Ok(grads)
}
