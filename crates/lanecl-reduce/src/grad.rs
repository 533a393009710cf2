//! Gradients of the scatter reductions with respect to their source.
//!
//! Additive scatters are differentiated by gathering the output gradient back along the index,
//! the max scatter by routing it to the recorded argmax.

use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    BufferRole, GlobalTensor, LaneDevice, PartitionPlan, PartitionPlanRaw, ShapeDecomposer,
    TensorShape, TileAxis, TilingBuffer, WorkPartitioner, WorkRequest,
};

use crate::{
    ScatterError, ScatterExtents, ScatterExtentsRaw, ScatterGradTiling, config::output_extent,
    is_aligned,
    kernel::{GatherKernel, RouteKernel},
};

/// Gradient of [scatter_sum](crate::scatter_sum): every source row receives the gradient of the
/// output row it was added to. Masked source rows receive zero.
pub fn scatter_sum_grad<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    grad_out: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    axis: usize,
    src_shape: impl Into<TensorShape>,
) -> Result<GlobalTensor<F>, ScatterError> {
    gather(device, grad_out, index, None, axis, src_shape.into())
}

/// Gradient of [scatter_mean](crate::scatter_mean), given the counts it returned.
pub fn scatter_mean_grad<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    grad_out: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    counts: &GlobalTensor<F>,
    axis: usize,
    src_shape: impl Into<TensorShape>,
) -> Result<GlobalTensor<F>, ScatterError> {
    gather(device, grad_out, index, Some(counts), axis, src_shape.into())
}

/// Gradient of [scatter_max](crate::scatter_max), given the args it returned.
///
/// Source elements that didn't win any output element receive zero.
pub fn scatter_max_grad<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    grad_out: &GlobalTensor<F>,
    args: &GlobalTensor<I>,
    axis: usize,
    src_shape: impl Into<TensorShape>,
) -> Result<GlobalTensor<F>, ScatterError> {
    let src_shape = src_shape.into();
    // Args are per element, so every axis after the scattered one is walked like an index axis.
    let decomposition = ShapeDecomposer::decompose(&src_shape, &src_shape, axis)?;
    let out_dim = output_extent(&src_shape, grad_out.shape(), axis)?;
    if args.shape() != grad_out.shape() {
        return Err(ScatterError::Shape {
            name: "args",
            expected: grad_out.shape().clone(),
            actual: args.shape().clone(),
        });
    }

    let request = WorkRequest::new(grad_out.len())
        .with_role(BufferRole::per_task("grad", F::DTYPE, 1))
        .with_role(BufferRole::per_task("arg", I::DTYPE, 1))
        .with_max_depth(device.max_buffer_depth());
    let plan = WorkPartitioner::new(device.properties()).plan(&request)?;
    device.log_plan("scatter_max_grad", &plan);

    let grad_src = GlobalTensor::zeros(src_shape);
    let kernel = RouteKernel {
        grad_out,
        args,
        grad_src: &grad_src,
    };
    let tiling = grad_tiling(&plan, &ScatterExtents {
        decomposition,
        out_dim,
        index_len: 0,
    });
    device.launch(plan.used_lanes, &TilingBuffer::encode(&tiling, 0), &kernel);

    Ok(grad_src)
}

fn gather<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    grad_out: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    counts: Option<&GlobalTensor<F>>,
    axis: usize,
    src_shape: TensorShape,
) -> Result<GlobalTensor<F>, ScatterError> {
    let decomposition = ShapeDecomposer::decompose(&src_shape, index.shape(), axis)?;
    let out_dim = output_extent(&src_shape, grad_out.shape(), axis)?;
    let extents = ScatterExtents {
        decomposition,
        out_dim,
        index_len: index.len(),
    };

    if let Some(counts) = counts {
        let expected = TensorShape::new([decomposition.output_rows(out_dim)]);
        if counts.shape() != &expected {
            return Err(ScatterError::Shape {
                name: "counts",
                expected,
                actual: counts.shape().clone(),
            });
        }
    }

    let mut request = WorkRequest::new(decomposition.index_rows())
        .with_role(BufferRole::per_tail_element("value", F::DTYPE, 1))
        .with_role(BufferRole::per_task("group", I::DTYPE, 1))
        .with_tail(decomposition.tail, true)
        .with_max_depth(device.max_buffer_depth());
    if counts.is_some() {
        request = request.with_role(BufferRole::per_task("scale", F::DTYPE, 1));
    }
    let plan = WorkPartitioner::new(device.properties()).plan(&request)?;
    device.log_plan("scatter_gather_grad", &plan);

    let chunk = match plan.axis {
        TileAxis::Tasks => None,
        TileAxis::Tail { .. } => Some(plan.tile_size),
    };
    let aligned = is_aligned(
        decomposition.tail,
        chunk,
        device.properties().block_elements(F::DTYPE),
    );

    let grad_src = GlobalTensor::zeros(src_shape);
    let kernel = GatherKernel {
        grad_out,
        index,
        counts,
        grad_src: &grad_src,
    };
    let tiling = grad_tiling(&plan, &extents);
    device.launch(
        plan.used_lanes,
        &TilingBuffer::encode(&tiling, aligned as u32),
        &kernel,
    );

    Ok(grad_src)
}

fn grad_tiling(plan: &PartitionPlan, extents: &ScatterExtents) -> ScatterGradTiling {
    ScatterGradTiling {
        plan: PartitionPlanRaw::from(plan),
        extents: ScatterExtentsRaw::new(&extents.decomposition, extents.out_dim, extents.index_len),
    }
}
