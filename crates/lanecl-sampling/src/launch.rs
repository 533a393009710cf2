use lanecl_common::FloatElement;
use lanecl_runtime::{
    ConfigurationError, GlobalTensor, LaneDevice, LaneExchange, PartitionPlanRaw, TensorShape,
    TilingBuffer, WorkspaceAllocator,
};

use crate::{
    FpsConfig, FpsExtents, FpsOptions, FpsTiling, PointSource, SamplingError, kernel::FpsKernel,
};

/// Selected points of every batch.
#[derive(Debug)]
pub struct FpsOutput<F: FloatElement> {
    /// `[batch, samples]` indices of the selected points, in selection order.
    pub indices: GlobalTensor<i32>,
    /// `[batch, samples]` nearest distance of every selected point at the time it was selected.
    /// The first selection has no predecessor and records infinity.
    pub distances: GlobalTensor<F>,
}

/// Selects `num_samples` points of every batch of `input`, starting from point zero, each new
/// point being the farthest from the points already selected.
///
/// `seeds` optionally holds the `[batch, points]` nearest distances before the first selection;
/// otherwise every point starts at the distance picked by `options`.
pub fn sample<F: FloatElement>(
    device: &LaneDevice,
    source: PointSource,
    input: &GlobalTensor<F>,
    num_samples: usize,
    seeds: Option<&GlobalTensor<F>>,
    options: FpsOptions,
) -> Result<FpsOutput<F>, SamplingError> {
    let extents = FpsExtents::new(source, input.shape(), num_samples)?;
    if let Some(seeds) = seeds {
        let expected = TensorShape::new([extents.batch, extents.points]);
        if seeds.shape() != &expected {
            return Err(SamplingError::Shape {
                name: "seeds",
                expected: "[batch, points]",
                actual: seeds.shape().clone(),
            });
        }
    }

    let config = FpsConfig::generate::<F>(device, source, extents)?;
    let output = FpsOutput {
        indices: GlobalTensor::zeros([extents.batch, extents.samples]),
        distances: GlobalTensor::zeros([extents.batch, extents.samples]),
    };
    if config.plan.is_noop() {
        return Ok(output);
    }

    let workspace = match config.variant.spilled {
        true => Some(nearest_workspace::<F>(device, &extents)?),
        false => None,
    };
    let tiling = FpsTiling {
        plan: PartitionPlanRaw::from(&config.plan),
        batch: extents.batch as u64,
        points: extents.points as u64,
        samples: extents.samples as u64,
        seed: options.seed.value(),
    };
    let exchange = LaneExchange::new(config.plan.used_lanes);
    let kernel = FpsKernel {
        input,
        seeds,
        nearest: workspace.as_ref(),
        indices: &output.indices,
        distances: &output.distances,
        exchange: &exchange,
        tie: options.tie_break,
    };
    device.launch(
        config.plan.used_lanes,
        &TilingBuffer::encode(&tiling, config.variant.key()),
        &kernel,
    );

    Ok(output)
}

// Running distances of every point, placed after the system workspace.
fn nearest_workspace<F: FloatElement>(
    device: &LaneDevice,
    extents: &FpsExtents,
) -> Result<GlobalTensor<F>, SamplingError> {
    let mut allocator = WorkspaceAllocator::new(device.properties().system_workspace_bytes);
    allocator.reserve::<F>("nearest", extents.batch * extents.points)?;
    let layout = allocator.finish();
    log::debug!(
        "Sampling workspace of {} bytes, {} of them for running distances",
        layout.total_bytes(),
        layout.user_bytes()
    );

    layout.materialize::<F>("nearest").ok_or_else(|| {
        ConfigurationError::InvalidAttribute {
            name: "workspace",
            reason: "the running distances region can't be materialized".into(),
        }
        .into()
    })
}
