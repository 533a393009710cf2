use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    BufferRole, ConfigurationError, LaneDevice, PartitionPlan, ShapeDecomposer, TensorShape,
    TileAxis, WorkPartitioner, WorkRequest,
};

use crate::{
    ScatterError, ScatterExtents, ScatterInstruction, ScatterStrategy, ScatterVariant, is_aligned,
};

/// Everything the host decides before launching a scatter.
#[derive(Debug, Clone)]
pub struct ScatterConfig {
    pub extents: ScatterExtents,
    pub strategy: ScatterStrategy,
    pub variant: ScatterVariant,
    pub plan: PartitionPlan,
}

impl ScatterConfig {
    pub fn generate<F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>>(
        device: &LaneDevice,
        src: &TensorShape,
        index: &TensorShape,
        out: &TensorShape,
        axis: usize,
        strategy: Option<ScatterStrategy>,
    ) -> Result<Self, ScatterError> {
        let decomposition = ShapeDecomposer::decompose(src, index, axis)?;
        let out_dim = output_extent(src, out, axis)?;
        let extents = ScatterExtents {
            decomposition,
            out_dim,
            index_len: index.num_elements(),
        };

        let config = ScatterConfigBuilder::<F, I, Inst>::new(device, extents)
            .generate_strategy(strategy)?
            .generate_plan()?
            .generate_variant();

        log::debug!(
            "Scatter {} over {:?} with {} output groups uses {:?}",
            Inst::KIND,
            config.extents.decomposition,
            config.extents.out_dim,
            config.strategy
        );
        device.log_plan(&format!("scatter_{}", Inst::KIND), &config.plan);

        Ok(config)
    }
}

struct ScatterConfigBuilder<'a, F, I, Inst> {
    device: &'a LaneDevice,
    extents: ScatterExtents,
    strategy: ScatterStrategy,
    plan: PartitionPlan,
    _types: core::marker::PhantomData<(F, I, Inst)>,
}

impl<'a, F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>>
    ScatterConfigBuilder<'a, F, I, Inst>
{
    fn new(device: &'a LaneDevice, extents: ScatterExtents) -> Self {
        // Only a starting point, every field is generated below.
        Self {
            device,
            extents,
            strategy: ScatterStrategy::Streaming,
            plan: PartitionPlan::noop(device.properties().lane_count),
            _types: core::marker::PhantomData,
        }
    }

    fn generate_strategy(mut self, strategy: Option<ScatterStrategy>) -> Result<Self, ScatterError> {
        let budget = self.device.properties().scratch_budget_bytes;
        // Smallest owned tile: one output element of one row. Longer rows are cut in chunks.
        let block_bytes = self.device.properties().block_bytes;
        let element_bytes = self.owned_rows_request().footprint(1, 1, block_bytes);
        let element_fits = element_bytes <= budget;

        self.strategy = match strategy {
            Some(ScatterStrategy::OwnedRows) if !element_fits => {
                return Err(ScatterError::OwnedRowsUnavailable {
                    element_bytes,
                    budget,
                });
            }
            Some(strategy) => strategy,
            None => ScatterStrategy::fallback(element_fits),
        };
        Ok(self)
    }

    fn generate_plan(mut self) -> Result<Self, ConfigurationError> {
        let request = match self.strategy {
            ScatterStrategy::OwnedRows => self.owned_rows_request(),
            ScatterStrategy::Streaming => self.streaming_request(),
        };
        self.plan = WorkPartitioner::new(self.device.properties()).plan(&request)?;
        Ok(self)
    }

    fn generate_variant(self) -> ScatterConfig {
        let chunk = match self.plan.axis {
            TileAxis::Tasks => None,
            TileAxis::Tail { .. } => Some(self.plan.tile_size),
        };
        let block = self.device.properties().block_elements(F::DTYPE);

        ScatterConfig {
            variant: ScatterVariant {
                kind: Inst::KIND,
                strategy: self.strategy,
                aligned: is_aligned(self.extents.tail(), chunk, block),
            },
            extents: self.extents,
            strategy: self.strategy,
            plan: self.plan,
        }
    }

    // Output rows, each with its args and count, plus a staged source row. Rows over budget are
    // cut in column chunks, the lane owning the row keeps every chunk of it.
    fn owned_rows_request(&self) -> WorkRequest {
        let requirements = Inst::requirements();
        let mut request = WorkRequest::new(self.extents.decomposition.output_rows(self.extents.out_dim))
            .with_role(BufferRole::per_tail_element("acc", F::DTYPE, 1))
            .with_role(BufferRole::per_tail_element("staging", F::DTYPE, 1))
            .with_tail(self.extents.tail(), true)
            .with_max_depth(self.device.max_buffer_depth());
        if requirements.args {
            request = request.with_role(BufferRole::per_tail_element("arg", I::DTYPE, 1));
        }
        if requirements.counts {
            request = request.with_role(BufferRole::per_task("count", F::DTYPE, 1));
        }
        request
    }

    fn streaming_request(&self) -> WorkRequest {
        WorkRequest::new(self.extents.decomposition.index_rows())
            .with_role(BufferRole::per_tail_element("value", F::DTYPE, 1))
            .with_role(BufferRole::per_task("group", I::DTYPE, 1))
            .with_tail(self.extents.tail(), true)
            .with_max_depth(self.device.max_buffer_depth())
    }
}

/// Extent of the scattered axis on `out`, checking every other axis against `src`.
pub(crate) fn output_extent(
    src: &TensorShape,
    out: &TensorShape,
    axis: usize,
) -> Result<usize, ScatterError> {
    let Some(out_dim) = out.dim(axis) else {
        return Err(ConfigurationError::AxisOutOfRange {
            axis,
            rank: out.rank(),
        }
        .into());
    };
    let expected = src.with_dim(axis, out_dim);
    if &expected != out {
        return Err(ScatterError::Shape {
            name: "output",
            expected,
            actual: out.clone(),
        });
    }
    Ok(out_dim)
}
