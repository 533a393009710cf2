use core::marker::PhantomData;

use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{
    BufferRole, CellLocks, GlobalTensor, LaneDevice, PartitionPlanRaw, TileAxis, TilingBuffer,
    WorkPartitioner, WorkRequest,
};

use crate::{
    FinalizeTiling, ScatterConfig, ScatterError, ScatterExtentsRaw, ScatterInstruction,
    ScatterOptions, ScatterStrategy, ScatterTiling, is_aligned,
    kernel::{FinalizeKernel, OwnedRowsKernel, StreamingKernel},
};

/// What a scatter produces next to the updated output.
#[derive(Debug)]
pub struct ScatterOutputs<F: FloatElement, I: IndexElement> {
    /// Contributions per output row, for reductions that count them.
    pub counts: Option<GlobalTensor<F>>,
    /// Position of the winning contribution per output element, for reductions that track it.
    /// Elements without a contributor hold the extent of the scattered axis.
    pub args: Option<GlobalTensor<I>>,
}

/// Scatters `src` into `out` along `axis`, grouping source rows by `index` and combining them with
/// `Inst`.
///
/// `out` holds the initial value of every output element and receives the result.
pub fn scatter<F: FloatElement, I: IndexElement, Inst: ScatterInstruction<F>>(
    device: &LaneDevice,
    src: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    axis: usize,
    out: &GlobalTensor<F>,
    options: ScatterOptions,
) -> Result<ScatterOutputs<F, I>, ScatterError> {
    let config = ScatterConfig::generate::<F, I, Inst>(
        device,
        src.shape(),
        index.shape(),
        out.shape(),
        axis,
        options.strategy,
    )?;
    let extents = config.extents;
    let requirements = Inst::requirements();

    let counts = requirements
        .counts
        .then(|| GlobalTensor::<F>::zeros([extents.decomposition.output_rows(extents.out_dim)]));
    let args = requirements.args.then(|| {
        GlobalTensor::<I>::filled(
            out.shape().clone(),
            I::from_index(extents.decomposition.dim),
        )
    });

    let tiling = ScatterTiling {
        plan: PartitionPlanRaw::from(&config.plan),
        extents: ScatterExtentsRaw::new(&extents.decomposition, extents.out_dim, extents.index_len),
    };
    let buffer = TilingBuffer::encode(&tiling, config.variant.key());

    match config.strategy {
        ScatterStrategy::OwnedRows => {
            let kernel = OwnedRowsKernel::<F, I, Inst> {
                src,
                index,
                out,
                args: args.as_ref(),
                counts: counts.as_ref(),
                tie: options.tie_break,
                _instruction: PhantomData,
            };
            device.launch(config.plan.used_lanes, &buffer, &kernel);
        }
        ScatterStrategy::Streaming => {
            let locks = CellLocks::new(device.properties().lane_count * 64);
            let kernel = StreamingKernel::<F, I, Inst> {
                src,
                index,
                out,
                args: args.as_ref(),
                counts: counts.as_ref(),
                locks: &locks,
                tie: options.tie_break,
                _instruction: PhantomData,
            };
            device.launch(config.plan.used_lanes, &buffer, &kernel);

            if let Some(counts) = &counts {
                finalize::<F, Inst>(device, out, counts, extents.tail())?;
            }
        }
    }

    Ok(ScatterOutputs { counts, args })
}

// Streamed rows only know their count once every lane is done, so they are finalized by a second
// launch over the output rows.
fn finalize<F: FloatElement, Inst: ScatterInstruction<F>>(
    device: &LaneDevice,
    out: &GlobalTensor<F>,
    counts: &GlobalTensor<F>,
    tail: usize,
) -> Result<(), ScatterError> {
    let request = WorkRequest::new(counts.len())
        .with_role(BufferRole::per_tail_element("value", F::DTYPE, 1))
        .with_role(BufferRole::per_task("count", F::DTYPE, 1))
        .with_tail(tail, true)
        .with_max_depth(device.max_buffer_depth());
    let plan = WorkPartitioner::new(device.properties()).plan(&request)?;
    device.log_plan(&format!("scatter_{}_finalize", Inst::KIND), &plan);

    let chunk = match plan.axis {
        TileAxis::Tasks => None,
        TileAxis::Tail { .. } => Some(plan.tile_size),
    };
    let aligned = is_aligned(tail, chunk, device.properties().block_elements(F::DTYPE));
    let tiling = FinalizeTiling {
        plan: PartitionPlanRaw::from(&plan),
        tail: tail as u64,
    };
    let kernel = FinalizeKernel::<F, Inst> {
        out,
        counts,
        _instruction: PhantomData,
    };
    device.launch(
        plan.used_lanes,
        &TilingBuffer::encode(&tiling, aligned as u32),
        &kernel,
    );

    Ok(())
}
