//! Grouped scatter reductions.
//!
//! Source rows are grouped along an axis by an index tensor and combined into the matching
//! output rows with a sum, a mean or a max that also records which contribution won.

mod config;
mod error;
mod grad;
mod instructions;
mod kernel;
mod launch;
mod strategy;
mod tiling;

pub use config::*;
pub use error::*;
pub use grad::*;
pub use instructions::*;
pub use launch::*;
pub use strategy::*;
pub use tiling::*;


use lanecl_common::{FloatElement, IndexElement};
use lanecl_runtime::{GlobalTensor, LaneDevice};

/// Adds every source row to the output row selected by its index.
///
/// Negative or out-of-range indices are masked.
pub fn scatter_sum<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    src: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    axis: usize,
    out: &GlobalTensor<F>,
    options: ScatterOptions,
) -> Result<(), ScatterError> {
    scatter::<F, I, Sum>(device, src, index, axis, out, options)?;
    Ok(())
}

/// Averages the source rows of every group into `out`, whose initial value is added to the sum
/// without being counted. Rows without contributions keep their initial value.
///
/// Returns the number of contributions of every output row.
pub fn scatter_mean<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    src: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    axis: usize,
    out: &GlobalTensor<F>,
    options: ScatterOptions,
) -> Result<GlobalTensor<F>, ScatterError> {
    let outputs = scatter::<F, I, Mean>(device, src, index, axis, out, options)?;
    Ok(outputs.counts.unwrap_or_else(|| GlobalTensor::zeros([0])))
}

/// Keeps the maximum of every group and of the initial value of `out`.
///
/// Returns the argmax of every output element: the position along `axis` of the winning source
/// element, or the extent of `axis` when the initial value was kept.
pub fn scatter_max<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    src: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    axis: usize,
    out: &GlobalTensor<F>,
    options: ScatterOptions,
) -> Result<GlobalTensor<I>, ScatterError> {
    let outputs = scatter::<F, I, Max>(device, src, index, axis, out, options)?;
    Ok(outputs
        .args
        .unwrap_or_else(|| GlobalTensor::zeros(out.shape().clone())))
}

/// [scatter_max] into a fresh output of `out_dim` groups: groups without contributions are zero.
pub fn scatter_max_default<F: FloatElement, I: IndexElement>(
    device: &LaneDevice,
    src: &GlobalTensor<F>,
    index: &GlobalTensor<I>,
    axis: usize,
    out_dim: usize,
    options: ScatterOptions,
) -> Result<(GlobalTensor<F>, GlobalTensor<I>), ScatterError> {
    let Some(dim) = src.shape().dim(axis) else {
        return Err(lanecl_runtime::ConfigurationError::AxisOutOfRange {
            axis,
            rank: src.shape().rank(),
        }
        .into());
    };

    let out = GlobalTensor::filled(src.shape().with_dim(axis, out_dim), F::lowest());
    let args = scatter_max(device, src, index, axis, &out, options)?;

    let empty = I::from_index(dim);
    for element in 0..out.len() {
        if args.load(element) == empty {
            out.store(element, F::zero());
        }
    }

    Ok((out, args))
}
