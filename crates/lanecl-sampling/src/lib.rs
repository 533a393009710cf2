//! Farthest-point sampling.
//!
//! Points are selected one after the other, each being the candidate farthest from every point
//! selected so far. Selections are sequential, but refreshing the distances of the candidates is
//! split over lanes.

mod config;
mod error;
mod kernel;
mod launch;
mod options;
mod tiling;

pub use config::*;
pub use error::*;
pub use launch::*;
pub use options::*;
pub use tiling::*;

use lanecl_common::FloatElement;
use lanecl_runtime::{GlobalTensor, LaneDevice};

/// Samples `[batch, points, 3]` coordinates, using squared euclidean distances.
pub fn furthest_point_sampling<F: FloatElement>(
    device: &LaneDevice,
    points: &GlobalTensor<F>,
    num_samples: usize,
    options: FpsOptions,
) -> Result<FpsOutput<F>, SamplingError> {
    sample(
        device,
        PointSource::Coordinates,
        points,
        num_samples,
        None,
        options,
    )
}

/// Samples from a `[batch, points, points]` matrix of precomputed distances.
pub fn furthest_point_sampling_with_dist<F: FloatElement>(
    device: &LaneDevice,
    distances: &GlobalTensor<F>,
    num_samples: usize,
    options: FpsOptions,
) -> Result<FpsOutput<F>, SamplingError> {
    sample(
        device,
        PointSource::Distances,
        distances,
        num_samples,
        None,
        options,
    )
}
