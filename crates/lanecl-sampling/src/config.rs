use lanecl_common::FloatElement;
use lanecl_runtime::{
    BufferRole, ConfigurationError, DeviceProperties, LaneDevice, PartitionPlan, TensorShape,
    WorkPartitioner, WorkRequest,
};

use crate::{FpsVariant, PointSource, SamplingError, tiles_are_aligned};

/// Extents of a sampling launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpsExtents {
    pub batch: usize,
    pub points: usize,
    pub samples: usize,
}

impl FpsExtents {
    /// Validates `input` for `source` and the requested number of samples.
    pub fn new(
        source: PointSource,
        input: &TensorShape,
        samples: usize,
    ) -> Result<Self, SamplingError> {
        let dims = input.dims();
        let valid = match source {
            PointSource::Coordinates => dims.len() == 3 && dims[2] == 3,
            PointSource::Distances => dims.len() == 3 && dims[1] == dims[2],
        };
        if !valid {
            return Err(SamplingError::Shape {
                name: match source {
                    PointSource::Coordinates => "points",
                    PointSource::Distances => "distances",
                },
                expected: match source {
                    PointSource::Coordinates => "[batch, points, 3]",
                    PointSource::Distances => "[batch, points, points]",
                },
                actual: input.clone(),
            });
        }

        let (batch, points) = (dims[0], dims[1]);
        if samples > points {
            return Err(ConfigurationError::InvalidAttribute {
                name: "num_samples",
                reason: format!("can't select {samples} samples out of {points} points"),
            }
            .into());
        }

        Ok(Self {
            batch,
            points,
            samples,
        })
    }

    /// Whether the launch has nothing to select.
    pub fn is_empty(&self) -> bool {
        self.batch == 0 || self.samples == 0
    }
}

/// Everything the host decides before launching a sampling.
#[derive(Debug, Clone)]
pub struct FpsConfig {
    pub extents: FpsExtents,
    pub variant: FpsVariant,
    pub plan: PartitionPlan,
}

impl FpsConfig {
    /// Splits the candidate points over lanes.
    ///
    /// The running distances of a lane stay in scratch next to the tile ring whenever they fit.
    /// Otherwise every tile also stages its slice of distances, read from and written back to a
    /// workspace region.
    pub fn generate<F: FloatElement>(
        device: &LaneDevice,
        source: PointSource,
        extents: FpsExtents,
    ) -> Result<Self, SamplingError> {
        let properties = device.properties();
        if extents.is_empty() {
            return Ok(Self {
                extents,
                variant: FpsVariant {
                    source,
                    spilled: false,
                    aligned: false,
                },
                plan: PartitionPlan::noop(properties.lane_count),
            });
        }

        let lane_points = extents.points.div_ceil(properties.lane_count.max(1));
        let resident_bytes = (lane_points * F::size()).next_multiple_of(properties.block_bytes.max(1));
        let request = candidate_request::<F>(device, source, extents.points, false);

        let (plan, spilled) = match resident_plan(properties, resident_bytes, &request) {
            Some(plan) => (plan, false),
            None => {
                log::warn!(
                    "Running distances of {lane_points} points exceed the scratch budget of {} bytes, spilling them to the workspace",
                    properties.scratch_budget_bytes
                );
                let request = candidate_request::<F>(device, source, extents.points, true);
                (WorkPartitioner::new(properties).plan(&request)?, true)
            }
        };

        let variant = FpsVariant {
            source,
            spilled,
            aligned: tiles_are_aligned(&plan, properties.block_elements(F::DTYPE)),
        };
        log::debug!("Sampling {extents:?} from {source:?} with {variant:?}");
        device.log_plan("furthest_point_sampling", &plan);

        Ok(Self {
            extents,
            variant,
            plan,
        })
    }
}

// Plans the tiles with whatever scratch is left once the running distances are carved.
fn resident_plan(
    properties: &DeviceProperties,
    resident_bytes: usize,
    request: &WorkRequest,
) -> Option<PartitionPlan> {
    let remaining = properties.scratch_budget_bytes.checked_sub(resident_bytes)?;
    let mut properties = properties.clone();
    properties.scratch_budget_bytes = remaining;

    WorkPartitioner::new(&properties).plan(request).ok()
}

fn candidate_request<F: FloatElement>(
    device: &LaneDevice,
    source: PointSource,
    points: usize,
    spilled: bool,
) -> WorkRequest {
    let mut request = WorkRequest::new(points).with_max_depth(device.max_buffer_depth());
    request = match source {
        PointSource::Coordinates => request.with_role(BufferRole::per_task("xyz", F::DTYPE, 3)),
        PointSource::Distances => request.with_role(BufferRole::per_task("row", F::DTYPE, 1)),
    };
    if spilled {
        request = request.with_role(BufferRole::per_task("nearest", F::DTYPE, 1));
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_samples_are_rejected() {
        let result = FpsExtents::new(PointSource::Coordinates, &TensorShape::new([2, 4, 3]), 5);

        assert!(matches!(
            result,
            Err(SamplingError::Configuration(
                ConfigurationError::InvalidAttribute {
                    name: "num_samples",
                    ..
                }
            ))
        ));
    }

    #[test]
    fn distance_matrices_must_be_square() {
        let result = FpsExtents::new(PointSource::Distances, &TensorShape::new([1, 4, 3]), 2);

        assert_eq!(
            result,
            Err(SamplingError::Shape {
                name: "distances",
                expected: "[batch, points, points]",
                actual: TensorShape::new([1, 4, 3]),
            })
        );
    }

    #[test]
    fn no_samples_is_empty() {
        let extents =
            FpsExtents::new(PointSource::Coordinates, &TensorShape::new([3, 8, 3]), 0).unwrap();
        assert!(extents.is_empty());
    }
}
