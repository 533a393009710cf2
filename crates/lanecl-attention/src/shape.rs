use lanecl_common::IndexElement;
use lanecl_runtime::{GlobalTensor, TensorShape};

use crate::AttentionError;

/// One level of the value pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsdaLevel {
    pub height: usize,
    pub width: usize,
    /// First key of the level.
    pub start: usize,
}

/// Extents of a deformable attention, checked against every input.
///
/// - value: `[batch, keys, heads, channels]`
/// - sampling locations: `[batch, queries, heads, levels, points, 2]`, normalized `(x, y)`
/// - attention weights: `[batch, queries, heads, levels, points]`
/// - output: `[batch, queries, heads * channels]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsdaShape {
    pub batch: usize,
    pub keys: usize,
    pub heads: usize,
    pub channels: usize,
    pub levels: usize,
    pub queries: usize,
    pub points: usize,
}

impl MsdaShape {
    pub fn new(
        value: &TensorShape,
        spatial_shapes: &TensorShape,
        level_start_index: &TensorShape,
        sampling_locations: &TensorShape,
        attention_weights: &TensorShape,
    ) -> Result<Self, AttentionError> {
        let value = check_rank("value", value, 4)?;
        let locations = check_rank("sampling_locations", sampling_locations, 6)?;
        let (batch, keys, heads, channels) = (value[0], value[1], value[2], value[3]);
        let (queries, levels, points) = (locations[1], locations[3], locations[4]);

        check_shape("spatial_shapes", spatial_shapes, [levels, 2])?;
        check_shape("level_start_index", level_start_index, [levels])?;
        check_shape(
            "sampling_locations",
            sampling_locations,
            [batch, queries, heads, levels, points, 2],
        )?;
        check_shape(
            "attention_weights",
            attention_weights,
            [batch, queries, heads, levels, points],
        )?;

        Ok(Self {
            batch,
            keys,
            heads,
            channels,
            levels,
            queries,
            points,
        })
    }

    /// Every query of every batch, the unit of work of both passes.
    pub fn total_queries(&self) -> usize {
        self.batch * self.queries
    }

    /// Sampling points of one query over every head and level.
    pub fn samples_per_query(&self) -> usize {
        self.heads * self.levels * self.points
    }

    pub fn output_shape(&self) -> TensorShape {
        TensorShape::new([self.batch, self.queries, self.heads * self.channels])
    }

    /// Reads the level table and checks every level lies within the keys.
    pub fn levels<I: IndexElement>(
        &self,
        spatial_shapes: &GlobalTensor<I>,
        level_start_index: &GlobalTensor<I>,
    ) -> Result<Vec<MsdaLevel>, AttentionError> {
        let mut levels = Vec::with_capacity(self.levels);

        for level in 0..self.levels {
            let read = |tensor: &GlobalTensor<I>, index: usize, what: &str| {
                tensor.load(index).as_index().ok_or_else(|| AttentionError::Level {
                    level,
                    reason: format!("negative {what}"),
                })
            };
            let height = read(spatial_shapes, level * 2, "height")?;
            let width = read(spatial_shapes, level * 2 + 1, "width")?;
            let start = read(level_start_index, level, "start index")?;

            let end = height
                .checked_mul(width)
                .and_then(|area| area.checked_add(start));
            if end.is_none_or(|end| end > self.keys) {
                return Err(AttentionError::Level {
                    level,
                    reason: format!(
                        "{height}x{width} keys from key {start} overflow the {} keys of value",
                        self.keys
                    ),
                });
            }
            levels.push(MsdaLevel {
                height,
                width,
                start,
            });
        }

        Ok(levels)
    }
}

fn check_rank<'a>(
    name: &'static str,
    shape: &'a TensorShape,
    rank: usize,
) -> Result<&'a [usize], AttentionError> {
    if shape.rank() != rank {
        return Err(AttentionError::Rank {
            name,
            expected: rank,
            actual: shape.clone(),
        });
    }
    Ok(shape.dims())
}

fn check_shape<const N: usize>(
    name: &'static str,
    shape: &TensorShape,
    expected: [usize; N],
) -> Result<(), AttentionError> {
    let expected = TensorShape::new(expected);
    if shape != &expected {
        return Err(AttentionError::Shape {
            name,
            expected,
            actual: shape.clone(),
        });
    }
    Ok(())
}
