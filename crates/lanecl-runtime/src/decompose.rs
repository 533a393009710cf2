use crate::{ConfigurationError, TensorShape};

/// Extents of a tensor factored around a reduction or gather axis.
///
/// `head` covers the axes before the reduction axis, `dim` the axis itself, `body` the axes
/// after it along which indices still vary, and `tail` the trailing axes copied verbatim for
/// every index.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisDecomposition {
    pub head: usize,
    pub dim: usize,
    pub body: usize,
    pub tail: usize,
}

impl AxisDecomposition {
    pub fn num_elements(&self) -> usize {
        self.head * self.dim * self.body * self.tail
    }

    /// Number of index elements, each addressing one row of `tail` values.
    pub fn index_rows(&self) -> usize {
        self.head * self.dim * self.body
    }

    /// Number of output rows once the reduction axis is resized to `out_dim`.
    pub fn output_rows(&self, out_dim: usize) -> usize {
        self.head * out_dim * self.body
    }

    /// Output row receiving the index element at `index_row` when its value is `group`.
    pub fn output_row(&self, index_row: usize, group: usize, out_dim: usize) -> usize {
        let head = index_row / (self.dim * self.body);
        let body = index_row % self.body;
        (head * out_dim + group) * self.body + body
    }

    /// Coordinate of `index_row` along the reduction axis.
    pub fn position_along_axis(&self, index_row: usize) -> usize {
        (index_row / self.body) % self.dim
    }

    /// Head owning the given output row.
    pub fn head_of_output_row(&self, output_row: usize, out_dim: usize) -> usize {
        output_row / (out_dim * self.body)
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }
}

/// Factors value/index shape pairs into [axis decompositions](AxisDecomposition).
pub struct ShapeDecomposer;

impl ShapeDecomposer {
    /// Decompose `value` around `axis`, using `index` to find where indices stop varying.
    ///
    /// Trailing extents of size one on the index tensor are ignored, so an index of shape
    /// `[N, 1]` against a value of shape `[N, C]` yields `tail = C`. A rank-0 index leaves
    /// `body = 1`.
    pub fn decompose(
        value: &TensorShape,
        index: &TensorShape,
        axis: usize,
    ) -> Result<AxisDecomposition, ConfigurationError> {
        let rank = value.rank();
        if axis >= rank {
            return Err(ConfigurationError::AxisOutOfRange { axis, rank });
        }
        if index.rank() > 0 && axis >= index.rank() {
            return Err(ConfigurationError::AxisOutOfRange {
                axis,
                rank: index.rank(),
            });
        }

        let indices_end = index.available_rank().max(axis + 1);
        if indices_end > rank {
            return Err(ConfigurationError::ShapeMismatch(format!(
                "index {index} varies over more axes than value {value}"
            )));
        }

        if index.rank() > 0 {
            for axis in 0..indices_end {
                if index.dim(axis) != value.dim(axis) {
                    return Err(ConfigurationError::ShapeMismatch(format!(
                        "index {index} and value {value} differ on axis {axis}"
                    )));
                }
            }
        }

        let decomposition = AxisDecomposition {
            head: value.extent_product(0..axis),
            dim: value.dims()[axis],
            body: value.extent_product(axis + 1..indices_end),
            tail: value.extent_product(indices_end..rank),
        };
        log::trace!("Decomposed {value} around axis {axis}: {decomposition:?}");

        Ok(decomposition)
    }
}
