//! Tensor shapes and row-major strides.
//!
//! Strides are expressed in element units (not bytes). Element size may be used
//! by callers to convert to/from byte pitches as needed.

use core::fmt::Display;

/// Canonical contiguous row-major strides for a given shape (in elements).
///
/// Example: shape [R, C] -> strides [C, 1]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return vec![];
    }
    let mut strides = vec![0; shape.len()];
    let mut s = 1usize;
    for (i, dim) in shape.iter().enumerate().rev() {
        strides[i] = s;
        s = s.saturating_mul(*dim.max(&1));
    }
    strides
}

/// The extents of a tensor, captured once at planning time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TensorShape {
    dims: Vec<usize>,
}

impl TensorShape {
    /// Creates a shape from its extents.
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    /// The shape of a rank-0 tensor holding a single element.
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Extent of `axis`, or `None` when the axis doesn't exist.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Number of elements, `1` for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn strides(&self) -> Vec<usize> {
        contiguous_strides(&self.dims)
    }

    /// Product of the extents in `range`, `1` for an empty range.
    pub fn extent_product(&self, range: core::ops::Range<usize>) -> usize {
        self.dims[range].iter().product()
    }

    /// Rank once trailing extents of size one are dropped.
    ///
    /// An index tensor of shape `[N, 1, 1]` only varies along its first axis, so its
    /// available rank is one.
    pub fn available_rank(&self) -> usize {
        self.dims
            .iter()
            .rposition(|dim| *dim != 1)
            .map(|last| last + 1)
            .unwrap_or(0)
    }

    /// A copy of this shape with `axis` resized to `extent`.
    ///
    /// # Panics
    /// If the axis doesn't exist.
    pub fn with_dim(&self, axis: usize, extent: usize) -> Self {
        let mut dims = self.dims.clone();
        dims[axis] = extent;
        Self { dims }
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims)
    }
}

impl Display for TensorShape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}
