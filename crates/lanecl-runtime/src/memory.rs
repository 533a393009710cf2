use lanecl_common::{Element, FloatElement};

use crate::TensorShape;

/// A tensor in global memory, shared by every lane of a launch.
///
/// Cells are atomics: lanes read freely, and write either to rows they own exclusively or through
/// commutative atomic updates.
pub struct GlobalTensor<E: Element> {
    shape: TensorShape,
    cells: Vec<E::Cell>,
}

impl<E: Element> core::fmt::Debug for GlobalTensor<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GlobalTensor")
            .field("dtype", &E::DTYPE)
            .field("shape", &self.shape)
            .finish()
    }
}

impl<E: Element> GlobalTensor<E> {
    /// Creates a tensor from host data.
    ///
    /// # Panics
    /// If `data` doesn't hold exactly one value per element of `shape`.
    pub fn from_slice(shape: impl Into<TensorShape>, data: &[E]) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.num_elements(),
            data.len(),
            "Tensor of shape {shape} can't be created from {} values",
            data.len()
        );

        Self {
            shape,
            cells: data.iter().map(|value| value.new_cell()).collect(),
        }
    }

    pub fn filled(shape: impl Into<TensorShape>, value: E) -> Self {
        let shape = shape.into();
        let cells = (0..shape.num_elements())
            .map(|_| value.new_cell())
            .collect();
        Self { shape, cells }
    }

    pub fn zeros(shape: impl Into<TensorShape>) -> Self {
        Self::filled(shape, E::default())
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn load(&self, index: usize) -> E {
        E::load(&self.cells[index])
    }

    pub fn store(&self, index: usize, value: E) {
        E::store(&self.cells[index], value)
    }

    /// Atomically applies `update` to the element, see [Element::update].
    pub fn update<F: Fn(E) -> Option<E>>(&self, index: usize, update: F) -> E {
        E::update(&self.cells[index], update)
    }

    /// Reads `dst.len()` consecutive elements starting at `offset`.
    pub fn read_into(&self, offset: usize, dst: &mut [E]) {
        let cells = &self.cells[offset..offset + dst.len()];
        for (value, cell) in dst.iter_mut().zip(cells) {
            *value = E::load(cell);
        }
    }

    /// Writes `src` to consecutive elements starting at `offset`.
    pub fn write_from(&self, offset: usize, src: &[E]) {
        let cells = &self.cells[offset..offset + src.len()];
        for (value, cell) in src.iter().zip(cells) {
            E::store(cell, *value);
        }
    }

    /// Copies the whole tensor back to the host.
    pub fn to_vec(&self) -> Vec<E> {
        self.cells.iter().map(E::load).collect()
    }
}

impl<F: FloatElement> GlobalTensor<F> {
    /// Atomically adds `value` to the element at `index`.
    pub fn atomic_add(&self, index: usize, value: F) {
        F::atomic_add(&self.cells[index], value)
    }

    /// Atomically adds `src` to consecutive elements starting at `offset`.
    pub fn accumulate_from(&self, offset: usize, src: &[F]) {
        let cells = &self.cells[offset..offset + src.len()];
        for (value, cell) in src.iter().zip(cells) {
            F::atomic_add(cell, *value);
        }
    }
}

/// Locks serializing read-modify-write sequences that span several global cells, such as a
/// value and its argmax.
///
/// Cells are mapped onto a fixed number of stripes, so unrelated cells may share a lock.
#[derive(Debug)]
pub struct CellLocks {
    stripes: Vec<spin::Mutex<()>>,
}

impl CellLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| spin::Mutex::new(())).collect(),
        }
    }

    /// Runs `func` while holding the lock of `cell`.
    pub fn with<R, F: FnOnce() -> R>(&self, cell: usize, func: F) -> R {
        let _guard = self.stripes[cell % self.stripes.len()].lock();
        func()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes_ranges() {
        let tensor = GlobalTensor::<f32>::zeros([2, 3]);
        tensor.write_from(2, &[1.0, 2.0, 3.0]);

        let mut window = [0.0; 2];
        tensor.read_into(3, &mut window);

        assert_eq!(window, [2.0, 3.0]);
        assert_eq!(tensor.to_vec(), vec![0.0, 0.0, 1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn concurrent_atomic_adds_are_not_lost() {
        let tensor = GlobalTensor::<f32>::zeros([1]);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        tensor.atomic_add(0, 1.0);
                    }
                });
            }
        });

        assert_eq!(tensor.load(0), 4000.0);
    }

    #[test]
    #[should_panic(expected = "can't be created from 3 values")]
    fn wrong_host_length_panics() {
        GlobalTensor::<i32>::from_slice([2, 2], &[1, 2, 3]);
    }
}
