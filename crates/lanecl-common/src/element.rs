use core::fmt::Debug;
use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

use bytemuck::Pod;
use half::{bf16, f16};
use num_traits::Float;

/// The data type of an [element](Element), used to size scratch buffers at planning time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum DType {
    #[display("f16")]
    F16,
    #[display("bf16")]
    BF16,
    #[display("f32")]
    F32,
    #[display("f64")]
    F64,
    #[display("i32")]
    I32,
    #[display("i64")]
    I64,
    #[display("u32")]
    U32,
}

impl DType {
    /// Size of one element in bytes.
    pub const fn size_bytes(&self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::I32 | DType::U32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// Number of elements moved by one transfer block of `block_bytes`.
    pub const fn elements_per_block(&self, block_bytes: usize) -> usize {
        let per_block = block_bytes / self.size_bytes();
        if per_block == 0 { 1 } else { per_block }
    }
}

/// An atomic storage cell holding the bit pattern of one element in global memory.
pub trait AtomicCell: Send + Sync + Debug {
    /// The raw bits stored in the cell.
    type Bits: Pod + Eq;

    fn new(bits: Self::Bits) -> Self;
    fn load(&self) -> Self::Bits;
    fn store(&self, bits: Self::Bits);
    fn compare_exchange_weak(
        &self,
        current: Self::Bits,
        new: Self::Bits,
    ) -> Result<Self::Bits, Self::Bits>;
}

macro_rules! atomic_cell {
    ($atomic:ty, $bits:ty) => {
        impl AtomicCell for $atomic {
            type Bits = $bits;

            fn new(bits: Self::Bits) -> Self {
                <$atomic>::new(bits)
            }

            fn load(&self) -> Self::Bits {
                <$atomic>::load(self, Ordering::Acquire)
            }

            fn store(&self, bits: Self::Bits) {
                <$atomic>::store(self, bits, Ordering::Release)
            }

            fn compare_exchange_weak(
                &self,
                current: Self::Bits,
                new: Self::Bits,
            ) -> Result<Self::Bits, Self::Bits> {
                <$atomic>::compare_exchange_weak(
                    self,
                    current,
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
            }
        }
    };
}

atomic_cell!(AtomicU16, u16);
atomic_cell!(AtomicU32, u32);
atomic_cell!(AtomicU64, u64);

/// A value that can live in global memory and in a lane's scratch.
///
/// Every element is stored in global memory as its bit pattern inside an [atomic cell](AtomicCell),
/// so lanes can share tensors and accumulate into them without locks.
pub trait Element: Pod + Debug + PartialEq + Default + Send + Sync + 'static {
    /// Storage cell with the same width as the element.
    type Cell: AtomicCell;

    /// Data type tag of the element.
    const DTYPE: DType;

    /// Size of the element in bytes.
    fn size() -> usize {
        Self::DTYPE.size_bytes()
    }

    fn new_cell(self) -> Self::Cell {
        Self::Cell::new(bytemuck::cast(self))
    }

    fn load(cell: &Self::Cell) -> Self {
        bytemuck::cast(cell.load())
    }

    fn store(cell: &Self::Cell, value: Self) {
        cell.store(bytemuck::cast(value))
    }

    /// Atomically replace the cell content with `update(current)` until no other lane
    /// interferes. Returning `None` leaves the cell untouched.
    ///
    /// Returns the value observed right before the successful update.
    fn update<F: Fn(Self) -> Option<Self>>(cell: &Self::Cell, update: F) -> Self {
        let mut current = cell.load();
        loop {
            let value: Self = bytemuck::cast(current);
            let Some(next) = update(value) else {
                return value;
            };
            match cell.compare_exchange_weak(current, bytemuck::cast(next)) {
                Ok(_) => return value,
                Err(actual) => current = actual,
            }
        }
    }
}

/// A floating point element. Kernels accumulate in the element type itself.
pub trait FloatElement: Element + Float {
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Atomically add `value` to the cell.
    fn atomic_add(cell: &Self::Cell, value: Self) {
        Self::update(cell, |current| Some(current + value));
    }

    /// Lowest finite value, used as the neutral seed of a max reduction.
    fn lowest() -> Self {
        Self::min_value()
    }
}

/// An element used to address rows of another tensor.
pub trait IndexElement: Element + Eq {
    /// The index as a position, or `None` when it is negative and must be masked.
    fn as_index(self) -> Option<usize>;
    fn from_index(index: usize) -> Self;
}

macro_rules! float_element {
    ($ty:ty, $cell:ty, $dtype:expr, $from:expr, $to:expr) => {
        impl Element for $ty {
            type Cell = $cell;
            const DTYPE: DType = $dtype;
        }

        impl FloatElement for $ty {
            fn from_f64(value: f64) -> Self {
                $from(value)
            }

            fn to_f64(self) -> f64 {
                $to(self)
            }
        }
    };
}

float_element!(f16, AtomicU16, DType::F16, f16::from_f64, f16::to_f64);
float_element!(bf16, AtomicU16, DType::BF16, bf16::from_f64, bf16::to_f64);
float_element!(f32, AtomicU32, DType::F32, |v| v as f32, |v: f32| v as f64);
float_element!(f64, AtomicU64, DType::F64, |v| v, |v| v);

macro_rules! index_element {
    ($ty:ty, $cell:ty, $dtype:expr) => {
        impl Element for $ty {
            type Cell = $cell;
            const DTYPE: DType = $dtype;
        }

        impl IndexElement for $ty {
            fn as_index(self) -> Option<usize> {
                usize::try_from(self).ok()
            }

            fn from_index(index: usize) -> Self {
                index as $ty
            }
        }
    };
}

index_element!(i32, AtomicU32, DType::I32);
index_element!(i64, AtomicU64, DType::I64);
index_element!(u32, AtomicU32, DType::U32);
