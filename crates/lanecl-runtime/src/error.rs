use thiserror::Error;

/// A fatal problem detected while planning an operator launch.
///
/// Configuration errors never reach the lanes: planning aborts before any work is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The device reported zero lanes.
    #[error("The device must expose at least one lane")]
    NoLanes,

    /// The device reported an empty scratch budget.
    #[error("The device must expose a non-empty scratch budget per lane")]
    NoScratch,

    /// A reduction or gather axis does not exist on one of the tensors.
    #[error("Axis {axis} is out of range for a tensor of rank {rank}")]
    AxisOutOfRange {
        /// The requested axis.
        axis: usize,
        /// Rank of the offending tensor.
        rank: usize,
    },

    /// Two tensors that must agree on their extents don't.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Not even a single task fits into one lane's scratch.
    #[error("A tile needs at least {required} bytes of scratch but only {available} are available")]
    ScratchTooSmall {
        /// Bytes needed by the smallest possible tile.
        required: usize,
        /// Scratch bytes available per lane.
        available: usize,
    },

    /// An operator attribute is outside the range the operator supports.
    #[error("Invalid attribute `{name}`: {reason}")]
    InvalidAttribute {
        /// Name of the attribute.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Error returned when a serialized tiling buffer can't be decoded into the expected layout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer doesn't have the size agreed upon for the operator.
    #[error("Expected a tiling buffer of {expected} bytes, got {actual}")]
    WrongLength {
        /// Size of the tiling layout.
        expected: usize,
        /// Size of the received buffer.
        actual: usize,
    },

    /// The buffer was encoded for another operator.
    #[error("Expected a tiling buffer for operator {expected:#x}, got {actual:#x}")]
    WrongOperator {
        /// Operator the decoder belongs to.
        expected: u32,
        /// Operator recorded in the buffer.
        actual: u32,
    },

    /// The plan embedded in the buffer violates the partition invariants.
    #[error("The encoded partition plan is inconsistent: {0}")]
    CorruptPlan(&'static str),
}
