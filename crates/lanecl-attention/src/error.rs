use lanecl_runtime::{ConfigurationError, TensorShape};

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum AttentionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{name} should have rank {expected}, got shape {actual}")]
    Rank {
        name: &'static str,
        expected: usize,
        actual: TensorShape,
    },

    #[error("{name} should have shape {expected}, got {actual}")]
    Shape {
        name: &'static str,
        expected: TensorShape,
        actual: TensorShape,
    },

    /// A level of the value pyramid is inconsistent with the value tensor.
    #[error("Level {level} is invalid: {reason}")]
    Level { level: usize, reason: String },
}
