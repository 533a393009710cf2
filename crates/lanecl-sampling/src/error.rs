use lanecl_runtime::{ConfigurationError, TensorShape};

/// Errors raised while planning a sampling launch.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum SamplingError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// An input doesn't have the layout the sampler expects.
    #[error("{name} of shape {actual} should be {expected}")]
    Shape {
        name: &'static str,
        expected: &'static str,
        actual: TensorShape,
    },
}
