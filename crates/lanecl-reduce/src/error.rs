use lanecl_runtime::{ConfigurationError, TensorShape};

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ScatterError {
    /// The launch can't be planned on this device.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Owned rows were requested but not even one output element fits in a lane's scratch.
    #[error(
        "An owned output element needs {element_bytes} bytes, over the scratch budget of {budget} bytes"
    )]
    OwnedRowsUnavailable { element_bytes: usize, budget: usize },

    /// A tensor doesn't have the shape implied by the other operands.
    #[error("Expected {name} of shape {expected}, got {actual}")]
    Shape {
        name: &'static str,
        expected: TensorShape,
        actual: TensorShape,
    },
}
