//! Tiled operators running over the lanes of a [LaneDevice].
//!
//! The planning and execution engine is re-exported at the root. Operators live in their own
//! modules, each behind the feature of the same name.

pub use lanecl_runtime::*;

pub use lanecl_common as common;

#[cfg(feature = "reduce")]
pub use lanecl_reduce as reduce;

#[cfg(feature = "sampling")]
pub use lanecl_sampling as sampling;

#[cfg(feature = "attention")]
pub use lanecl_attention as attention;

pub mod prelude {
    pub use lanecl_common::{DType, Element, FloatElement, IndexElement};
    pub use lanecl_runtime::{DeviceProperties, GlobalTensor, LaneDevice, TensorShape};

    #[cfg(feature = "reduce")]
    pub use lanecl_reduce::{
        ScatterOptions, ScatterStrategy, scatter_max, scatter_mean, scatter_sum,
    };

    #[cfg(feature = "sampling")]
    pub use lanecl_sampling::{
        FpsOptions, furthest_point_sampling, furthest_point_sampling_with_dist,
    };

    #[cfg(feature = "attention")]
    pub use lanecl_attention::{
        BoundaryMode, MsdaInputs, MsdaOptions, multi_scale_deformable_attn,
        multi_scale_deformable_attn_backward,
    };
}
