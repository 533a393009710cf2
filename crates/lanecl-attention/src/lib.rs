//! Multi-scale deformable attention.
//!
//! Every query attends to a few points per head and per level of a feature pyramid. Points are
//! sampled bilinearly around learned locations and summed with learned weights.

mod config;
mod error;
mod kernel;
mod launch;
mod sampling;
mod shape;
mod tiling;

pub use config::*;
pub use error::*;
pub use launch::*;
pub use sampling::*;
pub use shape::*;
pub use tiling::*;
