//! Planning and lane execution engine for lanecl operators.
//!
//! Every operator follows the same two phases. On the host, the tensor shapes are
//! [decomposed](ShapeDecomposer) and the work is [partitioned](WorkPartitioner) over lanes and
//! tiles; the resulting plan is [encoded](TilingBuffer) into a flat buffer. On the
//! [device](LaneDevice), every lane decodes the buffer and walks its tiles through a
//! [pipeline](pipeline::TileExecutor) of copy-in, compute and copy-out stages.

#[macro_use]
extern crate derive_new;

/// Configuration module.
pub mod config;
/// Tile pipeline module.
pub mod pipeline;

mod codec;
mod decompose;
mod device;
mod error;
mod exchange;
mod memory;
mod partition;
mod shape;
mod tie;
mod workspace;

pub use codec::*;
pub use decompose::*;
pub use device::*;
pub use error::*;
pub use exchange::*;
pub use memory::*;
pub use partition::*;
pub use shape::*;
pub use tie::*;
pub use workspace::*;
