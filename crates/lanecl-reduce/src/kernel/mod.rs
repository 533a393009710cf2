//! Lane bodies of the scatter launches.
//!
//! Every kernel decodes its tiling, then dispatches once on the alignment bit of the variant so
//! the tile loop runs with a compile-time copy path.

mod divide;
mod gather;
mod owned;
mod route;
mod streaming;

pub(crate) use divide::*;
pub(crate) use gather::*;
pub(crate) use owned::*;
pub(crate) use route::*;
pub(crate) use streaming::*;

use lanecl_runtime::LaneContext;

use crate::ScatterVariant;

pub(crate) fn scatter_variant(lane: &LaneContext<'_>) -> ScatterVariant {
    let key = lane.tiling().key().variant;
    match ScatterVariant::from_key(key) {
        Some(variant) => variant,
        None => panic!("Lane {} received an unknown scatter variant {key:#x}", lane.lane_id),
    }
}

/// Alignment bit of launches whose variant only records the copy path.
pub(crate) fn is_aligned_launch(lane: &LaneContext<'_>) -> bool {
    lane.tiling().key().variant & 1 == 1
}
