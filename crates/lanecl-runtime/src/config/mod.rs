/// Execution config module.
pub mod execution;
/// Planning config module.
pub mod planning;
/// Platform config module.
pub mod platform;

mod base;
mod logger;

pub use base::*;
pub use logger::*;
