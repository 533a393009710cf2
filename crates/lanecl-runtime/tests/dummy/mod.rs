mod kernel;

pub use kernel::*;
