mod copy;
mod executor;
mod ring;
mod stage;

pub use copy::*;
pub use executor::*;
pub use ring::*;
pub use stage::*;
