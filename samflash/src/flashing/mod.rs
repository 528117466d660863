//! Flash programming, readback and fuse handling.

mod error;
mod fuses;
mod progress;
mod same5x;

pub use error::*;
pub use fuses::*;
pub use progress::*;
pub use same5x::*;
