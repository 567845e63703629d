mod error;
mod merge;
mod set;

pub use error::*;
pub use merge::*;
pub use set::*;
