mod error;
mod set;

pub use error::*;
pub use set::*;
