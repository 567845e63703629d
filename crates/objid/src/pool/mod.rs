mod error;
mod resolver;

pub use error::*;
pub use resolver::*;
