mod next;
mod request;
mod scan;
#[cfg(test)]
mod tests;

pub use next::*;
pub use request::*;
pub use scan::*;
