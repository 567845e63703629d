#![doc = include_str!("../README.md")]

mod allocator;
mod consumption;
mod error;
mod futures;
mod id;
mod pool;
mod range;
mod reconcile;
mod record;
mod storage;

pub use crate::allocator::*;
pub use crate::consumption::*;
pub use crate::error::*;
pub use crate::futures::*;
pub use crate::id::*;
pub use crate::pool::*;
pub use crate::range::*;
pub use crate::reconcile::*;
pub use crate::record::*;
pub use crate::storage::*;
