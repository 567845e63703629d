//! Reconciliation of discovered consumption into canonical storage.
//!
//! A run walks a small state machine over one application's record:
//!
//! ```text
//! Idle -> Fetching -> Merging -> Committing -> Idle
//!             ^                      |
//!             +------ Retrying <-----+ (token conflict)
//!                        |
//!                        +-> Failed (attempts or deadline exhausted)
//! ```
//!
//! On a conflict the *original* discovered delta is merged again against the
//! fresher canonical state, so concurrent contributors never lose each
//! other's IDs.

mod config;
mod coordinator;
mod error;
mod state;

pub use config::*;
pub use coordinator::*;
pub use error::*;
pub use state::*;
