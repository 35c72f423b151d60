//! Repository implementations for `SQLite` operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! and run one statement. Transactions are owned by the caller.

pub mod delta;
pub mod state;

pub use delta::{DeltaRepo, StepRange};
pub use state::StateRepo;
