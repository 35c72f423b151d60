//! High-level `StateStore` API.
//!
//! [`StateStore`] is the only mutation path for session state. Each write
//! validates its payload, then persists the zone change and exactly one delta
//! in a single `SQLite` transaction.

mod options;
mod state_store;
pub mod validation;

pub use options::StoreOptions;
pub use state_store::{RollbackOutcome, RollbackRequest, StateStore};
