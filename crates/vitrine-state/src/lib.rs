//! # vitrine-state
//!
//! Session zone-state engine with `SQLite` backend.
//!
//! - **Zone store**: one `session_state` row per session holding the Data,
//!   Template and View zones plus the navigation stack
//! - **Delta log**: append-only, checksummed change records with gap-free
//!   per-session steps allocated inside the insert
//! - **Write coordinator**: [`StateStore`], the only mutation path; one
//!   transaction per write, empty results never erase data, aliases carry
//!   forward
//! - **Reconstruction**: replay of any delta prefix, log verification and
//!   rollback by appending a restoring delta
//! - **Migrations**: version-tracked SQL schema

#![deny(unsafe_code)]

pub mod checksum;
pub mod errors;
pub mod reconstruct;
pub mod sqlite;
pub mod store;

pub use errors::{ErrorKind, Result, StateError};
pub use reconstruct::{ReconstructedState, VerifyReport, reconstruct_from_deltas, verify_deltas};
pub use sqlite::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, run_migrations,
};
pub use store::{RollbackOutcome, RollbackRequest, StateStore, StoreOptions};
