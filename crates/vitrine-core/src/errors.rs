//! Error types for the core vocabulary.

use thiserror::Error;

/// Errors raised while interpreting core values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A stored or supplied string did not name any variant of a wire enum.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enum was being parsed (e.g. `"view mode"`).
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}

/// Convenience type alias for core results.
pub type Result<T> = std::result::Result<T, CoreError>;
