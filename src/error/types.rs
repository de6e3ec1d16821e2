//! Key pool error types

use thiserror::Error;

/// Errors produced by the credential pool core.
///
/// Per-key "not found" cases are deliberately not represented here: resets
/// and queries on unknown keys report a boolean failure and log a warning,
/// so bookkeeping problems stay local and non-fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyPoolError {
    /// A required key list was absent when a new manager had to be built.
    /// A present-but-empty list is allowed and only warned about.
    #[error("missing {0} key list: cannot construct key manager")]
    MissingKeyList(&'static str),

    /// Key selection was attempted on a pool with no keys.
    #[error("the {0} key pool is empty")]
    EmptyPool(&'static str),

    /// A selection mode value outside {polling, fixed} was rejected.
    #[error("invalid key usage mode: {0:?} (expected \"polling\" or \"fixed\")")]
    InvalidMode(String),

    /// A non-positive usage threshold was rejected.
    #[error("invalid usage threshold: {0} (must be at least 1)")]
    InvalidThreshold(u64),
}
