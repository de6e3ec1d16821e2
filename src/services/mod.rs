//! Services module
//!
//! Contains the credential pool business logic.

pub mod key_pool;

pub use key_pool::{
    KeyManager, KeyManagerHolder, KeyStatus, KeysByStatus, KeysWithFailCounts, PoolSnapshot,
    PreservedState, SelectionMode, UsageModeStatus,
};
