//! Error types for the key pool core

pub mod types;

pub use types::KeyPoolError;
