//! Utility modules

pub mod redact;

pub use redact::redact_key;
