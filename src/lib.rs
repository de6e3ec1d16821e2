//! Gemini API key gateway core
//!
//! In-process credential pool management for a gateway that fronts multiple
//! upstream Gemini API keys: key selection (round-robin or sticky), failure
//! and usage bookkeeping, and state preservation across pool reconfigurations.

// Public modules
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::KeyPoolError;
pub use services::key_pool::{KeyManager, KeyManagerHolder, SelectionMode};
