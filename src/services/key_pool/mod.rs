//! Key Pool Module
//!
//! This module manages the pools of upstream Gemini API keys used to spread
//! load and route around failing keys.
//!
//! # Features
//! - Two independent pools (primary and Vertex Express) under one shared policy
//! - Round-robin ("polling") and sticky ("fixed") selection modes, switchable at runtime
//! - Per-key failure and usage counters with explicit resets
//! - State preservation across pool reconfigurations via [`KeyManagerHolder`]
//!
//! # Example
//! ```
//! use gemini_key_gateway::config::Settings;
//! use gemini_key_gateway::services::key_pool::KeyManager;
//!
//! let settings = Settings::default();
//! let manager = KeyManager::new(
//!     vec!["key-1".into(), "key-2".into()],
//!     vec![],
//!     &settings,
//! );
//!
//! let key = manager.next_working_key().unwrap();
//! if !manager.is_valid(&key) {
//!     // all keys have failed too often; the caller decides what to do
//! }
//! ```

mod lifecycle;
mod manager;
mod mode;
mod pool;
mod status;

pub use lifecycle::{KeyManagerHolder, PoolSnapshot, PreservedState};
pub use manager::KeyManager;
pub use mode::SelectionMode;
pub use status::{KeyStatus, KeysByStatus, KeysWithFailCounts, UsageModeStatus};
