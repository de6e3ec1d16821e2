//! Key selection modes
//!
//! The selection mode is a single shared setting applied identically to the
//! primary and vertex pools.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KeyPoolError;

/// Selection policy for handing out keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Round-robin over the whole pool (default)
    #[default]
    Polling,
    /// Repeat one key until its usage count reaches the threshold, then advance
    Fixed,
}

impl FromStr for SelectionMode {
    type Err = KeyPoolError;

    /// Parse from string (case-insensitive). Anything outside
    /// `{"polling", "fixed"}` is rejected rather than defaulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polling" => Ok(Self::Polling),
            "fixed" => Ok(Self::Fixed),
            _ => Err(KeyPoolError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polling => write!(f, "polling"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}
