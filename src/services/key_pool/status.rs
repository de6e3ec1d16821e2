//! Read-only status projections
//!
//! These structs are what the request-handling layer serializes for the
//! operator dashboard. Producing one never mutates pool state.

use serde::Serialize;
use std::collections::HashMap;

use super::mode::SelectionMode;

/// Per-key counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub fail_count: u32,
    pub usage_count: u64,
}

/// Keys of one pool partitioned by validity
///
/// A key is valid iff its failure count is strictly below the pool's
/// max-failures threshold.
#[derive(Debug, Clone, Serialize)]
pub struct KeysByStatus {
    pub valid_keys: HashMap<String, KeyStatus>,
    pub invalid_keys: HashMap<String, KeyStatus>,
}

impl KeysByStatus {
    /// Total number of keys across both partitions
    pub fn total(&self) -> usize {
        self.valid_keys.len() + self.invalid_keys.len()
    }
}

/// Keys partitioned by validity, carrying fail counts only
///
/// The older projection used by bulk key operations.
#[derive(Debug, Clone, Serialize)]
pub struct KeysWithFailCounts {
    pub valid_keys: HashMap<String, u32>,
    pub invalid_keys: HashMap<String, u32>,
    pub all_keys: HashMap<String, u32>,
}

/// Snapshot of the active selection policy and usage counters
#[derive(Debug, Clone, Serialize)]
pub struct UsageModeStatus {
    pub usage_mode: SelectionMode,
    pub usage_threshold: u64,
    /// Key currently pinned by fixed mode; `None` under polling
    pub current_fixed_key: Option<String>,
    pub current_vertex_fixed_key: Option<String>,
    pub current_key_usage: u64,
    pub current_vertex_key_usage: u64,
    pub total_usage_counts: HashMap<String, u64>,
    pub total_vertex_usage_counts: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_by_status_total() {
        let status = KeysByStatus {
            valid_keys: HashMap::from([(
                "a".to_string(),
                KeyStatus {
                    fail_count: 0,
                    usage_count: 2,
                },
            )]),
            invalid_keys: HashMap::from([(
                "b".to_string(),
                KeyStatus {
                    fail_count: 5,
                    usage_count: 9,
                },
            )]),
        };
        assert_eq!(status.total(), 2);
    }

    #[test]
    fn test_key_status_serialization() {
        let status = KeyStatus {
            fail_count: 2,
            usage_count: 7,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["fail_count"], 2);
        assert_eq!(json["usage_count"], 7);
    }
}
