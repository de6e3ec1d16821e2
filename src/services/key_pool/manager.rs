//! Credential pool manager
//!
//! [`KeyManager`] owns the primary and vertex key pools and applies one
//! shared selection policy (mode + usage threshold) to both. Callers ask it
//! for the next key, report failures against the key they used, and inspect
//! or reset the accumulated bookkeeping. Success is implicit: failure counts
//! only move via failure reports and explicit resets.
//!
//! The manager's key lists are fixed for its lifetime; changing them means
//! constructing a new manager, normally through
//! [`KeyManagerHolder`](super::KeyManagerHolder) so history carries over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::lifecycle::PreservedState;
use super::mode::SelectionMode;
use super::pool::KeyPool;
use super::status::{KeysByStatus, KeysWithFailCounts, UsageModeStatus};
use crate::config::Settings;
use crate::error::KeyPoolError;
use crate::utils::redact_key;

/// Manager for the primary and vertex key pools
#[derive(Debug)]
pub struct KeyManager {
    api_pool: KeyPool,
    vertex_pool: KeyPool,
    /// Shared selection mode, applied to both pools identically
    mode: RwLock<SelectionMode>,
    /// Shared fixed-mode usage threshold, always >= 1
    usage_threshold: AtomicU64,
    /// Retry ceiling consulted by `report_failure`
    max_retries: u32,
}

impl KeyManager {
    /// Create a manager over the given key lists
    ///
    /// Empty lists are allowed (the pool logs a warning); thresholds and the
    /// default policy come from `settings`.
    pub fn new(api_keys: Vec<String>, vertex_api_keys: Vec<String>, settings: &Settings) -> Self {
        tracing::info!(
            api_keys = api_keys.len(),
            vertex_api_keys = vertex_api_keys.len(),
            mode = %settings.key_usage_mode,
            "Key manager created"
        );
        Self {
            api_pool: KeyPool::new("api", api_keys, settings.max_failures),
            vertex_pool: KeyPool::new("vertex", vertex_api_keys, settings.max_failures),
            mode: RwLock::new(settings.key_usage_mode),
            usage_threshold: AtomicU64::new(settings.key_usage_threshold.max(1)),
            max_retries: settings.max_retries,
        }
    }

    /// Create a manager using the key lists carried in `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.api_keys.clone(),
            settings.vertex_api_keys.clone(),
            settings,
        )
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Next primary key under the active policy
    pub fn next_key(&self) -> Result<String, KeyPoolError> {
        self.next_from(&self.api_pool)
    }

    /// Next vertex key under the active policy
    pub fn next_vertex_key(&self) -> Result<String, KeyPoolError> {
        self.next_from(&self.vertex_pool)
    }

    /// Next primary key that is still valid
    ///
    /// Cycles through the pool until a valid key turns up. If the selection
    /// wraps back around to the first key handed out, every key has failed
    /// too often and that exhausted key is returned as a last resort; the
    /// caller can detect the situation through [`is_valid`](Self::is_valid).
    pub fn next_working_key(&self) -> Result<String, KeyPoolError> {
        self.next_working_from(&self.api_pool)
    }

    /// Next vertex key that is still valid, with the same fallback
    pub fn next_working_vertex_key(&self) -> Result<String, KeyPoolError> {
        self.next_working_from(&self.vertex_pool)
    }

    fn next_from(&self, pool: &KeyPool) -> Result<String, KeyPoolError> {
        match *self.mode.read().unwrap() {
            SelectionMode::Polling => pool.next_polling(),
            SelectionMode::Fixed => pool.next_fixed(self.usage_threshold.load(Ordering::SeqCst)),
        }
    }

    fn next_working_from(&self, pool: &KeyPool) -> Result<String, KeyPoolError> {
        let initial = self.next_from(pool)?;
        if pool.is_valid(&initial) {
            return Ok(initial);
        }
        loop {
            let candidate = self.next_from(pool)?;
            if pool.is_valid(&candidate) || candidate == initial {
                return Ok(candidate);
            }
        }
    }

    // ------------------------------------------------------------------
    // Failure reporting
    // ------------------------------------------------------------------

    /// Record a failed upstream call made with a primary key
    ///
    /// Returns the next working key while `retries` is below the configured
    /// ceiling; `None` signals retry exhaustion and the caller must give up.
    pub fn report_failure(&self, api_key: &str, retries: u32) -> Option<String> {
        self.report_failure_on(&self.api_pool, api_key, retries)
    }

    /// Record a failed upstream call made with a vertex key
    pub fn report_vertex_failure(&self, api_key: &str, retries: u32) -> Option<String> {
        self.report_failure_on(&self.vertex_pool, api_key, retries)
    }

    fn report_failure_on(&self, pool: &KeyPool, api_key: &str, retries: u32) -> Option<String> {
        pool.record_failure(api_key);
        if retries >= self.max_retries {
            tracing::warn!(
                pool = pool.label(),
                key = %redact_key(api_key),
                retries,
                "Retry ceiling reached, giving up on this request"
            );
            return None;
        }
        match self.next_working_from(pool) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(pool = pool.label(), error = %err, "No key available after failure report");
                None
            }
        }
    }

    /// Whether a primary key's failure count is below max-failures
    pub fn is_valid(&self, key: &str) -> bool {
        self.api_pool.is_valid(key)
    }

    /// Whether a vertex key's failure count is below max-failures
    pub fn is_vertex_key_valid(&self, key: &str) -> bool {
        self.vertex_pool.is_valid(key)
    }

    // ------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------

    /// Switch the selection mode for both pools
    ///
    /// Mode strings from the request layer are validated upstream via
    /// `SelectionMode::from_str`, which rejects unknown values. Switching
    /// modes never touches counters or selection positions.
    pub fn set_mode(&self, mode: SelectionMode) {
        *self.mode.write().unwrap() = mode;
        tracing::info!(%mode, "Key usage mode changed");
    }

    pub fn mode(&self) -> SelectionMode {
        *self.mode.read().unwrap()
    }

    /// Set the fixed-mode usage threshold; values below 1 are rejected
    pub fn set_usage_threshold(&self, threshold: u64) -> Result<(), KeyPoolError> {
        if threshold < 1 {
            return Err(KeyPoolError::InvalidThreshold(threshold));
        }
        self.usage_threshold.store(threshold, Ordering::SeqCst);
        tracing::info!(threshold, "Key usage threshold changed");
        Ok(())
    }

    pub fn usage_threshold(&self) -> u64 {
        self.usage_threshold.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Aggregate queries
    // ------------------------------------------------------------------

    /// Primary keys partitioned into valid and invalid with both counters
    pub fn keys_by_status(&self) -> KeysByStatus {
        self.api_pool.keys_by_status()
    }

    /// Vertex keys partitioned into valid and invalid with both counters
    pub fn vertex_keys_by_status(&self) -> KeysByStatus {
        self.vertex_pool.keys_by_status()
    }

    /// Primary keys with fail counts only (bulk-operation projection)
    pub fn all_keys_with_fail_count(&self) -> KeysWithFailCounts {
        self.api_pool.all_keys_with_fail_count()
    }

    /// Read-only snapshot of the active policy and usage counters
    pub fn usage_mode_status(&self) -> UsageModeStatus {
        let mode = self.mode();
        let (current_fixed_key, current_vertex_fixed_key) = match mode {
            SelectionMode::Fixed => (
                self.api_pool.current_fixed_key(),
                self.vertex_pool.current_fixed_key(),
            ),
            SelectionMode::Polling => (None, None),
        };
        let current_key_usage = current_fixed_key
            .as_deref()
            .map(|k| self.api_pool.usage_count(k))
            .unwrap_or(0);
        let current_vertex_key_usage = current_vertex_fixed_key
            .as_deref()
            .map(|k| self.vertex_pool.usage_count(k))
            .unwrap_or(0);
        UsageModeStatus {
            usage_mode: mode,
            usage_threshold: self.usage_threshold(),
            current_fixed_key,
            current_vertex_fixed_key,
            current_key_usage,
            current_vertex_key_usage,
            total_usage_counts: self.api_pool.usage_snapshot(),
            total_vertex_usage_counts: self.vertex_pool.usage_snapshot(),
        }
    }

    /// First valid primary key in pool order (first key as fallback)
    pub fn first_valid_key(&self) -> Option<String> {
        self.api_pool.first_valid_key()
    }

    /// Random valid primary key (first key as fallback)
    pub fn random_valid_key(&self) -> Option<String> {
        self.api_pool.random_valid_key()
    }

    pub fn fail_count(&self, key: &str) -> u32 {
        self.api_pool.fail_count(key)
    }

    pub fn vertex_fail_count(&self, key: &str) -> u32 {
        self.vertex_pool.fail_count(key)
    }

    pub fn usage_count(&self, key: &str) -> u64 {
        self.api_pool.usage_count(key)
    }

    pub fn vertex_usage_count(&self, key: &str) -> u64 {
        self.vertex_pool.usage_count(key)
    }

    // ------------------------------------------------------------------
    // Resets
    // ------------------------------------------------------------------

    /// Zero usage counts in both pools; failure counts and selection
    /// positions are untouched
    pub fn reset_usage_counts(&self) {
        self.api_pool.reset_usage_counts();
        self.vertex_pool.reset_usage_counts();
        tracing::info!("All key usage counts have been reset");
    }

    /// Zero every primary key's failure count
    pub fn reset_failure_counts(&self) {
        self.api_pool.reset_failure_counts();
    }

    /// Zero every vertex key's failure count
    pub fn reset_vertex_failure_counts(&self) {
        self.vertex_pool.reset_failure_counts();
    }

    /// Zero one primary key's failure count; `false` for unknown keys
    pub fn reset_key_failure_count(&self, key: &str) -> bool {
        self.api_pool.reset_key_failure_count(key)
    }

    /// Zero one vertex key's failure count; `false` for unknown keys
    pub fn reset_vertex_key_failure_count(&self, key: &str) -> bool {
        self.vertex_pool.reset_key_failure_count(key)
    }

    // ------------------------------------------------------------------
    // Snapshot / restore
    // ------------------------------------------------------------------

    /// Capture both pools' state, without side effects, for the next epoch
    pub fn snapshot(&self) -> PreservedState {
        PreservedState {
            api: self.api_pool.snapshot(),
            vertex: self.vertex_pool.snapshot(),
        }
    }

    /// Carry forward a previous epoch's state into this manager's pools
    pub fn restore(&self, state: &PreservedState) {
        self.api_pool.restore(&state.api);
        self.vertex_pool.restore(&state.vertex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn settings(max_failures: u32, max_retries: u32) -> Settings {
        Settings {
            max_failures,
            max_retries,
            ..Default::default()
        }
    }

    fn manager(keys: &[&str], max_failures: u32) -> KeyManager {
        KeyManager::new(
            keys.iter().map(|k| k.to_string()).collect(),
            vec![],
            &settings(max_failures, 3),
        )
    }

    #[test]
    fn test_polling_then_fixed_scenario() {
        let manager = manager(&["K1", "K2", "K3"], 3);

        let picks: Vec<String> = (0..5).map(|_| manager.next_key().unwrap()).collect();
        assert_eq!(picks, ["K1", "K2", "K3", "K1", "K2"]);

        manager.set_mode(SelectionMode::Fixed);
        manager.set_usage_threshold(2).unwrap();
        manager.reset_usage_counts();

        let picks: Vec<String> = (0..8).map(|_| manager.next_key().unwrap()).collect();
        assert_eq!(picks, ["K1", "K1", "K2", "K2", "K3", "K3", "K1", "K1"]);
    }

    #[test]
    fn test_next_working_key_skips_failed_key_until_reset() {
        let manager = manager(&["K1", "K2", "K3"], 3);

        for _ in 0..3 {
            manager.report_failure("K1", 0);
        }
        assert!(!manager.is_valid("K1"));

        for _ in 0..6 {
            let key = manager.next_working_key().unwrap();
            assert_ne!(key, "K1");
        }

        assert!(manager.reset_key_failure_count("K1"));
        assert!(manager.is_valid("K1"));
        let picks: Vec<String> = (0..3).map(|_| manager.next_working_key().unwrap()).collect();
        assert!(picks.contains(&"K1".to_string()));
    }

    #[test]
    fn test_next_working_key_returns_exhausted_key_as_fallback() {
        let manager = manager(&["K1", "K2"], 1);
        manager.report_failure("K1", 9);
        manager.report_failure("K2", 9);

        // no valid key left: the call still hands one back
        let key = manager.next_working_key().unwrap();
        assert!(["K1", "K2"].contains(&key.as_str()));
        assert!(!manager.is_valid(&key));
    }

    #[test]
    fn test_report_failure_returns_next_key_below_retry_ceiling() {
        let manager = manager(&["K1", "K2"], 3);
        let next = manager.report_failure("K1", 0).unwrap();
        assert!(["K1", "K2"].contains(&next.as_str()));
        assert_eq!(manager.fail_count("K1"), 1);
    }

    #[test]
    fn test_report_failure_signals_exhaustion_at_retry_ceiling() {
        let manager = manager(&["K1", "K2"], 3);
        assert_eq!(manager.report_failure("K1", 3), None);
        // the failure itself is still recorded
        assert_eq!(manager.fail_count("K1"), 1);
    }

    #[test]
    fn test_report_failure_on_empty_pool_returns_none() {
        let manager = manager(&[], 3);
        assert_eq!(manager.report_failure("K1", 0), None);
    }

    #[test]
    fn test_vertex_pool_is_independent() {
        let settings = settings(2, 3);
        let manager = KeyManager::new(
            vec!["P1".into()],
            vec!["V1".into(), "V2".into()],
            &settings,
        );

        assert_eq!(manager.next_vertex_key().unwrap(), "V1");
        assert_eq!(manager.next_vertex_key().unwrap(), "V2");

        manager.report_vertex_failure("V1", 9);
        manager.report_vertex_failure("V1", 9);
        assert!(!manager.is_vertex_key_valid("V1"));
        // primary pool history is untouched
        assert!(manager.is_valid("P1"));
        assert_eq!(manager.fail_count("V1"), 0);
        assert_eq!(manager.vertex_fail_count("V1"), 2);
    }

    #[test]
    fn test_set_usage_threshold_rejects_zero() {
        let manager = manager(&["K1"], 3);
        assert_eq!(
            manager.set_usage_threshold(0),
            Err(KeyPoolError::InvalidThreshold(0))
        );
        // state unchanged
        assert_eq!(manager.usage_threshold(), 100);
        manager.set_usage_threshold(5).unwrap();
        assert_eq!(manager.usage_threshold(), 5);
    }

    #[test]
    fn test_usage_mode_status_projection() {
        let manager = manager(&["K1", "K2"], 3);
        manager.next_key().unwrap();

        let status = manager.usage_mode_status();
        assert_eq!(status.usage_mode, SelectionMode::Polling);
        assert_eq!(status.current_fixed_key, None);
        assert_eq!(status.total_usage_counts["K1"], 1);

        manager.set_mode(SelectionMode::Fixed);
        manager.next_key().unwrap();
        let status = manager.usage_mode_status();
        assert_eq!(status.current_fixed_key.as_deref(), Some("K1"));
        assert_eq!(status.current_key_usage, 2);

        // the projection itself must not move any counter
        let again = manager.usage_mode_status();
        assert_eq!(again.current_key_usage, 2);
    }

    #[test]
    fn test_reset_usage_counts_spans_both_pools() {
        let settings = settings(3, 3);
        let manager = KeyManager::new(vec!["P1".into()], vec!["V1".into()], &settings);
        manager.next_key().unwrap();
        manager.next_vertex_key().unwrap();
        manager.report_failure("P1", 9);

        manager.reset_usage_counts();
        assert_eq!(manager.usage_count("P1"), 0);
        assert_eq!(manager.vertex_usage_count("V1"), 0);
        assert_eq!(manager.fail_count("P1"), 1);
    }

    #[test]
    fn test_concurrent_polling_loses_no_usage() {
        let manager = Arc::new(manager(&["K1", "K2", "K3"], 3));
        let threads: u64 = 6;
        let calls_per_thread: u64 = 300;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..calls_per_thread {
                        manager.next_key().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total: u64 = ["K1", "K2", "K3"]
            .iter()
            .map(|k| manager.usage_count(k))
            .sum();
        assert_eq!(total, threads * calls_per_thread);
        // round-robin spreads the load exactly evenly over a full cycle count
        for key in ["K1", "K2", "K3"] {
            assert_eq!(manager.usage_count(key), threads * calls_per_thread / 3);
        }
    }

    #[test]
    fn test_concurrent_fixed_mode_loses_no_usage() {
        let manager = Arc::new(manager(&["K1", "K2", "K3"], 3));
        manager.set_mode(SelectionMode::Fixed);
        manager.set_usage_threshold(50).unwrap();

        let threads: u64 = 8;
        let calls_per_thread: u64 = 100;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..calls_per_thread {
                        manager.next_key().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total: u64 = ["K1", "K2", "K3"]
            .iter()
            .map(|k| manager.usage_count(k))
            .sum();
        assert_eq!(total, threads * calls_per_thread);
    }

    #[test]
    fn test_concurrent_failure_reports_lose_no_counts() {
        let manager = Arc::new(manager(&["K1", "K2"], 1_000_000));
        let threads: u32 = 8;
        let reports_per_thread: u32 = 200;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..reports_per_thread {
                        manager.report_failure("K1", 9);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.fail_count("K1"), threads * reports_per_thread);
        assert_eq!(manager.fail_count("K2"), 0);
    }
}
