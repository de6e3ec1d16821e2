//! Per-pool selection state
//!
//! A [`KeyPool`] owns one ordered key list together with its failure and
//! usage counters, the round-robin cursor, and the fixed-mode sticky index.
//! The manager holds two of these (primary and vertex) and applies one
//! shared policy across both.
//!
//! Each piece of state sits behind its own guard so a failure report never
//! blocks round-robin selection. The one jointly-consistent region is the
//! fixed-mode path: the sticky-index lock is taken first, then the usage
//! lock, so the threshold check, the advancement, and the usage increment
//! appear atomic to concurrent callers. No other path acquires both locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::seq::SliceRandom;

use super::lifecycle::PoolSnapshot;
use super::status::{KeyStatus, KeysByStatus, KeysWithFailCounts};
use crate::error::KeyPoolError;
use crate::utils::redact_key;

/// One pool of upstream API keys with its bookkeeping
#[derive(Debug)]
pub struct KeyPool {
    /// Label used in logs and error values ("api" or "vertex")
    label: &'static str,
    /// Ordered key list, fixed for the pool's lifetime
    keys: Vec<String>,
    /// Round-robin cursor: index (mod pool size) of the next key to hand out
    cursor: AtomicUsize,
    /// Fixed-mode sticky index; its lock also covers threshold advancement
    sticky_index: Mutex<usize>,
    failure_counts: Mutex<HashMap<String, u32>>,
    usage_counts: Mutex<HashMap<String, u64>>,
    /// Failures at which a key becomes invalid; constant for the pool's lifetime
    max_failures: u32,
}

impl KeyPool {
    pub fn new(label: &'static str, keys: Vec<String>, max_failures: u32) -> Self {
        if keys.is_empty() {
            tracing::warn!(pool = label, "Initializing key pool with an empty key list");
        }
        let failure_counts = keys.iter().map(|k| (k.clone(), 0u32)).collect();
        let usage_counts = keys.iter().map(|k| (k.clone(), 0u64)).collect();
        Self {
            label,
            keys,
            cursor: AtomicUsize::new(0),
            sticky_index: Mutex::new(0),
            failure_counts: Mutex::new(failure_counts),
            usage_counts: Mutex::new(usage_counts),
            max_failures,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Hand out the next key in round-robin order
    pub fn next_polling(&self) -> Result<String, KeyPoolError> {
        if self.keys.is_empty() {
            return Err(KeyPoolError::EmptyPool(self.label));
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.keys.len();
        let key = self.keys[idx].clone();
        self.bump_usage(&key);
        Ok(key)
    }

    /// Hand out the sticky key, advancing it once its usage reaches `threshold`
    pub fn next_fixed(&self, threshold: u64) -> Result<String, KeyPoolError> {
        if self.keys.is_empty() {
            return Err(KeyPoolError::EmptyPool(self.label));
        }
        // Lock order: sticky index, then usage counts.
        let mut sticky = self.sticky_index.lock().unwrap();
        let mut usage = self.usage_counts.lock().unwrap();

        let mut key = &self.keys[*sticky];
        let count = usage.get(key).copied().unwrap_or(0);
        if count >= threshold {
            *sticky = (*sticky + 1) % self.keys.len();
            key = &self.keys[*sticky];
            tracing::info!(
                pool = self.label,
                index = *sticky,
                key = %redact_key(key),
                "Usage threshold reached, switched to next fixed key"
            );
        }
        *usage.entry(key.clone()).or_insert(0) += 1;
        Ok(key.clone())
    }

    /// Key currently pinned by fixed mode, if the pool is non-empty
    pub fn current_fixed_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let sticky = self.sticky_index.lock().unwrap();
        Some(self.keys[*sticky].clone())
    }

    // ------------------------------------------------------------------
    // Failure bookkeeping
    // ------------------------------------------------------------------

    /// Whether the key's failure count is below the max-failures threshold
    ///
    /// Keys outside the pool have no failure history and report as valid;
    /// callers interested in membership should check the pool's key list.
    pub fn is_valid(&self, key: &str) -> bool {
        let counts = self.failure_counts.lock().unwrap();
        counts.get(key).copied().unwrap_or(0) < self.max_failures
    }

    /// Record one failure for `key`
    ///
    /// Emits a warning exactly once, when the count reaches the max-failures
    /// threshold. A report for a key not in the pool is logged and dropped.
    pub fn record_failure(&self, key: &str) {
        let mut counts = self.failure_counts.lock().unwrap();
        match counts.get_mut(key) {
            Some(count) => {
                *count += 1;
                if *count == self.max_failures {
                    tracing::warn!(
                        pool = self.label,
                        key = %redact_key(key),
                        failures = *count,
                        "Key reached the failure limit and is now considered invalid"
                    );
                }
            }
            None => {
                tracing::warn!(
                    pool = self.label,
                    key = %redact_key(key),
                    "Failure reported for a key not in the pool"
                );
            }
        }
    }

    pub fn fail_count(&self, key: &str) -> u32 {
        self.failure_counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn usage_count(&self, key: &str) -> u64 {
        self.usage_counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Resets
    // ------------------------------------------------------------------

    /// Zero every failure count in the pool
    pub fn reset_failure_counts(&self) {
        let mut counts = self.failure_counts.lock().unwrap();
        for count in counts.values_mut() {
            *count = 0;
        }
        tracing::info!(pool = self.label, "All key failure counts have been reset");
    }

    /// Zero one key's failure count; `false` if the key is not in the pool
    pub fn reset_key_failure_count(&self, key: &str) -> bool {
        let mut counts = self.failure_counts.lock().unwrap();
        match counts.get_mut(key) {
            Some(count) => {
                *count = 0;
                tracing::info!(
                    pool = self.label,
                    key = %redact_key(key),
                    "Reset failure count for key"
                );
                true
            }
            None => {
                tracing::warn!(
                    pool = self.label,
                    key = %redact_key(key),
                    "Attempt to reset failure count for a key not in the pool"
                );
                false
            }
        }
    }

    /// Zero every usage count; failure counts and selection positions stay put
    pub fn reset_usage_counts(&self) {
        let mut counts = self.usage_counts.lock().unwrap();
        for count in counts.values_mut() {
            *count = 0;
        }
    }

    // ------------------------------------------------------------------
    // Aggregate queries
    // ------------------------------------------------------------------

    /// Partition the pool's keys into valid and invalid with both counters
    pub fn keys_by_status(&self) -> KeysByStatus {
        // Lock order: failure counts, then usage counts.
        let failures = self.failure_counts.lock().unwrap();
        let usages = self.usage_counts.lock().unwrap();

        let mut valid_keys = HashMap::new();
        let mut invalid_keys = HashMap::new();
        for key in &self.keys {
            let status = KeyStatus {
                fail_count: failures.get(key).copied().unwrap_or(0),
                usage_count: usages.get(key).copied().unwrap_or(0),
            };
            if status.fail_count < self.max_failures {
                valid_keys.insert(key.clone(), status);
            } else {
                invalid_keys.insert(key.clone(), status);
            }
        }
        KeysByStatus {
            valid_keys,
            invalid_keys,
        }
    }

    /// Partition with fail counts only, plus the combined map
    pub fn all_keys_with_fail_count(&self) -> KeysWithFailCounts {
        let failures = self.failure_counts.lock().unwrap();
        let all_keys: HashMap<String, u32> = self
            .keys
            .iter()
            .map(|k| (k.clone(), failures.get(k).copied().unwrap_or(0)))
            .collect();
        let valid_keys = all_keys
            .iter()
            .filter(|(_, &c)| c < self.max_failures)
            .map(|(k, &c)| (k.clone(), c))
            .collect();
        let invalid_keys = all_keys
            .iter()
            .filter(|(_, &c)| c >= self.max_failures)
            .map(|(k, &c)| (k.clone(), c))
            .collect();
        KeysWithFailCounts {
            valid_keys,
            invalid_keys,
            all_keys,
        }
    }

    /// Copy of the usage counter map
    pub fn usage_snapshot(&self) -> HashMap<String, u64> {
        self.usage_counts.lock().unwrap().clone()
    }

    /// First key in pool order that is still valid, falling back to the
    /// first key of the pool when none is
    pub fn first_valid_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            tracing::warn!(pool = self.label, "Key pool is empty, cannot get first valid key");
            return None;
        }
        let counts = self.failure_counts.lock().unwrap();
        self.keys
            .iter()
            .find(|k| counts.get(*k).copied().unwrap_or(0) < self.max_failures)
            .or_else(|| {
                tracing::warn!(
                    pool = self.label,
                    "No valid keys available, returning first key as fallback"
                );
                self.keys.first()
            })
            .cloned()
    }

    /// Uniformly random valid key, with the same fallback as `first_valid_key`
    pub fn random_valid_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            tracing::warn!(pool = self.label, "Key pool is empty, cannot get random valid key");
            return None;
        }
        let valid: Vec<&String> = {
            let counts = self.failure_counts.lock().unwrap();
            self.keys
                .iter()
                .filter(|k| counts.get(*k).copied().unwrap_or(0) < self.max_failures)
                .collect()
        };
        match valid.choose(&mut rand::thread_rng()) {
            Some(key) => Some((*key).clone()),
            None => {
                tracing::warn!(
                    pool = self.label,
                    "No valid keys available, returning first key as fallback"
                );
                self.keys.first().cloned()
            }
        }
    }

    // ------------------------------------------------------------------
    // Snapshot / restore
    // ------------------------------------------------------------------

    /// Capture the pool's full state without perturbing it
    ///
    /// The next-key hint is read by peeking the cursor, not by selecting,
    /// so taking a snapshot consumes no usage increments.
    pub fn snapshot(&self) -> PoolSnapshot {
        let next_key_hint = if self.keys.is_empty() {
            None
        } else {
            let idx = self.cursor.load(Ordering::SeqCst) % self.keys.len();
            Some(self.keys[idx].clone())
        };
        // One guard at a time; the fixed-mode path holds sticky + usage.
        let sticky_index = *self.sticky_index.lock().unwrap();
        let failure_counts = self.failure_counts.lock().unwrap().clone();
        let usage_counts = self.usage_counts.lock().unwrap().clone();
        PoolSnapshot {
            keys: self.keys.clone(),
            failure_counts,
            usage_counts,
            sticky_index,
            next_key_hint,
        }
    }

    /// Carry forward state from a previous epoch's snapshot
    ///
    /// Counters are matched by key string; keys new to this pool keep their
    /// zero counters and keys that disappeared are dropped with the
    /// snapshot. The sticky index is clamped to the new bounds. The
    /// round-robin cycle resumes at the first key, scanning the old order
    /// from the old "next" hint, that still exists in this pool; otherwise
    /// it starts at the beginning.
    pub fn restore(&self, snap: &PoolSnapshot) {
        if self.keys.is_empty() {
            return;
        }

        {
            let mut counts = self.failure_counts.lock().unwrap();
            for (key, count) in &snap.failure_counts {
                if let Some(slot) = counts.get_mut(key) {
                    *slot = *count;
                }
            }
        }
        {
            let mut counts = self.usage_counts.lock().unwrap();
            for (key, count) in &snap.usage_counts {
                if let Some(slot) = counts.get_mut(key) {
                    *slot = *count;
                }
            }
        }
        {
            let mut sticky = self.sticky_index.lock().unwrap();
            *sticky = snap.sticky_index.min(self.keys.len() - 1);
        }
        tracing::info!(pool = self.label, "Inherited counters for keys carried over from the previous epoch");

        let Some(hint) = snap.next_key_hint.as_deref() else {
            return;
        };
        match snap.keys.iter().position(|k| k == hint) {
            Some(start) => {
                let resume = (0..snap.keys.len())
                    .map(|i| &snap.keys[(start + i) % snap.keys.len()])
                    .find_map(|old| self.keys.iter().position(|k| k == old));
                match resume {
                    Some(idx) => {
                        self.cursor.store(idx, Ordering::SeqCst);
                        tracing::info!(
                            pool = self.label,
                            key = %redact_key(&self.keys[idx]),
                            "Round-robin cycle resumed from preserved state"
                        );
                    }
                    None => {
                        tracing::info!(
                            pool = self.label,
                            "No preserved key survived the reconfiguration, cycle starts at the beginning"
                        );
                    }
                }
            }
            None => {
                tracing::warn!(
                    pool = self.label,
                    "Preserved next-key hint not found in the old key list, cycle starts at the beginning"
                );
            }
        }
    }

    // ------------------------------------------------------------------

    fn bump_usage(&self, key: &str) {
        let mut counts = self.usage_counts.lock().unwrap();
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
}
