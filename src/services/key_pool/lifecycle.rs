//! Manager lifecycle and state preservation
//!
//! A [`KeyManagerHolder`] owns at most one live [`KeyManager`]. Releasing
//! the manager snapshots its counters and selection positions into a
//! [`PreservedState`]; the next acquire with a fresh key list carries the
//! history forward for every key that survived the reconfiguration, so a
//! pool change does not silently discard useful failure and usage history.
//!
//! The holder is an explicitly owned value: construct one next to your
//! application state and share it behind an `Arc`. The snapshot is plain
//! data and can be inspected or transported on its own.
//!
//! Snapshotting is side-effect-free: the round-robin "next key" hint is
//! read by peeking the cursor rather than by selecting a key, so a
//! release/acquire round trip with an unchanged key list reproduces the
//! exact pre-release state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::manager::KeyManager;
use crate::config::Settings;
use crate::error::KeyPoolError;

/// Point-in-time state of one pool, captured between manager epochs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// The old epoch's key list, in pool order
    pub keys: Vec<String>,
    pub failure_counts: HashMap<String, u32>,
    pub usage_counts: HashMap<String, u64>,
    pub sticky_index: usize,
    /// The key the round-robin cycle would have handed out next
    pub next_key_hint: Option<String>,
}

/// Snapshot of both pools, held between release and the next acquire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedState {
    pub api: PoolSnapshot,
    pub vertex: PoolSnapshot,
}

#[derive(Debug, Default)]
struct HolderInner {
    live: Option<Arc<KeyManager>>,
    preserved: Option<PreservedState>,
}

/// Owner of the live [`KeyManager`] and of state preserved across epochs
///
/// One mutex serializes `acquire` and `release`, spanning construction plus
/// rehydration on one side and snapshot plus teardown on the other, so no
/// caller ever observes a half-built or half-torn-down manager.
#[derive(Debug)]
pub struct KeyManagerHolder {
    settings: Settings,
    inner: Mutex<HolderInner>,
}

impl KeyManagerHolder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            inner: Mutex::new(HolderInner::default()),
        }
    }

    /// Get the live manager, constructing one if none exists
    ///
    /// While a manager is live the key list arguments are ignored and the
    /// existing instance is returned (first-writer-wins). When a manager
    /// must be built, both lists are required: `None` is a configuration
    /// error, while `Some(vec![])` is allowed and merely warned about by
    /// the pool. Any state preserved by a prior [`release`](Self::release)
    /// is applied to the new manager and then cleared, whether or not any
    /// key matched.
    pub fn acquire(
        &self,
        api_keys: Option<Vec<String>>,
        vertex_api_keys: Option<Vec<String>>,
    ) -> Result<Arc<KeyManager>, KeyPoolError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(live) = &inner.live {
            return Ok(Arc::clone(live));
        }

        let api_keys = api_keys.ok_or(KeyPoolError::MissingKeyList("api"))?;
        let vertex_api_keys = vertex_api_keys.ok_or(KeyPoolError::MissingKeyList("vertex"))?;

        let manager = Arc::new(KeyManager::new(api_keys, vertex_api_keys, &self.settings));
        if let Some(preserved) = inner.preserved.take() {
            manager.restore(&preserved);
        }
        inner.live = Some(Arc::clone(&manager));
        Ok(manager)
    }

    /// Tear down the live manager, preserving its state for the next acquire
    ///
    /// A no-op if no manager is live; an earlier snapshot, if any, is kept.
    pub fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.live.take() {
            Some(manager) => {
                inner.preserved = Some(manager.snapshot());
                tracing::info!("Key manager released, state preserved for the next acquire");
            }
            None => {
                tracing::info!("Key manager already released, no action taken");
            }
        }
    }

    /// Whether a manager is currently live
    pub fn is_live(&self) -> bool {
        self.inner.lock().unwrap().live.is_some()
    }

    /// State preserved by the last release and not yet consumed, if any
    pub fn preserved_state(&self) -> Option<PreservedState> {
        self.inner.lock().unwrap().preserved.clone()
    }
}
