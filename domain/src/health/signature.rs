//! Health signatures - point-in-time probe snapshots with bounded history.

use crate::core::error::ErrorKind;
use crate::core::identity::VoiceIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default number of signatures retained per identity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Point-in-time health snapshot for one voice identity.
///
/// Produced on every monitor tick and appended to a bounded
/// per-identity [`SignatureHistory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSignature {
    pub identity: VoiceIdentity,
    pub connected: bool,
    pub latency_ms: u64,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_histogram: BTreeMap<ErrorKind, u32>,
    /// Response-quality coherence signal in [0, 1]
    pub coherence: f64,
    /// Derived failure-probability estimate in [0, 1]
    pub failure_probability: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Fixed-capacity ring buffer of [`HealthSignature`] entries.
///
/// Oldest entries are evicted once capacity is reached, bounding
/// memory under long-running sessions.
#[derive(Debug, Clone)]
pub struct SignatureHistory {
    entries: VecDeque<HealthSignature>,
    capacity: usize,
}

impl SignatureHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, signature: HealthSignature) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(signature);
    }

    pub fn latest(&self) -> Option<&HealthSignature> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &HealthSignature> {
        self.entries.iter()
    }
}

impl Default for SignatureHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
