//! Verdict cache with passive TTL expiry
//!
//! The cache is an optimization, never a correctness dependency: every
//! operation is fallible and the aggregator computes fresh when it fails.
//! Expiry is passive; an expired entry behaves as a miss at read time and is
//! dropped on the next overwrite or capacity eviction, with no background
//! sweep.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};

use crate::models::{Fingerprint, RiskVerdict};

/// A cached verdict and its expiry deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub verdict: RiskVerdict,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Storage for computed verdicts keyed by request fingerprint.
pub trait VerdictCache: Send + Sync {
    /// Returns the cached verdict if present and not expired.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<RiskVerdict>>;

    /// Stores a verdict, overwriting any previous entry for the fingerprint.
    fn put(&self, fingerprint: Fingerprint, verdict: RiskVerdict, ttl: Duration) -> Result<()>;
}

/// In-process verdict cache with bounded capacity.
pub struct MemoryCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VerdictCache for MemoryCache {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<RiskVerdict>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("cache lock poisoned"))?;

        match entries.get(fingerprint) {
            // Expired entries stay until the next put; removing here would
            // need a write lock on the read path.
            Some(entry) if entry.is_expired() => Ok(None),
            Some(entry) => Ok(Some(entry.verdict.clone())),
            None => Ok(None),
        }
    }

    fn put(&self, fingerprint: Fingerprint, verdict: RiskVerdict, ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("cache lock poisoned"))?;

        if entries.len() >= self.max_entries && !entries.contains_key(&fingerprint) {
            entries.retain(|_, entry| !entry.is_expired());

            // Eviction order is soonest-to-expire, not insertion order.
            if entries.len() >= self.max_entries {
                if let Some(soonest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone())
                {
                    entries.remove(&soonest);
                }
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                verdict,
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }
}
