//! In-Memory Lease Store
//!
//! A single-process lease store with real TTL expiry on the tokio clock.
//! Used for local runs without etcd and for tests (it follows paused time).
//! Leases can be revoked from the outside and the store can be made
//! unreachable to simulate a partition.

use crate::error::StoreError;
use crate::key::{AdvertisedValue, LeaseId, RegistryKey};
use crate::store::LeaseStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Lease {
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Debug)]
struct Inner {
    next_id: i64,
    leases: HashMap<LeaseId, Lease>,
    /// key -> (value, owning lease)
    entries: BTreeMap<String, (String, LeaseId)>,
    unreachable: bool,
}

impl Inner {
    /// Drop expired leases together with their keys
    fn purge_expired(&mut self, now: Instant) {
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.expires_at > now);
        if self.leases.len() != before {
            let leases = &self.leases;
            self.entries.retain(|_, (_, lease_id)| leases.contains_key(lease_id));
        }
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable {
            return Err(StoreError::Unavailable("store unreachable".to_string()));
        }
        Ok(())
    }
}

/// Cloneable handle to a shared in-memory store
#[derive(Debug, Clone)]
pub struct MemoryLeaseStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_first_lease_id(1)
    }

    /// Lease IDs are handed out sequentially starting at `first_id`
    pub fn with_first_lease_id(first_id: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: first_id.max(1),
                leases: HashMap::new(),
                entries: BTreeMap::new(),
                unreachable: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_live(&self) -> MutexGuard<'_, Inner> {
        let mut inner = self.lock();
        inner.purge_expired(Instant::now());
        inner
    }

    /// Reject every call with [`StoreError::Unavailable`] while set.
    /// Leases keep expiring in the meantime.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Revoke a lease behind the owner's back
    pub fn revoke_externally(&self, lease_id: LeaseId) -> bool {
        let mut inner = self.lock_live();
        let existed = inner.leases.remove(&lease_id).is_some();
        inner.entries.retain(|_, (_, owner)| *owner != lease_id);
        existed
    }

    /// Value stored under `key`, if its lease is still alive
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock_live().entries.get(key).map(|(value, _)| value.clone())
    }

    /// Live `(key, value)` pairs under `prefix`, ordered by key
    pub fn list_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.lock_live()
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, _))| (key.clone(), value.clone()))
            .collect()
    }

    /// Remaining time before `lease_id` expires
    pub fn time_to_live(&self, lease_id: LeaseId) -> Option<Duration> {
        let now = Instant::now();
        self.lock_live()
            .leases
            .get(&lease_id)
            .map(|lease| lease.expires_at.saturating_duration_since(now))
    }

    pub fn live_lease_count(&self) -> usize {
        self.lock_live().leases.len()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, StoreError> {
        let mut inner = self.lock_live();
        inner.check_reachable()?;

        let lease_id = LeaseId::new(inner.next_id);
        inner.next_id += 1;
        inner.leases.insert(
            lease_id,
            Lease {
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(lease_id)
    }

    async fn put(
        &self,
        key: &RegistryKey,
        value: &AdvertisedValue,
        lease_id: LeaseId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock_live();
        inner.check_reachable()?;

        if !inner.leases.contains_key(&lease_id) {
            return Err(StoreError::LeaseNotFound(lease_id));
        }
        inner.entries.insert(
            key.as_str().to_string(),
            (value.as_str().to_string(), lease_id),
        );
        Ok(())
    }

    async fn keep_alive_once(&self, lease_id: LeaseId) -> Result<(), StoreError> {
        let mut inner = self.lock_live();
        inner.check_reachable()?;

        let now = Instant::now();
        match inner.leases.get_mut(&lease_id) {
            Some(lease) => {
                lease.expires_at = now + lease.ttl;
                Ok(())
            }
            None => Err(StoreError::LeaseNotFound(lease_id)),
        }
    }

    async fn revoke(&self, lease_id: LeaseId) -> Result<(), StoreError> {
        self.lock().check_reachable()?;
        if self.revoke_externally(lease_id) {
            Ok(())
        } else {
            Err(StoreError::LeaseNotFound(lease_id))
        }
    }
}
