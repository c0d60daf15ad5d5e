//! Lease Store Interface
//!
//! The minimal set of coordination store primitives the lease manager needs:
//! grant a lease, write a key bound to it, renew it once, and revoke it.

use crate::error::StoreError;
use crate::key::{AdvertisedValue, LeaseId, RegistryKey};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Lease-backed key-value store.
///
/// Keys written with [`put`](LeaseStore::put) must disappear when their lease
/// expires. Implementations should report a missing lease as
/// [`StoreError::LeaseNotFound`] and connectivity problems as
/// [`StoreError::Unavailable`].
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Create a lease that expires after `ttl` unless renewed
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, StoreError>;

    /// Write `key -> value` bound to `lease_id`
    async fn put(
        &self,
        key: &RegistryKey,
        value: &AdvertisedValue,
        lease_id: LeaseId,
    ) -> Result<(), StoreError>;

    /// Send a single keep-alive for `lease_id`, resetting its expiry
    async fn keep_alive_once(&self, lease_id: LeaseId) -> Result<(), StoreError>;

    /// Revoke `lease_id`, deleting every key bound to it
    async fn revoke(&self, lease_id: LeaseId) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: LeaseStore + ?Sized> LeaseStore for Arc<T> {
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, StoreError> {
        (**self).grant(ttl).await
    }

    async fn put(
        &self,
        key: &RegistryKey,
        value: &AdvertisedValue,
        lease_id: LeaseId,
    ) -> Result<(), StoreError> {
        (**self).put(key, value, lease_id).await
    }

    async fn keep_alive_once(&self, lease_id: LeaseId) -> Result<(), StoreError> {
        (**self).keep_alive_once(lease_id).await
    }

    async fn revoke(&self, lease_id: LeaseId) -> Result<(), StoreError> {
        (**self).revoke(lease_id).await
    }
}
