//! Etcd Lease Store
//!
//! [`LeaseStore`] on top of `etcd_client`. Connection setup retries with
//! exponential backoff; store errors are classified so a lost lease can be
//! told apart from an unreachable cluster.

use crate::config::RegistrarConfig;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use etcd_client::{Client, ConnectOptions, Error, PutOptions};
use std::time::Duration;
use svcreg_core::{
    AdvertisedValue, LeaseId, LeaseStore, RegistrationError, RegistryKey, StoreError,
};
use tracing::{debug, trace, warn};

/// Substring etcd uses for missing leases ("etcdserver: requested lease not found")
const LEASE_NOT_FOUND: &str = "lease not found";

const GRPC_DEADLINE_EXCEEDED: i32 = 4;
const GRPC_UNAVAILABLE: i32 = 14;

/// Lease store backed by an etcd cluster.
///
/// Cloning is cheap and clones share the underlying channel.
#[derive(Clone)]
pub struct EtcdLeaseStore {
    client: Client,
}

impl EtcdLeaseStore {
    /// Connect to etcd with exponential backoff and verify the cluster answers.
    ///
    /// Giving up is fatal: without a reachable store the instance cannot announce itself.
    pub async fn connect(config: &RegistrarConfig) -> Result<Self, RegistrationError> {
        let backoff = ExponentialBackoff {
            initial_interval: config.etcd_backoff_initial,
            max_interval: config.etcd_backoff_max,
            max_elapsed_time: Some(config.etcd_backoff_max_elapsed),
            multiplier: config.etcd_backoff_multiplier,
            ..Default::default()
        };
        let endpoints = &config.etcd_endpoints;
        let dial_timeout = config.dial_timeout;

        let client = retry(backoff, || async move {
            match Self::try_connect(endpoints, dial_timeout).await {
                Ok(client) => Ok(client),
                Err(e) => {
                    warn!(error = %e, "etcd connection failed, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
        .map_err(|e| {
            RegistrationError::StoreUnavailable(format!(
                "failed to connect to etcd at {endpoints:?} after retries: {e}"
            ))
        })?;

        Ok(Self { client })
    }

    async fn try_connect(endpoints: &[String], dial_timeout: Duration) -> Result<Client, Error> {
        let options = ConnectOptions::new()
            .with_connect_timeout(dial_timeout)
            .with_timeout(dial_timeout);
        let mut client = Client::connect(endpoints, Some(options)).await?;

        // The channel connects lazily, so ask the cluster something
        let status = client.status().await?;
        debug!(version = %status.version(), "Connected to etcd");
        Ok(client)
    }

    /// Wrap an already connected client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map an etcd error onto the store error taxonomy
fn classify(err: Error, lease_id: LeaseId) -> StoreError {
    match &err {
        Error::LeaseKeepAliveError(msg) if msg.contains(LEASE_NOT_FOUND) => {
            StoreError::LeaseNotFound(lease_id)
        }
        Error::GRpcStatus(status) if status.message().contains(LEASE_NOT_FOUND) => {
            StoreError::LeaseNotFound(lease_id)
        }
        Error::GRpcStatus(status)
            if matches!(status.code() as i32, GRPC_DEADLINE_EXCEEDED | GRPC_UNAVAILABLE) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        Error::TransportError(_) | Error::IoError(_) => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Rejected(err.to_string()),
    }
}

/// etcd takes the TTL as signed seconds
fn grant_ttl_secs(ttl: Duration) -> Result<i64, StoreError> {
    i64::try_from(ttl.as_secs())
        .map_err(|_| StoreError::Rejected(format!("lease TTL {ttl:?} out of range")))
}

#[async_trait]
impl LeaseStore for EtcdLeaseStore {
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, StoreError> {
        let ttl_secs = grant_ttl_secs(ttl)?;
        let mut client = self.client.clone();
        let resp = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| classify(e, LeaseId::NONE))?;
        debug!(lease_id = resp.id(), ttl = resp.ttl(), "Lease granted");
        Ok(LeaseId::new(resp.id()))
    }

    async fn put(
        &self,
        key: &RegistryKey,
        value: &AdvertisedValue,
        lease_id: LeaseId,
    ) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let options = PutOptions::new().with_lease(lease_id.get());
        client
            .put(key.as_str(), value.as_str(), Some(options))
            .await
            .map_err(|e| classify(e, lease_id))?;
        Ok(())
    }

    async fn keep_alive_once(&self, lease_id: LeaseId) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        // Opening the stream sends one keep-alive and checks the returned TTL;
        // the keeper and stream are dropped right after.
        let (_keeper, _stream) = client
            .lease_keep_alive(lease_id.get())
            .await
            .map_err(|e| classify(e, lease_id))?;
        trace!(lease_id = lease_id.get(), "Keep-alive acknowledged");
        Ok(())
    }

    async fn revoke(&self, lease_id: LeaseId) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client
            .lease_revoke(lease_id.get())
            .await
            .map_err(|e| classify(e, lease_id))?;
        Ok(())
    }
}
