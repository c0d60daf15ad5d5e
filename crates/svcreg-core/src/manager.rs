//! Lease Lifecycle Manager
//!
//! Keeps one registry entry alive for a service instance:
//! 1. No lease held: grant a lease, write `namespace + lease_id -> value` bound to it
//! 2. Lease held: send one keep-alive per tick
//! 3. Keep-alive reports the lease gone: drop it and re-acquire without sleeping
//!
//! Grant and put failures are fatal and returned to the caller. Any other
//! keep-alive failure is retried on the next tick against the same lease.

use crate::error::{ConfigError, RegistrationError, StoreError};
use crate::events;
use crate::key::{AdvertisedValue, LeaseId, RegistryKey, ServiceNamespace};
use crate::store::LeaseStore;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, trace, warn};

/// Default lease TTL
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

/// Longest TTL etcd will grant
pub const MAX_LEASE_TTL: Duration = Duration::from_secs(9_000_000_000);

/// Default delay between keep-alives
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(1);

/// Lease timing, validated so renewals always land before expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    lease_ttl: Duration,
    renew_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            lease_ttl: DEFAULT_LEASE_TTL,
            renew_interval: DEFAULT_RENEW_INTERVAL,
        }
    }
}

impl ManagerConfig {
    /// `lease_ttl` must be whole seconds (the store grants in seconds), at most
    /// [`MAX_LEASE_TTL`] and strictly longer than `renew_interval`.
    pub fn new(lease_ttl: Duration, renew_interval: Duration) -> Result<Self, ConfigError> {
        if lease_ttl < Duration::from_secs(1)
            || lease_ttl > MAX_LEASE_TTL
            || lease_ttl.subsec_nanos() != 0
        {
            return Err(ConfigError::InvalidTtl(lease_ttl));
        }
        if renew_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if renew_interval >= lease_ttl {
            return Err(ConfigError::IntervalNotBelowTtl {
                interval: renew_interval,
                ttl: lease_ttl,
            });
        }
        Ok(Self {
            lease_ttl,
            renew_interval,
        })
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    pub fn renew_interval(&self) -> Duration {
        self.renew_interval
    }
}

/// Where the manager is in the lease lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started yet, or about to grant the first lease
    Starting,
    /// Key written and being renewed
    Registered,
    /// Previous lease lost, granting a replacement
    Reacquiring,
    /// Shut down on request
    Stopped,
    /// Stopped by a fatal error
    Failed,
}

/// Snapshot published on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationStatus {
    pub phase: Phase,
    /// Held lease, [`LeaseId::NONE`] when none
    pub lease_id: LeaseId,
    /// Key of the current lease generation
    pub key: Option<RegistryKey>,
    /// Number of leases granted so far
    pub generation: u64,
    /// Successful keep-alives for the current lease
    pub renewals: u64,
    /// Keep-alive failures in a row for the current lease
    pub consecutive_failures: u32,
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Starting,
            lease_id: LeaseId::NONE,
            key: None,
            generation: 0,
            renewals: 0,
            consecutive_failures: 0,
        }
    }
}

impl RegistrationStatus {
    pub fn is_registered(&self) -> bool {
        self.phase == Phase::Registered
    }
}

/// What the loop does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Sleep,
    Reacquire,
}

/// Owns the lease for one `(namespace, value)` registration.
///
/// Lease state lives only in this struct; other tasks observe it through
/// [`LeaseManager::subscribe`].
pub struct LeaseManager<S> {
    store: S,
    config: ManagerConfig,
    lease_id: LeaseId,
    status_tx: watch::Sender<RegistrationStatus>,
}

impl<S: LeaseStore> LeaseManager<S> {
    pub fn new(store: S, config: ManagerConfig) -> Self {
        let (status_tx, _) = watch::channel(RegistrationStatus::default());
        Self {
            store,
            config,
            lease_id: LeaseId::NONE,
            status_tx,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current status snapshot
    pub fn status(&self) -> RegistrationStatus {
        self.status_tx.borrow().clone()
    }

    /// Receiver that sees every status change, including the final one
    pub fn subscribe(&self) -> watch::Receiver<RegistrationStatus> {
        self.status_tx.subscribe()
    }

    /// Register and renew forever. Only returns on a fatal error.
    pub async fn run(
        self,
        namespace: ServiceNamespace,
        value: AdvertisedValue,
    ) -> Result<(), RegistrationError> {
        let (_shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        self.run_until(namespace, value, shutdown_rx).await
    }

    /// Register and renew until a shutdown signal arrives or a fatal error occurs.
    ///
    /// The signal (or all senders being dropped) is observed between store
    /// calls. On shutdown the held lease is revoked, best effort, so the key
    /// disappears without waiting for the TTL.
    #[instrument(skip_all, fields(namespace = %namespace))]
    pub async fn run_until(
        mut self,
        namespace: ServiceNamespace,
        value: AdvertisedValue,
        mut shutdown_rx: mpsc::UnboundedReceiver<()>,
    ) -> Result<(), RegistrationError> {
        let interval_ms = u64::try_from(self.config.renew_interval.as_millis()).unwrap_or(u64::MAX);
        info!(
            value = %value,
            ttl_secs = self.config.lease_ttl.as_secs(),
            interval_ms,
            "Starting service registration"
        );

        loop {
            match self.step(&namespace, &value).await {
                Ok(Next::Reacquire) => continue,
                Ok(Next::Sleep) => {}
                Err(e) => {
                    events::registration_failed(namespace.as_str(), &e.to_string());
                    self.status_tx.send_modify(|status| status.phase = Phase::Failed);
                    return Err(e);
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.shutdown(&namespace).await;
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.renew_interval) => {}
            }
        }
    }

    async fn step(
        &mut self,
        namespace: &ServiceNamespace,
        value: &AdvertisedValue,
    ) -> Result<Next, RegistrationError> {
        if self.lease_id.is_none() {
            self.acquire(namespace, value).await?;
            return Ok(Next::Sleep);
        }

        match self.store.keep_alive_once(self.lease_id).await {
            Ok(()) => {
                trace!(lease_id = self.lease_id.get(), "Keep-alive OK");
                self.status_tx.send_modify(|status| {
                    status.renewals += 1;
                    status.consecutive_failures = 0;
                });
                Ok(Next::Sleep)
            }
            Err(e) if e.is_lease_not_found() => {
                let status = self.status();
                let key = status.key.as_ref().map(RegistryKey::as_str).unwrap_or_default();
                events::lease_lost(key, self.lease_id.get(), status.renewals);

                self.lease_id = LeaseId::NONE;
                self.status_tx.send_modify(|status| {
                    status.phase = Phase::Reacquiring;
                    status.lease_id = LeaseId::NONE;
                });
                Ok(Next::Reacquire)
            }
            Err(e) => {
                let mut failures = 0;
                self.status_tx.send_modify(|status| {
                    status.consecutive_failures += 1;
                    failures = status.consecutive_failures;
                });
                events::renewal_failed(self.lease_id.get(), &e.to_string(), failures);
                Ok(Next::Sleep)
            }
        }
    }

    /// Grant a lease and bind a fresh key to it
    async fn acquire(
        &mut self,
        namespace: &ServiceNamespace,
        value: &AdvertisedValue,
    ) -> Result<(), RegistrationError> {
        let lease_id = self
            .store
            .grant(self.config.lease_ttl)
            .await
            .map_err(RegistrationError::LeaseGrantFailed)?;
        if lease_id.get() <= 0 {
            // Zero would read as "no lease held" and re-grant every tick
            return Err(RegistrationError::LeaseGrantFailed(StoreError::Rejected(
                format!("store granted invalid lease id {lease_id}"),
            )));
        }
        events::lease_granted(
            namespace.as_str(),
            lease_id.get(),
            self.config.lease_ttl.as_secs(),
        );

        let key = namespace.key_for(lease_id);
        if let Err(source) = self.store.put(&key, value, lease_id).await {
            // The orphaned lease expires on its own
            return Err(RegistrationError::WriteFailed {
                key,
                lease_id,
                source,
            });
        }
        debug!(key = %key, lease_id = lease_id.get(), "Registry key written");

        self.lease_id = lease_id;
        let mut generation = 0;
        self.status_tx.send_modify(|status| {
            status.phase = Phase::Registered;
            status.lease_id = lease_id;
            status.key = Some(key.clone());
            status.generation += 1;
            status.renewals = 0;
            status.consecutive_failures = 0;
            generation = status.generation;
        });
        events::instance_registered(key.as_str(), value.as_str(), lease_id.get(), generation);
        Ok(())
    }

    /// Revoke the held lease so the key disappears immediately
    async fn shutdown(&mut self, namespace: &ServiceNamespace) {
        let lease_id = self.lease_id;
        let mut revoked = false;

        if !lease_id.is_none() {
            debug!(lease_id = lease_id.get(), "Revoking lease");
            match self.store.revoke(lease_id).await {
                Ok(()) => revoked = true,
                Err(e) => {
                    warn!(lease_id = lease_id.get(), error = %e, "Failed to revoke lease");
                }
            }
        }

        self.lease_id = LeaseId::NONE;
        self.status_tx.send_modify(|status| {
            status.phase = Phase::Stopped;
            status.lease_id = LeaseId::NONE;
        });
        events::registration_stopped(namespace.as_str(), lease_id.get(), revoked);
    }
}
