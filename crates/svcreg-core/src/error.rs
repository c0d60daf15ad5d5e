//! Error types
//!
//! Store failures are classified so the lease manager can tell a lost lease
//! (recoverable, re-acquire) from everything else. Errors that stop the manager
//! are collected in [`RegistrationError`] and handed back to the host process.

use crate::key::{LeaseId, RegistryKey};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`LeaseStore`](crate::store::LeaseStore)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store answered and does not know the lease (expired or revoked)
    #[error("lease {0} not found")]
    LeaseNotFound(LeaseId),
    /// The store could not be reached (connection refused, timeout, ...)
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
    /// The store answered with any other error
    #[error("coordination store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_lease_not_found(&self) -> bool {
        matches!(self, StoreError::LeaseNotFound(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Fatal registration errors. Once one of these is returned the manager has stopped.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to grant lease: {0}")]
    LeaseGrantFailed(#[source] StoreError),

    #[error("failed to write registry key {key} bound to lease {lease_id}: {source}")]
    WriteFailed {
        key: RegistryKey,
        lease_id: LeaseId,
        #[source]
        source: StoreError,
    },

    #[error("registration task aborted: {0}")]
    Aborted(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Rejected manager or namespace configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("service namespace must contain at least one non-separator character")]
    EmptyNamespace,

    #[error("lease TTL must be a whole number of seconds between 1s and 9000000000s (got {0:?})")]
    InvalidTtl(Duration),

    #[error("renewal interval must be non-zero")]
    ZeroInterval,

    #[error("renewal interval {interval:?} must be shorter than lease TTL {ttl:?}")]
    IntervalNotBelowTtl { interval: Duration, ttl: Duration },
}
