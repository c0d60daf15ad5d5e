//! Structured Events
//!
//! One function per registration lifecycle event so field names stay consistent
//! across log lines. Every event carries an `event_type` field.
//!
//! Event types:
//! - `lease_granted` - New lease obtained from the store
//! - `instance_registered` - Registry key written for a lease generation
//! - `lease_lost` - Keep-alive reported the lease as gone
//! - `renewal_failed` - Keep-alive failed for any other reason
//! - `registration_failed` - Fatal error, manager stopped
//! - `registration_stopped` - Manager shut down on request

use tracing::{debug, error, info, warn};

/// Emit a lease granted event
pub fn lease_granted(namespace: &str, lease_id: i64, ttl_secs: u64) {
    debug!(
        event_type = "lease_granted",
        namespace = %namespace,
        lease_id = lease_id,
        ttl_secs = ttl_secs,
        "Lease granted"
    );
}

/// Emit an instance registered event
pub fn instance_registered(key: &str, value: &str, lease_id: i64, generation: u64) {
    info!(
        event_type = "instance_registered",
        key = %key,
        value = %value,
        lease_id = lease_id,
        generation = generation,
        "Instance registered"
    );
}

/// Emit a lease lost event
pub fn lease_lost(key: &str, lease_id: i64, renewals: u64) {
    warn!(
        event_type = "lease_lost",
        key = %key,
        lease_id = lease_id,
        renewals = renewals,
        "Lease expired or revoked, re-acquiring"
    );
}

/// Emit a renewal failed event
pub fn renewal_failed(lease_id: i64, error: &str, consecutive_failures: u32) {
    warn!(
        event_type = "renewal_failed",
        lease_id = lease_id,
        error = %error,
        consecutive_failures = consecutive_failures,
        "Keep-alive failed, retrying next tick"
    );
}

/// Emit a registration failed event
pub fn registration_failed(namespace: &str, error: &str) {
    error!(
        event_type = "registration_failed",
        namespace = %namespace,
        error = %error,
        "Registration failed"
    );
}

/// Emit a registration stopped event
pub fn registration_stopped(namespace: &str, lease_id: i64, revoked: bool) {
    info!(
        event_type = "registration_stopped",
        namespace = %namespace,
        lease_id = lease_id,
        revoked = revoked,
        "Registration stopped"
    );
}
