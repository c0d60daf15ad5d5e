//! Service self-registration core
//!
//! Announces a service instance in a lease-backed key-value registry and keeps
//! the announcement alive for as long as the process runs. The registry key is
//! `namespace + lease_id`; the store deletes it when the lease expires.

pub mod error;
pub mod events;
pub mod key;
pub mod manager;
pub mod memory;
pub mod registrar;
pub mod store;

pub use error::{ConfigError, RegistrationError, StoreError};
pub use key::{build_key, normalize, AdvertisedValue, LeaseId, RegistryKey, ServiceNamespace};
pub use manager::{LeaseManager, ManagerConfig, Phase, RegistrationStatus};
pub use memory::MemoryLeaseStore;
pub use registrar::{RegistrationHandle, Registrar};
pub use store::LeaseStore;
