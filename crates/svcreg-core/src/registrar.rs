//! Background registrations
//!
//! Spawns one [`LeaseManager`] task per service over a shared store handle.

use crate::error::RegistrationError;
use crate::key::{AdvertisedValue, ServiceNamespace};
use crate::manager::{LeaseManager, ManagerConfig, RegistrationStatus};
use crate::store::LeaseStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Starts registrations that share one store client
#[derive(Debug, Clone)]
pub struct Registrar<S> {
    store: S,
    config: ManagerConfig,
}

impl<S> Registrar<S>
where
    S: LeaseStore + Clone + 'static,
{
    pub fn new(store: S, config: ManagerConfig) -> Self {
        Self { store, config }
    }

    /// Spawn a background task announcing `value` under `namespace`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, namespace: ServiceNamespace, value: AdvertisedValue) -> RegistrationHandle {
        let manager = LeaseManager::new(self.store.clone(), self.config);
        let status_rx = manager.subscribe();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        debug!(namespace = %namespace, value = %value, "Spawning registration task");
        let task = tokio::spawn(manager.run_until(namespace.clone(), value, shutdown_rx));

        RegistrationHandle {
            namespace,
            shutdown_tx,
            status_rx,
            task: Some(task),
        }
    }
}

/// Handle to a running registration.
///
/// Dropping the handle stops the registration and revokes its lease.
#[derive(Debug)]
pub struct RegistrationHandle {
    namespace: ServiceNamespace,
    shutdown_tx: mpsc::UnboundedSender<()>,
    status_rx: watch::Receiver<RegistrationStatus>,
    task: Option<JoinHandle<Result<(), RegistrationError>>>,
}

impl RegistrationHandle {
    pub fn namespace(&self) -> &ServiceNamespace {
        &self.namespace
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrationStatus> {
        self.status_rx.clone()
    }

    /// Wait for the task to end, which only happens on a fatal error or
    /// after a shutdown request. Cancel safe. Returns `Ok` once the task
    /// has already been reaped.
    pub async fn wait(&mut self) -> Result<(), RegistrationError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;

        match result {
            Ok(result) => result,
            Err(e) => Err(RegistrationError::Aborted(e.to_string())),
        }
    }

    /// Stop the registration, revoke the lease and wait for the task
    pub async fn shutdown(mut self) -> Result<(), RegistrationError> {
        // The task may already have exited on a fatal error
        let _ = self.shutdown_tx.send(());
        self.wait().await
    }
}
