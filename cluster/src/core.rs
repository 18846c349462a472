// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The `Core` value that owns both registries and the configured driver.
//!
//! All registry access goes through one lock, and no guarded section ever
//! spans a suspension point: placement (slot claim + port reservation) and
//! release (port + slot) are each one synchronous critical section, so the
//! invariants hold whether the runtime is the reference current-thread one
//! or multi-threaded.

use crate::driver::KernelDriver;
use crate::errors::ClusterError;
use crate::registry::{Instance, InstanceTable, KernelHandle, KernelId, KernelState, KernelTable};
use config::{ManagerConfig, PortRange};
use parking_lot::{Mutex, MutexGuard};
#[allow(unused)]
use tracing::{debug, info, warn};

/// Both registries, guarded together.
#[derive(Debug)]
pub struct ClusterState {
    pub instances: InstanceTable,
    pub kernels: KernelTable,
}

#[allow(clippy::new_without_default)]
impl ClusterState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: InstanceTable::new(),
            kernels: KernelTable::new(),
        }
    }
}

#[derive(Debug)]
pub struct Core {
    state: Mutex<ClusterState>,
    driver: KernelDriver,
    ports: PortRange,
    namespace: String,
}

impl Core {
    #[must_use]
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            state: Mutex::new(ClusterState::new()),
            driver: KernelDriver::new(config),
            ports: config.agent_ports,
            namespace: config.namespace.clone(),
        }
    }

    #[must_use]
    pub fn driver(&self) -> &KernelDriver {
        &self.driver
    }

    #[must_use]
    pub fn ports(&self) -> &PortRange {
        &self.ports
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock()
    }

    /// Add an instance to the pool. The configured driver decides whether
    /// the agent port range can serve the instance's concurrency — the same
    /// rule creation applies — so an instance that could never place a
    /// kernel is rejected here instead of failing every CREATE later.
    pub fn register_instance(&self, instance: Instance) -> Result<(), ClusterError> {
        if !self.driver.port_headroom(instance.max_kernels, &self.ports) {
            warn!(
                "Rejecting instance '{}': capacity {} does not fit the {} agent ports",
                instance.tag,
                instance.max_kernels,
                self.ports.len()
            );
            return Err(ClusterError::PortRangeTooSmall {
                tag: instance.tag,
                max: instance.max_kernels,
                ports: self.ports.len(),
            });
        }
        self.state.lock().instances.add(instance)
    }

    /// Run a read-only closure against both registries under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&ClusterState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Run a mutating closure against both registries under the lock. This
    /// is the doorway event handlers use; the closure must not block.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut ClusterState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) fn agent_sock_of(&self, id: &KernelId) -> Option<String> {
        self.state
            .lock()
            .kernels
            .get(id)
            .map(|kernel| kernel.agent_sock.clone())
    }

    pub(crate) fn set_kernel_state(&self, id: &KernelId, state: KernelState) {
        if let Some(kernel) = self.state.lock().kernels.get_mut(id) {
            kernel.state = state;
        }
    }

    /// Record that an instance's agent reported in.
    pub fn touch_instance_heartbeat(&self, tag: &str) -> bool {
        let mut state = self.state.lock();
        match state.instances.get_mut(tag) {
            Some(instance) => {
                instance.touch_heartbeat();
                true
            }
            None => {
                debug!("Heartbeat from unknown instance '{tag}'");
                false
            }
        }
    }

    /// Drop a kernel whose agent reported it gone: remove the record and
    /// give the reservation back. The back-end is not contacted; a local
    /// child gets a best-effort kill signal so nothing lingers.
    pub fn reap_kernel(&self, id: &KernelId) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let Some(kernel) = state.kernels.remove(id) else {
            return Err(ClusterError::NotFound(id.clone()));
        };
        if let Some(instance) = state.instances.get_mut(&kernel.instance) {
            instance.release(kernel.agent_port);
        }
        if let KernelHandle::Process(mut child) = kernel.handle {
            let _ = child.start_kill();
        }
        info!("Reaped kernel {id}");
        Ok(())
    }
}
