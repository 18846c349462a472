// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel driver capability set.
//!
//! A driver knows how to place, launch, probe and tear down kernels against
//! one back-end. The two variants differ only in the placement filter, the
//! spawn and the teardown; everything else is shared. Dispatch happens by
//! matching the tagged enum at the operation boundary.

mod agent;
mod docker;
mod local;

use crate::core::{ClusterState, Core};
use crate::errors::ClusterError;
use crate::registry::{DEFAULT_KERNEL_SPEC, Kernel, KernelHandle, KernelId, KernelState};
use config::{DriverKind, ManagerConfig, PortRange};
use std::net::IpAddr;
use std::time::Duration;
use wire::{AgentReqType, AgentRequest, SocketInfo};

pub(crate) use docker::DockerDriver;
pub(crate) use local::LocalDriver;

#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Deadline on one heartbeat request/reply.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline on the socket-info request/reply.
pub const SOCKET_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// A kernel back-end driver.
#[derive(Debug)]
pub enum KernelDriver {
    Local(LocalDriver),
    Docker(DockerDriver),
}

impl KernelDriver {
    #[must_use]
    pub fn new(config: &ManagerConfig) -> Self {
        match config.kernel_driver {
            DriverKind::Local => Self::Local(LocalDriver::new(config.agent_program.clone())),
            DriverKind::Docker => Self::Docker(DockerDriver::new(config.kernel_image.clone())),
        }
    }

    /// Scan the instance registry for one with headroom, claim a kernel
    /// slot on it and return its tag. The local variant only considers
    /// loopback instances. First match in (deterministic) iteration order
    /// wins.
    pub fn find_available_instance(&self, state: &mut ClusterState) -> Option<String> {
        let local_only = matches!(self, Self::Local(_));
        let instance = state
            .instances
            .values_mut()
            .filter(|instance| !local_only || instance.is_loopback())
            .find(|instance| instance.has_headroom())?;
        instance.cur_kernels += 1;
        debug!(
            "Placed a kernel on instance '{}' ({}/{})",
            instance.tag, instance.cur_kernels, instance.max_kernels
        );
        Some(instance.tag.clone())
    }

    /// Whether an instance of the given concurrency can ever serve its full
    /// capacity out of the agent port range. The local variant needs strict
    /// headroom; the container variant may use the range exactly.
    pub(crate) fn port_headroom(&self, max_kernels: usize, range: &PortRange) -> bool {
        match self {
            Self::Local(_) => max_kernels < range.len(),
            Self::Docker(_) => max_kernels <= range.len(),
        }
    }

    /// Launch a kernel on the instance claimed by
    /// [`find_available_instance`](Self::find_available_instance), record it
    /// and return its id. Any failure past the port reservation gives the
    /// port and the kernel slot back — and tears an already-spawned
    /// back-end down — before the error propagates.
    pub async fn create_kernel(&self, core: &Core, tag: &str) -> Result<KernelId, ClusterError> {
        let (port, ip, docker_port) = {
            let mut state = core.lock_state();
            let Some(instance) = state.instances.get_mut(tag) else {
                return Err(ClusterError::NoSuchInstance(tag.to_string()));
            };
            if !self.port_headroom(instance.max_kernels, core.ports()) {
                instance.unplace();
                return Err(ClusterError::PortRangeTooSmall {
                    tag: tag.to_string(),
                    max: instance.max_kernels,
                    ports: core.ports().len(),
                });
            }
            let Some(port) = instance.reserve_port(core.ports()) else {
                instance.unplace();
                return Err(ClusterError::PortExhausted(tag.to_string()));
            };
            (port, instance.ip, instance.docker_port)
        };

        let spawned = match self {
            Self::Local(driver) => driver.spawn(port).await,
            Self::Docker(driver) => driver.spawn(ip, docker_port, port).await,
        };
        let (id, handle) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                self.release_reservation(core, tag, port);
                return Err(e);
            }
        };

        let stale = {
            let mut state = core.lock_state();
            if state.kernels.contains(&id) {
                if let Some(instance) = state.instances.get_mut(tag) {
                    instance.release(port);
                }
                Some(handle)
            } else {
                let kernel = Kernel {
                    id: id.clone(),
                    instance: tag.to_string(),
                    spec: DEFAULT_KERNEL_SPEC.to_string(),
                    agent_sock: format!("tcp://{ip}:{port}"),
                    agent_port: port,
                    stdin_sock: None,
                    stdout_sock: None,
                    stderr_sock: None,
                    state: KernelState::Spawned,
                    handle,
                };
                // the id was free one line up, under this same lock
                state.kernels.add(kernel)?;
                None
            }
        };
        if let Some(handle) = stale {
            warn!("Kernel id {id} is already recorded, tearing the fresh back-end down");
            if let Err(e) = teardown_backend(handle, ip, docker_port).await {
                error!("Teardown of colliding kernel {id}'s back-end failed: {e}");
            }
            return Err(ClusterError::KernelExists(id));
        }
        info!("Spawned kernel {id} on instance '{tag}' (agent port {port})");
        Ok(id)
    }

    /// Tear down a kernel's back-end, release its reservation and drop its
    /// record. The record is gone even when the back-end teardown fails.
    pub async fn destroy_kernel(&self, core: &Core, id: &KernelId) -> Result<(), ClusterError> {
        let (handle, ip, docker_port) = {
            let mut state = core.lock_state();
            let Some(mut kernel) = state.kernels.remove(id) else {
                return Err(ClusterError::NotFound(id.clone()));
            };
            kernel.state = KernelState::Destroying;
            let (ip, docker_port) = match state.instances.get_mut(&kernel.instance) {
                Some(instance) => {
                    instance.release(kernel.agent_port);
                    (instance.ip, instance.docker_port)
                }
                None => {
                    // The instance should outlive its kernels; nothing left
                    // to release against if it does not.
                    error!(
                        "Kernel {id} pointed at unknown instance '{}'",
                        kernel.instance
                    );
                    (std::net::Ipv4Addr::LOCALHOST.into(), 0)
                }
            };
            (kernel.handle, ip, docker_port)
        };

        match teardown_backend(handle, ip, docker_port).await {
            Ok(()) => {
                info!("Destroyed kernel {id}");
                Ok(())
            }
            Err(e) => {
                warn!("Back-end teardown of kernel {id} failed: {e}");
                Err(e)
            }
        }
    }

    /// One readiness probe: send a HEARTBEAT carrying a fresh correlation
    /// token and report whether the agent echoed it within the deadline.
    /// Probes never error; anything short of a verbatim echo is `false`.
    pub async fn ping_kernel(&self, core: &Core, id: &KernelId) -> bool {
        let Some(agent_sock) = core.agent_sock_of(id) else {
            return false;
        };
        let token = uuid::Uuid::new_v4().to_string();
        let request = AgentRequest {
            req_type: AgentReqType::Heartbeat,
            body: token.clone(),
        };
        match agent::request(&agent_sock, &request, PING_TIMEOUT).await {
            Ok(reply) => reply.body == token,
            Err(e) => {
                debug!("Heartbeat to {agent_sock} failed: {e}");
                false
            }
        }
    }

    /// Ask the agent for the kernel's I/O endpoints and populate the
    /// record. No retry at this layer.
    pub async fn fetch_socket_info(&self, core: &Core, id: &KernelId) -> Result<(), ClusterError> {
        let agent_sock = core
            .agent_sock_of(id)
            .ok_or_else(|| ClusterError::NotFound(id.clone()))?;
        let request = AgentRequest {
            req_type: AgentReqType::SocketInfo,
            body: String::new(),
        };
        let reply = agent::request(&agent_sock, &request, SOCKET_INFO_TIMEOUT).await?;
        let info: SocketInfo = serde_json::from_str(&reply.body)
            .map_err(|e| ClusterError::BadAgentReply(format!("socket info: {e}")))?;

        let mut state = core.lock_state();
        let kernel = state
            .kernels
            .get_mut(id)
            .ok_or_else(|| ClusterError::NotFound(id.clone()))?;
        kernel.stdin_sock = info.stdin;
        kernel.stdout_sock = info.stdout;
        kernel.stderr_sock = info.stderr;
        Ok(())
    }

    fn release_reservation(&self, core: &Core, tag: &str, port: u16) {
        let mut state = core.lock_state();
        if let Some(instance) = state.instances.get_mut(tag) {
            instance.release(port);
        }
    }
}

/// Dispatch back-end teardown on the handle variant.
async fn teardown_backend(
    handle: KernelHandle,
    ip: IpAddr,
    docker_port: u16,
) -> Result<(), ClusterError> {
    match handle {
        KernelHandle::Process(child) => local::terminate(child).await,
        KernelHandle::Container { id } => docker::remove_container(ip, docker_port, &id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Instance;
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;

    fn local_driver() -> KernelDriver {
        KernelDriver::Local(LocalDriver::new(PathBuf::from("sorna-agent")))
    }

    fn docker_driver() -> KernelDriver {
        KernelDriver::Docker(DockerDriver::new("lablup-python-kernel:latest".to_string()))
    }

    #[test]
    fn headroom_rule_differs_per_variant() {
        let range = PortRange::default(); // 8 ports
        assert!(local_driver().port_headroom(7, &range));
        assert!(!local_driver().port_headroom(8, &range));
        assert!(docker_driver().port_headroom(8, &range));
        assert!(!docker_driver().port_headroom(9, &range));
    }

    #[test]
    fn local_placement_filters_to_loopback() {
        let mut state = ClusterState::new();
        state
            .instances
            .add(Instance::new("remote", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))))
            .unwrap();

        assert_eq!(local_driver().find_available_instance(&mut state), None);
        assert_eq!(
            docker_driver().find_available_instance(&mut state),
            Some("remote".to_string())
        );
        assert_eq!(state.instances.get("remote").unwrap().cur_kernels, 1);
    }

    #[test]
    fn placement_skips_full_instances() {
        let mut state = ClusterState::new();
        state
            .instances
            .add(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)).with_max_kernels(1))
            .unwrap();

        assert!(local_driver().find_available_instance(&mut state).is_some());
        assert_eq!(local_driver().find_available_instance(&mut state), None);
        assert_eq!(state.instances.get("test").unwrap().cur_kernels, 1);
    }
}
