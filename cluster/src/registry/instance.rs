// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A worker instance and its capacity accounting.

use config::PortRange;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Instant;

/// Standard docker daemon port; VM instances run their daemon with
/// `-H tcp://0.0.0.0:2375` in `DOCKER_OPTS`.
pub const DEFAULT_DOCKER_PORT: u16 = 2375;

const DEFAULT_MAX_KERNELS: usize = 2;

/// A host that can run kernels. The port set and the kernel counter always
/// move together: a reservation pairs with an increment, a release with a
/// decrement, and both pairs happen under the registry lock.
#[derive(Debug)]
pub struct Instance {
    pub tag: String,
    pub ip: IpAddr,
    pub docker_port: u16,
    pub max_kernels: usize,
    pub cur_kernels: usize,
    pub occupied_ports: BTreeSet<u16>,
    pub last_heartbeat: Option<Instant>,
}

impl Instance {
    #[must_use]
    pub fn new(tag: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            tag: tag.into(),
            ip,
            docker_port: DEFAULT_DOCKER_PORT,
            max_kernels: DEFAULT_MAX_KERNELS,
            cur_kernels: 0,
            occupied_ports: BTreeSet::new(),
            last_heartbeat: None,
        }
    }

    #[must_use]
    pub fn with_max_kernels(mut self, max_kernels: usize) -> Self {
        self.max_kernels = max_kernels;
        self
    }

    #[must_use]
    pub fn with_docker_port(mut self, docker_port: u16) -> Self {
        self.docker_port = docker_port;
        self
    }

    #[must_use]
    pub fn has_headroom(&self) -> bool {
        self.cur_kernels < self.max_kernels
    }

    #[must_use]
    pub fn is_loopback(&self) -> bool {
        self.ip.is_loopback()
    }

    /// Reserve the smallest agent port not yet occupied.
    pub(crate) fn reserve_port(&mut self, range: &PortRange) -> Option<u16> {
        let port = range.iter().find(|p| !self.occupied_ports.contains(p))?;
        self.occupied_ports.insert(port);
        Some(port)
    }

    /// Release an agent port together with the kernel slot that held it.
    pub(crate) fn release(&mut self, port: u16) {
        if !self.occupied_ports.remove(&port) {
            tracing::warn!(
                "instance '{}' released port {port} it did not occupy",
                self.tag
            );
        }
        self.cur_kernels = self.cur_kernels.saturating_sub(1);
    }

    /// Give back a placement slot that never got as far as a port.
    pub(crate) fn unplace(&mut self) {
        self.cur_kernels = self.cur_kernels.saturating_sub(1);
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }
}
