// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error kinds of the dispatch and lifecycle subsystem.

use crate::registry::KernelId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no instance has capacity for a new kernel")]
    NoCapacity,
    #[error("no such kernel: {0}")]
    NotFound(KernelId),
    #[error("no such instance: '{0}'")]
    NoSuchInstance(String),
    #[error("instance '{0}' is already registered")]
    InstanceExists(String),
    #[error("instance '{tag}' allows {max} kernels but the agent port range only holds {ports}")]
    PortRangeTooSmall { tag: String, max: usize, ports: usize },
    #[error("instance '{0}' has no free agent port")]
    PortExhausted(String),
    #[error("kernel id collision on {0}")]
    KernelExists(KernelId),
    #[error("failed to launch the kernel back-end: {0}")]
    SpawnFailed(String),
    #[error("failed to tear down the kernel back-end: {0}")]
    TeardownFailed(String),
    #[error("agent at {0} is unreachable: {1}")]
    AgentUnreachable(String, String),
    #[error("bad reply from agent: {0}")]
    BadAgentReply(String),
}
