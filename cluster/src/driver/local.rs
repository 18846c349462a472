// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The local back-end: kernels are child processes of the manager.

use crate::errors::ClusterError;
use crate::registry::{KernelHandle, KernelId};
use std::path::PathBuf;
use tokio::process::{Child, Command};
#[allow(unused)]
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct LocalDriver {
    agent_program: PathBuf,
}

impl LocalDriver {
    #[must_use]
    pub(crate) fn new(agent_program: PathBuf) -> Self {
        Self { agent_program }
    }

    /// Spawn the agent program for a fresh kernel id on the given agent
    /// port.
    pub(crate) async fn spawn(&self, port: u16) -> Result<(KernelId, KernelHandle), ClusterError> {
        let id = KernelId::local(&Uuid::new_v4().to_string());
        let child = Command::new(&self.agent_program)
            .arg("--kernel-id")
            .arg(id.as_str())
            .arg("--agent-port")
            .arg(port.to_string())
            .spawn()
            .map_err(|e| {
                ClusterError::SpawnFailed(format!("{}: {e}", self.agent_program.display()))
            })?;
        debug!("Spawned agent process for kernel {id} on port {port}");
        Ok((id, KernelHandle::Process(child)))
    }
}

/// Terminate-and-wait on a kernel child process. A child that already
/// exited on its own is not an error.
pub(crate) async fn terminate(mut child: Child) -> Result<(), ClusterError> {
    if let Err(e) = child.start_kill() {
        if e.kind() != std::io::ErrorKind::InvalidInput {
            return Err(ClusterError::TeardownFailed(e.to_string()));
        }
    }
    match child.wait().await {
        Ok(status) => {
            debug!("Kernel process exited with {status}");
            Ok(())
        }
        Err(e) => Err(ClusterError::TeardownFailed(e.to_string())),
    }
}
