// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The container back-end: kernels run as containers under the instance's
//! docker daemon, reached over its TCP REST endpoint.

use crate::errors::ClusterError;
use crate::registry::{KernelHandle, KernelId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tokio::task;
#[allow(unused)]
use tracing::{debug, warn};

/// Client-side deadline on every docker daemon call.
const DOCKER_API_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct CreateContainer<'a> {
    #[serde(rename = "Image")]
    image: &'a str,
    #[serde(rename = "Cmd")]
    cmd: Vec<String>,
}

#[derive(Deserialize)]
struct ContainerCreated {
    #[serde(rename = "Id")]
    id: String,
}

fn docker_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(DOCKER_API_TIMEOUT))
        .build()
        .into()
}

#[derive(Debug)]
pub struct DockerDriver {
    kernel_image: String,
}

impl DockerDriver {
    #[must_use]
    pub(crate) fn new(kernel_image: String) -> Self {
        Self { kernel_image }
    }

    /// Create and start a kernel container on the instance's daemon. The
    /// container id becomes the kernel's local id.
    pub(crate) async fn spawn(
        &self,
        ip: IpAddr,
        docker_port: u16,
        agent_port: u16,
    ) -> Result<(KernelId, KernelHandle), ClusterError> {
        let image = self.kernel_image.clone();
        let base = format!("http://{ip}:{docker_port}");
        let container_id = task::spawn_blocking(move || -> Result<String, ClusterError> {
            let agent = docker_agent();
            let payload = CreateContainer {
                image: &image,
                cmd: vec![
                    "/usr/bin/python3".to_string(),
                    "-m".to_string(),
                    "sorna.kernel_agent".to_string(),
                    "--agent-port".to_string(),
                    agent_port.to_string(),
                ],
            };
            let mut response = agent
                .post(&format!("{base}/containers/create"))
                .send_json(&payload)
                .map_err(|e| ClusterError::SpawnFailed(format!("container create: {e}")))?;
            let created: ContainerCreated = response
                .body_mut()
                .read_json()
                .map_err(|e| ClusterError::SpawnFailed(format!("container create reply: {e}")))?;
            agent
                .post(&format!("{base}/containers/{}/start", created.id))
                .send_empty()
                .map_err(|e| ClusterError::SpawnFailed(format!("container start: {e}")))?;
            Ok(created.id)
        })
        .await
        .map_err(|e| ClusterError::SpawnFailed(format!("docker client task: {e}")))??;

        debug!("Started kernel container {container_id} on {ip} (agent port {agent_port})");
        let id = KernelId::docker(&container_id);
        Ok((id, KernelHandle::Container { id: container_id }))
    }
}

/// Force-delete a kernel container; covers both running and wedged ones.
pub(crate) async fn remove_container(
    ip: IpAddr,
    docker_port: u16,
    container_id: &str,
) -> Result<(), ClusterError> {
    let url = format!("http://{ip}:{docker_port}/containers/{container_id}?force=true");
    task::spawn_blocking(move || -> Result<(), ClusterError> {
        docker_agent()
            .delete(&url)
            .call()
            .map_err(|e| ClusterError::TeardownFailed(format!("container delete: {e}")))?;
        Ok(())
    })
    .await
    .map_err(|e| ClusterError::TeardownFailed(format!("docker client task: {e}")))?
}
