// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The lifecycle coordinator: turns decoded client requests into registry
//! state and wire replies.
//!
//! This module is the single writer of the kernel registry on the request
//! path; event handlers go through [`Core`]'s explicit mutation doorway.

use crate::core::Core;
use crate::errors::ClusterError;
use crate::registry::{KernelId, KernelState};
use std::time::Duration;
use tokio::time::sleep;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use wire::{KernelCreated, ManagerAction, ManagerReply, ManagerRequest, ManagerResponse};

/// Grace period between spawning a kernel and the first readiness probe.
pub const WARMUP_DELAY: Duration = Duration::from_millis(200);

/// How many readiness probes a fresh kernel gets before CREATE gives up.
pub const PROBE_ATTEMPTS: u32 = 5;

/// Pause after a failed probe before the next one.
pub const PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);

pub const MSG_NO_INSTANCE: &str = "No instance is available to launch a new kernel.";
pub const MSG_KERNEL_DID_NOT_RESPOND: &str = "The created kernel did not respond!";
pub const MSG_NO_SUCH_KERNEL: &str = "No such kernel.";
pub const MSG_UNKNOWN_ACTION: &str = "Unknown action.";

/// Serve one manager RPC request. Always produces a response; internal
/// errors become FAILURE replies here rather than propagating to the
/// server loop.
pub async fn handle_request(core: &Core, request: ManagerRequest) -> ManagerResponse {
    match request.action {
        ManagerAction::Ping => ManagerResponse::new(ManagerReply::Pong, "", request.body),
        ManagerAction::Create => handle_create(core).await,
        ManagerAction::Destroy => handle_destroy(core, &request.kernel_id).await,
        ManagerAction::Unknown => {
            warn!("Rejecting request with unknown action");
            ManagerResponse::new(ManagerReply::InvalidInput, "", MSG_UNKNOWN_ACTION)
        }
    }
}

async fn handle_create(core: &Core) -> ManagerResponse {
    let driver = core.driver();

    let placed = {
        let mut state = core.lock_state();
        driver.find_available_instance(&mut state)
    };
    let Some(tag) = placed else {
        info!("CREATE rejected: every instance is at capacity");
        return ManagerResponse::new(ManagerReply::Failure, "", MSG_NO_INSTANCE);
    };

    let kernel_id = match driver.create_kernel(core, &tag).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to create a kernel on instance '{tag}': {e}");
            return ManagerResponse::new(ManagerReply::Failure, "", e.to_string());
        }
    };

    sleep(WARMUP_DELAY).await;
    core.set_kernel_state(&kernel_id, KernelState::Probing);
    debug!("Checking if kernel {kernel_id} is up...");
    let mut alive = false;
    for attempt in 1..=PROBE_ATTEMPTS {
        if driver.ping_kernel(core, &kernel_id).await {
            alive = true;
            break;
        }
        debug!("  probe {attempt}/{PROBE_ATTEMPTS} failed, retrying after 1 sec...");
        sleep(PROBE_RETRY_DELAY).await;
    }
    if !alive {
        core.set_kernel_state(&kernel_id, KernelState::Failed);
        warn!("Kernel {kernel_id} never answered a heartbeat, destroying it");
        if let Err(e) = driver.destroy_kernel(core, &kernel_id).await {
            error!("Cleanup of unresponsive kernel {kernel_id} failed: {e}");
        }
        return ManagerResponse::new(ManagerReply::Failure, "", MSG_KERNEL_DID_NOT_RESPOND);
    }

    if let Err(e) = driver.fetch_socket_info(core, &kernel_id).await {
        error!("Failed to fetch socket info of kernel {kernel_id}: {e}");
        if let Err(e) = driver.destroy_kernel(core, &kernel_id).await {
            error!("Cleanup of kernel {kernel_id} failed: {e}");
        }
        return ManagerResponse::new(ManagerReply::Failure, "", e.to_string());
    }

    let body = core.with_state_mut(|state| {
        let kernel = state
            .kernels
            .get_mut(&kernel_id)
            .ok_or_else(|| ClusterError::NotFound(kernel_id.clone()))?;
        kernel.state = KernelState::Ready;
        // The reply never exposes a stdin endpoint, even when the agent
        // reported one.
        let created = KernelCreated {
            agent_sock: kernel.agent_sock.clone(),
            stdin_sock: None,
            stdout_sock: kernel.stdout_sock.clone(),
            stderr_sock: kernel.stderr_sock.clone(),
        };
        serde_json::to_string(&created).map_err(|e| ClusterError::BadAgentReply(e.to_string()))
    });
    match body {
        Ok(body) => {
            info!("Kernel {kernel_id} is ready");
            ManagerResponse::new(ManagerReply::Success, kernel_id.as_str(), body)
        }
        Err(e) => {
            error!("Lost kernel {kernel_id} before replying: {e}");
            ManagerResponse::new(ManagerReply::Failure, "", e.to_string())
        }
    }
}

async fn handle_destroy(core: &Core, kernel_id: &str) -> ManagerResponse {
    let id = KernelId::from(kernel_id);
    let known = core.with_state(|state| state.kernels.contains(&id));
    if !known {
        debug!("DESTROY of unknown kernel '{kernel_id}'");
        return ManagerResponse::new(ManagerReply::InvalidInput, "", MSG_NO_SUCH_KERNEL);
    }
    match core.driver().destroy_kernel(core, &id).await {
        Ok(()) => ManagerResponse::new(ManagerReply::Success, id.as_str(), ""),
        Err(ClusterError::NotFound(_)) => {
            ManagerResponse::new(ManagerReply::InvalidInput, "", MSG_NO_SUCH_KERNEL)
        }
        Err(e) => {
            error!("Failed to destroy kernel {id}: {e}");
            ManagerResponse::new(ManagerReply::Failure, id.as_str(), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{CmdArgs, ManagerConfig, Parser};
    use wire::ManagerAction;

    fn test_core() -> Core {
        let args = CmdArgs::parse_from(["sorna-manager", "--kernel-driver", "local"]);
        Core::new(&ManagerConfig::from(args))
    }

    #[tokio::test]
    async fn ping_echoes_body_without_touching_state() {
        let core = test_core();
        let response = handle_request(
            &core,
            ManagerRequest {
                action: ManagerAction::Ping,
                kernel_id: String::new(),
                body: "abc".to_string(),
            },
        )
        .await;
        assert_eq!(response.reply, ManagerReply::Pong);
        assert_eq!(response.kernel_id, "");
        assert_eq!(response.body, "abc");
        core.with_state(|state| {
            assert!(state.instances.is_empty());
            assert!(state.kernels.is_empty());
        });
    }

    #[tokio::test]
    async fn create_with_no_instances_fails_with_stable_text() {
        let core = test_core();
        let response = handle_request(
            &core,
            ManagerRequest {
                action: ManagerAction::Create,
                kernel_id: String::new(),
                body: String::new(),
            },
        )
        .await;
        assert_eq!(response.reply, ManagerReply::Failure);
        assert_eq!(response.body, MSG_NO_INSTANCE);
    }

    #[tokio::test]
    async fn destroy_unknown_kernel_is_invalid_input_and_idempotent() {
        let core = test_core();
        for _ in 0..2 {
            let response = handle_request(
                &core,
                ManagerRequest {
                    action: ManagerAction::Destroy,
                    kernel_id: "local/no-such".to_string(),
                    body: String::new(),
                },
            )
            .await;
            assert_eq!(response.reply, ManagerReply::InvalidInput);
            assert_eq!(response.body, MSG_NO_SUCH_KERNEL);
        }
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let core = test_core();
        let response = handle_request(
            &core,
            ManagerRequest {
                action: ManagerAction::Unknown,
                kernel_id: String::new(),
                body: String::new(),
            },
        )
        .await;
        assert_eq!(response.reply, ManagerReply::InvalidInput);
    }
}
