// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! End-to-end lifecycle scenarios against the local driver, with a stub
//! in-test agent speaking the agent RPC protocol.

use cluster::lifecycle::{
    self, MSG_KERNEL_DID_NOT_RESPOND, MSG_NO_INSTANCE, handle_request,
};
use cluster::{ClusterError, Core, Instance, KernelId};
use config::{CmdArgs, ManagerConfig, Parser};
use futures::{SinkExt, StreamExt};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use wire::{
    AgentReqType, AgentRequest, AgentResponse, KernelCreated, ManagerAction, ManagerReply,
    ManagerRequest, SocketInfo,
};

fn local_core(agent_ports: &str) -> Core {
    let args = CmdArgs::parse_from([
        "sorna-manager",
        "--kernel-driver",
        "local",
        "--agent-program",
        "/bin/sleep",
        "--agent-ports",
        agent_ports,
    ]);
    Core::new(&ManagerConfig::from(args))
}

fn create_request() -> ManagerRequest {
    ManagerRequest {
        action: ManagerAction::Create,
        kernel_id: String::new(),
        body: String::new(),
    }
}

fn destroy_request(kernel_id: &str) -> ManagerRequest {
    ManagerRequest {
        action: ManagerAction::Destroy,
        kernel_id: kernel_id.to_string(),
        body: String::new(),
    }
}

/// Answer HEARTBEAT echoes and SOCKET_INFO queries the way a live kernel
/// agent would.
async fn stub_agent(listener: TcpListener, info: SocketInfo) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let info = info.clone();
        tokio::spawn(async move {
            let mut framed = wire::framed(stream);
            while let Some(Ok(frame)) = framed.next().await {
                let Ok(request) = wire::decode::<AgentRequest>(&frame) else {
                    return;
                };
                let reply = match request.req_type {
                    AgentReqType::Heartbeat => AgentResponse { body: request.body },
                    AgentReqType::SocketInfo => AgentResponse {
                        body: serde_json::to_string(&info).expect("socket info encodes"),
                    },
                    AgentReqType::Unknown => AgentResponse { body: String::new() },
                };
                let frame = wire::encode(&reply).expect("agent reply encodes");
                if framed.send(frame).await.is_err() {
                    return;
                }
            }
        });
    }
}

fn assert_registry_invariants(core: &Core) {
    core.with_state(|state| {
        let reserved: usize = state
            .instances
            .values()
            .map(|instance| instance.occupied_ports.len())
            .sum();
        assert_eq!(reserved, state.kernels.len());
        for instance in state.instances.values() {
            assert!(instance.cur_kernels <= instance.max_kernels);
            assert_eq!(instance.occupied_ports.len(), instance.cur_kernels);
        }
        for kernel in state.kernels.values() {
            let port = url::Url::parse(&kernel.agent_sock)
                .expect("agent sock is a url")
                .port()
                .expect("agent sock has a port");
            let instance = state
                .instances
                .get(&kernel.instance)
                .expect("owning instance is registered");
            assert!(instance.occupied_ports.contains(&port));
        }
    });
}

#[tokio::test]
async fn create_then_destroy_with_a_ready_kernel() {
    let core = local_core("5002-5010");
    core.register_instance(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)))
        .unwrap();

    // A stub agent where the first placed kernel will listen.
    let listener = TcpListener::bind(("127.0.0.1", 5002))
        .await
        .expect("agent port 5002 is free");
    tokio::spawn(stub_agent(
        listener,
        SocketInfo {
            stdin: Some("tcp://127.0.0.1:5011".to_string()),
            stdout: Some("tcp://127.0.0.1:5012".to_string()),
            stderr: Some("tcp://127.0.0.1:5013".to_string()),
        },
    ));

    let response = handle_request(&core, create_request()).await;
    assert_eq!(response.reply, ManagerReply::Success, "{}", response.body);
    assert!(response.kernel_id.starts_with("local/"));

    let created: KernelCreated = serde_json::from_str(&response.body).unwrap();
    assert_eq!(created.agent_sock, "tcp://127.0.0.1:5002");
    assert_eq!(created.stdin_sock, None);
    assert_eq!(created.stdout_sock, Some("tcp://127.0.0.1:5012".to_string()));
    assert_eq!(created.stderr_sock, Some("tcp://127.0.0.1:5013".to_string()));

    core.with_state(|state| {
        let instance = state.instances.get("test").unwrap();
        assert_eq!(instance.cur_kernels, 1);
        assert!(instance.occupied_ports.contains(&5002));
        assert_eq!(state.kernels.len(), 1);
        let kernel = state
            .kernels
            .get(&KernelId::from(response.kernel_id.as_str()))
            .unwrap();
        // The record keeps the agent-reported stdin even though the reply
        // never exposes one.
        assert_eq!(kernel.stdin_sock, Some("tcp://127.0.0.1:5011".to_string()));
    });
    assert_registry_invariants(&core);

    let response = handle_request(&core, destroy_request(&response.kernel_id)).await;
    assert_eq!(response.reply, ManagerReply::Success, "{}", response.body);
    core.with_state(|state| {
        let instance = state.instances.get("test").unwrap();
        assert_eq!(instance.cur_kernels, 0);
        assert!(instance.occupied_ports.is_empty());
        assert!(state.kernels.is_empty());
    });
    assert_registry_invariants(&core);

    // The id never reappears once destroyed.
    let response = handle_request(&core, destroy_request(&response.kernel_id)).await;
    assert_eq!(response.reply, ManagerReply::InvalidInput);
    assert_eq!(response.body, lifecycle::MSG_NO_SUCH_KERNEL);
}

#[tokio::test]
async fn create_with_no_capacity_mutates_nothing() {
    let core = local_core("5002-5010");
    core.register_instance(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)))
        .unwrap();
    core.with_state_mut(|state| {
        let instance = state.instances.get_mut("test").unwrap();
        instance.cur_kernels = 2;
        instance.occupied_ports.extend([5002, 5003]);
    });

    let response = handle_request(&core, create_request()).await;
    assert_eq!(response.reply, ManagerReply::Failure);
    assert_eq!(response.kernel_id, "");
    assert_eq!(response.body, MSG_NO_INSTANCE);

    core.with_state(|state| {
        let instance = state.instances.get("test").unwrap();
        assert_eq!(instance.cur_kernels, 2);
        assert_eq!(instance.occupied_ports.len(), 2);
        assert!(state.kernels.is_empty());
    });
}

#[tokio::test]
async fn create_with_dead_kernel_probes_five_times_then_cleans_up() {
    // Nothing listens on this range, so every probe fails fast and the
    // retry pacing dominates the wait.
    let core = local_core("5102-5110");
    core.register_instance(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)))
        .unwrap();

    let started = Instant::now();
    let response = handle_request(&core, create_request()).await;
    let elapsed = started.elapsed();

    assert_eq!(response.reply, ManagerReply::Failure);
    assert_eq!(response.kernel_id, "");
    assert_eq!(response.body, MSG_KERNEL_DID_NOT_RESPOND);
    // 200 ms warm-up plus five 1 s retry pauses.
    assert!(elapsed >= Duration::from_secs(5), "gave up after {elapsed:?}");

    core.with_state(|state| {
        let instance = state.instances.get("test").unwrap();
        assert_eq!(instance.cur_kernels, 0);
        assert!(instance.occupied_ports.is_empty());
        assert!(state.kernels.is_empty());
    });
    assert_registry_invariants(&core);
}

#[tokio::test]
async fn local_driver_refuses_capacity_equal_to_port_range() {
    // Two ports, two-kernel instance: the container driver may fill the
    // range exactly, the local driver must keep strict headroom. The rule
    // bites at registration already.
    let core = local_core("6000-6002");
    let result = core.register_instance(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert!(matches!(
        result,
        Err(ClusterError::PortRangeTooSmall { ports: 2, .. })
    ));
    core.with_state(|state| assert!(state.instances.is_empty()));

    // An instance that slipped past registration still trips the same
    // guard at creation time, and the placement slot is given back.
    core.with_state_mut(|state| {
        state
            .instances
            .add(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)))
            .unwrap();
    });
    let response = handle_request(&core, create_request()).await;
    assert_eq!(response.reply, ManagerReply::Failure);
    assert_ne!(response.body, MSG_NO_INSTANCE);

    core.with_state(|state| {
        let instance = state.instances.get("test").unwrap();
        assert_eq!(instance.cur_kernels, 0);
        assert!(instance.occupied_ports.is_empty());
        assert!(state.kernels.is_empty());
    });
}
