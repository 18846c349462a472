// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One-shot request/reply client for a kernel's agent socket.
//!
//! Every call opens a fresh framed connection, matching the per-request
//! REQ socket the agents expect.

use crate::errors::ClusterError;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;
use wire::{AgentRequest, AgentResponse};

pub(crate) async fn request(
    agent_sock: &str,
    request: &AgentRequest,
    deadline: Duration,
) -> Result<AgentResponse, ClusterError> {
    let (host, port) = parse_agent_sock(agent_sock)?;
    let unreachable =
        |reason: String| ClusterError::AgentUnreachable(agent_sock.to_string(), reason);

    let exchange = async {
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let mut framed = wire::framed(stream);
        let frame = wire::encode(request).map_err(|e| ClusterError::BadAgentReply(e.to_string()))?;
        framed
            .send(frame)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let reply = framed
            .next()
            .await
            .ok_or_else(|| unreachable("connection closed before reply".to_string()))?
            .map_err(|e| unreachable(e.to_string()))?;
        wire::decode::<AgentResponse>(&reply)
            .map_err(|e| ClusterError::BadAgentReply(e.to_string()))
    };
    timeout(deadline, exchange)
        .await
        .map_err(|_| unreachable(format!("no reply within {deadline:?}")))?
}

fn parse_agent_sock(agent_sock: &str) -> Result<(String, u16), ClusterError> {
    let bad = |reason: &str| {
        ClusterError::AgentUnreachable(agent_sock.to_string(), format!("bad address: {reason}"))
    };
    let url = Url::parse(agent_sock).map_err(|e| bad(&e.to_string()))?;
    if url.scheme() != "tcp" {
        return Err(bad("expected a tcp:// address"));
    }
    let host = url.host_str().ok_or_else(|| bad("missing host"))?.to_string();
    let port = url.port().ok_or_else(|| bad("missing port"))?;
    Ok((host, port))
}
