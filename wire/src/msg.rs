// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Message types of the two RPC families.

use serde::{Deserialize, Serialize};

/// Action tag of a [`ManagerRequest`]. Tags that this build does not know
/// decode to [`ManagerAction::Unknown`] and are rejected at the server
/// boundary with `INVALID_INPUT` rather than tearing the connection down.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagerAction {
    Ping,
    Create,
    Destroy,
    #[serde(other)]
    Unknown,
}

/// Reply tag of a [`ManagerResponse`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagerReply {
    Pong,
    Success,
    InvalidInput,
    Failure,
    #[serde(other)]
    Unknown,
}

/// A client request to the manager RPC endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ManagerRequest {
    pub action: ManagerAction,
    pub kernel_id: String,
    pub body: String,
}

/// The manager's reply to a [`ManagerRequest`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ManagerResponse {
    pub reply: ManagerReply,
    pub kernel_id: String,
    pub body: String,
}

impl ManagerResponse {
    #[must_use]
    pub fn new(reply: ManagerReply, kernel_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            reply,
            kernel_id: kernel_id.into(),
            body: body.into(),
        }
    }
}

/// Request tag of an [`AgentRequest`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentReqType {
    Heartbeat,
    SocketInfo,
    #[serde(other)]
    Unknown,
}

/// A request from the manager to a kernel's in-kernel agent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub req_type: AgentReqType,
    pub body: String,
}

/// The agent's reply. A HEARTBEAT reply carries the correlation token back;
/// a SOCKET_INFO reply carries a JSON-encoded [`SocketInfo`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub body: String,
}

/// JSON body of a SOCKET_INFO reply: the kernel's three I/O endpoints.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SocketInfo {
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// JSON body of a successful CREATE reply.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KernelCreated {
    pub agent_sock: String,
    pub stdin_sock: Option<String>,
    pub stdout_sock: Option<String>,
    pub stderr_sock: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use pretty_assertions::assert_eq;

    #[test]
    fn manager_request_round_trip() {
        let req = ManagerRequest {
            action: ManagerAction::Create,
            kernel_id: String::new(),
            body: "{}".to_string(),
        };
        let bytes = encode(&req).unwrap();
        let back: ManagerRequest = decode(&bytes).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn manager_response_round_trip() {
        let resp = ManagerResponse::new(ManagerReply::Success, "local/abcd", "ok");
        let bytes = encode(&resp).unwrap();
        let back: ManagerResponse = decode(&bytes).unwrap();
        assert_eq!(resp, back);
    }

    #[test]
    fn agent_messages_round_trip() {
        let req = AgentRequest {
            req_type: AgentReqType::Heartbeat,
            body: "token-1234".to_string(),
        };
        let bytes = encode(&req).unwrap();
        let back: AgentRequest = decode(&bytes).unwrap();
        assert_eq!(req, back);

        let resp = AgentResponse {
            body: "token-1234".to_string(),
        };
        let bytes = encode(&resp).unwrap();
        let back: AgentResponse = decode(&bytes).unwrap();
        assert_eq!(resp, back);
    }

    #[test]
    fn unrecognized_action_decodes_to_unknown() {
        // A frame built by a newer peer with a tag we do not have.
        #[derive(Serialize)]
        struct NewerRequest {
            action: String,
            kernel_id: String,
            body: String,
        }
        let frame = encode(&NewerRequest {
            action: "RESTART".to_string(),
            kernel_id: "local/abcd".to_string(),
            body: String::new(),
        })
        .unwrap();
        let req: ManagerRequest = decode(&frame).unwrap();
        assert_eq!(req.action, ManagerAction::Unknown);
        assert_eq!(req.kernel_id, "local/abcd");
    }

    #[test]
    fn unrecognized_reply_decodes_to_unknown() {
        #[derive(Serialize)]
        struct NewerResponse {
            reply: String,
            kernel_id: String,
            body: String,
        }
        let frame = encode(&NewerResponse {
            reply: "THROTTLED".to_string(),
            kernel_id: String::new(),
            body: String::new(),
        })
        .unwrap();
        let resp: ManagerResponse = decode(&frame).unwrap();
        assert_eq!(resp.reply, ManagerReply::Unknown);
    }

    #[test]
    fn socket_info_json_body() {
        let info = SocketInfo {
            stdin: None,
            stdout: Some("tcp://127.0.0.1:5003".to_string()),
            stderr: Some("tcp://127.0.0.1:5004".to_string()),
        };
        let body = serde_json::to_string(&info).unwrap();
        let back: SocketInfo = serde_json::from_str(&body).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn kernel_created_null_stdin() {
        let created = KernelCreated {
            agent_sock: "tcp://127.0.0.1:5002".to_string(),
            stdin_sock: None,
            stdout_sock: Some("tcp://127.0.0.1:5003".to_string()),
            stderr_sock: Some("tcp://127.0.0.1:5004".to_string()),
        };
        let body = serde_json::to_string(&created).unwrap();
        assert!(body.contains("\"stdin_sock\":null"));
    }
}
