// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Wire types and framing for the manager RPC, the agent RPC and the agent
//! event bus.
//!
//! Everything on the wire is a length-prefixed MessagePack frame. RPC
//! messages are encoded as tagged records with named fields; event frames are
//! encoded positionally as the 3-tuple `[event_name, agent_id, args_blob]`.
//! Both ends of every transport in the system go through this crate, so a
//! frame that encodes here decodes here.

#![deny(clippy::all)]

mod codec;
mod event;
mod msg;

pub use codec::{WireError, decode, decode_event, encode, encode_event, framed};
pub use event::EventFrame;
pub use msg::{
    AgentReqType, AgentRequest, AgentResponse, KernelCreated, ManagerAction, ManagerReply,
    ManagerRequest, ManagerResponse, SocketInfo,
};
