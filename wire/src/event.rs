// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The agent event frame.

use serde::{Deserialize, Serialize};

/// One event emitted by a worker agent, as carried on the ingress socket and
/// the local bus. Encoded positionally as the 3-tuple
/// `[event_name, agent_id, args_blob]`; `args` stays opaque packed bytes all
/// the way to the handlers, which decode what they recognize.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub name: String,
    pub agent_id: String,
    pub args: Vec<u8>,
}

impl EventFrame {
    #[must_use]
    pub fn new(name: impl Into<String>, agent_id: impl Into<String>, args: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            agent_id: agent_id.into(),
            args,
        }
    }
}
