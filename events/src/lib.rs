// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The agent event plane: a router worker that proxies ingress frames onto
//! a local bus, and the subscriber/dispatcher pair that fans them out to
//! handler chains.

#![deny(clippy::all)]

mod dispatcher;
mod router;
mod subscriber;

use thiserror::Error;
use wire::WireError;

pub use dispatcher::{EventDispatcher, EventHandler, HandlerResult};
pub use router::{BUS_LINGER, RouterHandle, spawn_router};
pub use subscriber::event_subscriber;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad event frame: {0}")]
    Frame(#[from] WireError),
}
