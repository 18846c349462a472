// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The event subscriber: reads the local bus and feeds the dispatcher.

use crate::EventError;
use crate::dispatcher::EventDispatcher;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::time::sleep;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use wire::{decode_event, framed};

const BUS_CONNECT_ATTEMPTS: u32 = 30;
const BUS_CONNECT_RETRY: Duration = Duration::from_millis(100);

/// Read event frames off the local bus until the bus closes or `shutdown`
/// fires. Undecodable frames are logged and dropped; handler outcomes never
/// surface here. On cancellation the socket closes and in-flight task
/// handlers keep running under their own tasks.
pub async fn event_subscriber(
    bus_path: &Path,
    dispatcher: Arc<EventDispatcher>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), EventError> {
    let stream = connect_bus(bus_path).await?;
    let mut framed = framed(stream);
    debug!("event subscriber attached to {}", bus_path.display());
    loop {
        tokio::select! {
            maybe = framed.next() => match maybe {
                Some(Ok(frame)) => match decode_event(&frame) {
                    Ok(event) => dispatcher.dispatch(&event),
                    Err(e) => warn!("dropping undecodable event frame: {e}"),
                },
                Some(Err(e)) => {
                    error!("event bus read failed: {e}");
                    return Err(e.into());
                }
                None => {
                    info!("event bus closed");
                    return Ok(());
                }
            },
            _ = &mut shutdown => {
                debug!("event subscriber cancelled");
                return Ok(());
            }
        }
    }
}

/// The router worker binds the bus; give it a moment to come up.
async fn connect_bus(bus_path: &Path) -> Result<UnixStream, EventError> {
    let mut last_err = None;
    for _ in 0..BUS_CONNECT_ATTEMPTS {
        match UnixStream::connect(bus_path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                sleep(BUS_CONNECT_RETRY).await;
            }
        }
    }
    let err = last_err.unwrap_or_else(|| std::io::Error::other("bus connect never attempted"));
    error!("could not reach the event bus at {}: {err}", bus_path.display());
    Err(err.into())
}
