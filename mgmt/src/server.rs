// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Accepts client connections and serves manager RPC frames.
//!
//! Frames on one connection are served strictly serially and replied to in
//! request order; connections are independent of each other. Everything a
//! client can cause is converted to a response here: an undecodable frame
//! becomes INVALID_INPUT and the coordinator maps its own failures before
//! they reach this loop.

use cluster::{Core, lifecycle};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use wire::{ManagerReply, ManagerRequest, ManagerResponse};

pub const MSG_BAD_REQUEST: &str = "Malformed request.";

pub async fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Serve manager RPC until `shutdown` fires or the listener dies.
pub async fn serve(
    core: Arc<Core>,
    listener: TcpListener,
    mut shutdown: oneshot::Receiver<()>,
) -> io::Result<()> {
    info!("Serving manager RPC on {}", listener.local_addr()?);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("client connected from {peer}");
                    let core = Arc::clone(&core);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(&core, stream).await {
                            debug!("client {peer} connection ended: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("manager RPC accept failed: {e}");
                    return Err(e);
                }
            },
            _ = &mut shutdown => {
                info!("manager RPC server stopping");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(core: &Core, stream: TcpStream) -> io::Result<()> {
    let mut framed = wire::framed(stream);
    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let response = match wire::decode::<ManagerRequest>(&frame) {
            Ok(request) => lifecycle::handle_request(core, request).await,
            Err(e) => {
                warn!("rejecting undecodable request frame: {e}");
                ManagerResponse::new(ManagerReply::InvalidInput, "", MSG_BAD_REQUEST)
            }
        };
        match wire::encode(&response) {
            Ok(bytes) => framed.send(bytes).await?,
            Err(e) => {
                // A response that cannot encode leaves the REP contract
                // unsatisfiable; drop the connection.
                error!("failed to encode response: {e}");
                break;
            }
        }
    }
    Ok(())
}
