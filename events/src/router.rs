// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The event router worker.
//!
//! Runs on its own OS thread with its own current-thread runtime and shares
//! nothing with the manager scheduler: worker agents push frames into the
//! TCP ingress, the router forwards them byte-for-byte onto the local bus
//! socket the subscriber reads. Terminal errors kill the worker only; a
//! supervisor may restart it.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, oneshot};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use wire::framed;

/// How long a shutting-down router keeps forwarding queued frames.
pub const BUS_LINGER: Duration = Duration::from_millis(50);

const FORWARD_QUEUE_DEPTH: usize = 1024;

/// Handle on a running router worker. Dropping it signals shutdown;
/// [`shutdown`](RouterHandle::shutdown) also waits for the worker to drain
/// and exit.
#[derive(Debug)]
pub struct RouterHandle {
    /// The ingress address actually bound (resolves port 0 binds).
    pub local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl RouterHandle {
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("event router worker panicked");
            }
        }
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Start the router worker: bind the TCP ingress and the unix-domain bus
/// socket, then proxy frames from the former to the latter until shutdown.
pub fn spawn_router(ingress: SocketAddr, bus_path: PathBuf) -> io::Result<RouterHandle> {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<io::Result<SocketAddr>>();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name("event-router".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            rt.block_on(async move {
                let listener = match TcpListener::bind(ingress).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Replace a stale bus socket left over from a dead worker.
                if bus_path.exists() {
                    let _ = std::fs::remove_file(&bus_path);
                }
                let bus = match UnixListener::bind(&bus_path) {
                    Ok(bus) => bus,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let local_addr = match listener.local_addr() {
                    Ok(addr) => addr,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(local_addr));
                info!("Event router up: ingress {local_addr}, bus {}", bus_path.display());
                run(listener, bus, shutdown_rx).await;
                let _ = std::fs::remove_file(&bus_path);
                info!("Event router stopped");
            });
        })?;

    match ready_rx.recv() {
        Ok(Ok(local_addr)) => Ok(RouterHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(io::Error::other("event router died during startup"))
        }
    }
}

async fn run(listener: TcpListener, bus: UnixListener, mut shutdown: oneshot::Receiver<()>) {
    let (tx, mut rx) = mpsc::channel::<Bytes>(FORWARD_QUEUE_DEPTH);

    // Fan ingress connections into one frame queue.
    let ingress = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("agent event stream connected from {peer}");
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let mut framed = framed(stream);
                        while let Some(frame) = framed.next().await {
                            match frame {
                                Ok(frame) => {
                                    if tx.send(frame.freeze()).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    warn!("dropping agent event stream from {peer}: {e}");
                                    return;
                                }
                            }
                        }
                        debug!("agent event stream from {peer} closed");
                    });
                }
                Err(e) => {
                    error!("event ingress accept failed: {e}");
                    return;
                }
            }
        }
    });

    // Forward queued frames to whichever subscriber is connected.
    'accept: loop {
        let stream = tokio::select! {
            accepted = bus.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!("event bus accept failed: {e}");
                    break 'accept;
                }
            },
            _ = &mut shutdown => break 'accept,
        };
        debug!("event subscriber connected");
        let mut sink = framed(stream);
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            warn!("event subscriber went away: {e}");
                            continue 'accept;
                        }
                    }
                    None => break 'accept,
                },
                _ = &mut shutdown => {
                    drain(&mut rx, &mut sink).await;
                    break 'accept;
                }
            }
        }
    }
    ingress.abort();
}

/// Best-effort forwarding of already-queued frames, bounded by the linger.
async fn drain<S>(rx: &mut mpsc::Receiver<Bytes>, sink: &mut S)
where
    S: futures::Sink<Bytes> + Unpin,
{
    let _ = tokio::time::timeout(BUS_LINGER, async {
        while let Ok(frame) = rx.try_recv() {
            if sink.send(frame).await.is_err() {
                return;
            }
        }
        let _ = sink.flush().await;
    })
    .await;
}
