// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The manager binary: wires the cluster core, the event plane and the
//! request server together on one current-thread scheduler.

#![deny(clippy::all)]

mod handlers;

use cluster::{Core, Instance};
use config::{CmdArgs, ManagerConfig, Parser};
use events::{event_subscriber, spawn_router};
use std::net::{IpAddr, Ipv4Addr};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = ManagerConfig::from(args);
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Tokio runtime creation failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    match rt.block_on(run(config)) {
        Ok(()) => {
            info!("Exit.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ManagerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let core = Arc::new(Core::new(&config));
    // The seed pool: one local instance. Deployments with a coordinator
    // register their fleet through it instead.
    core.register_instance(Instance::new("test", IpAddr::V4(Ipv4Addr::LOCALHOST)))?;

    let router = spawn_router(config.events_addr(), config.bus_path())?;
    let dispatcher = Arc::new(handlers::default_dispatcher(Arc::clone(&core)));
    let (subscriber_stop, subscriber_stop_rx) = oneshot::channel();
    let bus_path = config.bus_path();
    let subscriber = tokio::spawn(async move {
        if let Err(e) = event_subscriber(&bus_path, dispatcher, subscriber_stop_rx).await {
            error!("event subscriber died: {e}");
        }
    });

    let listener = mgmt::bind(config.rpc_addr).await?;
    info!("Started serving... (driver: {})", config.kernel_driver);

    let mut sigterm = signal(SignalKind::terminate())?;
    let (server_stop, server_stop_rx) = oneshot::channel();
    tokio::select! {
        result = mgmt::serve(Arc::clone(&core), listener, server_stop_rx) => result?,
        _ = sigterm.recv() => info!("Got SIGTERM, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    // In-flight lifecycle tasks are abandoned; the sockets close here.
    let _ = server_stop.send(());
    let _ = subscriber_stop.send(());
    let _ = subscriber.await;
    router.shutdown();
    Ok(())
}
