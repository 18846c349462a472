// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Argument parsing and the resolved manager configuration record.
//!
//! Every flag can also come from a `BACKEND_*` environment variable. The
//! rest of the workspace never touches clap: it consumes the resolved
//! [`ManagerConfig`] only.

#![deny(clippy::all)]

pub use clap::Parser;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("bad host:port pair '{0}': expected IP:PORT")]
    BadHostPort(String),
    #[error("bad port range '{0}': expected LO-HI with LO < HI")]
    BadPortRange(String),
}

/// An `IP:PORT` pair, as the etcd/redis/db address flags take it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HostPortPair {
    pub host: IpAddr,
    pub port: u16,
}

impl HostPortPair {
    #[must_use]
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }
}

impl FromStr for HostPortPair {
    type Err = ConfigError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::BadHostPort(input.to_string()))?;
        let host = host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::BadHostPort(input.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::BadHostPort(input.to_string()))?;
        Ok(Self { host, port })
    }
}

impl Display for HostPortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The contiguous half-open `[lo, hi)` range of agent-side TCP ports a
/// single instance may hand out to its kernels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortRange {
    lo: u16,
    hi: u16,
}

impl PortRange {
    pub fn new(lo: u16, hi: u16) -> Result<Self, ConfigError> {
        if lo >= hi {
            return Err(ConfigError::BadPortRange(format!("{lo}-{hi}")));
        }
        Ok(Self { lo, hi })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.hi - self.lo)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lo >= self.hi
    }

    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        (self.lo..self.hi).contains(&port)
    }

    /// Ports in ascending order; allocation takes the first free one.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.lo..self.hi
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self { lo: 5002, hi: 5010 }
    }
}

impl FromStr for PortRange {
    type Err = ConfigError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = input
            .split_once('-')
            .ok_or_else(|| ConfigError::BadPortRange(input.to_string()))?;
        let lo = lo
            .parse::<u16>()
            .map_err(|_| ConfigError::BadPortRange(input.to_string()))?;
        let hi = hi
            .parse::<u16>()
            .map_err(|_| ConfigError::BadPortRange(input.to_string()))?;
        Self::new(lo, hi)
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

/// Which kernel back-end this manager drives.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Local,
    Docker,
}

impl Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Local => write!(f, "local"),
            DriverKind::Docker => write!(f, "docker"),
        }
    }
}

/// Command-line arguments of the manager binary.
#[derive(Debug, Parser)]
#[command(
    name = "sorna-manager",
    about = "The Sorna API server: routes client requests to kernel agents and manages the instance pool."
)]
pub struct CmdArgs {
    /// The namespace of this cluster.
    #[arg(long, env = "BACKEND_NAMESPACE", default_value = "local")]
    pub namespace: String,

    /// The host:port pair of the etcd cluster or its proxy.
    #[arg(long, env = "BACKEND_ETCD_ADDR", default_value = "127.0.0.1:2379")]
    pub etcd_addr: HostPortPair,

    /// The private docker registry that caches the kernel images.
    #[arg(long, env = "BACKEND_DOCKER_REGISTRY", value_name = "URL")]
    pub docker_registry: Option<Url>,

    /// The TCP port number where the agent instances are listening on.
    #[arg(long, env = "BACKEND_AGENT_PORT", default_value_t = 6001)]
    pub agent_port: u16,

    /// The TCP port where worker agents push their event frames.
    #[arg(long, env = "BACKEND_EVENTS_PORT", default_value_t = 5010)]
    pub events_port: u16,

    /// The agent-side port range an instance allocates kernel ports from.
    #[arg(long, env = "BACKEND_AGENT_PORTS", default_value = "5002-5010")]
    pub agent_ports: PortRange,

    /// The hostname-port pair of a redis server.
    #[arg(long, env = "BACKEND_REDIS_ADDR", default_value = "127.0.0.1:6379")]
    pub redis_addr: HostPortPair,

    /// The hostname-port pair of a database server.
    #[arg(long, env = "BACKEND_DB_ADDR", default_value = "127.0.0.1:5432")]
    pub db_addr: HostPortPair,

    #[arg(long, env = "BACKEND_DB_NAME", default_value = "sorna")]
    pub db_name: String,

    #[arg(long, env = "BACKEND_DB_USER", default_value = "postgres")]
    pub db_user: String,

    #[arg(long, env = "BACKEND_DB_PASSWORD", default_value = "develove")]
    pub db_password: String,

    /// Which kernel back-end to drive.
    #[arg(long, value_enum, env = "BACKEND_KERNEL_DRIVER", default_value_t = DriverKind::Docker)]
    pub kernel_driver: DriverKind,

    /// Bind address of the manager RPC endpoint.
    #[arg(long, env = "BACKEND_RPC_ADDR", default_value = "0.0.0.0:5001")]
    pub rpc_addr: SocketAddr,

    /// The kernel agent program the local driver spawns.
    #[arg(long, env = "BACKEND_AGENT_PROGRAM", default_value = "sorna-agent")]
    pub agent_program: PathBuf,

    /// The container image the docker driver runs.
    #[arg(
        long,
        env = "BACKEND_KERNEL_IMAGE",
        default_value = "lablup-python-kernel:latest"
    )]
    pub kernel_image: String,

    /// Directory for runtime sockets (the local event bus lives here).
    #[arg(long, env = "BACKEND_RUNTIME_DIR", default_value = "/tmp")]
    pub runtime_dir: PathBuf,
}

/// The resolved configuration record the core consumes. The etcd, redis and
/// db knobs ride along for deployments that plug those services in; the
/// in-memory manager itself does not dial them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub namespace: String,
    pub etcd_addr: HostPortPair,
    pub docker_registry: Option<Url>,
    pub agent_port: u16,
    pub events_port: u16,
    pub agent_ports: PortRange,
    pub redis_addr: HostPortPair,
    pub db_addr: HostPortPair,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub kernel_driver: DriverKind,
    pub rpc_addr: SocketAddr,
    pub agent_program: PathBuf,
    pub kernel_image: String,
    pub runtime_dir: PathBuf,
}

impl ManagerConfig {
    /// Filesystem path of the local event bus socket
    /// (the `ipc://sorna.agent-events` endpoint).
    #[must_use]
    pub fn bus_path(&self) -> PathBuf {
        self.runtime_dir.join("sorna.agent-events")
    }

    /// Socket address the event router ingress binds.
    #[must_use]
    pub fn events_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.events_port)
    }
}

impl From<CmdArgs> for ManagerConfig {
    fn from(args: CmdArgs) -> Self {
        Self {
            namespace: args.namespace,
            etcd_addr: args.etcd_addr,
            docker_registry: args.docker_registry,
            agent_port: args.agent_port,
            events_port: args.events_port,
            agent_ports: args.agent_ports,
            redis_addr: args.redis_addr,
            db_addr: args.db_addr,
            db_name: args.db_name,
            db_user: args.db_user,
            db_password: args.db_password,
            kernel_driver: args.kernel_driver,
            rpc_addr: args.rpc_addr,
            agent_program: args.agent_program,
            kernel_image: args.kernel_image,
            runtime_dir: args.runtime_dir,
        }
    }
}
