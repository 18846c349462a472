// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A live kernel record.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tokio::process::Child;

/// Runtime flavor a kernel hosts unless a request says otherwise.
pub const DEFAULT_KERNEL_SPEC: &str = "python34";

/// Globally unique kernel id, composed as `<driver-tag>/<local-id>`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct KernelId(String);

impl KernelId {
    #[must_use]
    pub fn local(unique: &str) -> Self {
        Self(format!("local/{unique}"))
    }

    #[must_use]
    pub fn docker(container_id: &str) -> Self {
        Self(format!("docker/{container_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The driver tag in front of the first `/`, if the id has one.
    #[must_use]
    pub fn driver_tag(&self) -> Option<&str> {
        self.0.split_once('/').map(|(tag, _)| tag)
    }
}

impl From<&str> for KernelId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for KernelId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a kernel is on its way from placement to teardown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KernelState {
    Placing,
    Spawned,
    Probing,
    Ready,
    Destroying,
    Failed,
}

/// The driver-private back-end handle. Owned exclusively by the kernel
/// record and released on destroy; nothing outside the driver looks inside.
#[derive(Debug)]
pub enum KernelHandle {
    Process(Child),
    Container { id: String },
}

/// A kernel the manager placed and tracks. The instance field is a
/// non-owning back-reference by tag; the instance record outlives its
/// kernels.
#[derive(Debug)]
pub struct Kernel {
    pub id: KernelId,
    pub instance: String,
    pub spec: String,
    pub agent_sock: String,
    pub agent_port: u16,
    pub stdin_sock: Option<String>,
    pub stdout_sock: Option<String>,
    pub stderr_sock: Option<String>,
    pub state: KernelState,
    pub handle: KernelHandle,
}
