// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory catalogs of worker instances and live kernels.
//!
//! Nothing here persists; a deployment that plugs a coordinator in mirrors
//! the records under the keys produced by [`instance_key`] and
//! [`kernel_key`].

mod instance;
mod instances;
mod kernel;
mod kernels;

pub use instance::Instance;
pub use instances::{InstanceTable, instance_key};
pub use kernel::{DEFAULT_KERNEL_SPEC, Kernel, KernelHandle, KernelId, KernelState};
pub use kernels::{KernelTable, kernel_key};
