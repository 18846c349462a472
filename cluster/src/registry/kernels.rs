// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A table of live kernels, keyed by kernel id.

use crate::errors::ClusterError;
use crate::registry::{Kernel, KernelId};
use ahash::RandomState;
use std::collections::HashMap;
#[allow(unused)]
use tracing::{debug, error, info};

/// Coordinator key under which a kernel record is mirrored.
#[must_use]
pub fn kernel_key(namespace: &str, id: &KernelId) -> String {
    format!("{namespace}/kernels/{id}")
}

/// The kernel registry. Written only by the lifecycle coordinator and by
/// event handlers that explicitly reap records.
#[derive(Debug)]
pub struct KernelTable {
    by_id: HashMap<KernelId, Kernel, RandomState>,
}

#[allow(clippy::new_without_default)]
impl KernelTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &KernelId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &Kernel> {
        self.by_id.values()
    }

    pub fn add(&mut self, kernel: Kernel) -> Result<(), ClusterError> {
        if self.contains(&kernel.id) {
            error!("Kernel id {} already recorded", kernel.id);
            return Err(ClusterError::KernelExists(kernel.id));
        }
        debug!(
            "Recorded kernel {} on instance '{}'",
            kernel.id, kernel.instance
        );
        self.by_id.insert(kernel.id.clone(), kernel);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &KernelId) -> Option<&Kernel> {
        self.by_id.get(id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: &KernelId) -> Option<&mut Kernel> {
        self.by_id.get_mut(id)
    }

    pub fn remove(&mut self, id: &KernelId) -> Option<Kernel> {
        let kernel = self.by_id.remove(id);
        if kernel.is_some() {
            debug!("Removed kernel {id} from the registry");
        }
        kernel
    }
}
