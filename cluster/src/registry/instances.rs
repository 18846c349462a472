// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A table of worker instances, keyed by tag.

use crate::errors::ClusterError;
use crate::registry::Instance;
use ahash::RandomState;
use std::collections::HashMap;
#[allow(unused)]
use tracing::{debug, error, info};

/// Coordinator key under which an instance record is mirrored.
#[must_use]
pub fn instance_key(namespace: &str, tag: &str) -> String {
    format!("{namespace}/instances/{tag}")
}

/// The instance registry. The seeded hasher makes iteration order
/// deterministic within a process, which is what makes the placement
/// tie-break reproducible.
#[derive(Debug)]
pub struct InstanceTable {
    by_tag: HashMap<String, Instance, RandomState>,
}

#[allow(clippy::new_without_default)]
impl InstanceTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_tag: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn values(&self) -> impl Iterator<Item = &Instance> {
        self.by_tag.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Instance> {
        self.by_tag.values_mut()
    }

    /// Add an [`Instance`] to the table. Whether the agent port range can
    /// serve the instance's concurrency is the driver's call, checked at
    /// registration by [`Core::register_instance`](crate::Core::register_instance).
    pub fn add(&mut self, instance: Instance) -> Result<(), ClusterError> {
        if self.contains(&instance.tag) {
            error!(
                "Failed to add instance '{}': already registered",
                instance.tag
            );
            return Err(ClusterError::InstanceExists(instance.tag));
        }
        debug!(
            "Added instance '{}' at {} (max {} kernels)",
            instance.tag, instance.ip, instance.max_kernels
        );
        self.by_tag.insert(instance.tag.clone(), instance);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&Instance> {
        self.by_tag.get(tag)
    }

    #[must_use]
    pub fn get_mut(&mut self, tag: &str) -> Option<&mut Instance> {
        self.by_tag.get_mut(tag)
    }
}
