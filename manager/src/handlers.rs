// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Default event handler registrations.
//!
//! Agents report in with `instance_heartbeat` and announce dead kernels
//! with `kernel_terminated`; both mutate the registries through the core's
//! explicit doorway.

use cluster::{Core, KernelId};
use events::EventDispatcher;
use std::sync::Arc;

pub fn default_dispatcher(core: Arc<Core>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    {
        let core = Arc::clone(&core);
        dispatcher.add_immediate_handler("instance_heartbeat", move |agent_id, _args| {
            core.touch_instance_heartbeat(agent_id);
            Ok(())
        });
    }
    dispatcher.add_task_handler("kernel_terminated", move |_agent_id, args| {
        let core = Arc::clone(&core);
        async move {
            let (kernel_id,): (String,) = rmp_serde::from_slice(&args)?;
            core.reap_kernel(&KernelId::from(kernel_id.as_str()))?;
            Ok(())
        }
    });
    dispatcher
}
