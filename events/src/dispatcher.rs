// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The event dispatcher: an ordered table of handler chains keyed by event
//! name.

use ahash::RandomState;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use wire::EventFrame;

/// What a handler reports back. Errors are logged and swallowed; they never
/// abort the subscriber.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type ImmediateFn = Box<dyn Fn(&str, &[u8]) -> HandlerResult + Send + Sync>;
type TaskFn = Box<
    dyn Fn(String, Vec<u8>) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync,
>;

/// A registered handler. Immediate handlers run to completion on the
/// subscriber's scheduler; task handlers are spawned as independent tasks
/// and never awaited by the subscriber.
pub enum EventHandler {
    Immediate(ImmediateFn),
    Task(TaskFn),
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("EventHandler::Immediate"),
            Self::Task(_) => f.write_str("EventHandler::Task"),
        }
    }
}

/// Handler chains in registration order, per event name. Dispatch for one
/// event name happens in arrival order; nothing is ordered across names.
#[derive(Debug)]
pub struct EventDispatcher {
    handlers: HashMap<String, Vec<EventHandler>, RandomState>,
    unknown_dropped: AtomicU64,
}

#[allow(clippy::new_without_default)]
impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::with_hasher(RandomState::with_seed(0)),
            unknown_dropped: AtomicU64::new(0),
        }
    }

    /// Append an immediate handler to the chain for `event_name`.
    pub fn add_immediate_handler<F>(&mut self, event_name: &str, handler: F)
    where
        F: Fn(&str, &[u8]) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers
            .entry(event_name.to_string())
            .or_default()
            .push(EventHandler::Immediate(Box::new(handler)));
    }

    /// Append a task handler to the chain for `event_name`. The closure
    /// receives the agent id and the opaque args blob and returns the
    /// future to run.
    pub fn add_task_handler<F, Fut>(&mut self, event_name: &str, handler: F)
    where
        F: Fn(String, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let wrapped: TaskFn = Box::new(move |agent_id, args| Box::pin(handler(agent_id, args)));
        self.handlers
            .entry(event_name.to_string())
            .or_default()
            .push(EventHandler::Task(wrapped));
    }

    #[must_use]
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers.get(event_name).map_or(0, Vec::len)
    }

    /// Events nobody registered for, counted and dropped.
    #[must_use]
    pub fn unknown_dropped(&self) -> u64 {
        self.unknown_dropped.load(Ordering::Relaxed)
    }

    /// Walk the handler chain for one event. Must run inside a runtime;
    /// task handlers are spawned onto it.
    pub fn dispatch(&self, event: &EventFrame) {
        let Some(chain) = self.handlers.get(&event.name) else {
            let dropped = self.unknown_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                "no handler for event '{}' from {} ({dropped} dropped so far)",
                event.name, event.agent_id
            );
            return;
        };
        debug!("DISPATCH({}/{})", event.name, event.agent_id);
        for handler in chain {
            match handler {
                EventHandler::Immediate(run) => {
                    if let Err(e) = run(&event.agent_id, &event.args) {
                        warn!("handler for '{}' failed: {e}", event.name);
                    }
                }
                EventHandler::Task(make) => {
                    let task = make(event.agent_id.clone(), event.args.clone());
                    let name = event.name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = task.await {
                            warn!("handler task for '{name}' failed: {e}");
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn frame(name: &str, agent_id: &str) -> EventFrame {
        EventFrame::new(name, agent_id, vec![])
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            dispatcher.add_immediate_handler("instance_heartbeat", move |_, _| {
                log.lock().unwrap().push(tag);
                Ok(())
            });
        }
        dispatcher.dispatch(&frame("instance_heartbeat", "a"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn a_failing_handler_does_not_stop_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_immediate_handler("kernel_terminated", |_, _| Err("boom".into()));
        {
            let log = Arc::clone(&log);
            dispatcher.add_immediate_handler("kernel_terminated", move |agent_id, _| {
                log.lock().unwrap().push(agent_id.to_string());
                Ok(())
            });
        }
        dispatcher.dispatch(&frame("kernel_terminated", "a"));
        assert_eq!(*log.lock().unwrap(), vec!["a".to_string()]);
        assert!(logs_contain("handler for 'kernel_terminated' failed: boom"));
    }

    #[tokio::test]
    async fn task_handlers_run_without_being_awaited() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        {
            let log = Arc::clone(&log);
            dispatcher.add_task_handler("kernel_terminated", move |agent_id, _| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(agent_id);
                    Ok(())
                }
            });
        }
        dispatcher.dispatch(&frame("kernel_terminated", "a"));
        // The task was spawned, not awaited; give it a beat to run.
        for _ in 0..50 {
            if !log.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*log.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn unknown_events_are_counted_and_dropped() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(&frame("never_registered", "a"));
        dispatcher.dispatch(&frame("never_registered", "b"));
        assert_eq!(dispatcher.unknown_dropped(), 2);
    }

    #[tokio::test]
    async fn handler_count_reflects_registration() {
        let mut dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.handler_count("instance_heartbeat"), 0);
        dispatcher.add_immediate_handler("instance_heartbeat", |_, _| Ok(()));
        dispatcher.add_task_handler("instance_heartbeat", |_, _| async { Ok(()) });
        assert_eq!(dispatcher.handler_count("instance_heartbeat"), 2);
    }
}
