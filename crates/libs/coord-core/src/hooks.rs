//! In-process pub/sub for team lifecycle events.
//!
//! The subscriber set is the only process-global mutable state in this
//! crate (spec section 5, "Shared state"). Listener panics/errors are
//! swallowed so a bad subscriber can never abort a mutation path.

use crate::external::AnalyticsSink;
use crate::phase::Phase;
use std::sync::{Arc, OnceLock, RwLock};

#[derive(Debug, Clone)]
pub enum HookEvent {
    TeammateIdle {
        team: String,
        agent: String,
        summary: Option<String>,
    },
    TaskCompleted {
        team: String,
        task_id: String,
        subject: String,
    },
    PhaseTransition {
        team: String,
        from: Phase,
        to: Phase,
    },
}

impl HookEvent {
    fn analytics_event_name(&self) -> &'static str {
        match self {
            HookEvent::TeammateIdle { .. } => "team.teammate_idle",
            HookEvent::TaskCompleted { .. } => "team.task_completed",
            HookEvent::PhaseTransition { .. } => "team.phase_transition",
        }
    }

    fn distinct_id(&self) -> &str {
        match self {
            HookEvent::TeammateIdle { team, .. }
            | HookEvent::TaskCompleted { team, .. }
            | HookEvent::PhaseTransition { team, .. } => team,
        }
    }

    fn properties(&self) -> serde_json::Value {
        match self {
            HookEvent::TeammateIdle {
                agent, summary, ..
            } => serde_json::json!({ "agent": agent, "summary": summary }),
            HookEvent::TaskCompleted {
                task_id, subject, ..
            } => serde_json::json!({ "taskId": task_id, "subject": subject }),
            HookEvent::PhaseTransition { from, to, .. } => {
                serde_json::json!({ "from": from.to_string(), "to": to.to_string() })
            }
        }
    }
}

type Listener = Arc<dyn Fn(&HookEvent) + Send + Sync>;

fn registry() -> &'static RwLock<Vec<(u64, Listener)>> {
    static REGISTRY: OnceLock<RwLock<Vec<(u64, Listener)>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

fn next_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A handle that unsubscribes its listener when dropped.
pub struct Subscription(u64);

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut listeners) = registry().write() {
            listeners.retain(|(id, _)| *id != self.0);
        }
    }
}

/// Subscribe to every team hook event. Returns a guard that unsubscribes
/// on drop.
pub fn on_team_hook_event<F>(listener: F) -> Subscription
where
    F: Fn(&HookEvent) + Send + Sync + 'static,
{
    let id = next_id();
    if let Ok(mut listeners) = registry().write() {
        listeners.push((id, Arc::new(listener)));
    }
    Subscription(id)
}

/// Calls every subscriber with `event`, swallowing any panic a listener
/// raises so a crashing listener never aborts the caller's mutation path.
pub fn dispatch_team_hook_event(event: &HookEvent) {
    let listeners: Vec<Listener> = match registry().read() {
        Ok(guard) => guard.iter().map(|(_, l)| l.clone()).collect(),
        Err(_) => return,
    };
    for listener in listeners {
        let event = event.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            listener(&event);
        }));
        if result.is_err() {
            tracing::warn!("hook listener panicked; ignoring");
        }
    }
}

/// Dispatches the event to subscribers and forwards its analytics shadow
/// to `sink`.
pub fn emit(event: HookEvent, sink: &dyn AnalyticsSink) {
    let name = event.analytics_event_name();
    let distinct_id = event.distinct_id().to_string();
    let properties = event.properties();
    dispatch_team_hook_event(&event);
    sink.capture(name, &distinct_id, properties);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::NoopAnalyticsSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    #[serial_test::serial(hooks_registry)]
    fn test_dispatch_calls_subscriber() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = on_team_hook_event(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(
            HookEvent::TaskCompleted {
                team: "alpha".into(),
                task_id: "1".into(),
                subject: "do the thing".into(),
            },
            &NoopAnalyticsSink,
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial_test::serial(hooks_registry)]
    fn test_panicking_listener_is_swallowed() {
        let _sub = on_team_hook_event(|_event| panic!("boom"));
        let survivor_called = Arc::new(AtomicUsize::new(0));
        let survivor_clone = survivor_called.clone();
        let _sub2 = on_team_hook_event(move |_event| {
            survivor_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(
            HookEvent::TeammateIdle {
                team: "alpha".into(),
                agent: "dev-1".into(),
                summary: None,
            },
            &NoopAnalyticsSink,
        );

        assert_eq!(survivor_called.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial_test::serial(hooks_registry)]
    fn test_unsubscribe_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let sub = on_team_hook_event(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);

        emit(
            HookEvent::TeammateIdle {
                team: "alpha".into(),
                agent: "dev-1".into(),
                summary: None,
            },
            &NoopAnalyticsSink,
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
