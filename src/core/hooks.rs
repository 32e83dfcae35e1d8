//! Hook dispatch - best-effort notifications after a mutation succeeded.
//!
//! Each dispatched event is delivered on its own spawned task, after the primary
//! write returned. Handler failures are logged and never reach the caller of the
//! mutation. Deliveries still running can be awaited with [`HookDispatcher::drain`]
//! before the runtime shuts down.

use crate::{errors::Result, models::HookEvent};
use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Receiver of post-mutation events (cache invalidation, webhooks, ...).
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the dispatcher.
    async fn run(&self, event: &HookEvent) -> Result<()>;
}

/// Handler that writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHook;

#[async_trait]
impl HookHandler for LogHook {
    fn name(&self) -> &str {
        "log"
    }

    async fn run(&self, event: &HookEvent) -> Result<()> {
        info!(
            hook = %event.function,
            user = %event.user.name,
            application = %event.application_name,
            feature = %event.feature_name,
            toggle = ?event.toggle_name,
            value = ?event.value,
            "feature hook"
        );
        Ok(())
    }
}

/// Fans events out to the registered handlers.
///
/// Clones share the set of in-flight deliveries; dropping the last clone aborts
/// whatever is still running.
#[derive(Clone, Default)]
pub struct HookDispatcher {
    handlers: Vec<Arc<dyn HookHandler>>,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HookDispatcher {
    /// Dispatcher with no handlers; events are dropped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler; handlers run in registration order.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn HookHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Fire-and-forget delivery of `event` to every handler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, event: HookEvent) {
        if self.handlers.is_empty() {
            debug!(hook = %event.function, "no hook handlers registered");
            return;
        }
        let handlers = self.handlers.clone();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished deliveries so the set only holds running ones.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            for handler in handlers {
                if let Err(e) = handler.run(&event).await {
                    error!(
                        handler = handler.name(),
                        hook = %event.function,
                        "hook delivery failed: {}",
                        e
                    );
                }
            }
        });
    }

    /// Waits up to `limit` for deliveries still in flight. Returns how many were
    /// abandoned when the limit expired.
    pub async fn drain(&self, limit: Duration) -> usize {
        let mut pending =
            std::mem::take(&mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
        let finished = tokio::time::timeout(limit, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            warn!(
                abandoned = pending.len(),
                "hook deliveries still running at shutdown"
            );
        }
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::models::User;
    use crate::test_utils::{RecordingHook, next_hook_event};

    struct FailingHook;

    #[async_trait]
    impl HookHandler for FailingHook {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _event: &HookEvent) -> Result<()> {
            Err(Error::StoreUnavailable {
                message: "webhook endpoint down".to_string(),
            })
        }
    }

    fn event() -> HookEvent {
        HookEvent {
            function: "deleteFeature".to_string(),
            user: User::anonymous(),
            application_name: "myapp".to_string(),
            feature_name: "dark-mode".to_string(),
            toggle_name: None,
            value: None,
        }
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_later_handlers() {
        let (recorder, mut events) = RecordingHook::new();
        let dispatcher = HookDispatcher::new()
            .with_handler(Arc::new(FailingHook))
            .with_handler(Arc::new(recorder));

        dispatcher.dispatch(event());

        let delivered = next_hook_event(&mut events).await;
        assert_eq!(delivered, Some(event()));
    }

    /// Handler that needs a while before the event is delivered.
    struct SlowHook(RecordingHook);

    #[async_trait]
    impl HookHandler for SlowHook {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, event: &HookEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.run(event).await
        }
    }

    #[tokio::test]
    async fn test_drain_waits_for_slow_deliveries() {
        let (recorder, mut events) = RecordingHook::new();
        let dispatcher = HookDispatcher::new().with_handler(Arc::new(SlowHook(recorder)));

        dispatcher.dispatch(event());
        dispatcher.dispatch(event());

        assert_eq!(dispatcher.drain(Duration::from_secs(1)).await, 0);
        assert_eq!(events.try_recv().ok(), Some(event()));
        assert_eq!(events.try_recv().ok(), Some(event()));
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_limit() {
        let (recorder, _events) = RecordingHook::new();
        let dispatcher = HookDispatcher::new().with_handler(Arc::new(SlowHook(recorder)));

        dispatcher.dispatch(event());
        assert_eq!(dispatcher.drain(Duration::from_millis(5)).await, 1);
    }

    #[tokio::test]
    async fn test_dispatch_without_handlers_is_a_no_op() {
        let dispatcher = HookDispatcher::new();
        assert_eq!(dispatcher.handler_count(), 0);
        dispatcher.dispatch(event());
    }

    #[tokio::test]
    async fn test_log_hook_accepts_events() -> Result<()> {
        LogHook.run(&event()).await
    }
}
