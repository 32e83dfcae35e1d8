//! Shared test utilities for the toggle store.
//!
//! This module provides contexts over an in-memory store, a store that fails
//! writes on demand, and a hook handler that forwards events to a channel.

use crate::{
    config::categories::CategoryConfig,
    context::ToggleContext,
    core::{
        application::add_application,
        category::CategoryRegistry,
        hooks::{HookDispatcher, HookHandler},
    },
    errors::{Error, Result},
    models::{HookEvent, User},
    store::{KeyValueStore, MemoryStore},
};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; later calls are ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Category 1: `dev`, `qa`, `prod`. Category 2: `eu`, `us`.
pub fn sample_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig {
            id: 1,
            columns: vec!["dev".to_string(), "qa".to_string(), "prod".to_string()],
        },
        CategoryConfig {
            id: 2,
            columns: vec!["eu".to_string(), "us".to_string()],
        },
    ]
}

/// The user test mutations are attributed to.
pub fn actor() -> User {
    User::named("tester")
}

fn context_over(store: Arc<dyn KeyValueStore>, hooks: HookDispatcher) -> Result<ToggleContext> {
    init_test_tracing();
    let categories = CategoryRegistry::from_config(&sample_categories())?;
    Ok(ToggleContext::new(store, categories, hooks))
}

/// Context over an empty in-memory store with the sample categories and no hooks.
pub fn setup_test_context() -> Result<ToggleContext> {
    context_over(Arc::new(MemoryStore::new()), HookDispatcher::new())
}

/// Same as [`setup_test_context`] with one application already registered.
pub async fn setup_with_application(name: &str) -> Result<ToggleContext> {
    let ctx = setup_test_context()?;
    add_application(&ctx, &actor(), name).await?;
    Ok(ctx)
}

/// Context over a [`FaultyStore`] with `myapp` registered.
pub async fn faulty_context(store: Arc<FaultyStore>) -> Result<ToggleContext> {
    let ctx = context_over(store, HookDispatcher::new())?;
    add_application(&ctx, &actor(), "myapp").await?;
    Ok(ctx)
}

/// Context over a [`GatedStore`] with `myapp` registered.
pub async fn gated_context(store: Arc<GatedStore>) -> Result<ToggleContext> {
    let ctx = context_over(store, HookDispatcher::new())?;
    add_application(&ctx, &actor(), "myapp").await?;
    Ok(ctx)
}

/// Context whose hook events are forwarded to the returned receiver, with `myapp` registered.
pub async fn recording_context() -> Result<(ToggleContext, mpsc::UnboundedReceiver<HookEvent>)> {
    let (recorder, events) = RecordingHook::new();
    let hooks = HookDispatcher::new().with_handler(Arc::new(recorder));
    let ctx = context_over(Arc::new(MemoryStore::new()), hooks)?;
    add_application(&ctx, &actor(), "myapp").await?;
    Ok((ctx, events))
}

/// Waits up to a second for the next dispatched hook event.
pub async fn next_hook_event(events: &mut mpsc::UnboundedReceiver<HookEvent>) -> Option<HookEvent> {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .ok()
        .flatten()
}

/// Hook handler forwarding every event to a channel.
pub struct RecordingHook {
    sender: mpsc::UnboundedSender<HookEvent>,
}

impl RecordingHook {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HookEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl HookHandler for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run(&self, event: &HookEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|e| Error::StoreUnavailable {
                message: e.to_string(),
            })
    }
}

/// In-memory store whose writes to selected keys fail with `StoreUnavailable`.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: RwLock<HashSet<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later write or delete of `key` fails.
    pub async fn fail_writes_to(&self, key: &str) {
        self.failing.write().await.insert(key.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    async fn check(&self, key: &str) -> Result<()> {
        if self.failing.read().await.contains(key) {
            return Err(Error::StoreUnavailable {
                message: format!("injected failure writing {key}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check(key).await?;
        self.inner.set(key, value).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        self.inner.hash_get_all(key).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check(key).await?;
        self.inner.hash_set(key, field, value).await
    }

    async fn hash_set_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.check(key).await?;
        self.inner.hash_set_multiple(key, fields).await
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<usize> {
        self.check(key).await?;
        self.inner.list_push_left(key, value).await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.inner.list_range(key, start, stop).await
    }

    async fn list_remove(&self, key: &str, count: isize, value: &str) -> Result<usize> {
        self.check(key).await?;
        self.inner.list_remove(key, count, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check(key).await?;
        self.inner.delete(key).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys_matching(pattern).await
    }
}

/// In-memory store that can park one hash read until the test releases it.
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryStore,
    gated_key: Mutex<Option<String>>,
    reached: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `hash_get_all` of `key` waits for [`GatedStore::open`].
    pub async fn gate_next_read(&self, key: &str) {
        *self.gated_key.lock().await = Some(key.to_string());
    }

    /// Resolves once a reader is parked at the gate.
    pub async fn wait_for_reader(&self) {
        self.reached.notified().await;
    }

    /// Lets the parked reader continue.
    pub fn open(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let gated = {
            let mut gated_key = self.gated_key.lock().await;
            if gated_key.as_deref() == Some(key) {
                gated_key.take().is_some()
            } else {
                false
            }
        };
        if gated {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.hash_get_all(key).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.inner.hash_set(key, field, value).await
    }

    async fn hash_set_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.inner.hash_set_multiple(key, fields).await
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<usize> {
        self.inner.list_push_left(key, value).await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.inner.list_range(key, start, stop).await
    }

    async fn list_remove(&self, key: &str, count: isize, value: &str) -> Result<usize> {
        self.inner.list_remove(key, count, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys_matching(pattern).await
    }
}
