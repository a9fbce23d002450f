//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use alarm_chain_scheduler::core::{
    AuthorizationStatus, ChainPolicy, ChainSettings, ChainedScheduler, DeliveredTrigger, GlobalLimitConfig,
    GlobalLimitGuard, NotificationIndex, SchedulerDeps, SchedulerError, TriggerRequest, TriggerStore,
};
use alarm_chain_scheduler::infra::{InMemoryKeyValueStore, InMemoryTriggerStore, StaticDurationCatalog};
use alarm_chain_scheduler::util::{Clock, ManualClock};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

/// Monday 2025-01-06 06:00:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 6, 0, 0).unwrap()
}

/// "chimes" is 27 s long, "beep" has no known length.
pub fn catalog() -> StaticDurationCatalog {
    StaticDurationCatalog::new()
        .with_sound("chimes", "chimes.caf", Some(27))
        .with_sound("beep", "beep.caf", None)
}

/// In-memory store whose submissions take a little while, so concurrent
/// callers really overlap.
pub struct SlowStore {
    pub inner: InMemoryTriggerStore,
    pub delay: StdDuration,
}

#[async_trait]
impl TriggerStore for SlowStore {
    async fn authorization(&self) -> AuthorizationStatus {
        self.inner.authorization().await
    }

    async fn submit(&self, request: TriggerRequest) -> Result<(), SchedulerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.submit(request).await
    }

    async fn list_pending(&self) -> Result<Vec<String>, SchedulerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_pending().await
    }

    async fn remove(&self, identifiers: &[String]) -> Result<(), SchedulerError> {
        self.inner.remove(identifiers).await
    }

    async fn list_delivered(&self) -> Result<Vec<DeliveredTrigger>, SchedulerError> {
        self.inner.list_delivered().await
    }
}

pub struct Harness<S> {
    pub store: Arc<S>,
    pub kv: Arc<InMemoryKeyValueStore>,
    pub index: Arc<NotificationIndex>,
    pub guard: Arc<GlobalLimitGuard>,
    pub clock: Arc<ManualClock>,
    pub scheduler: ChainedScheduler,
}

pub fn harness_with<S>(store: S, settings: ChainSettings, limits: GlobalLimitConfig) -> Harness<S>
where
    S: TriggerStore + 'static,
{
    let store = Arc::new(store);
    let dyn_store: Arc<dyn TriggerStore> = store.clone();
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let index = Arc::new(NotificationIndex::new(kv.clone()));
    let guard = Arc::new(GlobalLimitGuard::new(limits, dyn_store.clone()));
    let clock = Arc::new(ManualClock::new(t0()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let scheduler = ChainedScheduler::new(
        SchedulerDeps {
            store: dyn_store,
            catalog: Arc::new(catalog()),
            index: index.clone(),
            guard: guard.clone(),
            clock: dyn_clock,
        },
        ChainPolicy::new(settings),
    );

    Harness {
        store,
        kv,
        index,
        guard,
        clock,
        scheduler,
    }
}

pub fn harness(settings: ChainSettings, limits: GlobalLimitConfig) -> Harness<InMemoryTriggerStore> {
    harness_with(InMemoryTriggerStore::new(), settings, limits)
}

pub fn default_harness() -> Harness<InMemoryTriggerStore> {
    harness(ChainSettings::default(), GlobalLimitConfig::default())
}

pub fn slow_harness(settings: ChainSettings, limits: GlobalLimitConfig) -> Harness<SlowStore> {
    harness_with(
        SlowStore {
            inner: InMemoryTriggerStore::new(),
            delay: StdDuration::from_millis(5),
        },
        settings,
        limits,
    )
}
