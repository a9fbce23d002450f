//! Builder wiring a complete scheduler stack from configuration.

use std::sync::Arc;

use chrono::TimeZone;

use crate::config::{IndexBackendConfig, SchedulerConfig, TriggerBackendConfig};
use crate::core::{
    ChainPolicy, ChainedScheduler, DurationCatalog, GlobalLimitGuard, IdentifierCodec, KeyValueStore,
    NotificationIndex, Reconciler, SchedulerDeps, SchedulerError, TriggerStore,
};
use crate::infra::{FileKeyValueStore, InMemoryKeyValueStore, InMemoryTriggerStore};
use crate::util::clock::Clock;

/// What the running platform supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// A platform trigger scheduler is present.
    pub native_triggers: bool,
}

/// Pick the trigger backend once at startup.
///
/// A requested native backend falls back to the in-memory store when the
/// platform lacks one.
pub fn select_backend(requested: TriggerBackendConfig, capabilities: BackendCapabilities) -> TriggerBackendConfig {
    match requested {
        TriggerBackendConfig::Native if !capabilities.native_triggers => {
            tracing::warn!("native trigger backend unavailable, using in-memory store");
            TriggerBackendConfig::InMemory
        }
        other => other,
    }
}

/// Fully wired components sharing one store, index and quota guard.
pub struct SchedulerStack<Tz>
where
    Tz: TimeZone,
{
    /// Configuration the stack was built from.
    pub config: SchedulerConfig,
    /// Selected trigger store.
    pub store: Arc<dyn TriggerStore>,
    /// Identifier index.
    pub index: Arc<NotificationIndex>,
    /// Chain scheduler.
    pub scheduler: ChainedScheduler,
    /// Refresh coordinator over the same scheduler.
    pub reconciler: Reconciler<Tz>,
}

/// Build a scheduler stack from configuration.
///
/// `native_factory` is only called when the native backend is selected.
pub fn build_stack<Tz, FN>(
    cfg: &SchedulerConfig,
    capabilities: BackendCapabilities,
    catalog: Arc<dyn DurationCatalog>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    native_factory: FN,
) -> Result<SchedulerStack<Tz>, SchedulerError>
where
    Tz: TimeZone + Send + Sync + 'static,
    FN: FnOnce(&SchedulerConfig) -> Result<Arc<dyn TriggerStore>, SchedulerError>,
{
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfiguration(format!("config invalid: {e}")))?;

    let backend = select_backend(cfg.trigger_backend, capabilities);
    let store: Arc<dyn TriggerStore> = match backend {
        TriggerBackendConfig::InMemory => {
            Arc::new(InMemoryTriggerStore::new().with_max_pending(cfg.limits.max_system_limit))
        }
        TriggerBackendConfig::Native => native_factory(cfg)?,
    };

    let kv: Arc<dyn KeyValueStore> = match &cfg.index {
        IndexBackendConfig::InMemory => Arc::new(InMemoryKeyValueStore::new()),
        IndexBackendConfig::File { path } => Arc::new(FileKeyValueStore::open(path)?),
    };
    let index = Arc::new(NotificationIndex::new(kv));
    let guard = Arc::new(GlobalLimitGuard::new(cfg.limits, Arc::clone(&store)));

    let scheduler = ChainedScheduler::new(
        SchedulerDeps {
            store: Arc::clone(&store),
            catalog,
            index: Arc::clone(&index),
            guard,
            clock,
        },
        ChainPolicy::new(cfg.chain.to_settings()),
    )
    .with_codec(IdentifierCodec::new(cfg.namespace.clone()));
    let reconciler = Reconciler::new(scheduler.clone(), tz);

    tracing::info!(
        "built scheduler stack: backend={:?} namespace={} threshold={}",
        backend,
        cfg.namespace,
        cfg.limits.available_threshold()
    );

    Ok(SchedulerStack {
        config: cfg.clone(),
        store,
        index,
        scheduler,
        reconciler,
    })
}
