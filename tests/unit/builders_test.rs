//! Tests for builder modules

use std::sync::Arc;

use alarm_chain_scheduler::builders::{build_stack, select_backend, BackendCapabilities};
use alarm_chain_scheduler::config::{SchedulerConfig, TriggerBackendConfig};
use alarm_chain_scheduler::core::{GlobalLimitConfig, SchedulerError, TriggerStore};
use alarm_chain_scheduler::infra::{InMemoryTriggerStore, StaticDurationCatalog};
use alarm_chain_scheduler::util::SystemClock;
use chrono::Utc;

#[test]
fn test_select_backend() {
    let native = BackendCapabilities { native_triggers: true };
    let legacy = BackendCapabilities::default();
    assert_eq!(select_backend(TriggerBackendConfig::Native, native), TriggerBackendConfig::Native);
    assert_eq!(select_backend(TriggerBackendConfig::Native, legacy), TriggerBackendConfig::InMemory);
    assert_eq!(select_backend(TriggerBackendConfig::InMemory, native), TriggerBackendConfig::InMemory);
}

#[test]
fn test_build_in_memory_stack_skips_factory() {
    let stack = build_stack(
        &SchedulerConfig::default(),
        BackendCapabilities::default(),
        Arc::new(StaticDurationCatalog::new()),
        Arc::new(SystemClock),
        Utc,
        |_| Err(SchedulerError::Store("factory must not run".into())),
    )
    .unwrap();
    assert_eq!(stack.scheduler.codec().namespace(), "alarm");
    assert_eq!(stack.scheduler.guard().config().available_threshold(), 60);
}

#[test]
fn test_build_native_stack_uses_factory() {
    let cfg = SchedulerConfig {
        trigger_backend: TriggerBackendConfig::Native,
        namespace: "wake".into(),
        ..SchedulerConfig::default()
    };
    let platform = Arc::new(InMemoryTriggerStore::new());
    let stack = build_stack(
        &cfg,
        BackendCapabilities { native_triggers: true },
        Arc::new(StaticDurationCatalog::new()),
        Arc::new(SystemClock),
        Utc,
        |_| Ok(platform.clone() as Arc<dyn TriggerStore>),
    )
    .unwrap();
    assert!(Arc::ptr_eq(&stack.store, &(platform as Arc<dyn TriggerStore>)));
    assert_eq!(stack.scheduler.codec().namespace(), "wake");
}

#[test]
fn test_build_rejects_invalid_config() {
    let cfg = SchedulerConfig {
        limits: GlobalLimitConfig {
            max_system_limit: 2,
            safety_buffer: 5,
        },
        ..SchedulerConfig::default()
    };
    let result = build_stack(
        &cfg,
        BackendCapabilities::default(),
        Arc::new(StaticDurationCatalog::new()),
        Arc::new(SystemClock),
        Utc,
        |_| Err(SchedulerError::Store("unused".into())),
    );
    assert!(matches!(result, Err(SchedulerError::InvalidConfiguration(_))));
}
