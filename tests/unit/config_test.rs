//! Tests for configuration parsing and validation

use alarm_chain_scheduler::config::{ChainSettingsConfig, IndexBackendConfig, SchedulerConfig, TriggerBackendConfig};
use alarm_chain_scheduler::core::GlobalLimitConfig;

#[test]
fn test_defaults_are_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.namespace, "alarm");
    assert_eq!(cfg.limits.available_threshold(), 60);
    assert_eq!(cfg.index, IndexBackendConfig::InMemory);
    assert_eq!(cfg.trigger_backend, TriggerBackendConfig::InMemory);
}

#[test]
fn test_settings_are_clamped() {
    let raw = ChainSettingsConfig {
        max_chain_count: 500,
        ring_window_sec: 5,
        fallback_spacing_sec: 0,
        min_lead_time_sec: 100,
        cleanup_grace_sec: -3,
    };
    let settings = raw.to_settings();
    assert_eq!(settings.max_chain_count(), 50);
    assert_eq!(settings.ring_window_secs(), 30);
    assert_eq!(settings.fallback_spacing_secs(), 1);
    assert_eq!(settings.min_lead_time_secs(), 30);
    assert_eq!(settings.cleanup_grace_secs(), 30);
}

#[test]
fn test_from_json_partial() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "chain": { "max_chain_count": 5 },
            "limits": { "max_system_limit": 32 },
            "index": { "kind": "file", "path": "/tmp/alarm-index.json" },
            "trigger_backend": "native"
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.chain.max_chain_count, 5);
    assert_eq!(cfg.chain.ring_window_sec, 300);
    assert_eq!(cfg.limits.max_system_limit, 32);
    assert_eq!(cfg.limits.safety_buffer, 4);
    assert_eq!(cfg.trigger_backend, TriggerBackendConfig::Native);
    assert!(matches!(cfg.index, IndexBackendConfig::File { .. }));
}

#[test]
fn test_from_json_rejects_bad_limits() {
    let err = SchedulerConfig::from_json_str(r#"{ "limits": { "max_system_limit": 4, "safety_buffer": 4 } }"#)
        .unwrap_err();
    assert!(err.contains("limits invalid"));
}

#[test]
fn test_from_json_rejects_garbage() {
    assert!(SchedulerConfig::from_json_str("{ not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_namespace_validation() {
    let mut cfg = SchedulerConfig::default();
    cfg.namespace = String::new();
    assert!(cfg.validate().is_err());
    cfg.namespace = "a-occ-b".into();
    assert!(cfg.validate().is_err());
    cfg.namespace = "timer".into();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_limit_config_validation() {
    let bad = GlobalLimitConfig {
        max_system_limit: 0,
        safety_buffer: 0,
    };
    assert!(bad.validate().is_err());
}

#[test]
fn test_from_env() {
    std::env::set_var("CHAIN_MAX_COUNT", "7");
    std::env::set_var("TRIGGER_MAX_SYSTEM_LIMIT", "40");
    std::env::set_var("CHAIN_NAMESPACE", "wake");
    let cfg = SchedulerConfig::from_env().unwrap();
    assert_eq!(cfg.chain.max_chain_count, 7);
    assert_eq!(cfg.limits.max_system_limit, 40);
    assert_eq!(cfg.namespace, "wake");

    std::env::set_var("CHAIN_RING_WINDOW_SEC", "soon");
    assert!(SchedulerConfig::from_env().is_err());

    for key in ["CHAIN_MAX_COUNT", "TRIGGER_MAX_SYSTEM_LIMIT", "CHAIN_NAMESPACE", "CHAIN_RING_WINDOW_SEC"] {
        std::env::remove_var(key);
    }
}
