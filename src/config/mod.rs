//! Configuration models for chain sizing, quota and backends.

pub mod scheduler;

pub use scheduler::{ChainSettingsConfig, IndexBackendConfig, SchedulerConfig, TriggerBackendConfig};
