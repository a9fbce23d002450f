//! Builders to construct scheduler components from configuration.

pub mod stack_builder;

pub use stack_builder::{build_stack, select_backend, BackendCapabilities, SchedulerStack};
