//! Trigger store backends.
//!
//! Only the in-memory store ships with the crate; platform-native stores are
//! supplied through the builder's factory.

pub mod memory;

pub use memory::InMemoryTriggerStore;
