//! Infrastructure adapters for trigger stores, key-value persistence and
//! sound catalogs.

pub mod catalog;
pub mod kv;
pub mod trigger;

pub use catalog::StaticDurationCatalog;
pub use kv::{FileKeyValueStore, InMemoryKeyValueStore};
pub use trigger::InMemoryTriggerStore;
