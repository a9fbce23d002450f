//! # Alarm Chain Scheduler
//!
//! Reliable "ring at time T" on top of a substrate that only offers discrete,
//! future, one-shot triggers under a global quota.
//!
//! A single trigger plays a sound for a bounded time. To keep an alarm
//! ringing, this crate schedules a *chain* of triggers spaced a few seconds
//! apart, sized to cover a ringing window, and keeps every chain consistent
//! with the shared quota, with the persisted record of what was scheduled,
//! and with the owners' current configuration.
//!
//! ## Components
//!
//! - **[`ChainPolicy`](core::ChainPolicy)**: pure sizing, turns a sound
//!   length into spacing and count and computes fire instants with absolute
//!   time arithmetic.
//! - **[`GlobalLimitGuard`](core::GlobalLimitGuard)**: admission control over
//!   the store's quota. Reservations are scoped guards released on every
//!   exit path.
//! - **[`NotificationIndex`](core::NotificationIndex)**: per-owner record of
//!   submitted identifiers in a key-value store.
//! - **[`ChainedScheduler`](core::ChainedScheduler)**: schedules, replaces
//!   and cancels chains; one in-flight operation per owner.
//! - **[`Reconciler`](core::Reconciler)**: converges the store towards the
//!   desired chains; a second run without changes mutates nothing.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use alarm_chain_scheduler::builders::{build_stack, BackendCapabilities};
//! use alarm_chain_scheduler::config::SchedulerConfig;
//! use alarm_chain_scheduler::core::{OwnerConfig, RecurrenceRule};
//! use alarm_chain_scheduler::infra::StaticDurationCatalog;
//! use alarm_chain_scheduler::util::SystemClock;
//!
//! let cfg = SchedulerConfig::from_env()?;
//! let stack = build_stack(
//!     &cfg,
//!     BackendCapabilities::default(),
//!     Arc::new(StaticDurationCatalog::new().with_sound("chimes", "chimes.caf", Some(27))),
//!     Arc::new(SystemClock),
//!     chrono::Utc,
//!     |_| unreachable!("no native backend"),
//! )?;
//!
//! let owner = OwnerConfig::new(uuid::Uuid::new_v4(), RecurrenceRule::once(7, 30), "chimes");
//! let outcome = stack.scheduler.schedule_next(&owner, &chrono::Utc).await;
//! let report = stack.reconciler.refresh_all(&[owner]).await;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling logic and the seams to the outside world.
pub mod core;
/// Configuration models for chain sizing, quota and backends.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters for trigger stores, persistence and catalogs.
pub mod infra;
/// Shared utilities.
pub mod util;
