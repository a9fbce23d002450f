//! Global quota admission control.
//!
//! The trigger store enforces one hard cap on outstanding triggers for the
//! whole process. [`GlobalLimitGuard`] hands out slots below
//! `max_system_limit - safety_buffer`, counting both what the store already
//! holds and what other in-flight scheduling calls have reserved but not yet
//! submitted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::TriggerStore;

/// Slots assumed free when the store cannot be queried.
const FALLBACK_AVAILABLE_SLOTS: usize = 1;

/// Quota parameters of the trigger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalLimitConfig {
    /// Hard cap enforced by the store.
    pub max_system_limit: usize,
    /// Slots kept free for other parts of the application.
    pub safety_buffer: usize,
}

impl Default for GlobalLimitConfig {
    fn default() -> Self {
        Self {
            max_system_limit: 64,
            safety_buffer: 4,
        }
    }
}

impl GlobalLimitConfig {
    /// Highest number of outstanding triggers this subsystem may reach.
    pub const fn available_threshold(&self) -> usize {
        self.max_system_limit.saturating_sub(self.safety_buffer)
    }

    /// Validate limit values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_system_limit == 0 {
            return Err("max_system_limit must be greater than 0".into());
        }
        if self.safety_buffer >= self.max_system_limit {
            return Err("safety_buffer must be smaller than max_system_limit".into());
        }
        Ok(())
    }
}

/// Admission controller for the shared trigger quota.
pub struct GlobalLimitGuard {
    config: GlobalLimitConfig,
    store: Arc<dyn TriggerStore>,
    /// Serializes the observe-then-grant step of `reserve`.
    admission: tokio::sync::Mutex<()>,
    /// Slots granted but not yet finalized.
    reserved: Arc<AtomicUsize>,
}

impl GlobalLimitGuard {
    /// Create a guard observing `store`.
    pub fn new(config: GlobalLimitConfig, store: Arc<dyn TriggerStore>) -> Self {
        Self {
            config,
            store,
            admission: tokio::sync::Mutex::new(()),
            reserved: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Limits in force.
    pub const fn config(&self) -> &GlobalLimitConfig {
        &self.config
    }

    /// Slots granted and not yet finalized.
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Free slots according to the store, ignoring in-flight reservations.
    ///
    /// A failed query reports a single slot rather than guessing high.
    pub async fn available_slots(&self) -> usize {
        match self.store.list_pending().await {
            Ok(pending) => {
                let available = self.config.available_threshold().saturating_sub(pending.len());
                tracing::debug!(
                    "available slots: {} (pending: {}, threshold: {})",
                    available,
                    pending.len(),
                    self.config.available_threshold()
                );
                available
            }
            Err(e) => {
                tracing::error!("failed to count pending triggers: {}", e);
                FALLBACK_AVAILABLE_SLOTS
            }
        }
    }

    /// Reserve up to `requested` slots.
    ///
    /// The returned [`Reservation`] must be finalized once the caller knows
    /// how many triggers it submitted; dropping it releases the grant.
    pub async fn reserve(&self, requested: usize) -> Reservation {
        if requested == 0 {
            return Reservation::new(Arc::clone(&self.reserved), 0, 0);
        }

        let _admission = self.admission.lock().await;
        let available = self.available_slots().await;
        let in_flight = self.reserved.load(Ordering::Acquire);
        let granted = requested.min(available.saturating_sub(in_flight));
        self.reserved.fetch_add(granted, Ordering::AcqRel);

        tracing::info!(
            "reserved {} of {} requested slots (available: {}, reserved: {})",
            granted,
            requested,
            available,
            in_flight + granted
        );
        Reservation::new(Arc::clone(&self.reserved), requested, granted)
    }
}

/// Scoped grant from [`GlobalLimitGuard::reserve`].
///
/// Finalizing (or dropping) returns the whole grant to the guard: submitted
/// triggers are from then on counted by the store itself.
#[must_use = "a reservation holds quota until it is finalized or dropped"]
#[derive(Debug)]
pub struct Reservation {
    counter: Arc<AtomicUsize>,
    requested: usize,
    granted: usize,
    finalized: bool,
}

impl Reservation {
    fn new(counter: Arc<AtomicUsize>, requested: usize, granted: usize) -> Self {
        Self {
            counter,
            requested,
            granted,
            finalized: false,
        }
    }

    /// Slots asked for.
    pub const fn requested(&self) -> usize {
        self.requested
    }

    /// Slots granted.
    pub const fn granted(&self) -> usize {
        self.granted
    }

    /// Close the reservation after `actual` triggers were submitted.
    pub fn finalize(mut self, actual: usize) {
        self.release(actual);
    }

    fn release(&mut self, actual: usize) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        let granted = self.granted;
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(granted))
            })
            .unwrap_or_else(|current| current);
        tracing::debug!(
            "finalized reservation: {} scheduled of {} granted (remaining reserved: {})",
            actual,
            granted,
            previous.saturating_sub(granted)
        );
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.finalized && self.granted > 0 {
            tracing::debug!("reservation of {} slots dropped without finalize", self.granted);
        }
        self.release(0);
    }
}
