//! In-memory trigger store for development and testing.
//!
//! Behaves like the platform substrate where it matters to the scheduler: a
//! hard cap on pending triggers, an authorization state, and foreign entries
//! that belong to other parts of the application. Failures can be injected.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::{AuthorizationStatus, DeliveredTrigger, SchedulerError, TriggerRequest, TriggerStore};

#[derive(Debug)]
struct State {
    authorization: AuthorizationStatus,
    /// Foreign entries carry no request.
    pending: BTreeMap<String, Option<TriggerRequest>>,
    delivered: Vec<DeliveredTrigger>,
    fail_next_submissions: usize,
    fail_listing: bool,
    submitted_total: usize,
    removed_total: usize,
}

/// Trigger store held in process memory.
#[derive(Debug)]
pub struct InMemoryTriggerStore {
    state: Mutex<State>,
    max_pending: Option<usize>,
}

impl Default for InMemoryTriggerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTriggerStore {
    /// Authorized store without a pending cap.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                authorization: AuthorizationStatus::Authorized,
                pending: BTreeMap::new(),
                delivered: Vec::new(),
                fail_next_submissions: 0,
                fail_listing: false,
                submitted_total: 0,
                removed_total: 0,
            }),
            max_pending: None,
        }
    }

    /// Reject submissions once `max_pending` triggers are pending.
    #[must_use]
    pub const fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    /// Change the reported authorization state.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.state.lock().authorization = status;
    }

    /// Add a pending entry owned by someone else.
    pub fn insert_foreign(&self, identifier: impl Into<String>) {
        self.state.lock().pending.insert(identifier.into(), None);
    }

    /// Make the next `n` submissions fail.
    pub fn fail_next_submissions(&self, n: usize) {
        self.state.lock().fail_next_submissions = n;
    }

    /// Make `list_pending` fail until reset.
    pub fn set_fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    /// Pending identifiers, sorted.
    pub fn pending_identifiers(&self) -> Vec<String> {
        self.state.lock().pending.keys().cloned().collect()
    }

    /// Pending requests submitted through [`TriggerStore::submit`], sorted by
    /// identifier.
    pub fn pending_requests(&self) -> Vec<TriggerRequest> {
        self.state.lock().pending.values().flatten().cloned().collect()
    }

    /// Number of pending entries, foreign ones included.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Accepted submissions since creation.
    pub fn submitted_total(&self) -> usize {
        self.state.lock().submitted_total
    }

    /// Entries actually removed since creation.
    pub fn removed_total(&self) -> usize {
        self.state.lock().removed_total
    }

    /// Move every trigger due at `now` from pending to delivered. Returns how
    /// many fired.
    pub fn deliver_due(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let due: Vec<String> = state
            .pending
            .iter()
            .filter_map(|(id, request)| {
                request
                    .as_ref()
                    .filter(|r| r.fire_at <= now)
                    .map(|_| id.clone())
            })
            .collect();
        for id in &due {
            state.pending.remove(id);
            state.delivered.push(DeliveredTrigger {
                identifier: id.clone(),
                delivered_at: now,
            });
        }
        due.len()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn authorization(&self) -> AuthorizationStatus {
        self.state.lock().authorization
    }

    async fn submit(&self, request: TriggerRequest) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.fail_next_submissions > 0 {
            state.fail_next_submissions -= 1;
            return Err(SchedulerError::Store(format!(
                "injected failure for {}",
                request.identifier
            )));
        }
        let replacing = state.pending.contains_key(&request.identifier);
        if let Some(max) = self.max_pending {
            if !replacing && state.pending.len() >= max {
                return Err(SchedulerError::Store("pending trigger limit reached".into()));
            }
        }
        state.pending.insert(request.identifier.clone(), Some(request));
        state.submitted_total += 1;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<String>, SchedulerError> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(SchedulerError::Store("pending query failed".into()));
        }
        Ok(state.pending.keys().cloned().collect())
    }

    async fn remove(&self, identifiers: &[String]) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let mut removed = 0usize;
        for id in identifiers {
            if state.pending.remove(id).is_some() {
                removed += 1;
            }
        }
        let before = state.delivered.len();
        state.delivered.retain(|d| !identifiers.contains(&d.identifier));
        removed += before - state.delivered.len();
        state.removed_total += removed;
        Ok(())
    }

    async fn list_delivered(&self) -> Result<Vec<DeliveredTrigger>, SchedulerError> {
        Ok(self.state.lock().delivered.clone())
    }
}
