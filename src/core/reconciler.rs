//! Convergence of the trigger store towards the desired chains.
//!
//! A refresh computes what every active owner should have scheduled, compares
//! it with what the store and the index say is scheduled, removes the excess
//! and reschedules every owner that is missing something. Running it again
//! without changes mutates nothing.
//!
//! An active owner whose chain window is open (first trigger already fired,
//! last trigger still ahead) is left alone until the window closes.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{ChainedScheduler, OwnerConfig, ScheduleOutcome, SingleFlight};

/// Result of one refresh sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Identifiers removed from the store.
    pub removed: usize,
    /// Owners whose chains were rescheduled.
    pub rescheduled_owners: Vec<Uuid>,
    /// Outcome of each reschedule.
    pub outcomes: Vec<(Uuid, ScheduleOutcome)>,
}

impl RefreshReport {
    /// True when the sweep changed nothing.
    pub fn is_noop(&self) -> bool {
        self.removed == 0 && self.rescheduled_owners.is_empty()
    }
}

struct DesiredChain {
    owner: OwnerConfig,
    anchor: DateTime<Utc>,
    identifiers: Vec<String>,
}

/// Refresh coordinator. Concurrent sweeps share one execution.
#[derive(Clone)]
pub struct Reconciler<Tz>
where
    Tz: TimeZone,
{
    scheduler: ChainedScheduler,
    tz: Tz,
    flight: SingleFlight<(), RefreshReport>,
}

impl<Tz> Reconciler<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Reconciler resolving owner wall-clock times in `tz`.
    pub fn new(scheduler: ChainedScheduler, tz: Tz) -> Self {
        Self {
            scheduler,
            tz,
            flight: SingleFlight::new(),
        }
    }

    /// Scheduler used for rescheduling.
    pub const fn scheduler(&self) -> &ChainedScheduler {
        &self.scheduler
    }

    /// Converge the store to the chains `owners` should have.
    ///
    /// A call made while a sweep is running returns that sweep's report.
    pub async fn refresh_all(&self, owners: &[OwnerConfig]) -> RefreshReport {
        let this = self.clone();
        let owners = owners.to_vec();
        self.flight
            .run((), move || async move { this.refresh_once(&owners).await })
            .await
    }

    async fn refresh_once(&self, owners: &[OwnerConfig]) -> RefreshReport {
        let scheduler = &self.scheduler;
        let codec = scheduler.codec();
        let now = scheduler.now();

        let ringing: HashSet<Uuid> = owners
            .iter()
            .filter(|owner| owner.enabled && self.is_ringing(owner.id, now))
            .map(|owner| owner.id)
            .collect();
        if !ringing.is_empty() {
            tracing::debug!("refresh: {} owner(s) ringing, chains left in place", ringing.len());
        }

        let desired_chains: Vec<DesiredChain> = owners
            .iter()
            .filter(|owner| !ringing.contains(&owner.id))
            .filter_map(|owner| {
                let anchor = owner.next_fire_date(now, &self.tz)?;
                Some(DesiredChain {
                    owner: owner.clone(),
                    anchor,
                    identifiers: scheduler.desired_identifiers(owner, anchor),
                })
            })
            .collect();
        let desired: HashSet<&String> = desired_chains.iter().flat_map(|c| &c.identifiers).collect();

        let pending = match scheduler.store().list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("refresh aborted, cannot list pending triggers: {}", e);
                return RefreshReport::default();
            }
        };
        let observed: HashSet<String> = pending
            .into_iter()
            .chain(scheduler.index().all_pending_identifiers())
            .filter(|id| codec.recognizes(id))
            .collect();

        let to_remove: Vec<String> = observed
            .iter()
            .filter(|id| !desired.contains(id))
            .filter(|id| codec.parse_owner_id(id).is_none_or(|owner| !ringing.contains(&owner)))
            .cloned()
            .collect();
        let stale_owners: Vec<&DesiredChain> = desired_chains
            .iter()
            .filter(|chain| chain.identifiers.iter().any(|id| !observed.contains(id)))
            .collect();

        tracing::info!(
            "refresh: desired={} observed={} to_remove={} owners_to_reschedule={}",
            desired.len(),
            observed.len(),
            to_remove.len(),
            stale_owners.len()
        );

        if !to_remove.is_empty() {
            self.remove_unwanted(&to_remove).await;
        }

        let outcomes: Vec<(Uuid, ScheduleOutcome)> = join_all(stale_owners.iter().map(|chain| async move {
            let outcome = scheduler.schedule_chain(&chain.owner, chain.anchor).await;
            (chain.owner.id, outcome)
        }))
        .await;

        RefreshReport {
            removed: to_remove.len(),
            rescheduled_owners: outcomes.iter().map(|(id, _)| *id).collect(),
            outcomes,
        }
    }

    /// True while the owner's recorded chain has started and not yet finished.
    fn is_ringing(&self, owner: Uuid, now: DateTime<Utc>) -> bool {
        self.scheduler
            .index()
            .load_chain_meta(owner)
            .is_some_and(|meta| meta.start <= now && now <= meta.last_fire())
    }

    /// Remove from the store, then prune the owning index entries.
    async fn remove_unwanted(&self, to_remove: &[String]) {
        let scheduler = &self.scheduler;
        if let Err(e) = scheduler.store().remove(to_remove).await {
            tracing::warn!("failed to remove {} unwanted triggers: {}", to_remove.len(), e);
        }

        let mut by_owner: HashMap<Uuid, Vec<String>> = HashMap::new();
        for id in to_remove {
            if let Some(owner) = scheduler.codec().parse_owner_id(id) {
                by_owner.entry(owner).or_default().push(id.clone());
            }
        }
        let index = scheduler.index();
        for (owner, ids) in by_owner {
            if let Err(e) = index.remove_identifiers(owner, &ids) {
                tracing::warn!("failed to prune index for owner {}: {}", owner, e);
                continue;
            }
            if index.load(owner).is_empty() {
                if let Err(e) = index.clear_chain_meta(owner) {
                    tracing::warn!("failed to clear chain meta for owner {}: {}", owner, e);
                }
            }
        }
    }
}
