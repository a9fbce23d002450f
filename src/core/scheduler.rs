//! Chain scheduling orchestrator.
//!
//! [`ChainedScheduler`] turns "owner X fires at T" into a bounded chain of
//! one-shot triggers: it sizes the chain, clears it through the
//! [`GlobalLimitGuard`], replaces whatever the owner had scheduled before,
//! submits the triggers and records what actually landed in the
//! [`NotificationIndex`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;
use uuid::Uuid;

use crate::core::identifier::parse_occurrence_key;
use crate::core::{
    AuthorizationStatus, ChainConfiguration, ChainMeta, ChainPolicy, DurationCatalog,
    GlobalLimitGuard, IdentifierCodec, NotificationIdentifier, NotificationIndex, OwnerConfig,
    ScheduleOutcome, SchedulerError, SingleFlight, SoundInfo, TriggerPayload, TriggerRequest,
    TriggerStore, UnavailableReason,
};
use crate::util::clock::Clock;

const TRIGGER_TITLE: &str = "Alarm";
const TRIGGER_CATEGORY: &str = "ALARM_CATEGORY";
const FALLBACK_SOUND_FILE: &str = "ringtone1.caf";

/// Collaborators shared by the scheduler and the reconciler.
#[derive(Clone)]
pub struct SchedulerDeps {
    /// Trigger substrate.
    pub store: Arc<dyn TriggerStore>,
    /// Sound metadata.
    pub catalog: Arc<dyn DurationCatalog>,
    /// Persisted identifier index.
    pub index: Arc<NotificationIndex>,
    /// Quota admission control.
    pub guard: Arc<GlobalLimitGuard>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// Schedules, replaces and cancels trigger chains.
///
/// Cheap to clone; clones share state, including the per-owner single-flight
/// registry.
#[derive(Clone)]
pub struct ChainedScheduler {
    deps: SchedulerDeps,
    policy: ChainPolicy,
    codec: IdentifierCodec,
    flights: SingleFlight<Uuid, ScheduleOutcome>,
}

impl ChainedScheduler {
    /// Scheduler using the default identifier namespace.
    pub fn new(deps: SchedulerDeps, policy: ChainPolicy) -> Self {
        Self {
            deps,
            policy,
            codec: IdentifierCodec::default(),
            flights: SingleFlight::new(),
        }
    }

    /// Use a different identifier namespace.
    #[must_use]
    pub fn with_codec(mut self, codec: IdentifierCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Trigger store in use.
    pub fn store(&self) -> &Arc<dyn TriggerStore> {
        &self.deps.store
    }

    /// Identifier index in use.
    pub fn index(&self) -> &Arc<NotificationIndex> {
        &self.deps.index
    }

    /// Quota guard in use.
    pub fn guard(&self) -> &Arc<GlobalLimitGuard> {
        &self.deps.guard
    }

    /// Identifier codec in use.
    pub const fn codec(&self) -> &IdentifierCodec {
        &self.codec
    }

    /// Chain policy in use.
    pub const fn policy(&self) -> &ChainPolicy {
        &self.policy
    }

    /// Current instant from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.deps.clock.now()
    }

    /// Schedule the chain for one occurrence of `owner` anchored at `anchor`.
    ///
    /// A request for an owner that is already being scheduled waits for and
    /// returns the in-flight result.
    pub async fn schedule_chain(&self, owner: &OwnerConfig, anchor: DateTime<Utc>) -> ScheduleOutcome {
        let this = self.clone();
        let owner = owner.clone();
        self.flights
            .run(owner.id, move || async move {
                let outcome = this.schedule_chain_once(&owner, anchor).await;
                log_outcome(&outcome, owner.id, anchor);
                outcome
            })
            .await
    }

    /// Schedule the owner's next occurrence as computed by
    /// [`OwnerConfig::next_fire_date`] in `tz`.
    pub async fn schedule_next<Tz: TimeZone>(&self, owner: &OwnerConfig, tz: &Tz) -> ScheduleOutcome {
        match owner.next_fire_date(self.now(), tz) {
            Some(anchor) => self.schedule_chain(owner, anchor).await,
            None => {
                tracing::warn!("owner {} has no upcoming occurrence", owner.id);
                ScheduleOutcome::unavailable(UnavailableReason::InvalidConfiguration)
            }
        }
    }

    /// Chain shape for `owner` before any quota trimming.
    pub fn plan_chain(&self, owner: &OwnerConfig) -> (ChainConfiguration, Option<SoundInfo>) {
        let sound = self.deps.catalog.lookup(&owner.sound_id);
        let spacing = sound
            .as_ref()
            .and_then(|s| s.duration_secs)
            .filter(|d| *d > 0)
            .map_or_else(
                || i64::from(self.policy.settings().fallback_spacing_secs()),
                i64::from,
            );
        (self.policy.compute_chain(spacing), sound)
    }

    /// Identifiers a full, untrimmed chain for `owner` at `anchor` would use.
    pub fn desired_identifiers(&self, owner: &OwnerConfig, anchor: DateTime<Utc>) -> Vec<String> {
        let (configuration, _) = self.plan_chain(owner);
        (0..configuration.chain_count())
            .map(|k| self.codec.encode(&NotificationIdentifier::new(owner.id, anchor, k)))
            .collect()
    }

    async fn schedule_chain_once(&self, owner: &OwnerConfig, anchor: DateTime<Utc>) -> ScheduleOutcome {
        let now = self.now();
        if anchor <= now {
            tracing::error!(
                "anchor {} for owner {} is not in the future (now {})",
                anchor,
                owner.id,
                now
            );
            return ScheduleOutcome::unavailable(UnavailableReason::InvalidConfiguration);
        }

        let status = self.deps.store.authorization().await;
        if status != AuthorizationStatus::Authorized {
            tracing::error!("triggers not authorized ({:?}) for owner {}", status, owner.id);
            return ScheduleOutcome::unavailable(UnavailableReason::Permissions);
        }

        let (configuration, sound) = self.plan_chain(owner);
        tracing::info!(
            "chain config for owner {}: spacing={}s count={}",
            owner.id,
            configuration.spacing_secs(),
            configuration.chain_count()
        );

        // The owner's current chain still counts as pending here.
        let reservation = self.deps.guard.reserve(configuration.chain_count()).await;
        if reservation.granted() == 0 {
            reservation.finalize(0);
            return ScheduleOutcome::unavailable(UnavailableReason::GlobalLimit);
        }
        let effective = configuration.chain_count().min(reservation.granted());
        let trimmed = configuration.trimmed(effective);

        // The chain head never fires sooner than the minimum lead time.
        let lead = Duration::seconds(i64::from(self.policy.settings().min_lead_time_secs()));
        let start = anchor.max(now + lead);
        let requests = self.build_requests(owner, anchor, start, &trimmed, sound.as_ref());
        let expected: Vec<String> = requests.iter().map(|r| r.identifier.clone()).collect();

        self.remove_previous(owner.id, &expected).await;

        let mut submitted = 0usize;
        let counter = &mut submitted;
        let requests = &requests;
        let persisted = self
            .deps
            .index
            .idempotent_reschedule(owner.id, &expected, move || async move {
                let ok = self.submit_all(requests).await;
                *counter = ok.len();
                ok
            })
            .await;

        if let Err(e) = persisted {
            tracing::error!("failed to persist index for owner {}: {}", owner.id, e);
            if submitted == 0 {
                reservation.finalize(0);
                return ScheduleOutcome::unavailable(UnavailableReason::Other(e.to_string()));
            }
        }

        if submitted > 0 {
            let meta = ChainMeta {
                start,
                spacing_secs: trimmed.spacing_secs(),
                count: submitted,
                created_at: now,
            };
            if let Err(e) = self.deps.index.save_chain_meta(owner.id, &meta) {
                tracing::warn!("failed to save chain meta for owner {}: {}", owner.id, e);
            }
        } else if let Err(e) = self.deps.index.clear_chain_meta(owner.id) {
            tracing::warn!("failed to clear chain meta for owner {}: {}", owner.id, e);
        }
        reservation.finalize(submitted);

        if submitted == 0 {
            return ScheduleOutcome::unavailable(UnavailableReason::Other(format!(
                "all {} submissions failed",
                expected.len()
            )));
        }
        if submitted == configuration.chain_count() {
            ScheduleOutcome::Scheduled { count: submitted }
        } else {
            ScheduleOutcome::Trimmed {
                requested: configuration.chain_count(),
                granted: submitted,
            }
        }
    }

    fn build_requests(
        &self,
        owner: &OwnerConfig,
        anchor: DateTime<Utc>,
        start: DateTime<Utc>,
        configuration: &ChainConfiguration,
        sound: Option<&SoundInfo>,
    ) -> Vec<TriggerRequest> {
        let body = if owner.label.is_empty() {
            TRIGGER_TITLE.to_string()
        } else {
            owner.label.clone()
        };
        let sound_file = sound.map_or_else(|| FALLBACK_SOUND_FILE.to_string(), |s| s.file_name.clone());

        self.policy
            .compute_fire_dates(&start, configuration)
            .into_iter()
            .enumerate()
            .map(|(k, fire_at)| {
                let id = NotificationIdentifier::new(owner.id, anchor, k);
                TriggerRequest {
                    identifier: self.codec.encode(&id),
                    fire_at,
                    payload: TriggerPayload {
                        owner_id: owner.id,
                        occurrence_key: id.occurrence_key(),
                        title: TRIGGER_TITLE.to_string(),
                        body: body.clone(),
                        sound_file: sound_file.clone(),
                        category: TRIGGER_CATEGORY.to_string(),
                    },
                }
            })
            .collect()
    }

    /// Pull the owner's previous chain, plus any stray copies of the new
    /// identifiers, out of the store.
    async fn remove_previous(&self, owner: Uuid, expected: &[String]) {
        let mut seen = HashSet::new();
        let doomed: Vec<String> = self
            .deps
            .index
            .load(owner)
            .into_iter()
            .chain(expected.iter().cloned())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if let Err(e) = self.deps.store.remove(&doomed).await {
            tracing::warn!("failed to remove previous chain for owner {}: {}", owner, e);
        }
    }

    /// Submit every request independently; returns the identifiers that
    /// were accepted.
    async fn submit_all(&self, requests: &[TriggerRequest]) -> Vec<String> {
        let results = join_all(requests.iter().map(|request| {
            let store = Arc::clone(&self.deps.store);
            let request = request.clone();
            async move {
                let identifier = request.identifier.clone();
                match store.submit(request).await {
                    Ok(()) => Some(identifier),
                    Err(e) => {
                        tracing::warn!("submit failed for {}: {}", identifier, e);
                        None
                    }
                }
            }
        }))
        .await;

        let accepted: Vec<String> = results.into_iter().flatten().collect();
        if accepted.len() < requests.len() {
            tracing::warn!(
                "{}",
                SchedulerError::PartialSubmissionFailure {
                    failed: requests.len() - accepted.len(),
                    attempted: requests.len(),
                }
            );
        }
        accepted
    }

    /// Remove every trigger of the owner's chain and forget it.
    ///
    /// Waits for an in-flight scheduling call for the same owner first, but
    /// does not hold the owner's flight: a `schedule_chain` started after
    /// the wait returns runs concurrently with the removal, and the caller
    /// must order the two itself. Returns how many identifiers were cancelled.
    pub async fn cancel_chain(&self, owner: Uuid) -> Result<usize, SchedulerError> {
        self.flights.wait(&owner).await;

        let identifiers = self.deps.index.load(owner);
        if identifiers.is_empty() {
            return Ok(0);
        }
        self.deps.store.remove(&identifiers).await?;
        self.deps.index.clear(owner)?;
        self.deps.index.clear_chain_meta(owner)?;
        tracing::info!("cancelled {} triggers for owner {}", identifiers.len(), owner);
        Ok(identifiers.len())
    }

    /// Remove only the triggers of one occurrence of `owner`.
    ///
    /// `occurrence_key` is the anchor as produced by
    /// [`occurrence_key`](crate::core::occurrence_key). When the index has
    /// nothing for that key, the store's pending and delivered sets are
    /// scanned instead. Ordering against later scheduling calls is the same
    /// as for [`cancel_chain`](Self::cancel_chain).
    pub async fn cancel_occurrence(&self, owner: Uuid, occurrence_key: &str) -> Result<usize, SchedulerError> {
        self.flights.wait(&owner).await;

        let target = parse_occurrence_key(occurrence_key);
        let matches = |raw: &String| {
            self.codec.parse(raw).is_some_and(|id| {
                id.owner_id() == owner
                    && target.map_or_else(|| id.occurrence_key() == occurrence_key, |t| id.fire_date() == t)
            })
        };

        let mut matching: Vec<String> = self.deps.index.load(owner).into_iter().filter(|id| matches(id)).collect();

        if matching.is_empty() {
            let pending = self.deps.store.list_pending().await.unwrap_or_else(|e| {
                tracing::warn!("failed to list pending triggers: {}", e);
                Vec::new()
            });
            let delivered = self.deps.store.list_delivered().await.unwrap_or_else(|e| {
                tracing::warn!("failed to list delivered triggers: {}", e);
                Vec::new()
            });
            let mut seen = HashSet::new();
            matching = pending
                .into_iter()
                .chain(delivered.into_iter().map(|d| d.identifier))
                .filter(|id| matches(id) && seen.insert(id.clone()))
                .collect();
            if !matching.is_empty() {
                tracing::info!(
                    "index had no entries for occurrence {} of owner {}; found {} in store",
                    occurrence_key,
                    owner,
                    matching.len()
                );
            }
        }

        if matching.is_empty() {
            tracing::info!("no triggers found for occurrence {} of owner {}", occurrence_key, owner);
            return Ok(0);
        }

        self.deps.store.remove(&matching).await?;
        self.deps.index.remove_identifiers(owner, &matching)?;
        tracing::info!(
            "cancelled {} triggers of occurrence {} for owner {}",
            matching.len(),
            occurrence_key,
            owner
        );
        Ok(matching.len())
    }

    /// Identifiers currently recorded for `owner`.
    pub fn identifiers(&self, owner: Uuid) -> Vec<String> {
        self.deps.index.load(owner)
    }

    /// Every identifier recorded for any owner.
    pub fn all_tracked_identifiers(&self) -> HashSet<String> {
        self.deps.index.all_pending_identifiers().into_iter().collect()
    }

    /// Remove chains whose last trigger fired more than the cleanup grace
    /// period ago. Owners without chain metadata are left alone.
    ///
    /// Returns how many identifiers were removed.
    pub async fn cleanup_stale_chains(&self) -> usize {
        let now = self.now();
        let grace = Duration::seconds(i64::from(self.policy.settings().cleanup_grace_secs()));
        let mut removed = 0usize;
        let mut skipped = 0usize;

        for owner in self.deps.index.tracked_owner_ids() {
            let Some(meta) = self.deps.index.load_chain_meta(owner) else {
                skipped += 1;
                continue;
            };
            if now <= meta.last_fire() + grace {
                continue;
            }
            let identifiers = self.deps.index.load(owner);
            if identifiers.is_empty() {
                continue;
            }
            if let Err(e) = self.deps.store.remove(&identifiers).await {
                tracing::warn!("failed to remove stale chain for owner {}: {}", owner, e);
                continue;
            }
            if let Err(e) = self
                .deps
                .index
                .remove_identifiers(owner, &identifiers)
                .and_then(|()| self.deps.index.clear_chain_meta(owner))
            {
                tracing::warn!("failed to forget stale chain for owner {}: {}", owner, e);
            }
            removed += identifiers.len();
        }

        tracing::info!(
            "stale chain cleanup: removed {} triggers, skipped {} owners without metadata",
            removed,
            skipped
        );
        removed
    }
}

fn log_outcome(outcome: &ScheduleOutcome, owner: Uuid, anchor: DateTime<Utc>) {
    match outcome {
        ScheduleOutcome::Scheduled { count } => {
            tracing::info!("scheduled {} triggers for owner {} at {}", count, owner, anchor);
        }
        ScheduleOutcome::Trimmed { requested, granted } => {
            tracing::info!(
                "trimmed chain for owner {}: {} -> {} triggers",
                owner,
                requested,
                granted
            );
        }
        ScheduleOutcome::Unavailable { reason } => {
            tracing::warn!("nothing scheduled for owner {}: {}", owner, reason.message());
        }
    }
}
