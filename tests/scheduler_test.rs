//! Chain scheduling against the in-memory store.
//!
//! Covers quota trimming and exhaustion, permission checks, partial
//! submission failures, chain replacement, cancellation and stale-chain
//! cleanup.

mod common;

use alarm_chain_scheduler::core::{
    occurrence_key, AuthorizationStatus, ChainSettings, GlobalLimitConfig, IdentifierCodec, NotificationIdentifier,
    OwnerConfig, RecurrenceRule, ScheduleOutcome, TriggerPayload, TriggerRequest, TriggerStore, UnavailableReason,
};
use chrono::{Duration, SubsecRound};
use common::{default_harness, harness, slow_harness, t0};
use uuid::Uuid;

fn owner(sound: &str) -> OwnerConfig {
    OwnerConfig::new(Uuid::new_v4(), RecurrenceRule::once(7, 0), sound)
}

fn limits(max: usize, buffer: usize) -> GlobalLimitConfig {
    GlobalLimitConfig {
        max_system_limit: max,
        safety_buffer: buffer,
    }
}

fn manual_request(owner: &OwnerConfig, anchor: chrono::DateTime<chrono::Utc>, k: usize) -> TriggerRequest {
    let id = NotificationIdentifier::new(owner.id, anchor, k);
    TriggerRequest {
        identifier: IdentifierCodec::default().encode(&id),
        fire_at: anchor + Duration::seconds(10 * k as i64),
        payload: TriggerPayload {
            owner_id: owner.id,
            occurrence_key: id.occurrence_key(),
            title: "Alarm".into(),
            body: "Alarm".into(),
            sound_file: "ringtone1.caf".into(),
            category: "ALARM_CATEGORY".into(),
        },
    }
}

#[tokio::test]
async fn test_quota_trims_chain() {
    // Spacing 30 s over 300 s wants 10, capped at 5; only 3 slots free.
    let h = harness(ChainSettings::new(5, 300, 30, 10, 60), limits(3, 0));
    let alarm = owner("unknown-sound");

    let outcome = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    assert_eq!(
        outcome,
        ScheduleOutcome::Trimmed {
            requested: 5,
            granted: 3
        }
    );
    assert!(outcome.is_success());
    assert_eq!(h.store.submitted_total(), 3);
    assert_eq!(h.index.load(alarm.id).len(), 3);
    assert_eq!(h.guard.reserved(), 0);
}

#[tokio::test]
async fn test_exhausted_quota_schedules_nothing() {
    let h = harness(ChainSettings::default(), limits(4, 0));
    for i in 0..4 {
        h.store.insert_foreign(format!("other-{i}"));
    }
    let alarm = owner("chimes");

    let outcome = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    assert_eq!(outcome, ScheduleOutcome::unavailable(UnavailableReason::GlobalLimit));
    assert_eq!(h.store.submitted_total(), 0);
    assert!(h.index.load(alarm.id).is_empty());
    assert_eq!(h.guard.reserved(), 0);
}

#[tokio::test]
async fn test_exhausted_quota_keeps_existing_chain() {
    let h = harness(ChainSettings::new(5, 300, 30, 10, 60), limits(6, 0));
    let alarm = owner("unknown-sound");
    let first = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;
    assert_eq!(first, ScheduleOutcome::Scheduled { count: 5 });
    h.store.insert_foreign("other-app");

    let second = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(2)).await;

    assert_eq!(second, ScheduleOutcome::unavailable(UnavailableReason::GlobalLimit));
    assert_eq!(h.index.load(alarm.id).len(), 5);
    assert_eq!(h.store.pending_count(), 6);
}

#[tokio::test]
async fn test_replacement_counts_old_chain_against_quota() {
    // The old chain still occupies its slots when the new one is reserved.
    let h = harness(ChainSettings::new(5, 300, 30, 10, 60), limits(6, 0));
    let alarm = owner("unknown-sound");
    h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    let moved = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(2)).await;

    assert_eq!(
        moved,
        ScheduleOutcome::Trimmed {
            requested: 5,
            granted: 1
        }
    );
    assert_eq!(h.store.pending_count(), 1);
    assert_eq!(h.index.load(alarm.id).len(), 1);
    assert_eq!(h.guard.reserved(), 0);
}

#[tokio::test]
async fn test_missing_authorization_is_reported() {
    let h = default_harness();
    let alarm = owner("chimes");

    for status in [
        AuthorizationStatus::Denied,
        AuthorizationStatus::Provisional,
        AuthorizationStatus::NotDetermined,
    ] {
        h.store.set_authorization(status);
        let outcome = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;
        assert_eq!(outcome, ScheduleOutcome::unavailable(UnavailableReason::Permissions));
    }
    assert_eq!(h.store.submitted_total(), 0);
    assert_eq!(h.guard.reserved(), 0);
}

#[tokio::test]
async fn test_anchor_must_be_in_future() {
    let h = default_harness();
    let alarm = owner("chimes");

    let now = h.scheduler.schedule_chain(&alarm, t0()).await;
    let past = h.scheduler.schedule_chain(&alarm, t0() - Duration::minutes(5)).await;

    assert_eq!(now, ScheduleOutcome::unavailable(UnavailableReason::InvalidConfiguration));
    assert_eq!(past, now);
    assert_eq!(h.store.submitted_total(), 0);
}

#[tokio::test]
async fn test_full_chain_uses_sound_length() {
    let h = default_harness();
    let alarm = owner("chimes").with_label("Wake up");
    let anchor = t0() + Duration::hours(1);

    let outcome = h.scheduler.schedule_chain(&alarm, anchor).await;

    // 300 s window at 27 s spacing.
    assert_eq!(outcome, ScheduleOutcome::Scheduled { count: 11 });
    let mut requests = h.store.pending_requests();
    requests.sort_by_key(|r| r.fire_at);
    assert_eq!(requests.len(), 11);
    assert_eq!(requests[0].fire_at, anchor);
    for pair in requests.windows(2) {
        assert_eq!((pair[1].fire_at - pair[0].fire_at).num_seconds(), 27);
    }

    let codec = IdentifierCodec::default();
    for (k, request) in requests.iter().enumerate() {
        let id = codec.parse(&request.identifier).unwrap();
        assert_eq!(id.owner_id(), alarm.id);
        assert_eq!(id.fire_date(), anchor);
        assert_eq!(id.occurrence(), k);
        assert_eq!(request.payload.category, "ALARM_CATEGORY");
        assert_eq!(request.payload.sound_file, "chimes.caf");
        assert_eq!(request.payload.body, "Wake up");
        assert_eq!(request.payload.occurrence_key, occurrence_key(&anchor));
    }

    let meta = h.index.load_chain_meta(alarm.id).unwrap();
    assert_eq!(meta.count, 11);
    assert_eq!(meta.spacing_secs, 27);
}

#[tokio::test]
async fn test_unknown_sound_falls_back() {
    let h = default_harness();
    let alarm = owner("no-such-sound");

    let outcome = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    // Fallback spacing 10 s wants 30 triggers, capped at 12.
    assert_eq!(outcome, ScheduleOutcome::Scheduled { count: 12 });
    let requests = h.store.pending_requests();
    assert!(requests.iter().all(|r| r.payload.sound_file == "ringtone1.caf"));
    assert!(requests.iter().all(|r| r.payload.body == "Alarm"));
}

#[tokio::test]
async fn test_chain_start_respects_lead_time() {
    let h = default_harness();
    let alarm = owner("chimes");
    let anchor = t0() + Duration::seconds(3) + Duration::milliseconds(250);

    h.scheduler.schedule_chain(&alarm, anchor).await;

    let mut requests = h.store.pending_requests();
    requests.sort_by_key(|r| r.fire_at);
    assert_eq!(requests[0].fire_at, t0() + Duration::seconds(10));
    let key = occurrence_key(&anchor.trunc_subsecs(3));
    assert!(requests.iter().all(|r| r.payload.occurrence_key == key));
}

#[tokio::test]
async fn test_partial_submission_failure_is_counted() {
    let h = default_harness();
    let alarm = owner("beep");
    h.store.fail_next_submissions(2);

    let outcome = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    assert_eq!(
        outcome,
        ScheduleOutcome::Trimmed {
            requested: 12,
            granted: 10
        }
    );
    let tracked = h.index.load(alarm.id);
    assert_eq!(tracked.len(), 10);
    let mut pending = h.store.pending_identifiers();
    pending.sort();
    let mut tracked_sorted = tracked.clone();
    tracked_sorted.sort();
    assert_eq!(pending, tracked_sorted);
    assert_eq!(h.guard.reserved(), 0);
}

#[tokio::test]
async fn test_all_submissions_failing_is_unavailable() {
    let h = harness(ChainSettings::new(3, 300, 30, 10, 60), GlobalLimitConfig::default());
    let alarm = owner("beep");
    h.store.fail_next_submissions(3);

    let outcome = h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    assert!(matches!(
        outcome,
        ScheduleOutcome::Unavailable {
            reason: UnavailableReason::Other(_)
        }
    ));
    assert!(h.index.load(alarm.id).is_empty());
    assert_eq!(h.guard.reserved(), 0);
}

#[tokio::test]
async fn test_reschedule_replaces_previous_chain() {
    let h = default_harness();
    let alarm = owner("chimes");

    h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;
    let second_anchor = t0() + Duration::hours(2);
    let outcome = h.scheduler.schedule_chain(&alarm, second_anchor).await;

    assert_eq!(outcome, ScheduleOutcome::Scheduled { count: 11 });
    assert_eq!(h.store.pending_count(), 11);
    let codec = IdentifierCodec::default();
    for id in h.store.pending_identifiers() {
        assert_eq!(codec.parse_occurrence_date(&id), Some(second_anchor));
    }
    assert_eq!(h.index.load(alarm.id).len(), 11);
}

#[tokio::test]
async fn test_cancel_chain() {
    let h = default_harness();
    let alarm = owner("chimes");
    let other = owner("chimes");
    h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;
    h.scheduler.schedule_chain(&other, t0() + Duration::hours(1)).await;

    assert_eq!(h.scheduler.cancel_chain(alarm.id).await.unwrap(), 11);

    assert!(h.scheduler.identifiers(alarm.id).is_empty());
    assert!(h.index.load_chain_meta(alarm.id).is_none());
    assert_eq!(h.store.pending_count(), 11);
    assert_eq!(h.scheduler.identifiers(other.id).len(), 11);
    assert_eq!(h.scheduler.all_tracked_identifiers().len(), 11);
    assert_eq!(h.scheduler.cancel_chain(alarm.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_occurrence_leaves_other_occurrences() {
    let h = default_harness();
    let alarm = owner("chimes");
    let today = t0() + Duration::hours(1);
    let tomorrow = today + Duration::days(1);
    h.scheduler.schedule_chain(&alarm, today).await;

    // A second occurrence tracked alongside the first.
    let extra: Vec<TriggerRequest> = (0..2).map(|k| manual_request(&alarm, tomorrow, k)).collect();
    for request in &extra {
        h.store.submit(request.clone()).await.unwrap();
    }
    let mut tracked = h.index.load(alarm.id);
    tracked.extend(extra.iter().map(|r| r.identifier.clone()));
    h.index.save(alarm.id, &tracked).unwrap();

    let removed = h
        .scheduler
        .cancel_occurrence(alarm.id, &occurrence_key(&today))
        .await
        .unwrap();

    assert_eq!(removed, 11);
    let remaining: Vec<String> = extra.iter().map(|r| r.identifier.clone()).collect();
    assert_eq!(h.index.load(alarm.id), remaining);
    let mut pending = h.store.pending_identifiers();
    pending.sort();
    let mut expected = remaining;
    expected.sort();
    assert_eq!(pending, expected);
}

#[tokio::test]
async fn test_cancel_occurrence_falls_back_to_store() {
    let h = default_harness();
    let alarm = owner("chimes");
    let anchor = t0() + Duration::minutes(1);

    // Submitted out of band: the index knows nothing.
    for k in 0..3 {
        h.store.submit(manual_request(&alarm, anchor, k)).await.unwrap();
    }
    h.store.deliver_due(anchor);
    assert_eq!(h.store.list_delivered().await.unwrap().len(), 1);

    let removed = h
        .scheduler
        .cancel_occurrence(alarm.id, &occurrence_key(&anchor))
        .await
        .unwrap();

    assert_eq!(removed, 3);
    assert_eq!(h.store.pending_count(), 0);
    assert!(h.store.list_delivered().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_occurrence_is_noop() {
    let h = default_harness();
    let alarm = owner("chimes");
    h.scheduler.schedule_chain(&alarm, t0() + Duration::hours(1)).await;

    let removed = h
        .scheduler
        .cancel_occurrence(alarm.id, &occurrence_key(&(t0() + Duration::days(3))))
        .await
        .unwrap();

    assert_eq!(removed, 0);
    assert_eq!(h.index.load(alarm.id).len(), 11);
}

#[tokio::test]
async fn test_cleanup_stale_chains() {
    let h = default_harness();
    let alarm = owner("chimes");
    let anchor = t0() + Duration::hours(1);
    h.scheduler.schedule_chain(&alarm, anchor).await;
    // Tracked without metadata: never touched by cleanup.
    let untracked = Uuid::new_v4();
    h.index.save(untracked, &["alarm-legacy".to_string()]).unwrap();

    h.clock.set(anchor + Duration::seconds(1));
    assert_eq!(h.scheduler.cleanup_stale_chains().await, 0);

    // Last trigger at anchor + 270 s, grace 60 s.
    h.clock.set(anchor + Duration::seconds(331));
    assert_eq!(h.scheduler.cleanup_stale_chains().await, 11);
    assert!(h.index.load(alarm.id).is_empty());
    assert!(h.index.load_chain_meta(alarm.id).is_none());
    assert_eq!(h.index.load(untracked).len(), 1);
}

#[tokio::test]
async fn test_schedule_next_uses_recurrence() {
    let h = default_harness();
    let alarm = OwnerConfig::new(Uuid::new_v4(), RecurrenceRule::once(7, 30), "chimes");

    let outcome = h.scheduler.schedule_next(&alarm, &chrono::Utc).await;

    assert_eq!(outcome, ScheduleOutcome::Scheduled { count: 11 });
    let codec = IdentifierCodec::default();
    let first = &h.index.load(alarm.id)[0];
    assert_eq!(
        codec.parse_occurrence_date(first),
        Some(t0() + Duration::minutes(90))
    );

    let mut disabled = alarm.clone();
    disabled.enabled = false;
    assert_eq!(
        h.scheduler.schedule_next(&disabled, &chrono::Utc).await,
        ScheduleOutcome::unavailable(UnavailableReason::InvalidConfiguration)
    );
}

#[tokio::test]
async fn test_concurrent_requests_for_one_owner_share_execution() {
    let h = slow_harness(ChainSettings::default(), GlobalLimitConfig::default());
    let alarm = owner("chimes");
    let anchor = t0() + Duration::hours(1);

    let (a, b) = tokio::join!(
        h.scheduler.schedule_chain(&alarm, anchor),
        h.scheduler.schedule_chain(&alarm, anchor)
    );

    assert_eq!(a, ScheduleOutcome::Scheduled { count: 11 });
    assert_eq!(a, b);
    assert_eq!(h.store.inner.submitted_total(), 11);
}

#[tokio::test]
async fn test_concurrent_owners_never_oversubscribe() {
    let h = slow_harness(ChainSettings::default(), limits(24, 4));
    let owners: Vec<OwnerConfig> = (0..3).map(|_| owner("beep")).collect();
    let anchor = t0() + Duration::hours(1);

    let outcomes = futures::future::join_all(owners.iter().map(|o| h.scheduler.schedule_chain(o, anchor))).await;

    let total: usize = outcomes.iter().map(ScheduleOutcome::scheduled_count).sum();
    assert!(total >= 12);
    assert!(total <= 20);
    assert!(h.store.inner.pending_count() <= 20);
    assert_eq!(h.guard.reserved(), 0);
}
