//! Tests for error and outcome types

use alarm_chain_scheduler::core::{ScheduleOutcome, SchedulerError, UnavailableReason};

#[test]
fn test_partial_submission_failure_error() {
    let err = SchedulerError::PartialSubmissionFailure {
        failed: 2,
        attempted: 12,
    };
    assert_eq!(format!("{}", err), "partial submission failure: 2 of 12 failed");
}

#[test]
fn test_store_error() {
    let err = SchedulerError::Store("connection failed".to_string());
    assert_eq!(format!("{}", err), "store error: connection failed");
}

#[test]
fn test_index_parse_failure_names_key() {
    let err = SchedulerError::IndexParseFailure {
        key: "notification_index_ABC".to_string(),
        reason: "expected value".to_string(),
    };
    assert!(format!("{}", err).contains("notification_index_ABC"));
}

#[test]
fn test_unavailable_messages_are_actionable() {
    assert!(UnavailableReason::Permissions.message().contains("permission"));
    assert!(UnavailableReason::GlobalLimit.message().contains("too many"));
    assert!(UnavailableReason::Other("boom".into()).message().contains("boom"));
}

#[test]
fn test_outcome_counts() {
    assert_eq!(ScheduleOutcome::Scheduled { count: 4 }.scheduled_count(), 4);
    let trimmed = ScheduleOutcome::Trimmed {
        requested: 5,
        granted: 3,
    };
    assert!(trimmed.is_success());
    assert_eq!(trimmed.scheduled_count(), 3);
    let unavailable = ScheduleOutcome::unavailable(UnavailableReason::GlobalLimit);
    assert!(!unavailable.is_success());
    assert_eq!(unavailable.scheduled_count(), 0);
}

#[test]
fn test_outcome_serializes_tagged() {
    let json = serde_json::to_value(ScheduleOutcome::unavailable(UnavailableReason::Permissions)).unwrap();
    assert_eq!(json, serde_json::json!({"unavailable": {"reason": "permissions"}}));
}
