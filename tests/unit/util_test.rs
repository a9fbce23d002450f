//! Tests for utility functions

use alarm_chain_scheduler::util::{init_tracing, Clock, ManualClock, SystemClock};
use chrono::{Duration, TimeZone, Utc};

#[test]
fn test_manual_clock() {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    clock.advance(Duration::seconds(90));
    assert_eq!(clock.now(), start + Duration::seconds(90));
    clock.set(start);
    assert_eq!(clock.now(), start);
}

#[test]
fn test_system_clock_moves_forward() {
    let a = SystemClock.now();
    let b = SystemClock.now();
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
