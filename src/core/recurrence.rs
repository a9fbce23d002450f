//! Owners and the single function that decides when their next occurrence
//! fires.
//!
//! Initial scheduling and reconciliation both call
//! [`OwnerConfig::next_fire_date`]; if they disagreed the reconciler would
//! keep "fixing" chains that are already correct.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days searched ahead for the next matching weekday.
const SEARCH_DAYS: i64 = 8;

/// Local wall-clock time of day plus the weekdays it repeats on.
///
/// No weekdays means a one-shot alarm: the next time the wall clock shows
/// `hour:minute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// Hour, 0-23.
    pub hour: u32,
    /// Minute, 0-59.
    pub minute: u32,
    /// Repeat days; empty for one-shot.
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
}

impl RecurrenceRule {
    /// Rule firing once at `hour:minute`.
    pub const fn once(hour: u32, minute: u32) -> Self {
        Self {
            hour,
            minute,
            weekdays: Vec::new(),
        }
    }

    /// Rule repeating on `weekdays` at `hour:minute`.
    pub const fn weekly(hour: u32, minute: u32, weekdays: Vec<Weekday>) -> Self {
        Self {
            hour,
            minute,
            weekdays,
        }
    }

    /// First instant strictly after `after` matching the rule in `tz`.
    ///
    /// A wall time skipped by a spring-forward transition resolves to the
    /// next valid local time; a repeated wall time resolves to its earlier
    /// instant.
    pub fn next_fire_date<Tz: TimeZone>(&self, after: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let start_day = after.with_timezone(tz).date_naive();

        (0..SEARCH_DAYS)
            .filter_map(|offset| start_day.checked_add_signed(Duration::days(offset)))
            .filter(|day| self.weekdays.is_empty() || self.weekdays.contains(&day.weekday()))
            .filter_map(|day| resolve_local(tz, day, time))
            .find(|candidate| *candidate > after)
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::new(day, time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // Inside a gap: walk forward minute by minute to the first valid
        // wall time. Real gaps are at most a couple of hours.
        LocalResult::None => (1..=180)
            .map(|m| naive + Duration::minutes(m))
            .find_map(|shifted| tz.from_local_datetime(&shifted).earliest())
            .map(|t| t.with_timezone(&Utc)),
    }
}

/// A recurring thing that owns a chain: one alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerConfig {
    /// Stable owner identifier.
    pub id: Uuid,
    /// Disabled owners must have no triggers.
    pub enabled: bool,
    /// When it fires.
    pub rule: RecurrenceRule,
    /// Sound to play; also sizes the chain spacing.
    pub sound_id: String,
    /// Text shown with the trigger.
    #[serde(default)]
    pub label: String,
}

impl OwnerConfig {
    /// Enabled owner with an empty label.
    pub fn new(id: Uuid, rule: RecurrenceRule, sound_id: impl Into<String>) -> Self {
        Self {
            id,
            enabled: true,
            rule,
            sound_id: sound_id.into(),
            label: String::new(),
        }
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Authoritative anchor: the next occurrence strictly after `now`, or
    /// `None` for a disabled owner.
    pub fn next_fire_date<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        self.rule.next_fire_date(now, tz)
    }
}
