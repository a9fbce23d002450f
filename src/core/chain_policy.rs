//! Chain sizing policy.
//!
//! Pure computations that turn a ringing window into a bounded sequence of
//! one-shot triggers. Nothing in here touches I/O or the clock.

use chrono::{DateTime, Duration, TimeZone};
use serde::{Deserialize, Serialize};

/// Lower bound for trigger spacing in seconds.
pub const MIN_SPACING_SECS: u32 = 1;
/// Upper bound for trigger spacing in seconds.
pub const MAX_SPACING_SECS: u32 = 30;

/// Validated chain settings.
///
/// Every field is clamped on construction, so holders of a `ChainSettings`
/// never need to re-validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainSettings {
    max_chain_count: usize,
    ring_window_secs: u32,
    fallback_spacing_secs: u32,
    min_lead_time_secs: u32,
    cleanup_grace_secs: u32,
}

impl ChainSettings {
    /// Build settings, clamping each value into its safe range.
    pub fn new(
        max_chain_count: i64,
        ring_window_secs: i64,
        fallback_spacing_secs: i64,
        min_lead_time_secs: i64,
        cleanup_grace_secs: i64,
    ) -> Self {
        Self {
            max_chain_count: clamp_logged("max_chain_count", max_chain_count, 1, 50) as usize,
            ring_window_secs: clamp_logged("ring_window_secs", ring_window_secs, 30, 600),
            fallback_spacing_secs: clamp_logged(
                "fallback_spacing_secs",
                fallback_spacing_secs,
                i64::from(MIN_SPACING_SECS),
                i64::from(MAX_SPACING_SECS),
            ),
            min_lead_time_secs: clamp_logged("min_lead_time_secs", min_lead_time_secs, 5, 30),
            cleanup_grace_secs: clamp_logged("cleanup_grace_secs", cleanup_grace_secs, 30, 300),
        }
    }

    /// Maximum number of triggers in one chain.
    pub const fn max_chain_count(&self) -> usize {
        self.max_chain_count
    }

    /// Length of the ringing window to cover, in seconds.
    pub const fn ring_window_secs(&self) -> u32 {
        self.ring_window_secs
    }

    /// Spacing used when the sound duration is unknown.
    pub const fn fallback_spacing_secs(&self) -> u32 {
        self.fallback_spacing_secs
    }

    /// Minimum delay between scheduling and the first trigger.
    pub const fn min_lead_time_secs(&self) -> u32 {
        self.min_lead_time_secs
    }

    /// Grace period after the last trigger before a chain counts as stale.
    pub const fn cleanup_grace_secs(&self) -> u32 {
        self.cleanup_grace_secs
    }

    /// Advisory checks on an already clamped configuration.
    ///
    /// Returns human-readable reasons; an empty list means the settings are
    /// sensible. Callers may log these, nothing here is fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.max_chain_count > 15 {
            reasons.push("max_chain_count above 15 eats into the shared trigger budget".into());
        }
        if self.fallback_spacing_secs < 5 {
            reasons.push("fallback_spacing_secs below 5 produces very dense chains".into());
        }
        let min_window = u64::from(self.fallback_spacing_secs) * self.max_chain_count as u64;
        if u64::from(self.ring_window_secs) < min_window {
            reasons.push("ring_window_secs too small for max_chain_count at fallback spacing".into());
        }
        reasons
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self::new(12, 300, 10, 10, 60)
    }
}

fn clamp_logged(name: &str, value: i64, min: i64, max: i64) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::info!("chain settings: clamped {} {} -> {}", name, value, clamped);
    }
    // Bounds above all fit in u32.
    u32::try_from(clamped).unwrap_or(u32::MAX)
}

/// Spacing and length of a concrete chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfiguration {
    spacing_secs: u32,
    chain_count: usize,
}

impl ChainConfiguration {
    /// Create a configuration. A zero count is raised to one.
    pub fn new(spacing_secs: u32, chain_count: usize) -> Self {
        Self {
            spacing_secs,
            chain_count: chain_count.max(1),
        }
    }

    /// Seconds between consecutive triggers.
    pub const fn spacing_secs(&self) -> u32 {
        self.spacing_secs
    }

    /// Number of triggers, always at least one.
    pub const fn chain_count(&self) -> usize {
        self.chain_count
    }

    /// Total ringing time covered by the chain.
    pub fn total_duration_secs(&self) -> u64 {
        u64::from(self.spacing_secs) * self.chain_count as u64
    }

    /// Copy with the count limited to `max_count`, never below one.
    #[must_use]
    pub fn trimmed(&self, max_count: usize) -> Self {
        Self::new(self.spacing_secs, self.chain_count.min(max_count))
    }
}

/// Computes chain shapes from [`ChainSettings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainPolicy {
    settings: ChainSettings,
}

impl ChainPolicy {
    /// Create a policy over the given settings.
    pub const fn new(settings: ChainSettings) -> Self {
        Self { settings }
    }

    /// Settings in force.
    pub const fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Clamp a raw spacing to `[1, 30]` seconds.
    pub fn normalized_spacing(raw_secs: i64) -> u32 {
        let clamped = raw_secs.clamp(i64::from(MIN_SPACING_SECS), i64::from(MAX_SPACING_SECS));
        u32::try_from(clamped).unwrap_or(MAX_SPACING_SECS)
    }

    /// Fit as many triggers as the ring window allows, capped by the settings.
    pub fn compute_chain(&self, requested_spacing_secs: i64) -> ChainConfiguration {
        let spacing = Self::normalized_spacing(requested_spacing_secs);
        let raw = (self.settings.ring_window_secs / spacing) as usize;
        let count = raw.clamp(1, self.settings.max_chain_count);
        ChainConfiguration::new(spacing, count)
    }

    /// Fire instants `base + k * spacing` for each trigger in the chain.
    ///
    /// Offsets are added to the absolute instant, so gaps are exact in real
    /// time whatever the local wall clock does in between.
    pub fn compute_fire_dates<Tz: TimeZone>(
        &self,
        base: &DateTime<Tz>,
        configuration: &ChainConfiguration,
    ) -> Vec<DateTime<Tz>> {
        let spacing = i64::from(configuration.spacing_secs());
        (0..configuration.chain_count())
            .map(|k| base.clone() + Duration::seconds(k as i64 * spacing))
            .collect()
    }
}
