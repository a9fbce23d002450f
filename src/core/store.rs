//! Seams to the outside world: trigger substrate, sound catalog, key-value
//! persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SchedulerError;

/// Authorization state reported by the trigger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Triggers may be scheduled.
    Authorized,
    /// The user refused.
    Denied,
    /// Quiet delivery only; not enough for an alarm.
    Provisional,
    /// Never asked.
    NotDetermined,
}

/// Content delivered with a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    /// Owner of the chain.
    pub owner_id: Uuid,
    /// Occurrence key of the chain anchor.
    pub occurrence_key: String,
    /// Title line.
    pub title: String,
    /// Body line.
    pub body: String,
    /// Sound file to play.
    pub sound_file: String,
    /// Action category.
    pub category: String,
}

/// One-shot trigger submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Canonical identifier.
    pub identifier: String,
    /// Absolute fire instant.
    pub fire_at: DateTime<Utc>,
    /// Delivered content.
    pub payload: TriggerPayload,
}

/// A trigger that already fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredTrigger {
    /// Canonical identifier.
    pub identifier: String,
    /// When it fired.
    pub delivered_at: DateTime<Utc>,
}

/// External substrate of discrete, future, one-shot triggers under a global
/// quota.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Current authorization state.
    async fn authorization(&self) -> AuthorizationStatus;
    /// Submit a single trigger.
    async fn submit(&self, request: TriggerRequest) -> Result<(), SchedulerError>;
    /// Identifiers of all pending triggers, including foreign ones.
    async fn list_pending(&self) -> Result<Vec<String>, SchedulerError>;
    /// Remove pending triggers. Unknown identifiers are ignored.
    async fn remove(&self, identifiers: &[String]) -> Result<(), SchedulerError>;
    /// Triggers that already fired and are still on display.
    async fn list_delivered(&self) -> Result<Vec<DeliveredTrigger>, SchedulerError>;
}

/// Sound metadata used to size chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundInfo {
    /// File delivered with the trigger.
    pub file_name: String,
    /// Playback length, when known.
    pub duration_secs: Option<u32>,
}

/// Sound lookup.
pub trait DurationCatalog: Send + Sync {
    /// Metadata for a sound id, if known.
    fn lookup(&self, sound_id: &str) -> Option<SoundInfo>;
}

/// Minimal string key-value persistence with atomic single-key overwrite.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, SchedulerError>;
    /// Overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<(), SchedulerError>;
    /// Delete a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), SchedulerError>;
    /// All keys currently present.
    fn keys(&self) -> Result<Vec<String>, SchedulerError>;
}
