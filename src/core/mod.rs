//! Core chain scheduling: sizing policy, quota admission, identifier index,
//! the scheduler and the reconciler.

pub mod chain_policy;
pub mod error;
pub mod identifier;
pub mod index;
pub mod limit_guard;
pub mod outcome;
pub mod reconciler;
pub mod recurrence;
pub mod scheduler;
pub mod single_flight;
pub mod store;

pub use chain_policy::{ChainConfiguration, ChainPolicy, ChainSettings};
pub use error::{AppResult, SchedulerError};
pub use identifier::{occurrence_key, parse_occurrence_key, IdentifierCodec, NotificationIdentifier};
pub use index::{ChainMeta, NotificationIndex};
pub use limit_guard::{GlobalLimitConfig, GlobalLimitGuard, Reservation};
pub use outcome::{ScheduleOutcome, UnavailableReason};
pub use reconciler::{Reconciler, RefreshReport};
pub use recurrence::{OwnerConfig, RecurrenceRule};
pub use scheduler::{ChainedScheduler, SchedulerDeps};
pub use single_flight::SingleFlight;
pub use store::{
    AuthorizationStatus, DeliveredTrigger, DurationCatalog, KeyValueStore, SoundInfo, TriggerPayload, TriggerRequest,
    TriggerStore,
};
