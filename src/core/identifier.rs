//! Trigger identifier wire format.
//!
//! Identifiers look like
//! `<namespace>-<OWNER-UUID>-occ-<ISO8601 with millis>-<index>`, e.g.
//! `alarm-6F1C...-occ-2025-10-05T14:30:00.000Z-0`. The timestamp is the
//! occurrence anchor shared by every trigger of one chain and the trailing
//! index is the position inside the chain. The format is persisted and must
//! not change.

use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "alarm";

const OCC_SEPARATOR: &str = "-occ-";

/// Format an occurrence key: ISO8601 UTC with millisecond precision.
pub fn occurrence_key(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an occurrence key produced by [`occurrence_key`].
pub fn parse_occurrence_key(key: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(key)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// One trigger of one occurrence of one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationIdentifier {
    owner_id: Uuid,
    fire_date: DateTime<Utc>,
    occurrence: usize,
}

impl NotificationIdentifier {
    /// Build an identifier. The date is truncated to milliseconds so that
    /// encoding is lossless.
    pub fn new(owner_id: Uuid, fire_date: DateTime<Utc>, occurrence: usize) -> Self {
        Self {
            owner_id,
            fire_date: fire_date.trunc_subsecs(3),
            occurrence,
        }
    }

    /// Owner this trigger belongs to.
    pub const fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Occurrence anchor encoded in the identifier.
    pub const fn fire_date(&self) -> DateTime<Utc> {
        self.fire_date
    }

    /// Position inside the chain.
    pub const fn occurrence(&self) -> usize {
        self.occurrence
    }

    /// Occurrence key string of the encoded anchor.
    pub fn occurrence_key(&self) -> String {
        occurrence_key(&self.fire_date)
    }
}

/// Encodes and parses identifiers within one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierCodec {
    namespace: String,
}

impl Default for IdentifierCodec {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl IdentifierCodec {
    /// Codec for the given namespace prefix.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Canonical string form.
    pub fn encode(&self, id: &NotificationIdentifier) -> String {
        format!(
            "{}-{}{}{}-{}",
            self.namespace,
            id.owner_id.as_hyphenated().to_string().to_uppercase(),
            OCC_SEPARATOR,
            id.occurrence_key(),
            id.occurrence
        )
    }

    /// Exact inverse of [`encode`](Self::encode). Anything else yields `None`.
    pub fn parse(&self, raw: &str) -> Option<NotificationIdentifier> {
        let (owner_part, rest) = raw.split_once(OCC_SEPARATOR)?;
        let owner_id = self.parse_owner_part(owner_part)?;

        let (date_part, index_part) = rest.rsplit_once('-')?;
        if index_part.is_empty() || !index_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let occurrence = index_part.parse().ok()?;
        let fire_date = parse_occurrence_key(date_part)?;

        Some(NotificationIdentifier {
            owner_id,
            fire_date,
            occurrence,
        })
    }

    /// Owner of a raw identifier, looking only at the part before `-occ-`.
    pub fn parse_owner_id(&self, raw: &str) -> Option<Uuid> {
        let (owner_part, _) = raw.split_once(OCC_SEPARATOR)?;
        self.parse_owner_part(owner_part)
    }

    /// Occurrence anchor encoded in a raw identifier.
    pub fn parse_occurrence_date(&self, raw: &str) -> Option<DateTime<Utc>> {
        self.parse(raw).map(|id| id.fire_date)
    }

    /// True when `raw` is a well-formed identifier of this namespace.
    pub fn recognizes(&self, raw: &str) -> bool {
        self.parse(raw).is_some()
    }

    fn parse_owner_part(&self, owner_part: &str) -> Option<Uuid> {
        let uuid = owner_part
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix('-')?;
        Uuid::parse_str(uuid).ok()
    }
}

impl fmt::Display for NotificationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&IdentifierCodec::default().encode(self))
    }
}
