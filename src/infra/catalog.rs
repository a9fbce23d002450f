//! Fixed sound catalog.

use std::collections::HashMap;

use crate::core::{DurationCatalog, SoundInfo};

/// Catalog backed by a map filled at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDurationCatalog {
    sounds: HashMap<String, SoundInfo>,
}

impl StaticDurationCatalog {
    /// Empty catalog; every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sound.
    #[must_use]
    pub fn with_sound(mut self, sound_id: impl Into<String>, file_name: impl Into<String>, duration_secs: Option<u32>) -> Self {
        self.insert(sound_id, file_name, duration_secs);
        self
    }

    /// Add or replace a sound.
    pub fn insert(&mut self, sound_id: impl Into<String>, file_name: impl Into<String>, duration_secs: Option<u32>) {
        self.sounds.insert(
            sound_id.into(),
            SoundInfo {
                file_name: file_name.into(),
                duration_secs,
            },
        );
    }
}

impl DurationCatalog for StaticDurationCatalog {
    fn lookup(&self, sound_id: &str) -> Option<SoundInfo> {
        self.sounds.get(sound_id).cloned()
    }
}
