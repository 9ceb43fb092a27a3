use std::sync::{Arc, Mutex};

use tracing::debug;

use common::LoaderResult;

use crate::{LoaderSettings, LogFilter, Platform, file};

/// Process-wide home for the currently applicable loader settings
///
/// Writers serialize on the internal lock for the whole discard-then-replace
/// of `update`; readers hold it only long enough to clone out a reference.
/// Callers that carry their own pre-resolved `LoaderSettings` never need a
/// store and never take the lock. No method calls another locking method
/// while holding the lock.
#[derive(Default)]
pub struct SettingsStore {
    current: Mutex<Option<Arc<LoaderSettings>>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads the settings file and replaces the held settings
    ///
    /// The previous settings are discarded even when loading fails, so a
    /// store never serves stale state after the file disappears. Safe to
    /// call any number of times; last writer wins under concurrent calls.
    pub fn update(&self, platform: &dyn Platform) -> LoaderResult<()> {
        let loaded = file::load(platform);
        let mut current = self.current.lock().unwrap();
        *current = None;
        let settings = loaded?;
        if settings.active && !settings.stderr_filter.is_empty() {
            debug!(
                filter = ?settings.stderr_filter,
                "applying stderr log filter from loader settings"
            );
        }
        *current = Some(Arc::new(settings));
        Ok(())
    }

    /// Takes a reference to the current settings, if any
    pub fn get(&self) -> Option<Arc<LoaderSettings>> {
        self.current.lock().unwrap().clone()
    }

    /// The stderr filter of the active settings; empty when none are held
    pub fn stderr_filter(&self) -> LogFilter {
        self.get().map(|s| s.stderr_filter).unwrap_or_default()
    }

    /// Releases the held settings
    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }
}
