use std::env;
use std::path::PathBuf;

use crate::SETTINGS_FILE_NAME;

/// OS-specific discovery of loader inputs
///
/// Implementations answer where the settings document lives and which
/// executable the current process is, so settings objects can be matched
/// against `app_keys`. Tests substitute fixed answers.
pub trait Platform {
    /// Path of an existing loader settings document, if any
    fn settings_path(&self) -> Option<PathBuf>;
    /// Absolute path of the current executable
    fn current_exe(&self) -> Option<PathBuf>;
}

/// Discovery backed by the real process environment
///
/// The per-user data directory is searched before the system-wide one, so a
/// user-installed settings file shadows the machine default. Registry-based
/// discovery on Windows is an external concern; there only the per-user
/// location is consulted.
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn settings_path(&self) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dirs) = directories::BaseDirs::new() {
            candidates.push(
                dirs.data_local_dir()
                    .join("vulkan/loader_settings.d")
                    .join(SETTINGS_FILE_NAME),
            );
        }
        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/vulkan/loader_settings.d").join(SETTINGS_FILE_NAME));
        candidates.into_iter().find(|p| p.is_file())
    }

    fn current_exe(&self) -> Option<PathBuf> {
        env::current_exe().ok()
    }
}
