mod discovery;
mod file;
mod store;

pub use discovery::{HostPlatform, Platform};
pub use file::load;
pub use store::SettingsStore;

use std::path::PathBuf;

use bitflags::bitflags;
use tracing::debug;

/// File name of the loader settings document within a `loader_settings.d`
/// directory
pub const SETTINGS_FILE_NAME: &str = "vk_loader_settings.json";

/// Per-layer control state declared by the settings file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerControl {
    /// Normal discovery and enablement rules apply
    #[default]
    Auto,
    /// Force-enabled regardless of any other filter
    On,
    /// Force-disabled; acts as a blocklist entry matched by name
    Off,
    /// Positional sentinel: layers found outside the settings file are
    /// spliced in at this point of the order
    UnorderedLocation,
}

impl LayerControl {
    /// Maps a settings-file control string. Unrecognized strings fall back
    /// to `Auto` rather than failing the load.
    pub fn parse(s: &str) -> Self {
        match s {
            "auto" => Self::Auto,
            "on" => Self::On,
            "off" => Self::Off,
            "unordered_layer_location" => Self::UnorderedLocation,
            other => {
                debug!("unrecognized layer control {other:?}, treating as auto");
                Self::Auto
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::On => "on",
            Self::Off => "off",
            Self::UnorderedLocation => "unordered_layer_location",
        }
    }
}

bitflags! {
    /// Loader log categories the settings file routes to stderr
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LogFilter: u32 {
        const INFO = 1 << 0;
        const WARN = 1 << 1;
        const PERF = 1 << 2;
        const ERROR = 1 << 3;
        const DEBUG = 1 << 4;
        const LAYER = 1 << 5;
        const DRIVER = 1 << 6;
        const VALIDATION = 1 << 7;
        const ALL = Self::INFO.bits()
            | Self::WARN.bits()
            | Self::PERF.bits()
            | Self::ERROR.bits()
            | Self::DEBUG.bits()
            | Self::LAYER.bits()
            | Self::DRIVER.bits()
            | Self::VALIDATION.bits();
    }
}

impl LogFilter {
    /// Maps one `stderr_log` filter name; `None` for unknown names
    pub fn parse_token(s: &str) -> Option<Self> {
        Some(match s {
            "all" => Self::ALL,
            "info" => Self::INFO,
            "warn" => Self::WARN,
            "perf" => Self::PERF,
            "error" => Self::ERROR,
            "debug" => Self::DEBUG,
            "layer" => Self::LAYER,
            "driver" => Self::DRIVER,
            "validation" => Self::VALIDATION,
            _ => return None,
        })
    }
}

/// One entry of the settings file's `layers` array
///
/// `Off` entries carry a name only; the sentinel carries neither name nor
/// path; everything else carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfiguration {
    pub control: LayerControl,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    /// Treat the referenced manifest as describing an implicit layer
    pub treat_as_implicit: bool,
}

/// Contents of the loader settings document after app-key selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSettings {
    pub active: bool,
    pub stderr_filter: LogFilter,
    /// Whether any configuration is the unordered-location sentinel, i.e.
    /// whether layers from other sources participate at all
    pub has_unordered_location: bool,
    /// Layer configurations in file order, which is activation order
    pub configurations: Vec<LayerConfiguration>,
    /// The document these settings were loaded from
    pub path: PathBuf,
}

impl LoaderSettings {
    /// Whether two independently loaded settings denote the same
    /// configuration
    pub fn same_as(&self, other: &LoaderSettings) -> bool {
        self == other
    }
}
