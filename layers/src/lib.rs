mod activate;
mod combine;
mod manifest;
mod resolve;

pub use activate::{
    DisableFilter, ENV_INSTANCE_LAYERS, ENV_LAYERS_ALLOW, ENV_LAYERS_DISABLE, ENV_LAYERS_ENABLE,
    EnvFilters, resolve,
};
pub use combine::combine;
pub use resolve::{assemble_candidates, build_settings_layer_list, materialize};

use std::path::PathBuf;

use bitflags::bitflags;

use common::{LoaderError, LoaderResult};
use settings::LayerControl;

/// Vulkan's fixed layer-name buffer size; longer names cannot cross the ABI
pub const MAX_LAYER_NAME_LEN: usize = 256;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LayerType: u32 {
        /// Activated only when something asks for it by name
        const EXPLICIT = 1 << 0;
        /// Eligible for automatic activation
        const IMPLICIT = 1 << 1;
        /// Names other layers to activate as a group
        const META = 1 << 2;
    }
}

/// Which mechanism turned a layer on, kept for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnabledBy {
    #[default]
    None,
    SettingsFile,
    EnvEnable,
    EnvInstanceLayers,
    ApplicationApi,
    ImplicitDefault,
}

/// One discovered layer candidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerProperties {
    pub name: String,
    pub library_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub kind: LayerType,
    /// Control state stamped from the settings file; `Auto` for layers the
    /// settings file does not mention
    pub control: LayerControl,
    pub enabled_by: EnabledBy,
    /// Environment variable that disables this implicit layer when set
    pub disable_environment: Option<String>,
    /// Environment variable that must be set for this implicit layer to
    /// activate
    pub enable_environment: Option<String>,
    /// Constituent layer names; non-empty exactly for meta-layers
    pub component_layers: Vec<String>,
}

impl LayerProperties {
    /// Blocklist marker for an `off` settings entry; matches by name alone
    pub fn blocklist(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control: LayerControl::Off,
            ..Self::default()
        }
    }

    /// Positional sentinel for `unordered_layer_location`
    pub fn unordered_sentinel() -> Self {
        Self {
            control: LayerControl::UnorderedLocation,
            ..Self::default()
        }
    }

    pub fn is_meta(&self) -> bool {
        self.kind.contains(LayerType::META)
    }

    pub fn is_implicit(&self) -> bool {
        self.kind.contains(LayerType::IMPLICIT)
    }

    pub fn is_sentinel(&self) -> bool {
        self.control == LayerControl::UnorderedLocation
    }

    /// Whether two entries denote the same layer for dedup purposes:
    /// `(name, library_path)` equality, relaxed to name-only when either
    /// side is a meta-layer or an `off` blocklist marker
    pub fn same_layer(&self, other: &LayerProperties) -> bool {
        if self.name != other.name {
            return false;
        }
        if self.is_meta() || other.is_meta() {
            return true;
        }
        if self.control == LayerControl::Off || other.control == LayerControl::Off {
            return true;
        }
        self.library_path == other.library_path
    }
}

/// Ordered layer candidates; insertion order is activation order
///
/// The list never holds two entries that `same_layer` considers duplicates
/// when grown through `push_unique`.
#[derive(Debug, Default)]
pub struct LayerList {
    entries: Vec<LayerProperties>,
    /// Forces `push` to fail once the list reaches this length, so
    /// out-of-memory unwind paths can be exercised
    #[cfg(test)]
    pub(crate) fail_pushes_after: Option<usize>,
}

impl LayerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LayerProperties> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&LayerProperties> {
        self.entries.get(index)
    }

    /// Appends a layer; the list is unchanged on failure
    pub fn push(&mut self, layer: LayerProperties) -> LoaderResult<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_pushes_after {
            if self.entries.len() >= limit {
                return Err(LoaderError::OutOfMemory);
            }
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| LoaderError::OutOfMemory)?;
        self.entries.push(layer);
        Ok(())
    }

    /// Appends unless an equivalent entry is already present, returning
    /// whether the layer was inserted
    pub fn push_unique(&mut self, layer: LayerProperties) -> LoaderResult<bool> {
        if self.contains_layer(&layer) {
            return Ok(false);
        }
        self.push(layer)?;
        Ok(true)
    }

    pub fn contains_layer(&self, layer: &LayerProperties) -> bool {
        self.entries.iter().any(|x| x.same_layer(layer))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&LayerProperties> {
        self.entries.iter().find(|x| x.name == name)
    }

    pub(crate) fn into_entries(self) -> Vec<LayerProperties> {
        self.entries
    }
}

impl IntoIterator for LayerList {
    type Item = LayerProperties;
    type IntoIter = std::vec::IntoIter<LayerProperties>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a LayerList {
    type Item = &'a LayerProperties;
    type IntoIter = std::slice::Iter<'a, LayerProperties>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<LayerProperties> for LayerList {
    fn from_iter<T: IntoIterator<Item = LayerProperties>>(iter: T) -> Self {
        let mut list = Self::default();
        list.entries = iter.into_iter().collect();
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str, lib: &str) -> LayerProperties {
        LayerProperties {
            name: name.into(),
            library_path: Some(PathBuf::from(lib)),
            kind: LayerType::EXPLICIT,
            ..LayerProperties::default()
        }
    }

    #[test]
    fn same_layer_requires_matching_library() {
        let a = layer("VK_LAYER_X", "/a.so");
        let b = layer("VK_LAYER_X", "/b.so");
        assert!(!a.same_layer(&b));
        assert!(a.same_layer(&layer("VK_LAYER_X", "/a.so")));
    }

    #[test]
    fn meta_layers_match_by_name_only() {
        let mut meta = layer("VK_LAYER_X", "/a.so");
        meta.kind = LayerType::META;
        let other = layer("VK_LAYER_X", "/b.so");
        assert!(meta.same_layer(&other));
        assert!(other.same_layer(&meta));
    }

    #[test]
    fn blocklist_matches_by_name_only() {
        let off = LayerProperties::blocklist("VK_LAYER_X");
        assert!(off.same_layer(&layer("VK_LAYER_X", "/b.so")));
        assert!(!off.same_layer(&layer("VK_LAYER_Y", "/b.so")));
    }

    #[test]
    fn push_unique_preserves_first_entry() {
        let mut list = LayerList::new();
        assert!(list.push_unique(layer("VK_LAYER_X", "/a.so")).unwrap());
        assert!(!list.push_unique(layer("VK_LAYER_X", "/a.so")).unwrap());
        assert!(list.push_unique(layer("VK_LAYER_X", "/b.so")).unwrap());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn forced_push_failure_reports_out_of_memory() {
        let mut list = LayerList::new();
        list.fail_pushes_after = Some(1);
        list.push(layer("VK_LAYER_X", "/a.so")).unwrap();
        assert_eq!(
            list.push(layer("VK_LAYER_Y", "/b.so")),
            Err(LoaderError::OutOfMemory)
        );
        assert_eq!(list.len(), 1);
    }
}
