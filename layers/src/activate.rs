use std::env;

use tracing::{info, warn};

use common::{LoaderResult, StringList};
use settings::LayerControl;

use crate::{EnabledBy, LayerList, LayerProperties};

pub const ENV_LAYERS_ENABLE: &str = "VK_LOADER_LAYERS_ENABLE";
pub const ENV_LAYERS_DISABLE: &str = "VK_LOADER_LAYERS_DISABLE";
pub const ENV_LAYERS_ALLOW: &str = "VK_LOADER_LAYERS_ALLOW";
/// Legacy enable list, delimited like a PATH variable
pub const ENV_INSTANCE_LAYERS: &str = "VK_INSTANCE_LAYERS";

/// Disable-filter token matching every layer
const TOKEN_ALL: &str = "~all~";
/// Disable-filter token matching implicit layers
const TOKEN_IMPLICIT: &str = "~implicit~";

const PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Parsed form of `VK_LOADER_LAYERS_DISABLE`
#[derive(Debug, Default, Clone)]
pub struct DisableFilter {
    pub all: bool,
    pub all_implicit: bool,
    pub names: StringList,
}

impl DisableFilter {
    fn parse(raw: &str) -> LoaderResult<Self> {
        let mut filter = Self::default();
        for token in split_list(raw) {
            match token {
                TOKEN_ALL => filter.all = true,
                TOKEN_IMPLICIT => filter.all_implicit = true,
                name => {
                    filter.names.push_unique(name)?;
                }
            }
        }
        Ok(filter)
    }

    fn matches(&self, layer: &LayerProperties) -> bool {
        self.all || (self.all_implicit && layer.is_implicit()) || self.names.contains(&layer.name)
    }
}

/// Environment-variable layer filters, read once per resolution pass
#[derive(Debug, Default, Clone)]
pub struct EnvFilters {
    pub disable: DisableFilter,
    /// Names exempt from the disable filter
    pub allow: StringList,
    pub enable: StringList,
    /// Legacy `VK_INSTANCE_LAYERS` names
    pub instance_layers: StringList,
}

impl EnvFilters {
    pub fn from_env() -> LoaderResult<Self> {
        Self::parse(
            env::var(ENV_LAYERS_DISABLE).ok().as_deref(),
            env::var(ENV_LAYERS_ALLOW).ok().as_deref(),
            env::var(ENV_LAYERS_ENABLE).ok().as_deref(),
            env::var(ENV_INSTANCE_LAYERS).ok().as_deref(),
        )
    }

    /// Pure parsing core; the enable/disable/allow lists are
    /// comma-separated, the legacy list is path-separator-delimited and
    /// compared whole-token, never by substring
    pub fn parse(
        disable: Option<&str>,
        allow: Option<&str>,
        enable: Option<&str>,
        instance_layers: Option<&str>,
    ) -> LoaderResult<Self> {
        let mut filters = Self::default();
        if let Some(raw) = disable {
            filters.disable = DisableFilter::parse(raw)?;
        }
        if let Some(raw) = allow {
            collect_names(raw, &mut filters.allow)?;
        }
        if let Some(raw) = enable {
            collect_names(raw, &mut filters.enable)?;
        }
        if let Some(raw) = instance_layers {
            for token in raw
                .split(PATH_SEPARATOR)
                .map(str::trim)
                .filter(|t| !t.is_empty())
            {
                filters.instance_layers.push_unique(token)?;
            }
        }
        Ok(filters)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn collect_names(raw: &str, into: &mut StringList) -> LoaderResult<()> {
    for token in split_list(raw) {
        into.push_unique(token)?;
    }
    Ok(())
}

/// Decides the final enabled set
///
/// Returns `(target, activated)`: the expanded list the loader will
/// instantiate, and the activation record kept for diagnostics. Candidates
/// are visited in list order, which is also activation order. An `off`
/// control from the settings file overrides every other mechanism; an `on`
/// control bypasses them.
pub fn resolve(
    filters: &EnvFilters,
    app_requested: &[&str],
    candidates: &LayerList,
) -> LoaderResult<(LayerList, LayerList)> {
    let mut target = LayerList::new();
    let mut activated = LayerList::new();

    for layer in candidates {
        if layer.is_sentinel() {
            continue;
        }
        if layer.control == LayerControl::Off {
            info!("layer {} disabled by loader settings", layer.name);
            continue;
        }

        let enabled_by = if layer.control == LayerControl::On {
            EnabledBy::SettingsFile
        } else if filters.disable.matches(layer) && !filters.allow.contains(&layer.name) {
            info!("layer {} forced disabled by {}", layer.name, ENV_LAYERS_DISABLE);
            continue;
        } else if filters.enable.contains(&layer.name) {
            EnabledBy::EnvEnable
        } else if filters.instance_layers.contains(&layer.name) {
            EnabledBy::EnvInstanceLayers
        } else if app_requested.contains(&layer.name.as_str()) {
            EnabledBy::ApplicationApi
        } else if layer.is_implicit() && implicit_layer_enabled(layer) {
            EnabledBy::ImplicitDefault
        } else {
            continue;
        };

        let mut expanding = Vec::new();
        activate(
            layer,
            enabled_by,
            candidates,
            &mut target,
            &mut activated,
            &mut expanding,
        )?;
    }

    Ok((target, activated))
}

/// Appends an enabled layer, expanding meta-layers into their constituents
fn activate(
    layer: &LayerProperties,
    enabled_by: EnabledBy,
    candidates: &LayerList,
    target: &mut LayerList,
    activated: &mut LayerList,
    expanding: &mut Vec<String>,
) -> LoaderResult<()> {
    if layer.is_sentinel() || layer.control == LayerControl::Off {
        return Ok(());
    }

    if layer.is_meta() {
        if expanding.iter().any(|name| name == &layer.name) {
            warn!(
                "meta-layer {} includes itself through a cycle; ignoring",
                layer.name
            );
            return Ok(());
        }
        expanding.push(layer.name.clone());
        for component in &layer.component_layers {
            match candidates.find_by_name(component) {
                Some(component) => {
                    activate(component, enabled_by, candidates, target, activated, expanding)?
                }
                None => warn!(
                    "meta-layer {} names unknown layer {}",
                    layer.name, component
                ),
            }
        }
        expanding.pop();
        return Ok(());
    }

    if target.contains_layer(layer) {
        return Ok(());
    }
    let mut enabled = layer.clone();
    enabled.enabled_by = enabled_by;
    target.push(enabled.clone())?;
    activated.push(enabled)?;
    Ok(())
}

/// Whether an implicit layer's environment gates leave it enabled
fn implicit_layer_enabled(layer: &LayerProperties) -> bool {
    if let Some(var) = &layer.disable_environment {
        if env::var_os(var).is_some() {
            return false;
        }
    }
    match &layer.enable_environment {
        Some(var) => env::var_os(var).is_some(),
        None => true,
    }
}
