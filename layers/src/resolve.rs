use tracing::info;

use common::{LoaderError, LoaderResult};
use settings::{LayerConfiguration, LayerControl, LoaderSettings};

use crate::{LayerList, LayerProperties, LayerType, combine, manifest};

/// Materializes one settings-file layer configuration into `settings_layers`
///
/// A missing or unusable manifest skips the entry rather than failing the
/// pass; one bad manifest must not block the other layers. Only allocation
/// failure aborts.
pub fn materialize(
    config: &LayerConfiguration,
    settings_layers: &mut LayerList,
) -> LoaderResult<()> {
    match config.control {
        LayerControl::Off => {
            let Some(name) = &config.name else {
                return Ok(());
            };
            settings_layers.push(LayerProperties::blocklist(name.clone()))
        }
        LayerControl::UnorderedLocation => {
            settings_layers.push(LayerProperties::unordered_sentinel())
        }
        LayerControl::Auto | LayerControl::On => {
            let (Some(name), Some(path)) = (&config.name, &config.path) else {
                // Nothing to look up; not an error
                return Ok(());
            };
            let declared = match manifest::read_manifest(path) {
                Ok(declared) => declared,
                Err(LoaderError::OutOfMemory) => return Err(LoaderError::OutOfMemory),
                Err(_) => {
                    info!("skipping layer {name}: unusable manifest {}", path.display());
                    return Ok(());
                }
            };
            let Some(mut layer) = declared.into_iter().find(|l| &l.name == name) else {
                info!(
                    "skipping layer {name}: manifest {} does not declare it",
                    path.display()
                );
                return Ok(());
            };
            layer.control = config.control;
            if config.treat_as_implicit {
                layer.kind = (layer.kind - LayerType::EXPLICIT) | LayerType::IMPLICIT;
            }
            if settings_layers
                .iter()
                .any(|existing| existing.same_layer(&layer) && !existing.is_meta())
            {
                info!("skipping duplicate layer {name}");
                return Ok(());
            }
            settings_layers.push(layer)
        }
    }
}

/// Converts every configuration of `settings` into the settings-sourced
/// layer list, in file order
pub fn build_settings_layer_list(settings: &LoaderSettings) -> LoaderResult<LayerList> {
    let mut list = LayerList::new();
    for config in &settings.configurations {
        materialize(config, &mut list)?;
    }
    Ok(list)
}

/// Builds the full candidate list for an instance: settings-sourced layers
/// merged with independently discovered ones
pub fn assemble_candidates(
    settings: Option<&LoaderSettings>,
    regular_layers: LayerList,
) -> LoaderResult<LayerList> {
    match settings {
        Some(settings) => {
            let settings_layers = build_settings_layer_list(settings)?;
            combine(settings_layers, regular_layers)
        }
        None => Ok(regular_layers),
    }
}
