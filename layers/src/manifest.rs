use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use common::{LoaderError, LoaderResult};
use settings::LayerControl;

use crate::{EnabledBy, LayerProperties, LayerType, MAX_LAYER_NAME_LEN};

/// Manifest data as parsed directly out of the JSON file
///
/// A manifest declares either a single `layer` object or a `layers` array;
/// unknown fields (descriptions, function remapping, API versions beyond the
/// format version) are ignored here.
#[derive(Deserialize)]
struct RawManifest {
    file_format_version: Option<String>,
    layer: Option<RawLayer>,
    #[serde(default)]
    layers: Vec<RawLayer>,
}

#[derive(Deserialize)]
struct RawLayer {
    name: String,
    library_path: Option<String>,
    #[serde(default)]
    component_layers: Vec<String>,
    disable_environment: Option<BTreeMap<String, String>>,
    enable_environment: Option<BTreeMap<String, String>>,
}

/// Reads a layer manifest and extracts the declared layers
///
/// The returned properties carry no control state; the caller stamps
/// `control` and the implicit/explicit kind from its configuration. Any
/// structural problem is `Invalid`, which callers degrade to skipping the
/// one configuration that referenced this manifest.
pub(crate) fn read_manifest(path: &Path) -> LoaderResult<Vec<LayerProperties>> {
    let data = fs::read(path).map_err(|e| {
        debug!("failed to read manifest {}: {}", path.display(), e);
        LoaderError::Invalid
    })?;
    let raw: RawManifest = serde_json::from_slice(&data).map_err(|e| {
        debug!("failed to parse manifest {}: {}", path.display(), e);
        LoaderError::Invalid
    })?;
    if raw.file_format_version.is_none() {
        debug!("{}: manifest missing file_format_version", path.display());
    }

    let declared: Vec<RawLayer> = raw.layer.into_iter().chain(raw.layers).collect();
    if declared.is_empty() {
        debug!("{}: manifest declares no layers", path.display());
        return Err(LoaderError::Invalid);
    }

    declared.into_iter().map(|raw| cook_layer(raw, path)).collect()
}

fn cook_layer(raw: RawLayer, path: &Path) -> LoaderResult<LayerProperties> {
    if raw.name.len() > MAX_LAYER_NAME_LEN {
        debug!(
            "{}: layer name exceeds {} bytes",
            path.display(),
            MAX_LAYER_NAME_LEN
        );
        return Err(LoaderError::Invalid);
    }
    let kind = if raw.component_layers.is_empty() {
        LayerType::EXPLICIT
    } else {
        LayerType::META
    };
    Ok(LayerProperties {
        name: raw.name,
        library_path: raw.library_path.map(PathBuf::from),
        manifest_path: Some(path.to_owned()),
        kind,
        control: LayerControl::Auto,
        enabled_by: EnabledBy::None,
        disable_environment: first_key(raw.disable_environment),
        enable_environment: first_key(raw.enable_environment),
        component_layers: raw.component_layers,
    })
}

fn first_key(map: Option<BTreeMap<String, String>>) -> Option<String> {
    map.and_then(|m| m.into_keys().next())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn write_manifest(value: &serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    #[test]
    fn single_layer_manifest() {
        let file = write_manifest(&json!({
            "file_format_version": "1.2.0",
            "layer": {
                "name": "VK_LAYER_FOO",
                "library_path": "libfoo.so",
                "disable_environment": {"DISABLE_FOO": "1"},
            },
        }));
        let layers = read_manifest(file.path()).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].name, "VK_LAYER_FOO");
        assert_eq!(
            layers[0].library_path.as_deref(),
            Some(Path::new("libfoo.so"))
        );
        assert_eq!(layers[0].kind, LayerType::EXPLICIT);
        assert_eq!(layers[0].disable_environment.as_deref(), Some("DISABLE_FOO"));
        assert_eq!(layers[0].manifest_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn meta_layer_manifest() {
        let file = write_manifest(&json!({
            "file_format_version": "1.2.0",
            "layer": {
                "name": "VK_LAYER_GROUP",
                "component_layers": ["VK_LAYER_A", "VK_LAYER_B"],
            },
        }));
        let layers = read_manifest(file.path()).unwrap();
        assert_eq!(layers[0].kind, LayerType::META);
        assert_eq!(layers[0].component_layers, ["VK_LAYER_A", "VK_LAYER_B"]);
    }

    #[test]
    fn multi_layer_manifest() {
        let file = write_manifest(&json!({
            "file_format_version": "1.2.0",
            "layers": [
                {"name": "VK_LAYER_A", "library_path": "liba.so"},
                {"name": "VK_LAYER_B", "library_path": "libb.so"},
            ],
        }));
        let layers = read_manifest(file.path()).unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].name, "VK_LAYER_B");
    }

    #[test]
    fn empty_manifest_is_invalid() {
        let file = write_manifest(&json!({"file_format_version": "1.2.0"}));
        assert_eq!(read_manifest(file.path()), Err(LoaderError::Invalid));
    }

    #[test]
    fn missing_file_is_invalid() {
        assert_eq!(
            read_manifest(Path::new("/nonexistent/manifest.json")),
            Err(LoaderError::Invalid)
        );
    }

    #[test]
    fn oversize_name_is_invalid() {
        let file = write_manifest(&json!({
            "file_format_version": "1.2.0",
            "layer": {"name": "X".repeat(MAX_LAYER_NAME_LEN + 1), "library_path": "libx.so"},
        }));
        assert_eq!(read_manifest(file.path()), Err(LoaderError::Invalid));
    }
}
