use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use common::{LoaderError, LoaderResult};

use crate::{LayerConfiguration, LayerControl, LoaderSettings, LogFilter, Platform};

/// Locates and parses the loader settings document, selecting the single
/// settings object applicable to the current process.
///
/// Soft failures (no file, unparsable document, no matching settings object)
/// surface as `NotFound` and mean "run without settings". Only `OutOfMemory`
/// is fatal to the caller's larger operation. A malformed entry in `layers`
/// invalidates the whole document; partial settings are never returned.
pub fn load(platform: &dyn Platform) -> LoaderResult<LoaderSettings> {
    let Some(path) = platform.settings_path() else {
        debug!("no loader settings file found");
        return Err(LoaderError::NotFound);
    };

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            debug!("failed to read {}: {}", path.display(), e);
            return Err(LoaderError::NotFound);
        }
    };
    let document: Value = match serde_json::from_slice(&data) {
        Ok(x) => x,
        Err(e) => {
            warn!("failed to parse {}: {}", path.display(), e);
            return Err(LoaderError::NotFound);
        }
    };
    let Some(root) = document.as_object() else {
        warn!("{}: top-level value is not an object", path.display());
        return Err(LoaderError::NotFound);
    };

    if !root.get("file_format_version").is_some_and(Value::is_string) {
        debug!("{}: missing file_format_version", path.display());
        return Err(LoaderError::NotFound);
    }

    // A document carries either an array of settings objects or a single one
    let candidates: Vec<&Value> = if let Some(array) = root.get("settings_array") {
        array.as_array().map(|a| a.iter().collect()).unwrap_or_default()
    } else if let Some(single) = root.get("settings") {
        vec![single]
    } else {
        warn!(
            "{}: neither settings nor settings_array present",
            path.display()
        );
        return Err(LoaderError::InitializationFailed);
    };

    let Some(object) = select_settings_object(&candidates, platform) else {
        debug!("{}: no settings object applies to this process", path.display());
        return Err(LoaderError::NotFound);
    };

    let mut stderr_filter = LogFilter::empty();
    if let Some(names) = object.get("stderr_log").and_then(Value::as_array) {
        for name in names.iter().filter_map(Value::as_str) {
            match LogFilter::parse_token(name) {
                Some(bits) => stderr_filter |= bits,
                None => warn!("{}: unknown stderr_log filter {name:?}", path.display()),
            }
        }
    }

    validate_log_locations(object, &path);

    let mut configurations = Vec::new();
    if let Some(layers) = object.get("layers").and_then(Value::as_array) {
        configurations
            .try_reserve(layers.len())
            .map_err(|_| LoaderError::OutOfMemory)?;
        for layer in layers {
            // All or nothing: one malformed entry invalidates the document
            configurations.push(parse_layer_configuration(layer)?);
        }
    }
    let has_unordered_location = configurations
        .iter()
        .any(|c| c.control == LayerControl::UnorderedLocation);

    Ok(LoaderSettings {
        active: true,
        stderr_filter,
        has_unordered_location,
        configurations,
        path,
    })
}

/// Picks the first settings object whose `app_keys` names the current
/// executable, falling back to the first object with no `app_keys` at all
fn select_settings_object<'a>(
    candidates: &[&'a Value],
    platform: &dyn Platform,
) -> Option<&'a Map<String, Value>> {
    let exe = platform.current_exe();
    let mut global = None;
    for candidate in candidates {
        let Some(object) = candidate.as_object() else {
            continue;
        };
        match object.get("app_keys").and_then(Value::as_array) {
            None => {
                if global.is_none() {
                    global = Some(object);
                }
            }
            Some(keys) => {
                let Some(exe) = exe.as_deref() else { continue };
                if keys
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|key| Path::new(key) == exe)
                {
                    return Some(object);
                }
            }
        }
    }
    global
}

/// Shape check only; the values are consumed elsewhere
fn validate_log_locations(object: &Map<String, Value>, path: &Path) {
    let Some(locations) = object.get("log_locations").and_then(Value::as_array) else {
        return;
    };
    for location in locations {
        let valid = location.as_object().is_some_and(|loc| {
            ["destinations", "filters"].iter().all(|key| {
                loc.get(*key)
                    .and_then(Value::as_array)
                    .is_some_and(|a| a.iter().all(Value::is_string))
            })
        });
        if !valid {
            warn!("{}: malformed log_locations entry", path.display());
        }
    }
}

/// Parses one entry of the `layers` array
///
/// `control` is required but permissive (unknown strings mean `Auto`). `off`
/// entries need only a name; the unordered-location sentinel needs nothing
/// further; everything else requires both `name` and `path`. Missing
/// required fields are a hard error that invalidates the whole settings
/// load.
pub(crate) fn parse_layer_configuration(value: &Value) -> LoaderResult<LayerConfiguration> {
    let object = value.as_object().ok_or(LoaderError::Invalid)?;
    let control_str = object
        .get("control")
        .and_then(Value::as_str)
        .ok_or(LoaderError::Invalid)?;
    let control = LayerControl::parse(control_str);

    if control == LayerControl::UnorderedLocation {
        return Ok(LayerConfiguration {
            control,
            name: None,
            path: None,
            treat_as_implicit: false,
        });
    }

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or(LoaderError::Invalid)?
        .to_owned();
    if control == LayerControl::Off {
        // Blocklist entries match by name alone; no manifest is consulted
        return Ok(LayerConfiguration {
            control,
            name: Some(name),
            path: None,
            treat_as_implicit: false,
        });
    }

    let path = object
        .get("path")
        .and_then(Value::as_str)
        .ok_or(LoaderError::Invalid)?;
    let treat_as_implicit = object
        .get("treat_as_implicit_manifest")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(LayerConfiguration {
        control,
        name: Some(name),
        path: Some(PathBuf::from(path)),
        treat_as_implicit,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    struct StubPlatform {
        settings: Option<PathBuf>,
        exe: PathBuf,
    }

    impl Platform for StubPlatform {
        fn settings_path(&self) -> Option<PathBuf> {
            self.settings.clone()
        }

        fn current_exe(&self) -> Option<PathBuf> {
            Some(self.exe.clone())
        }
    }

    fn write_settings(value: &Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    fn platform_for(file: &tempfile::NamedTempFile) -> StubPlatform {
        StubPlatform {
            settings: Some(file.path().to_owned()),
            exe: PathBuf::from("/opt/app/game"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let platform = StubPlatform {
            settings: None,
            exe: PathBuf::from("/opt/app/game"),
        };
        assert_eq!(load(&platform), Err(LoaderError::NotFound));
    }

    #[test]
    fn malformed_json_is_not_found() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        assert_eq!(load(&platform_for(&file)), Err(LoaderError::NotFound));
    }

    #[test]
    fn missing_version_is_not_found() {
        let file = write_settings(&json!({"settings": {"layers": []}}));
        assert_eq!(load(&platform_for(&file)), Err(LoaderError::NotFound));
    }

    #[test]
    fn missing_settings_object_fails_initialization() {
        let file = write_settings(&json!({"file_format_version": "1.0.0"}));
        assert_eq!(
            load(&platform_for(&file)),
            Err(LoaderError::InitializationFailed)
        );
    }

    #[test]
    fn single_settings_object() {
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings": {
                "stderr_log": ["error", "warn"],
                "layers": [
                    {"control": "on", "name": "VK_LAYER_A", "path": "/x/a.json"},
                    {"control": "off", "name": "VK_LAYER_B"},
                    {"control": "unordered_layer_location"},
                ],
            },
        }));
        let settings = load(&platform_for(&file)).unwrap();
        assert!(settings.active);
        assert_eq!(settings.stderr_filter, LogFilter::ERROR | LogFilter::WARN);
        assert!(settings.has_unordered_location);
        assert_eq!(settings.configurations.len(), 3);
        assert_eq!(settings.configurations[0].control, LayerControl::On);
        assert_eq!(
            settings.configurations[0].path.as_deref(),
            Some(Path::new("/x/a.json"))
        );
        assert_eq!(settings.configurations[1].control, LayerControl::Off);
        assert_eq!(settings.configurations[1].path, None);
        assert_eq!(
            settings.configurations[2].control,
            LayerControl::UnorderedLocation
        );
    }

    #[test]
    fn malformed_layer_entry_invalidates_whole_load() {
        // One valid entry followed by one missing its name
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings": {
                "layers": [
                    {"control": "on", "name": "VK_LAYER_A", "path": "/x/a.json"},
                    {"control": "on", "path": "/x/b.json"},
                ],
            },
        }));
        assert_eq!(load(&platform_for(&file)), Err(LoaderError::Invalid));
    }

    #[test]
    fn app_key_match_beats_earlier_global() {
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings_array": [
                {
                    "layers": [{"control": "off", "name": "VK_LAYER_GLOBAL"}],
                },
                {
                    "app_keys": ["/somewhere/else", "/opt/app/game"],
                    "layers": [{"control": "off", "name": "VK_LAYER_APP"}],
                },
            ],
        }));
        let settings = load(&platform_for(&file)).unwrap();
        assert_eq!(settings.configurations.len(), 1);
        assert_eq!(
            settings.configurations[0].name.as_deref(),
            Some("VK_LAYER_APP")
        );
    }

    #[test]
    fn unmatched_app_keys_fall_back_to_global() {
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings_array": [
                {
                    "app_keys": ["/somewhere/else"],
                    "layers": [{"control": "off", "name": "VK_LAYER_APP"}],
                },
                {
                    "layers": [{"control": "off", "name": "VK_LAYER_GLOBAL"}],
                },
            ],
        }));
        let settings = load(&platform_for(&file)).unwrap();
        assert_eq!(
            settings.configurations[0].name.as_deref(),
            Some("VK_LAYER_GLOBAL")
        );
    }

    #[test]
    fn app_keys_but_no_global_is_not_found() {
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings_array": [
                {"app_keys": ["/somewhere/else"], "layers": []},
            ],
        }));
        assert_eq!(load(&platform_for(&file)), Err(LoaderError::NotFound));
    }

    #[test]
    fn unknown_stderr_filters_are_skipped() {
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings": {"stderr_log": ["error", "chartreuse"], "layers": []},
        }));
        let settings = load(&platform_for(&file)).unwrap();
        assert_eq!(settings.stderr_filter, LogFilter::ERROR);
    }

    #[test]
    fn unrecognized_control_parses_as_auto() {
        let file = write_settings(&json!({
            "file_format_version": "1.0.0",
            "settings": {
                "layers": [{"control": "sideways", "name": "VK_LAYER_A", "path": "/x/a.json"}],
            },
        }));
        let settings = load(&platform_for(&file)).unwrap();
        assert_eq!(settings.configurations[0].control, LayerControl::Auto);
    }
}
