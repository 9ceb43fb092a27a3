use tracing::debug;

use common::LoaderResult;

use crate::{LayerList, LayerProperties};

/// Merges settings-sourced layers with independently discovered ones
///
/// Both inputs are consumed; retained entries move into the output. When the
/// settings list carries no `unordered_layer_location` sentinel the settings
/// file takes total control of the order: independently discovered layers
/// are dropped, not appended. With a sentinel present, discovered layers are
/// spliced in at its position and the sentinel itself is never emitted.
pub fn combine(
    settings_layers: LayerList,
    regular_layers: LayerList,
) -> LoaderResult<LayerList> {
    if settings_layers.is_empty() {
        return Ok(regular_layers);
    }
    let sentinel = settings_layers.iter().position(LayerProperties::is_sentinel);
    let (Some(sentinel), false) = (sentinel, regular_layers.is_empty()) else {
        if !regular_layers.is_empty() {
            debug!(
                "settings file specifies no unordered layer location; dropping {} discovered layer(s)",
                regular_layers.len()
            );
        }
        return Ok(settings_layers);
    };

    let mut output = LayerList::new();
    #[cfg(test)]
    {
        output.fail_pushes_after = settings_layers.fail_pushes_after;
    }

    let mut before = settings_layers.into_entries();
    let after = before.split_off(sentinel + 1);
    before.truncate(sentinel); // the sentinel is a positional marker only

    for layer in before {
        // Defends against duplicates in malformed input
        output.push_unique(layer)?;
    }
    for layer in regular_layers {
        // A layer both separately discovered and configured later in the
        // settings file must not appear twice
        if after.iter().any(|x| x.same_layer(&layer)) {
            continue;
        }
        output.push_unique(layer)?;
    }
    for layer in after {
        output.push_unique(layer)?;
    }

    Ok(output)
}
