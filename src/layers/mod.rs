//! Layer index scan and target resolution
//!
//! Layer heights are compared with plain `f64` equality. A value typed by the
//! user as `2.150` matches a marker written as `2.15`, but no tolerance is
//! applied, so heights that differ in the last decimal never match.

use tracing::debug;

use crate::error::{ChangeError, Result};
use crate::pattern;

/// A layer marker found in the gcode
#[derive(Debug, Clone, PartialEq)]
pub struct LayerMarker {
    /// Z height as written after `Layer Z=`
    pub text: String,
    pub z: f64,
    /// Zero-based index of the marker line
    pub line: usize,
}

/// Collect every layer marker in file order, duplicates included.
/// An empty result means the slicer was not set up to emit markers.
pub fn scan_layers<S: AsRef<str>>(lines: &[S]) -> Result<Vec<LayerMarker>> {
    let layers: Vec<LayerMarker> = lines
        .iter()
        .enumerate()
        .filter_map(|(line, text)| {
            pattern::layer_marker(text.as_ref()).map(|m| LayerMarker {
                text: m.text.to_string(),
                z: m.z,
                line,
            })
        })
        .collect();

    if layers.is_empty() {
        return Err(ChangeError::NoLayersDetected);
    }
    debug!(count = layers.len(), "scanned layer markers");
    Ok(layers)
}

/// Parse a requested height and look it up among the scanned layers
pub fn find_layer<'a>(requested: &str, layers: &'a [LayerMarker]) -> Option<&'a LayerMarker> {
    let z = requested.trim().parse::<f64>().ok()?;
    layers.iter().find(|layer| layer.z == z)
}

/// Validated set of heights at which to change filament
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSet {
    heights: Vec<f64>,
}

impl TargetSet {
    pub fn contains(&self, z: f64) -> bool {
        self.heights.iter().any(|&h| h == z)
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }
}

/// Check every requested height against the scan. The first height with no
/// exact match rejects the whole request.
pub fn resolve_targets<S: AsRef<str>>(requested: &[S], layers: &[LayerMarker]) -> Result<TargetSet> {
    if requested.is_empty() {
        return Err(ChangeError::NoLayersSelected);
    }

    let mut heights = Vec::with_capacity(requested.len());
    for value in requested {
        let value = value.as_ref();
        let layer = find_layer(value, layers).ok_or_else(|| ChangeError::InvalidLayerValue {
            value: value.to_string(),
        })?;
        if !heights.contains(&layer.z) {
            heights.push(layer.z);
        }
    }

    debug!(?heights, "resolved target layers");
    Ok(TargetSet { heights })
}
