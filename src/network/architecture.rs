//! Layer-width bookkeeping shared by configuration, models, and captures.

/// Pixels per flattened 28×28 MNIST image.
pub const INPUT_FEATURES: usize = 784;
/// Digit classes 0–9.
pub const OUTPUT_CLASSES: usize = 10;
/// Hidden widths of the fixed three-layer network.
pub const DEFAULT_HIDDEN_LAYERS: [usize; 2] = [128, 64];

/// Parses a comma-separated list of hidden-layer widths such as `"256, 128, 64"`.
///
/// Whitespace around tokens is ignored and empty tokens are dropped. Returns
/// `None` when nothing usable remains or when any token is not a non-negative
/// integer; a partially parsed list is never returned.
pub fn parse_hidden_layers(text: &str) -> Option<Vec<usize>> {
    if text.trim().is_empty() {
        return None;
    }

    let sizes = text
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<usize>().ok())
        .collect::<Option<Vec<usize>>>()?;

    if sizes.is_empty() {
        None
    } else {
        Some(sizes)
    }
}

/// Renders `"784 → h1 (ReLU) → … → 10"`.
pub fn describe_architecture(hidden_layers: &[usize]) -> String {
    let mut parts = Vec::with_capacity(hidden_layers.len() + 2);
    parts.push(INPUT_FEATURES.to_string());
    parts.extend(hidden_layers.iter().map(|h| format!("{} (ReLU)", h)));
    parts.push(OUTPUT_CLASSES.to_string());
    parts.join(" → ")
}

/// Full width sequence: input ‖ hidden ‖ output.
pub fn layer_widths(hidden_layers: &[usize]) -> Vec<usize> {
    let mut widths = Vec::with_capacity(hidden_layers.len() + 2);
    widths.push(INPUT_FEATURES);
    widths.extend_from_slice(hidden_layers);
    widths.push(OUTPUT_CLASSES);
    widths
}

/// Name of the layer at 0-based `index` (`fc1`, `fc2`, …).
pub fn layer_name(index: usize) -> String {
    format!("fc{}", index + 1)
}
