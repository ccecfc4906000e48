//! Consistency checks over a decoded capture.
//!
//! Both checks return a list of human-readable violations; an empty list means
//! the capture is consistent.

use crate::capture::snapshot::{ForwardPassData, IterationData, LayerSnapshot};

/// Checks that every iteration's checkpoints agree on layer names, that each
/// checkpoint carries only the fields it should, and that every value array
/// matches its shape.
pub fn check_structure(data: &ForwardPassData) -> Vec<String> {
    let mut violations = Vec::new();
    for it in &data.iterations {
        structure_of(it, &mut violations);
    }
    violations
}

/// Checks `afterUpdate == before - lr * gradient` for every weight and bias
/// element, within `tolerance`.
pub fn check_update_rule(data: &ForwardPassData, tolerance: f64) -> Vec<String> {
    let lr = data.learning_rate;
    let mut violations = Vec::new();

    for it in &data.iterations {
        for (name, grads) in &it.after_backward {
            let (Some(before), Some(after)) = (it.before.get(name), it.after_update.get(name)) else {
                violations.push(format!("iteration {}: {} missing from before/afterUpdate", it.iteration, name));
                continue;
            };
            let label = |what: &str| format!("iteration {}: {}.{}", it.iteration, name, what);

            match &grads.weight_gradients {
                Some(dw) => compare(&label("weights"), &before.weights, dw, &after.weights, lr, tolerance, &mut violations),
                None => unchanged(&label("weights"), &before.weights, &after.weights, &mut violations),
            }
            match &grads.bias_gradients {
                Some(db) => compare(&label("bias"), &before.bias, db, &after.bias, lr, tolerance, &mut violations),
                None => unchanged(&label("bias"), &before.bias, &after.bias, &mut violations),
            }
        }
    }
    violations
}

fn compare(
    label: &str,
    before: &[f64],
    grad: &[f64],
    after: &[f64],
    lr: f64,
    tolerance: f64,
    violations: &mut Vec<String>,
) {
    if before.len() != grad.len() || before.len() != after.len() {
        violations.push(format!(
            "{}: length mismatch (before {}, gradient {}, after {})",
            label,
            before.len(),
            grad.len(),
            after.len()
        ));
        return;
    }
    let first_bad = before
        .iter()
        .zip(grad)
        .zip(after)
        .map(|((b, g), a)| (b - lr * g - a).abs())
        .enumerate()
        .find(|&(_, delta)| !(delta <= tolerance));
    if let Some((i, delta)) = first_bad {
        violations.push(format!(
            "{}[{}]: off by {:e} (tolerance {:e})",
            label, i, delta, tolerance
        ));
    }
}

// A parameter without a gradient is skipped by the update.
fn unchanged(label: &str, before: &[f64], after: &[f64], violations: &mut Vec<String>) {
    if before != after {
        violations.push(format!("{}: changed without a gradient", label));
    }
}

fn structure_of(it: &IterationData, violations: &mut Vec<String>) {
    let at = |what: String| format!("iteration {}: {}", it.iteration, what);

    let names: Vec<&String> = it.before.keys().collect();
    for (checkpoint, map) in [("afterBackward", &it.after_backward), ("afterUpdate", &it.after_update)] {
        if map.keys().collect::<Vec<_>>() != names {
            violations.push(at(format!("{} layer names differ from before", checkpoint)));
        }
    }

    if product(&it.input_shape) != it.input.len() {
        violations.push(at("input does not match inputShape".to_owned()));
    }
    if product(&it.output_shape) != it.output.len() {
        violations.push(at("output does not match outputShape".to_owned()));
    }
    if it.input_shape.first() != Some(&it.labels.len()) {
        violations.push(at("labels do not match batch size".to_owned()));
    }

    for (checkpoint, map) in [("before", &it.before), ("afterUpdate", &it.after_update)] {
        for (name, snap) in map {
            parameters_only(snap, violations, &at(format!("{} {}", checkpoint, name)));
        }
    }

    let last = it.after_backward.keys().max_by_key(|name| layer_index(name)).cloned();
    for (name, snap) in &it.after_backward {
        let label = at(format!("afterBackward {}", name));
        parameter_shapes(snap, violations, &label);
        paired(&snap.pre_activation, &snap.pre_activation_shape, "preActivation", violations, &label);
        paired(&snap.post_activation, &snap.post_activation_shape, "postActivation", violations, &label);
        paired(&snap.weight_gradients, &snap.weight_gradient_shape, "weightGradients", violations, &label);

        if snap.pre_activation.is_none() {
            violations.push(format!("{}: missing preActivation", label));
        }
        let is_output = last.as_ref() == Some(name);
        match (is_output, snap.post_activation.is_some()) {
            (true, true) => violations.push(format!("{}: output layer has postActivation", label)),
            (false, false) => violations.push(format!("{}: hidden layer missing postActivation", label)),
            _ => {}
        }
        if is_output && snap.pre_activation.as_ref() != Some(&it.output) {
            violations.push(format!("{}: preActivation differs from output", label));
        }
        if let Some(db) = &snap.bias_gradients {
            if db.len() != snap.bias.len() {
                violations.push(format!("{}: biasGradients length differs from bias", label));
            }
        }
        if snap.weight_gradient_shape.is_some() && snap.weight_gradient_shape.as_ref() != Some(&snap.weight_shape) {
            violations.push(format!("{}: weightGradientShape differs from weightShape", label));
        }
    }
}

fn parameters_only(snap: &LayerSnapshot, violations: &mut Vec<String>, label: &str) {
    parameter_shapes(snap, violations, label);
    let extras = snap.pre_activation.is_some()
        || snap.pre_activation_shape.is_some()
        || snap.post_activation.is_some()
        || snap.post_activation_shape.is_some()
        || snap.weight_gradients.is_some()
        || snap.weight_gradient_shape.is_some()
        || snap.bias_gradients.is_some();
    if extras {
        violations.push(format!("{}: carries activations or gradients", label));
    }
}

fn parameter_shapes(snap: &LayerSnapshot, violations: &mut Vec<String>, label: &str) {
    if product(&snap.weight_shape) != snap.weights.len() {
        violations.push(format!("{}: weights do not match weightShape", label));
    }
    if snap.weight_shape.first() != Some(&snap.bias.len()) {
        violations.push(format!("{}: bias length differs from output width", label));
    }
}

fn paired(
    values: &Option<Vec<f64>>,
    shape: &Option<Vec<usize>>,
    field: &str,
    violations: &mut Vec<String>,
    label: &str,
) {
    match (values, shape) {
        (Some(v), Some(s)) if product(s) != v.len() => {
            violations.push(format!("{}: {} does not match its shape", label, field))
        }
        (Some(_), None) | (None, Some(_)) => {
            violations.push(format!("{}: {} and its shape must appear together", label, field))
        }
        _ => {}
    }
}

fn product(shape: &[usize]) -> usize {
    shape.iter().product()
}

// `fc10` sorts before `fc2` as a string.
fn layer_index(name: &str) -> usize {
    name.trim_start_matches("fc").parse().unwrap_or(0)
}
