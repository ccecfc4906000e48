use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::capture::snapshot::{ForwardPassData, IterationData, LayerSnapshot, LayerSnapshots};
use crate::data::dataset::{Batch, Dataset, Split};
use crate::error::{Error, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::network::architecture::{layer_name, DEFAULT_HIDDEN_LAYERS};
use crate::network::network::{ForwardTrace, Model};
use crate::optim::sgd::Sgd;
use crate::train::loop_fn::ensure_finite_gradients;
use crate::train::train_config::{TrainingConfiguration, TrainingPlan};

/// Parameters of a capture run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    /// Iterations to record; fewer are recorded only if batches run out.
    pub iterations: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seeds both initialization and shuffling.
    pub seed: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        CaptureSettings {
            iterations: 1,
            batch_size: 4,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

impl CaptureSettings {
    fn validate(&self, hidden_layers: &[usize]) -> Result<()> {
        let config = TrainingConfiguration {
            hidden_layers: hidden_layers.to_vec(),
            epochs: 1,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            ..TrainingConfiguration::default()
        };
        let mut errors = config.validate().errors;
        if self.iterations == 0 {
            errors.push("Iterations must be at least 1".to_owned());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration(errors))
        }
    }
}

/// Records up to `settings.iterations` training steps of `model` over `batches`.
///
/// Each step runs, in order: record the input, snapshot parameters (`before`),
/// traced forward, loss, zero grads and backward, snapshot parameters with
/// activations and gradients (`afterBackward`), SGD update, snapshot
/// parameters again (`afterUpdate`).
///
/// `stop_flag` is checked between iterations only, so a recorded iteration is
/// always complete.
pub fn capture_iterations<I>(
    model: &mut Model,
    batches: I,
    settings: &CaptureSettings,
    stop_flag: Option<&AtomicBool>,
) -> Result<ForwardPassData>
where
    I: IntoIterator<Item = Batch>,
{
    settings.validate(&model.hidden_sizes())?;
    model.train();
    info!(
        "capturing {} iteration(s) of {} (batch size {}, lr {}, seed {})",
        settings.iterations,
        model.architecture(),
        settings.batch_size,
        settings.learning_rate,
        settings.seed
    );

    let mut iterations = Vec::with_capacity(settings.iterations);
    for (index, batch) in batches.into_iter().take(settings.iterations).enumerate() {
        if stop_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            info!("capture stopped after {} iteration(s)", index);
            break;
        }
        let iteration = capture_one(model, batch, index, settings.learning_rate)?;
        debug!("iteration {}: loss {:.6}", index, iteration.loss);
        iterations.push(iteration);
    }

    Ok(ForwardPassData {
        architecture: model.architecture(),
        optimizer: Sgd::NAME.to_owned(),
        loss_function: CrossEntropyLoss::NAME.to_owned(),
        learning_rate: settings.learning_rate,
        batch_size: settings.batch_size,
        random_seed: settings.seed,
        iterations,
    })
}

/// Builds a model for `hidden_layers` and captures it on `dataset`, drawing
/// initialization and batch order from one generator seeded with
/// `settings.seed`.
pub fn capture_from_dataset(
    dataset: &Dataset,
    hidden_layers: &[usize],
    settings: &CaptureSettings,
) -> Result<ForwardPassData> {
    settings.validate(hidden_layers)?;
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut model = Model::for_architecture(hidden_layers, &mut rng);
    let batches = dataset.shuffled_batches(settings.batch_size, &mut rng);
    capture_iterations(&mut model, batches, settings, None)
}

/// Captures on the fixed 784→128→64→10 network with the MNIST training split
/// found under the plan's dataset directory.
pub fn run_capture(plan: &TrainingPlan, iterations: usize) -> Result<ForwardPassData> {
    let dataset = Dataset::load_mnist(plan.dataset_path(), Split::Train)?;
    let settings = CaptureSettings {
        iterations,
        batch_size: plan.batch_size(),
        learning_rate: plan.learning_rate(),
        seed: plan.seed(),
    };
    capture_from_dataset(&dataset, &DEFAULT_HIDDEN_LAYERS, &settings)
}

fn capture_one(model: &mut Model, batch: Batch, index: usize, learning_rate: f64) -> Result<IterationData> {
    let labels: Vec<i64> = batch.labels.iter().map(|&y| y as i64).collect();
    let before = snapshot_parameters(model);

    let trace = model.forward_traced(&batch.images)?;
    let loss = CrossEntropyLoss::loss(trace.logits(), &batch.labels)?;
    if !loss.is_finite() {
        return Err(Error::non_finite("loss", format!("capture iteration {}", index)));
    }
    let grad_logits = CrossEntropyLoss::derivative(trace.logits(), &batch.labels)?;
    drop(batch);

    model.zero_grad();
    model.backward(&trace, &grad_logits)?;
    ensure_finite_gradients(model).map_err(|e| annotate(e, index))?;

    let output = trace.logits().clone();
    let ForwardTrace { input, layers: traces } = trace;
    let input_shape = input.shape();
    let input = input.into_vec();

    let after_backward: LayerSnapshots = model
        .layers()
        .iter()
        .zip(traces)
        .enumerate()
        .map(|(i, (layer, trace))| {
            let snapshot = LayerSnapshot::parameters_of(layer)
                .with_activations(trace.pre_activation, trace.post_activation)
                .with_gradients_of(layer);
            (layer_name(i), snapshot)
        })
        .collect();

    model.manual_update(learning_rate);
    let after_update = snapshot_parameters(model);

    Ok(IterationData {
        iteration: index,
        input,
        input_shape,
        labels,
        loss,
        output_shape: output.shape(),
        output: output.into_vec(),
        before,
        after_backward,
        after_update,
    })
}

fn snapshot_parameters(model: &Model) -> LayerSnapshots {
    model
        .layers()
        .iter()
        .enumerate()
        .map(|(i, layer)| (layer_name(i), LayerSnapshot::parameters_of(layer)))
        .collect()
}

fn annotate(err: Error, index: usize) -> Error {
    match err {
        Error::NonFinite { quantity, context } => Error::non_finite(
            quantity,
            format!("capture iteration {} ({})", index, context),
        ),
        other => other,
    }
}
