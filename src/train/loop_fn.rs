use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::dataset::{Batch, Dataset, Split};
use crate::error::{Error, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::network::architecture::layer_name;
use crate::network::network::Model;
use crate::train::epoch_stats::{EpochStats, Progress, TrainingResult};
use crate::train::train_config::{TrainOptions, TrainingPlan};

/// Batches between debug-level progress lines.
const LOG_EVERY: usize = 200;

/// A trained model together with how the run went.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: Model,
    pub result: TrainingResult,
}

/// Accuracy and loss over a held-out split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
    /// `correct / total`, or 0 for an empty split.
    pub accuracy: f64,
    /// Mean of the per-batch losses, or 0 for an empty split.
    pub loss: f64,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Loads the MNIST train and test splits from the plan's dataset directory,
/// then trains and evaluates.
pub fn run_training(plan: &TrainingPlan, options: &TrainOptions) -> Result<TrainingOutcome> {
    let train = Dataset::load_mnist(plan.dataset_path(), Split::Train)?;
    let test = Dataset::load_mnist(plan.dataset_path(), Split::Test)?;
    train_and_evaluate(plan, &train, &test, options)
}

/// Trains a freshly built model for `plan.epochs()` epochs, then measures it
/// on `test`.
///
/// The model and the per-epoch shuffle share one generator seeded from the
/// plan, so the same plan and data always give the same result.
///
/// A non-finite loss or gradient aborts the run with [`Error::NonFinite`].
pub fn train_and_evaluate(
    plan: &TrainingPlan,
    train: &Dataset,
    test: &Dataset,
    options: &TrainOptions,
) -> Result<TrainingOutcome> {
    if train.is_empty() {
        return Err(Error::dataset("training set is empty"));
    }

    let mut rng = StdRng::seed_from_u64(plan.seed());
    let mut model = Model::from_plan(plan, &mut rng);
    info!(
        "training {} for {} epochs (batch size {}, lr {})",
        model.architecture(),
        plan.epochs(),
        plan.batch_size(),
        plan.learning_rate()
    );

    let mut history = Vec::with_capacity(plan.epochs());
    let mut stopped = false;

    for epoch in 1..=plan.epochs() {
        if options.stop_requested() {
            stopped = true;
            break;
        }

        options.report(Progress::EpochStarted {
            epoch,
            total_epochs: plan.epochs(),
        });
        model.train();
        let t_start = Instant::now();

        let mut total_loss = 0.0;
        let mut batches = 0usize;
        for batch in train.shuffled_batches(plan.batch_size(), &mut rng) {
            if options.stop_requested() {
                stopped = true;
                break;
            }
            total_loss += train_step(&mut model, &batch, plan.learning_rate())
                .map_err(|e| in_context(e, epoch, batches + 1))?;
            batches += 1;
            if batches % LOG_EVERY == 0 {
                debug!(
                    "epoch {} batch {}: running loss {:.4}",
                    epoch,
                    batches,
                    total_loss / batches as f64
                );
            }
        }

        let stats = EpochStats {
            epoch,
            total_epochs: plan.epochs(),
            train_loss: if batches == 0 { 0.0 } else { total_loss / batches as f64 },
            batches,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            "epoch {}/{}: train loss {:.4} in {} ms",
            epoch, stats.total_epochs, stats.train_loss, stats.elapsed_ms
        );
        options.report(Progress::EpochFinished(stats.clone()));
        history.push(stats);

        if stopped {
            break;
        }
    }

    options.report(Progress::EvaluationStarted { samples: test.len() });
    let evaluation = evaluate(&mut model, test, plan.batch_size())?;
    info!(
        "test accuracy {:.2}% ({}/{}), test loss {:.4}",
        evaluation.accuracy * 100.0,
        evaluation.correct,
        evaluation.total,
        evaluation.loss
    );

    let result = TrainingResult {
        epochs_run: history.len(),
        final_test_accuracy: evaluation.accuracy,
        final_test_loss: evaluation.loss,
        history,
        stopped,
    };
    options.report(Progress::Completed(result.clone()));

    Ok(TrainingOutcome { model, result })
}

/// One optimization step: forward → loss → zero grads → backward → manual
/// update. Returns the batch loss.
///
/// The forward trace lives only for the duration of this call.
pub fn train_step(model: &mut Model, batch: &Batch, learning_rate: f64) -> Result<f64> {
    let trace = model.forward_traced(&batch.images)?;
    let loss = CrossEntropyLoss::loss(trace.logits(), &batch.labels)?;
    if !loss.is_finite() {
        return Err(Error::non_finite("loss", format!("value {}", loss)));
    }
    let grad_logits = CrossEntropyLoss::derivative(trace.logits(), &batch.labels)?;

    model.zero_grad();
    model.backward(&trace, &grad_logits)?;
    ensure_finite_gradients(model)?;
    model.manual_update(learning_rate);
    Ok(loss)
}

/// Evaluates on `test` in storage order without tracking anything for backward.
pub fn evaluate(model: &mut Model, test: &Dataset, batch_size: usize) -> Result<Evaluation> {
    model.eval();

    let mut correct = 0usize;
    let mut total = 0usize;
    let mut total_loss = 0.0;
    let mut batches = 0usize;

    for batch in test.batches(batch_size) {
        let logits = model.forward(&batch.images)?;
        let loss = CrossEntropyLoss::loss(&logits, &batch.labels)?;
        if !loss.is_finite() {
            return Err(Error::non_finite("loss", format!("evaluation batch {}", batches + 1)));
        }
        total_loss += loss;
        correct += logits
            .argmax_rows()
            .iter()
            .zip(batch.labels.iter())
            .filter(|(predicted, label)| predicted == label)
            .count();
        total += batch.len();
        batches += 1;
    }

    Ok(Evaluation {
        correct,
        total,
        accuracy: if total == 0 { 0.0 } else { correct as f64 / total as f64 },
        loss: if batches == 0 { 0.0 } else { total_loss / batches as f64 },
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub(crate) fn ensure_finite_gradients(model: &Model) -> Result<()> {
    for (i, layer) in model.layers().iter().enumerate() {
        let finite = [&layer.weight, &layer.bias]
            .iter()
            .all(|p| p.grad.as_ref().map_or(true, |g| g.is_finite()));
        if !finite {
            return Err(Error::non_finite("gradient", layer_name(i)));
        }
    }
    Ok(())
}

fn in_context(err: Error, epoch: usize, batch: usize) -> Error {
    match err {
        Error::NonFinite { quantity, context } => Error::non_finite(
            quantity,
            format!("epoch {} batch {} ({})", epoch, batch, context),
        ),
        other => other,
    }
}
