use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-epoch training statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean cross-entropy over the batches run in this epoch.
    pub train_loss: f64,
    /// Batches processed; lower than a full pass if the run was stopped.
    pub batches: usize,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Summary of a finished run, measured on the held-out test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub epochs_run: usize,
    /// Fraction in [0, 1].
    pub final_test_accuracy: f64,
    /// Mean of the per-batch test losses.
    pub final_test_loss: f64,
    pub history: Vec<EpochStats>,
    /// True when a stop request ended training early.
    pub stopped: bool,
}

/// Events emitted on the progress channel, in the order they happen.
///
/// `Display` renders each as a status line suitable for direct display.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    EpochStarted { epoch: usize, total_epochs: usize },
    EpochFinished(EpochStats),
    EvaluationStarted { samples: usize },
    Completed(TrainingResult),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::EpochStarted { epoch, total_epochs } => {
                write!(f, "Epoch {}/{} started", epoch, total_epochs)
            }
            Progress::EpochFinished(stats) => write!(
                f,
                "Epoch {}/{} finished: loss {:.4} ({} batches, {} ms)",
                stats.epoch, stats.total_epochs, stats.train_loss, stats.batches, stats.elapsed_ms
            ),
            Progress::EvaluationStarted { samples } => {
                write!(f, "Evaluating on {} test samples", samples)
            }
            Progress::Completed(result) => write!(
                f,
                "Training complete: test accuracy {:.2}%, test loss {:.4}",
                result.final_test_accuracy * 100.0,
                result.final_test_loss
            ),
        }
    }
}
