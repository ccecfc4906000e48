use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::architecture::{describe_architecture, DEFAULT_HIDDEN_LAYERS};
use crate::train::epoch_stats::Progress;

pub const MAX_HIDDEN_LAYERS: usize = 5;
pub const MIN_LAYER_SIZE: usize = 2;
pub const MAX_LAYER_SIZE: usize = 1024;
pub const MAX_EPOCHS: usize = 500;
pub const MAX_BATCH_SIZE: usize = 512;
pub const MIN_LEARNING_RATE: f64 = 0.0001;
pub const MAX_LEARNING_RATE: f64 = 1.0;

/// User-supplied hyperparameters, exactly as read from a config file or form.
///
/// Nothing here has been checked yet; call [`TrainingConfiguration::validate`]
/// to see every violation, or [`TrainingConfiguration::into_plan`] to obtain a
/// [`TrainingPlan`] that is known to be valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainingConfiguration {
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub dataset_path: PathBuf,
    /// Fixes weight initialization and batch shuffling.
    pub seed: u64,
}

impl Default for TrainingConfiguration {
    fn default() -> Self {
        TrainingConfiguration {
            hidden_layers: DEFAULT_HIDDEN_LAYERS.to_vec(),
            epochs: 5,
            batch_size: 64,
            learning_rate: 0.01,
            dataset_path: PathBuf::from("./data"),
            seed: 42,
        }
    }
}

/// Outcome of validating a [`TrainingConfiguration`]: every rule violation, in
/// rule order, as display-ready text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl TrainingConfiguration {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<TrainingConfiguration> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Checks every rule independently and collects all violations.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        if self.hidden_layers.is_empty() {
            errors.push("Must have at least 1 hidden layer".to_owned());
        }
        if self.hidden_layers.len() > MAX_HIDDEN_LAYERS {
            errors.push(format!("Cannot have more than {} hidden layers", MAX_HIDDEN_LAYERS));
        }
        for (i, &size) in self.hidden_layers.iter().enumerate() {
            if size < MIN_LAYER_SIZE {
                errors.push(format!("Layer {}: size must be at least {}", i + 1, MIN_LAYER_SIZE));
            }
            if size > MAX_LAYER_SIZE {
                errors.push(format!(
                    "Layer {}: size must not be more than {}",
                    i + 1,
                    MAX_LAYER_SIZE
                ));
            }
        }

        if !(1..=MAX_EPOCHS).contains(&self.epochs) {
            errors.push(format!("Epochs must be between 1 and {}", MAX_EPOCHS));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            errors.push(format!("Batch size must be between 1 and {}", MAX_BATCH_SIZE));
        }
        // Written so that NaN fails too.
        if !(self.learning_rate >= MIN_LEARNING_RATE && self.learning_rate <= MAX_LEARNING_RATE) {
            errors.push(format!(
                "Learning rate must be between {} and {:.1}",
                MIN_LEARNING_RATE, MAX_LEARNING_RATE
            ));
        }

        ValidationReport { errors }
    }

    pub fn is_default_architecture(&self) -> bool {
        self.hidden_layers == DEFAULT_HIDDEN_LAYERS
    }

    /// Validates and freezes the configuration.
    pub fn into_plan(self) -> Result<TrainingPlan> {
        let report = self.validate();
        if !report.is_valid() {
            return Err(Error::InvalidConfiguration(report.errors));
        }
        Ok(TrainingPlan { config: self })
    }
}

/// A configuration that passed validation. Read-only for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPlan {
    config: TrainingConfiguration,
}

impl TrainingPlan {
    pub fn hidden_layers(&self) -> &[usize] {
        &self.config.hidden_layers
    }

    pub fn epochs(&self) -> usize {
        self.config.epochs
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn learning_rate(&self) -> f64 {
        self.config.learning_rate
    }

    pub fn dataset_path(&self) -> &Path {
        &self.config.dataset_path
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn is_default_architecture(&self) -> bool {
        self.config.is_default_architecture()
    }

    pub fn architecture(&self) -> String {
        describe_architecture(&self.config.hidden_layers)
    }

    pub fn configuration(&self) -> &TrainingConfiguration {
        &self.config
    }
}

/// Runtime hooks for a training run.
///
/// Progress events are sent without waiting for the receiver, and a dropped
/// receiver is ignored. A stop flag set from another thread ends the run at the
/// next batch boundary, never mid-batch.
#[derive(Debug, Clone, Default)]
pub struct TrainOptions {
    pub progress_tx: Option<mpsc::Sender<Progress>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<Progress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub(crate) fn report(&self, event: Progress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(event);
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_layers(hidden_layers: Vec<usize>) -> TrainingConfiguration {
        TrainingConfiguration {
            hidden_layers,
            ..TrainingConfiguration::default()
        }
    }

    #[test]
    fn default_configuration_is_valid_and_canonical() {
        let config = TrainingConfiguration::default();
        assert!(config.validate().is_valid());
        assert!(config.is_default_architecture());
        assert!(!with_layers(vec![64, 128]).is_default_architecture());
    }

    #[test]
    fn layer_width_boundaries() {
        let report = with_layers(vec![1]).validate();
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("at least 2"));
        assert!(report.errors[0].starts_with("Layer 1:"));

        assert!(with_layers(vec![1024]).validate().is_valid());
        assert!(with_layers(vec![2]).validate().is_valid());

        let report = with_layers(vec![128, 1025]).validate();
        assert_eq!(report.errors, vec!["Layer 2: size must not be more than 1024"]);
    }

    #[test]
    fn layer_count_boundaries() {
        let report = with_layers(vec![]).validate();
        assert_eq!(report.errors, vec!["Must have at least 1 hidden layer"]);

        assert!(with_layers(vec![8; 5]).validate().is_valid());
        let report = with_layers(vec![8; 6]).validate();
        assert_eq!(report.errors, vec!["Cannot have more than 5 hidden layers"]);
    }

    #[test]
    fn scalar_bounds() {
        let base = TrainingConfiguration::default();
        let cases = [
            TrainingConfiguration { epochs: 0, ..base.clone() },
            TrainingConfiguration { epochs: 501, ..base.clone() },
            TrainingConfiguration { batch_size: 0, ..base.clone() },
            TrainingConfiguration { batch_size: 513, ..base.clone() },
            TrainingConfiguration { learning_rate: 0.00009, ..base.clone() },
            TrainingConfiguration { learning_rate: 1.5, ..base.clone() },
            TrainingConfiguration { learning_rate: f64::NAN, ..base.clone() },
        ];
        for config in cases {
            assert_eq!(config.validate().errors.len(), 1, "{:?}", config);
        }
        let edges = TrainingConfiguration {
            epochs: 500,
            batch_size: 512,
            learning_rate: 0.0001,
            ..base.clone()
        };
        assert!(edges.validate().is_valid());
        assert!(TrainingConfiguration { learning_rate: 1.0, ..base }.validate().is_valid());
    }

    #[test]
    fn collects_every_violation() {
        let config = TrainingConfiguration {
            hidden_layers: vec![1, 2000, 1, 4, 4, 4],
            epochs: 0,
            batch_size: 1000,
            learning_rate: 2.0,
            ..TrainingConfiguration::default()
        };
        let report = config.validate();
        assert_eq!(
            report.errors,
            vec![
                "Cannot have more than 5 hidden layers",
                "Layer 1: size must be at least 2",
                "Layer 2: size must not be more than 1024",
                "Layer 3: size must be at least 2",
                "Epochs must be between 1 and 500",
                "Batch size must be between 1 and 512",
                "Learning rate must be between 0.0001 and 1.0",
            ]
        );
    }

    #[test]
    fn into_plan_carries_full_error_list() {
        let config = TrainingConfiguration { epochs: 0, batch_size: 0, ..Default::default() };
        match config.into_plan() {
            Err(Error::InvalidConfiguration(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected configuration error, got {:?}", other),
        }

        let plan = with_layers(vec![256]).into_plan().unwrap();
        assert_eq!(plan.architecture(), "784 → 256 (ReLU) → 10");
        assert!(!plan.is_default_architecture());
        assert_eq!(plan.seed(), 42);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TrainingConfiguration =
            serde_json::from_str(r#"{ "hiddenLayers": [32], "learningRate": 0.1 }"#).unwrap();
        assert_eq!(config.hidden_layers, vec![32]);
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.epochs, 5);
        assert_eq!(config.batch_size, 64);
    }
}
