//! Captured training state and its JSON encoding.
//!
//! Field names are camelCase. Optional fields that were not captured at a
//! checkpoint are left out of the document entirely, and come back as `None`
//! on decode; an empty array stays an empty array.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layers::dense::Dense;
use crate::math::matrix::Matrix;

/// One layer's numeric state at one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSnapshot {
    /// Row-major `[out, in]`.
    pub weights: Vec<f64>,
    pub weight_shape: Vec<usize>,
    pub bias: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_activation: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_activation_shape: Option<Vec<usize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_activation: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_activation_shape: Option<Vec<usize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_gradients: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_gradient_shape: Option<Vec<usize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_gradients: Option<Vec<f64>>,
}

impl LayerSnapshot {
    /// Weights and bias only, copied out of the layer.
    pub fn parameters_of(layer: &Dense) -> LayerSnapshot {
        LayerSnapshot {
            weights: layer.weight.value.as_slice().to_vec(),
            weight_shape: layer.weight.shape(),
            bias: layer.bias.value.as_slice().to_vec(),
            pre_activation: None,
            pre_activation_shape: None,
            post_activation: None,
            post_activation_shape: None,
            weight_gradients: None,
            weight_gradient_shape: None,
            bias_gradients: None,
        }
    }

    /// Copies whatever gradients the layer currently holds.
    pub fn with_gradients_of(mut self, layer: &Dense) -> LayerSnapshot {
        if let Some(grad) = &layer.weight.grad {
            self.weight_gradients = Some(grad.as_slice().to_vec());
            self.weight_gradient_shape = Some(grad.shape());
        }
        if let Some(grad) = &layer.bias.grad {
            self.bias_gradients = Some(grad.as_slice().to_vec());
        }
        self
    }

    /// Moves traced activations into the snapshot without copying them.
    pub fn with_activations(mut self, pre: Matrix, post: Option<Matrix>) -> LayerSnapshot {
        self.pre_activation_shape = Some(pre.shape());
        self.pre_activation = Some(pre.into_vec());
        if let Some(post) = post {
            self.post_activation_shape = Some(post.shape());
            self.post_activation = Some(post.into_vec());
        }
        self
    }
}

/// Layer name (`fc1`, `fc2`, …) to snapshot.
pub type LayerSnapshots = BTreeMap<String, LayerSnapshot>;

/// Everything recorded for one training step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationData {
    /// 0-based.
    pub iteration: usize,
    pub input: Vec<f64>,
    pub input_shape: Vec<usize>,
    pub labels: Vec<i64>,
    pub loss: f64,
    /// Logits, row-major `[batch, 10]`.
    pub output: Vec<f64>,
    pub output_shape: Vec<usize>,
    /// Parameters before the forward pass.
    pub before: LayerSnapshots,
    /// Parameters, activations, and gradients after backward.
    pub after_backward: LayerSnapshots,
    /// Parameters after the SGD step.
    pub after_update: LayerSnapshots,
}

/// A full capture run: run metadata plus every recorded iteration.
///
/// This is the unit that gets written to and read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPassData {
    pub architecture: String,
    pub optimizer: String,
    pub loss_function: String,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub random_seed: u64,
    pub iterations: Vec<IterationData>,
}

impl ForwardPassData {
    /// Indented JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a document produced by [`ForwardPassData::to_json_string`].
    /// Malformed or truncated input is an error, never a partial value.
    pub fn from_json_str(text: &str) -> Result<ForwardPassData> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<ForwardPassData> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
