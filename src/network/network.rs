use std::borrow::Cow;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::dense::{Dense, LayerTrace};
use crate::layers::parameter::Parameter;
use crate::loss::cross_entropy::softmax;
use crate::math::matrix::Matrix;
use crate::network::architecture::{
    describe_architecture, layer_name, layer_widths, DEFAULT_HIDDEN_LAYERS, INPUT_FEATURES,
    OUTPUT_CLASSES,
};
use crate::optim::sgd::Sgd;
use crate::train::train_config::TrainingPlan;

/// Whether the model is being trained or evaluated.
///
/// Neither layer type behaves differently between modes; the flag records
/// which phase of a run owns the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Ordered dense layers with ReLU between all but the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStack {
    pub layers: Vec<Dense>,
    #[serde(skip)]
    mode: Mode,
}

impl LayerStack {
    /// Builds one dense layer per consecutive pair in `widths`.
    pub fn new<R: Rng + ?Sized>(widths: &[usize], rng: &mut R) -> LayerStack {
        let last = widths.len().saturating_sub(2);
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i == last {
                    ActivationFunction::Identity
                } else {
                    ActivationFunction::ReLU
                };
                Dense::new(pair[0], pair[1], activation, rng)
            })
            .collect();
        LayerStack {
            layers,
            mode: Mode::Train,
        }
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.layers.iter().map(Dense::in_features).collect();
        widths.extend(self.layers.last().map(Dense::out_features));
        widths
    }
}

/// The classifier being trained.
///
/// `Fixed` is the canonical 784→128→64→10 network; `Configurable` covers any
/// other hidden-layer list. The variant is chosen at construction and never
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "stack", rename_all = "snake_case")]
pub enum Model {
    Fixed(LayerStack),
    Configurable(LayerStack),
}

/// Everything a traced forward pass retained, in layer order.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    /// The `[batch, 784]` input actually fed to the first layer.
    pub input: Matrix,
    pub layers: Vec<LayerTrace>,
}

impl ForwardTrace {
    pub fn logits(&self) -> &Matrix {
        // A model always has at least one layer, so a trace always has one too.
        self.layers
            .last()
            .map(LayerTrace::output)
            .unwrap_or(&self.input)
    }
}

impl Model {
    pub fn fixed<R: Rng + ?Sized>(rng: &mut R) -> Model {
        Model::Fixed(LayerStack::new(&layer_widths(&DEFAULT_HIDDEN_LAYERS), rng))
    }

    pub fn configurable<R: Rng + ?Sized>(hidden_layers: &[usize], rng: &mut R) -> Model {
        Model::Configurable(LayerStack::new(&layer_widths(hidden_layers), rng))
    }

    /// `Fixed` for `[128, 64]`, `Configurable` for anything else.
    pub fn for_architecture<R: Rng + ?Sized>(hidden_layers: &[usize], rng: &mut R) -> Model {
        if hidden_layers == DEFAULT_HIDDEN_LAYERS {
            Model::fixed(rng)
        } else {
            Model::configurable(hidden_layers, rng)
        }
    }

    /// Builds the variant a validated plan calls for.
    pub fn from_plan<R: Rng + ?Sized>(plan: &TrainingPlan, rng: &mut R) -> Model {
        if plan.is_default_architecture() {
            Model::fixed(rng)
        } else {
            Model::configurable(plan.hidden_layers(), rng)
        }
    }

    fn stack(&self) -> &LayerStack {
        match self {
            Model::Fixed(stack) | Model::Configurable(stack) => stack,
        }
    }

    fn stack_mut(&mut self) -> &mut LayerStack {
        match self {
            Model::Fixed(stack) | Model::Configurable(stack) => stack,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Model::Fixed(_))
    }

    pub fn layers(&self) -> &[Dense] {
        &self.stack().layers
    }

    pub fn layers_mut(&mut self) -> &mut [Dense] {
        &mut self.stack_mut().layers
    }

    pub fn layer_names(&self) -> Vec<String> {
        (0..self.layers().len()).map(layer_name).collect()
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        let layers = self.layers();
        layers[..layers.len().saturating_sub(1)]
            .iter()
            .map(Dense::out_features)
            .collect()
    }

    pub fn architecture(&self) -> String {
        describe_architecture(&self.hidden_sizes())
    }

    pub fn mode(&self) -> Mode {
        self.stack().mode
    }

    pub fn train(&mut self) {
        self.stack_mut().mode = Mode::Train;
    }

    pub fn eval(&mut self) {
        self.stack_mut().mode = Mode::Eval;
    }

    /// Raw logits `[batch, 10]`. Nothing is retained, so this is the path
    /// evaluation and inference take.
    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        let input = flatten_input(input)?;
        let mut layers = self.layers().iter();
        let mut current = match layers.next() {
            Some(first) => first.forward(&input),
            None => return Ok(input.into_owned()),
        };
        for layer in layers {
            current = layer.forward(&current);
        }
        Ok(current)
    }

    /// Forward pass that retains every layer's pre- and post-activation so a
    /// backward pass can follow.
    pub fn forward_traced(&self, input: &Matrix) -> Result<ForwardTrace> {
        let input = flatten_input(input)?.into_owned();
        let mut traces: Vec<LayerTrace> = Vec::with_capacity(self.layers().len());
        for layer in self.layers() {
            let trace = match traces.last() {
                Some(prev) => layer.forward_traced(prev.output()),
                None => layer.forward_traced(&input),
            };
            traces.push(trace);
        }
        Ok(ForwardTrace {
            input,
            layers: traces,
        })
    }

    /// Propagates ∂L/∂logits back through the stack, accumulating a gradient
    /// on every parameter.
    pub fn backward(&mut self, trace: &ForwardTrace, grad_logits: &Matrix) -> Result<()> {
        if trace.layers.len() != self.layers().len() {
            return Err(Error::shape_mismatch(
                format!("trace of {} layers", self.layers().len()),
                format!("{} layers", trace.layers.len()),
            ));
        }
        if grad_logits.shape() != trace.logits().shape() {
            return Err(Error::shape_mismatch(
                format!("{:?}", trace.logits().shape()),
                format!("{:?}", grad_logits.shape()),
            ));
        }

        let mut grad = grad_logits.clone();
        for i in (0..trace.layers.len()).rev() {
            let layer_input = if i == 0 {
                &trace.input
            } else {
                trace.layers[i - 1].output()
            };
            grad = self.layers_mut()[i].backward(layer_input, &trace.layers[i], &grad);
        }
        Ok(())
    }

    /// Trainable tensors in layer order: weight then bias per layer.
    pub fn parameters(&self) -> Vec<&Parameter> {
        self.layers()
            .iter()
            .flat_map(|layer| [&layer.weight, &layer.bias])
            .collect()
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers_mut()
            .iter_mut()
            .flat_map(|layer| [&mut layer.weight, &mut layer.bias])
            .collect()
    }

    pub fn zero_grad(&mut self) {
        for layer in self.layers_mut() {
            layer.zero_grad();
        }
    }

    /// Applies `p ← p - learning_rate·∂L/∂p` to every parameter that has a gradient.
    pub fn manual_update(&mut self, learning_rate: f64) {
        Sgd::new(learning_rate).step(self.parameters_mut());
    }

    /// Predicted class per input row.
    pub fn predict(&self, input: &Matrix) -> Result<Vec<usize>> {
        Ok(self.forward(input)?.argmax_rows())
    }

    /// Softmax over the logits, for consumers that want class probabilities.
    pub fn probabilities(&self, input: &Matrix) -> Result<Matrix> {
        Ok(softmax(&self.forward(input)?))
    }

    /// Checks that a (possibly deserialized) model maps 784 inputs to 10 logits
    /// through consistent layer shapes.
    pub fn validate(&self) -> Result<()> {
        let layers = self.layers();
        if layers.is_empty() {
            return Err(Error::shape_mismatch("at least one layer", "none"));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.bias.shape() != vec![1, layer.out_features()] {
                return Err(Error::shape_mismatch(
                    format!("{} bias [1, {}]", layer_name(i), layer.out_features()),
                    format!("{:?}", layer.bias.shape()),
                ));
            }
            if let Some(next) = layers.get(i + 1) {
                if next.in_features() != layer.out_features() {
                    return Err(Error::shape_mismatch(
                        format!("{} input width {}", layer_name(i + 1), layer.out_features()),
                        next.in_features().to_string(),
                    ));
                }
            }
        }
        let widths = self.stack().widths();
        if widths.first() != Some(&INPUT_FEATURES) || widths.last() != Some(&OUTPUT_CLASSES) {
            return Err(Error::shape_mismatch(
                format!("{} → … → {}", INPUT_FEATURES, OUTPUT_CLASSES),
                format!("{:?}", widths),
            ));
        }
        if let Model::Fixed(_) = self {
            if self.hidden_sizes() != DEFAULT_HIDDEN_LAYERS {
                return Err(Error::shape_mismatch(
                    format!("fixed hidden layers {:?}", DEFAULT_HIDDEN_LAYERS),
                    format!("{:?}", self.hidden_sizes()),
                ));
            }
        }
        Ok(())
    }

    /// Serializes the model weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a model previously written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Model> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let model: Model = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }
}

/// Reshapes any reshape-compatible batch to `[batch, 784]`.
fn flatten_input(input: &Matrix) -> Result<Cow<'_, Matrix>> {
    if input.cols == INPUT_FEATURES {
        return Ok(Cow::Borrowed(input));
    }
    let len = input.rows * input.cols;
    if len == 0 || len % INPUT_FEATURES != 0 {
        return Err(Error::shape_mismatch(
            format!("a multiple of {} values per batch", INPUT_FEATURES),
            format!("{:?}", input.shape()),
        ));
    }
    Matrix::from_vec(len / INPUT_FEATURES, INPUT_FEATURES, input.as_slice().to_vec()).map(Cow::Owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::cross_entropy::CrossEntropyLoss;
    use crate::train::train_config::TrainingConfiguration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn batch(rows: usize, seed: u64) -> Matrix {
        Matrix::uniform(rows, INPUT_FEATURES, 1.0, &mut StdRng::seed_from_u64(seed)).map(f64::abs)
    }

    #[test]
    fn fixed_model_has_three_named_layers() {
        let model = Model::fixed(&mut rng());
        assert!(model.is_fixed());
        assert_eq!(model.layer_names(), vec!["fc1", "fc2", "fc3"]);
        let shapes: Vec<Vec<usize>> = model.layers().iter().map(|l| l.weight.shape()).collect();
        assert_eq!(shapes, vec![vec![128, 784], vec![64, 128], vec![10, 64]]);
        assert_eq!(model.layers()[2].activation, ActivationFunction::Identity);
        assert_eq!(model.parameters().len(), 6);
    }

    #[test]
    fn architecture_selects_variant() {
        assert!(Model::for_architecture(&[128, 64], &mut rng()).is_fixed());
        let model = Model::for_architecture(&[32, 16, 8], &mut rng());
        assert!(!model.is_fixed());
        assert_eq!(model.hidden_sizes(), vec![32, 16, 8]);
        assert_eq!(model.architecture(), "784 → 32 (ReLU) → 16 (ReLU) → 8 (ReLU) → 10");
        assert_eq!(model.layers().len(), 4);
    }

    #[test]
    fn plan_selects_variant() {
        let plan = TrainingConfiguration::default().into_plan().unwrap();
        assert!(Model::from_plan(&plan, &mut rng()).is_fixed());
        let plan = TrainingConfiguration {
            hidden_layers: vec![128, 64, 32],
            ..TrainingConfiguration::default()
        }
        .into_plan()
        .unwrap();
        let model = Model::from_plan(&plan, &mut rng());
        assert!(!model.is_fixed());
        assert_eq!(model.architecture(), plan.architecture());
    }

    #[test]
    fn forward_emits_batch_by_ten_logits() {
        let model = Model::configurable(&[16], &mut rng());
        let logits = model.forward(&batch(3, 1)).unwrap();
        assert_eq!(logits.shape(), vec![3, 10]);

        // A [batch, 28*28]-compatible buffer in another layout is reshaped.
        let reshaped = Matrix::from_vec(6, 392, batch(3, 1).into_vec()).unwrap();
        assert_eq!(model.forward(&reshaped).unwrap(), logits);

        assert!(model.forward(&Matrix::zeros(2, 100)).is_err());
    }

    #[test]
    fn traced_forward_matches_plain_forward() {
        let model = Model::fixed(&mut rng());
        let x = batch(2, 5);
        let trace = model.forward_traced(&x).unwrap();
        assert_eq!(trace.layers.len(), 3);
        assert!(trace.layers[0].post_activation.is_some());
        assert!(trace.layers[2].post_activation.is_none());
        assert_eq!(trace.logits(), &model.forward(&x).unwrap());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut model = Model::configurable(&[6, 5], &mut rng());
        let x = batch(3, 9);
        let labels = [1, 7, 3];

        let trace = model.forward_traced(&x).unwrap();
        let grad = CrossEntropyLoss::derivative(trace.logits(), &labels).unwrap();
        model.backward(&trace, &grad).unwrap();

        let eps = 1e-6;
        let probes = [(0usize, 0usize, 100usize), (0, 4, 783), (1, 2, 3), (2, 9, 4)];
        for &(layer, row, col) in &probes {
            let analytic = model.layers()[layer].weight.grad.as_ref().unwrap().get(row, col);
            let original = model.layers()[layer].weight.value.get(row, col);

            let mut probe = model.clone();
            probe.layers_mut()[layer].weight.value.set(row, col, original + eps);
            let plus = CrossEntropyLoss::loss(&probe.forward(&x).unwrap(), &labels).unwrap();
            probe.layers_mut()[layer].weight.value.set(row, col, original - eps);
            let minus = CrossEntropyLoss::loss(&probe.forward(&x).unwrap(), &labels).unwrap();

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (numeric - analytic).abs() < 1e-6,
                "layer {} ({}, {}): numeric {} vs analytic {}",
                layer, row, col, numeric, analytic
            );
        }

        for layer in 0..3 {
            for j in 0..model.layers()[layer].out_features() {
                let analytic = model.layers()[layer].bias.grad.as_ref().unwrap().get(0, j);
                let original = model.layers()[layer].bias.value.get(0, j);
                let mut probe = model.clone();
                probe.layers_mut()[layer].bias.value.set(0, j, original + eps);
                let plus = CrossEntropyLoss::loss(&probe.forward(&x).unwrap(), &labels).unwrap();
                probe.layers_mut()[layer].bias.value.set(0, j, original - eps);
                let minus = CrossEntropyLoss::loss(&probe.forward(&x).unwrap(), &labels).unwrap();
                assert!(((plus - minus) / (2.0 * eps) - analytic).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn zero_grad_clears_every_parameter() {
        let mut model = Model::configurable(&[4], &mut rng());
        let trace = model.forward_traced(&batch(2, 3)).unwrap();
        let grad = CrossEntropyLoss::derivative(trace.logits(), &[0, 1]).unwrap();
        model.backward(&trace, &grad).unwrap();
        assert!(model.parameters().iter().all(|p| p.grad.is_some()));
        model.zero_grad();
        assert!(model.parameters().iter().all(|p| p.grad.is_none()));
    }

    #[test]
    fn mode_switches() {
        let mut model = Model::fixed(&mut rng());
        assert_eq!(model.mode(), Mode::Train);
        model.eval();
        assert_eq!(model.mode(), Mode::Eval);
        model.train();
        assert_eq!(model.mode(), Mode::Train);
    }

    #[test]
    fn checkpoint_round_trips_weights_only() {
        let mut model = Model::configurable(&[12], &mut rng());
        let trace = model.forward_traced(&batch(1, 2)).unwrap();
        let grad = CrossEntropyLoss::derivative(trace.logits(), &[4]).unwrap();
        model.backward(&trace, &grad).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save_json(&path).unwrap();
        let loaded = Model::load_json(&path).unwrap();

        assert!(!loaded.is_fixed());
        assert!(loaded.parameters().iter().all(|p| p.grad.is_none()));
        model.zero_grad();
        assert_eq!(loaded, model);
    }

    #[test]
    fn truncated_checkpoint_fails_to_load() {
        let model = Model::configurable(&[4], &mut rng());
        let mut doc = serde_json::to_value(&model).unwrap();
        doc["stack"]["layers"][0]["weight"]["value"]["data"]
            .as_array_mut()
            .unwrap()
            .pop();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        assert!(matches!(Model::load_json(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn validate_rejects_wrong_output_width() {
        let model = Model::Configurable(LayerStack::new(&[784, 8, 3], &mut rng()));
        assert!(model.validate().is_err());
        assert!(Model::fixed(&mut rng()).validate().is_ok());
    }
}
