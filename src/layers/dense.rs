use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{activation::activation::ActivationFunction, layers::parameter::Parameter, math::matrix::Matrix};

/// Fully connected layer `a = f(x·Wᵀ + b)`.
///
/// `weight` has shape `(out_features, in_features)` and `bias` `(1, out_features)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weight: Parameter,
    pub bias: Parameter,
    pub activation: ActivationFunction,
}

/// Values a layer produced during one traced forward pass.
#[derive(Debug, Clone)]
pub struct LayerTrace {
    /// z = x·Wᵀ + b
    pub pre_activation: Matrix,
    /// f(z); `None` for layers without a nonlinearity.
    pub post_activation: Option<Matrix>,
}

impl LayerTrace {
    /// The tensor fed to the next layer.
    pub fn output(&self) -> &Matrix {
        self.post_activation.as_ref().unwrap_or(&self.pre_activation)
    }
}

impl Dense {
    /// Weights and biases are drawn from U(-1/√in, 1/√in).
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let bound = 1.0 / (in_features as f64).sqrt();
        let weight = Matrix::uniform(out_features, in_features, bound, rng);
        let bias = Matrix::uniform(1, out_features, bound, rng);
        Dense {
            weight: Parameter::new(weight),
            bias: Parameter::new(bias),
            activation,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.value.cols
    }

    pub fn out_features(&self) -> usize {
        self.weight.value.rows
    }

    /// Linear part only: `x·Wᵀ + b`.
    pub fn linear(&self, input: &Matrix) -> Matrix {
        (input * &self.weight.value.transpose()).add_row(&self.bias.value)
    }

    /// Forward pass without retaining anything.
    pub fn forward(&self, input: &Matrix) -> Matrix {
        let z = self.linear(input);
        if self.activation.is_nonlinear() {
            self.activation.apply(&z)
        } else {
            z
        }
    }

    /// Forward pass that keeps z and f(z) for backward and inspection.
    pub fn forward_traced(&self, input: &Matrix) -> LayerTrace {
        let pre_activation = self.linear(input);
        let post_activation = self
            .activation
            .is_nonlinear()
            .then(|| self.activation.apply(&pre_activation));
        LayerTrace {
            pre_activation,
            post_activation,
        }
    }

    /// Backpropagates `grad_output` (∂L/∂a for this layer's output).
    ///
    /// Accumulates ∂L/∂W and ∂L/∂b onto the parameters and returns ∂L/∂x for
    /// the layer's input.
    pub fn backward(&mut self, input: &Matrix, trace: &LayerTrace, grad_output: &Matrix) -> Matrix {
        // δ = ∂L/∂a ⊙ f'(z)
        let delta = if self.activation.is_nonlinear() {
            let act_derivative = trace.pre_activation.map(|x| self.activation.derivative(x));
            grad_output.hadamard(&act_derivative)
        } else {
            grad_output.clone()
        };

        let grad_input = &delta * &self.weight.value;
        self.weight.accumulate_grad(&delta.transpose() * input);
        self.bias.accumulate_grad(delta.sum_rows());
        grad_input
    }

    pub fn zero_grad(&mut self) {
        self.weight.zero_grad();
        self.bias.zero_grad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_layer(activation: ActivationFunction) -> Dense {
        Dense {
            weight: Parameter::new(
                Matrix::from_rows(&[vec![1.0, -1.0], vec![0.5, 2.0], vec![-3.0, 0.0]]).unwrap(),
            ),
            bias: Parameter::new(Matrix::from_vec(1, 3, vec![0.0, 1.0, 0.5]).unwrap()),
            activation,
        }
    }

    #[test]
    fn linear_applies_weight_rows_per_output() {
        let layer = fixed_layer(ActivationFunction::Identity);
        let x = Matrix::from_rows(&[vec![2.0, 1.0]]).unwrap();
        let z = layer.linear(&x);
        assert_eq!(z.as_slice(), &[1.0, 4.0, -5.5]);
    }

    #[test]
    fn trace_omits_post_activation_without_nonlinearity() {
        let x = Matrix::from_rows(&[vec![2.0, 1.0]]).unwrap();
        let relu = fixed_layer(ActivationFunction::ReLU).forward_traced(&x);
        assert_eq!(relu.post_activation.as_ref().unwrap().as_slice(), &[1.0, 4.0, 0.0]);
        let id = fixed_layer(ActivationFunction::Identity).forward_traced(&x);
        assert!(id.post_activation.is_none());
        assert_eq!(id.output().as_slice(), &[1.0, 4.0, -5.5]);
    }

    #[test]
    fn backward_produces_outer_product_gradients() {
        let mut layer = fixed_layer(ActivationFunction::Identity);
        let x = Matrix::from_rows(&[vec![2.0, 1.0]]).unwrap();
        let trace = layer.forward_traced(&x);
        let g = Matrix::from_rows(&[vec![1.0, 0.0, -1.0]]).unwrap();
        let gx = layer.backward(&x, &trace, &g);

        let gw = layer.weight.grad.as_ref().unwrap();
        assert_eq!(gw.shape(), vec![3, 2]);
        assert_eq!(gw.as_slice(), &[2.0, 1.0, 0.0, 0.0, -2.0, -1.0]);
        assert_eq!(layer.bias.grad.as_ref().unwrap().as_slice(), &[1.0, 0.0, -1.0]);
        assert_eq!(gx.as_slice(), &[4.0, -1.0]);
    }

    #[test]
    fn init_bound_shrinks_with_fan_in() {
        let layer = Dense::new(100, 4, ActivationFunction::ReLU, &mut StdRng::seed_from_u64(1));
        assert_eq!(layer.weight.shape(), vec![4, 100]);
        assert_eq!(layer.bias.shape(), vec![1, 4]);
        assert!(layer.weight.value.as_slice().iter().all(|w| w.abs() < 0.1));
    }
}
