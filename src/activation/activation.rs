use serde::{Deserialize, Serialize};

use crate::math::matrix::Matrix;

/// Nonlinearity applied after a layer's linear transform.
///
/// Every hidden layer uses `ReLU`; the output layer is `Identity` so the
/// network emits raw logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Identity,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
        }
    }

    /// Derivative evaluated at the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
        }
    }

    pub fn apply(&self, z: &Matrix) -> Matrix {
        z.map(|x| self.function(x))
    }

    /// True when the layer produces a post-activation distinct from its
    /// pre-activation.
    pub fn is_nonlinear(&self) -> bool {
        !matches!(self, ActivationFunction::Identity)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "ReLU",
            ActivationFunction::Identity => "Identity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives_and_gates_gradient() {
        let relu = ActivationFunction::ReLU;
        assert_eq!(relu.function(-2.0), 0.0);
        assert_eq!(relu.function(3.5), 3.5);
        assert_eq!(relu.derivative(-0.1), 0.0);
        assert_eq!(relu.derivative(0.0), 0.0);
        assert_eq!(relu.derivative(0.1), 1.0);
    }

    #[test]
    fn identity_passes_through() {
        let id = ActivationFunction::Identity;
        assert_eq!(id.function(-4.0), -4.0);
        assert_eq!(id.derivative(-4.0), 1.0);
        assert!(!id.is_nonlinear());
    }
}
