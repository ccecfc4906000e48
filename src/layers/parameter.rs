use serde::{Deserialize, Serialize};

use crate::math::matrix::Matrix;

/// A trainable tensor paired with the gradient the last backward pass left on it.
///
/// `grad` is `None` until a backward pass reaches the parameter and again after
/// [`Parameter::zero_grad`]. Gradients are never written to model checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: Matrix,
    #[serde(skip)]
    pub grad: Option<Matrix>,
}

impl Parameter {
    pub fn new(value: Matrix) -> Parameter {
        Parameter { value, grad: None }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.value.shape()
    }

    /// Adds `grad` onto any gradient already present.
    pub fn accumulate_grad(&mut self, grad: Matrix) {
        assert_eq!(grad.shape(), self.value.shape(), "gradient shape must match parameter");
        self.grad = Some(match self.grad.take() {
            Some(mut existing) => {
                for (acc, g) in existing.as_mut_slice().iter_mut().zip(grad.as_slice()) {
                    *acc += g;
                }
                existing
            }
            None => grad,
        });
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }
}
