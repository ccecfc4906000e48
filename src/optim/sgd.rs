use crate::layers::parameter::Parameter;

/// Plain stochastic gradient descent: `p ← p - learning_rate·g`.
///
/// No momentum, weight decay, or clipping. Parameters without a gradient are
/// left untouched. The step reads gradients but never produces new ones, so it
/// is invisible to the next backward pass.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub const NAME: &'static str = "SGD (manual)";

    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }

    /// Applies one update to every parameter, in order.
    pub fn step<'a>(&self, parameters: impl IntoIterator<Item = &'a mut Parameter>) {
        for parameter in parameters {
            self.update(parameter);
        }
    }

    /// Updates a single parameter in place. Returns `false` if it had no gradient.
    pub fn update(&self, parameter: &mut Parameter) -> bool {
        let Some(grad) = parameter.grad.as_ref() else {
            return false;
        };
        let lr = self.learning_rate;
        for (p, g) in parameter.value.as_mut_slice().iter_mut().zip(grad.as_slice()) {
            *p -= lr * g;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::Matrix;

    #[test]
    fn step_is_elementwise_multiply_subtract() {
        let mut p = Parameter::new(Matrix::from_vec(1, 3, vec![1.0, 2.0, 3.0]).unwrap());
        p.grad = Some(Matrix::from_vec(1, 3, vec![10.0, -20.0, 0.0]).unwrap());
        assert!(Sgd::new(0.1).update(&mut p));
        assert_eq!(p.value.as_slice(), &[1.0 - 0.1 * 10.0, 2.0 - 0.1 * -20.0, 3.0]);
        // The gradient is left in place for inspection.
        assert!(p.grad.is_some());
    }

    #[test]
    fn parameters_without_gradient_are_skipped() {
        let mut with = Parameter::new(Matrix::from_vec(1, 2, vec![1.0, 1.0]).unwrap());
        with.grad = Some(Matrix::from_vec(1, 2, vec![1.0, 1.0]).unwrap());
        let mut without = Parameter::new(Matrix::from_vec(1, 2, vec![5.0, 5.0]).unwrap());

        Sgd::new(0.5).step([&mut with, &mut without]);

        assert_eq!(with.value.as_slice(), &[0.5, 0.5]);
        assert_eq!(without.value.as_slice(), &[5.0, 5.0]);
    }
}
