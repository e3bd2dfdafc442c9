//! Stochastic Gradient Descent (SGD) optimizer with momentum
//!
//! Update rule:
//!
//! ```text
//! v = momentum * v + gradient
//! parameter = parameter - learning_rate * v
//! ```
//!
//! With a momentum of zero this is vanilla gradient descent.

use crate::optimizers::Optimizer;

/// Stochastic Gradient Descent optimizer with classical momentum.
///
/// # Example
///
/// ```
/// use neural_trainer::optimizers::{Optimizer, Sgd};
///
/// let mut optimizer = Sgd::new(0.1, 0.0);
/// let mut params = vec![1.0, 2.0, 3.0];
/// optimizer.update(&mut params, &[0.1, 0.2, 0.3]);
/// assert!((params[0] - 0.99).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
    momentum: f64,
    velocity: Vec<f64>,
}

impl Sgd {
    /// Creates a new SGD optimizer.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - The step size for parameter updates (must be positive)
    /// * `momentum` - Fraction of the previous velocity carried over, in `[0, 1)`
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Vec::new(),
        }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.velocity.len() != parameters.len() {
            self.velocity = vec![0.0; parameters.len()];
        }

        for ((param, velocity), grad) in parameters
            .iter_mut()
            .zip(self.velocity.iter_mut())
            .zip(gradients.iter())
        {
            *velocity = self.momentum * *velocity + grad;
            *param -= self.learning_rate * *velocity;
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn set_momentum(&mut self, momentum: f64) {
        self.momentum = momentum;
    }
}
