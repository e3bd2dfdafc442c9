//! Adaptive step size optimizer
//!
//! Keeps a decaying average of gradients and of squared gradients per
//! parameter. The step of each parameter is the first average divided by the
//! root of the second, after bias correction of both.

use crate::optimizers::Optimizer;

/// Adam optimizer driven by the network schedules.
///
/// ```text
/// m = momentum * m + (1 - momentum) * g
/// v = window * v + (1 - window) * g²
/// p -= lr * (m / (1 - momentum^t)) / (sqrt(v / (1 - window^t)) + bias)
/// ```
///
/// `momentum` follows the momentum scheduler, so the two features compose.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    momentum: f64,
    window: f64,
    bias: f64,
    first_moment: Vec<f64>,
    second_moment: Vec<f64>,
    step: i32,
}

impl Adam {
    /// `window` is the decay of the squared-gradient average and `bias` the
    /// epsilon added to its root.
    pub fn new(learning_rate: f64, momentum: f64, window: f64, bias: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            window,
            bias,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
            step: 0,
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        let size = parameters.len();
        if self.first_moment.len() != size {
            self.first_moment = vec![0.0; size];
            self.second_moment = vec![0.0; size];
        }
        self.step = self.step.saturating_add(1);

        let (momentum, window) = (self.momentum, self.window);
        let first_correction = 1.0 - momentum.powi(self.step);
        let second_correction = 1.0 - window.powi(self.step);

        let moments = self.first_moment.iter_mut().zip(self.second_moment.iter_mut());
        for ((parameter, &gradient), (first, second)) in
            parameters.iter_mut().zip(gradients).zip(moments)
        {
            *first = momentum * *first + (1.0 - momentum) * gradient;
            *second = window * *second + (1.0 - window) * gradient * gradient;

            let direction = *first / first_correction;
            let scale = (*second / second_correction).sqrt() + self.bias;
            *parameter -= self.learning_rate * direction / scale;
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn set_momentum(&mut self, momentum: f64) {
        self.momentum = momentum;
    }
}
