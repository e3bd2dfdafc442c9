//! Optimizer abstractions for layer parameter updates
//!
//! Each layer owns one optimizer per parameter buffer (weights, bias). The
//! network sets the learning rate and momentum for the epoch, then the layer
//! hands its accumulated gradients to the optimizer.
//!
//! # Available Optimizers
//!
//! - SGD: gradient descent with classical momentum
//! - Adam: momentum plus a per-parameter adaptive step, enabled by the
//!   `adaptive_learning_rate` setting
//!
//! # Example
//!
//! ```
//! use neural_trainer::optimizers::{Optimizer, Sgd};
//!
//! let mut optimizer = Sgd::new(0.1, 0.0);
//! let mut weights = vec![1.0, 2.0];
//! optimizer.update(&mut weights, &[0.5, -0.5]);
//! assert!((weights[0] - 0.95).abs() < 1e-12);
//! ```

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

/// Core trait for parameter optimizers.
///
/// # State Management
///
/// Optimizers keep per-parameter state (velocity, second moment) sized on
/// first use. The caller only provides parameters and gradients.
pub trait Optimizer: std::fmt::Debug + Send {
    /// Update parameters in place from gradients of the loss.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths.
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]);

    /// Set the learning rate used by the next updates.
    fn set_learning_rate(&mut self, lr: f64);

    /// Set the momentum used by the next updates.
    fn set_momentum(&mut self, momentum: f64);
}

/// Settings shared by every optimizer a network creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    pub adaptive: bool,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Decay of the squared-gradient average (adaptive only).
    pub window: f64,
    /// Epsilon added to the adaptive denominator.
    pub bias: f64,
}

/// Creates an optimizer for one parameter buffer.
pub fn build_optimizer(settings: &OptimizerSettings) -> Box<dyn Optimizer> {
    if settings.adaptive {
        Box::new(Adam::new(
            settings.learning_rate,
            settings.momentum,
            settings.window,
            settings.bias,
        ))
    } else {
        Box::new(Sgd::new(settings.learning_rate, settings.momentum))
    }
}
