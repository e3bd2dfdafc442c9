//! Dense (fully connected) layer implementation
//!
//! The layer performs `output = activation(input × weights + bias)` and owns
//! everything needed to train itself: cached values of the last training
//! forward pass, accumulated gradients, one optimizer per parameter buffer and
//! the kept snapshot used for early stopping.

use crate::error::{Error, Result};
use crate::optimizers::{build_optimizer, Optimizer, OptimizerSettings};
use crate::utils::Activation;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Full parameter state of a layer.
///
/// Weights, bias and activation coefficient always travel together so a
/// restored layer is never half old, half new.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

/// Hyperparameters of one update step, set by the network once per epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub learning_rate: f64,
    pub momentum: f64,
    pub l1: f64,
    pub l2: f64,
    pub decay: f64,
    pub tack_on: f64,
}

/// Values cached by [`DenseLayer::forward_train`] for the backward pass.
#[derive(Debug, Clone)]
struct ForwardCache {
    input: Array2<f64>,
    pre_activation: Array2<f64>,
    dropout_mask: Option<Array2<f64>>,
    dropconnect_mask: Option<Array2<f64>>,
}

/// Gradients of the loss with respect to the layer parameters.
#[derive(Debug, Clone)]
struct Gradients {
    weights: Array2<f64>,
    bias: Array1<f64>,
    coefficient: f64,
}

/// Dense (fully connected) layer with weights, biases and one activation.
///
/// # Fields
///
/// * `weights` - Weight matrix (input_size × output_size)
/// * `bias` - Bias vector (output_size)
/// * `activation` - Nonlinearity shared by every neuron of the layer
///
/// # Example
///
/// ```
/// use neural_trainer::layers::DenseLayer;
/// use neural_trainer::optimizers::OptimizerSettings;
/// use neural_trainer::utils::{seeded_rng, Activation};
///
/// let settings = OptimizerSettings {
///     adaptive: false,
///     learning_rate: 0.1,
///     momentum: 0.0,
///     window: 0.99,
///     bias: 1e-6,
/// };
/// let mut rng = seeded_rng(42);
/// let layer = DenseLayer::new(784, 512, Activation::relu(), &settings, &mut rng);
/// assert_eq!(layer.input_size(), 784);
/// assert_eq!(layer.output_size(), 512);
/// ```
#[derive(Debug)]
pub struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
    weight_optimizer: Box<dyn Optimizer>,
    bias_optimizer: Box<dyn Optimizer>,
    cache: Option<ForwardCache>,
    gradients: Option<Gradients>,
    kept: Option<LayerState>,
}

impl DenseLayer {
    /// Create a new DenseLayer with Xavier initialization.
    ///
    /// Weights are sampled uniformly from `[-limit, limit]` with
    /// `limit = sqrt(6 / (input_size + output_size))`. Biases start at zero.
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features
    /// * `output_size` - Number of neurons
    /// * `activation` - Nonlinearity of the layer
    /// * `settings` - Optimizer used for weights and bias
    /// * `rng` - Random number generator for weight initialization
    pub fn new(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        settings: &OptimizerSettings,
        rng: &mut StdRng,
    ) -> Self {
        let limit = (6.0 / (input_size + output_size).max(1) as f64).sqrt();
        let weights =
            Array2::from_shape_simple_fn((input_size, output_size), || rng.random_range(-limit..=limit));

        Self::from_parts(weights, Array1::zeros(output_size), activation, settings)
    }

    /// Rebuilds a layer from a saved state.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the bias length differs from the weight columns.
    pub fn from_state(state: LayerState, settings: &OptimizerSettings) -> Result<Self> {
        check_state(&state, state.weights.nrows(), state.weights.ncols())?;
        Ok(Self::from_parts(
            state.weights,
            state.bias,
            state.activation,
            settings,
        ))
    }

    fn from_parts(
        weights: Array2<f64>,
        bias: Array1<f64>,
        activation: Activation,
        settings: &OptimizerSettings,
    ) -> Self {
        Self {
            weights,
            bias,
            activation,
            weight_optimizer: build_optimizer(settings),
            bias_optimizer: build_optimizer(settings),
            cache: None,
            gradients: None,
            kept: None,
        }
    }

    /// Get the input size of the layer.
    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    /// Get the output size of the layer.
    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Get the number of trainable parameters.
    ///
    /// Returns input_size × output_size (weights) + output_size (biases), plus
    /// one for a learnable activation coefficient.
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len() + usize::from(self.activation.is_learnable())
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    /// Inference forward pass: no caches, no masks.
    pub fn forward(&self, input: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_input(input.ncols())?;
        let z = input.dot(&self.weights) + &self.bias;
        Ok(self.activation.activate_all(&z))
    }

    /// Training forward pass.
    ///
    /// Caches the input and pre-activation for [`compute_gradients`]. A
    /// positive `dropconnect` drops weights and a positive `dropout` drops
    /// outputs, both with inverted scaling so the expected value is unchanged.
    /// The network passes a zero dropout for the output layer.
    ///
    /// [`compute_gradients`]: Self::compute_gradients
    pub fn forward_train(
        &mut self,
        input: &Array2<f64>,
        dropout: f64,
        dropconnect: f64,
        rng: &mut StdRng,
    ) -> Result<Array2<f64>> {
        self.check_input(input.ncols())?;

        let dropconnect_mask = (dropconnect > 0.0).then(|| mask(self.weights.dim(), dropconnect, rng));
        let z = match &dropconnect_mask {
            Some(mask) => input.dot(&(&self.weights * mask)) + &self.bias,
            None => input.dot(&self.weights) + &self.bias,
        };

        let mut output = self.activation.activate_all(&z);
        let dropout_mask = (dropout > 0.0).then(|| mask(output.dim(), dropout, rng));
        if let Some(mask) = &dropout_mask {
            output *= mask;
        }

        self.cache = Some(ForwardCache {
            input: input.clone(),
            pre_activation: z,
            dropout_mask,
            dropconnect_mask,
        });
        Ok(output)
    }

    /// Backward pass for the last training forward pass.
    ///
    /// `error` is the error signal at the layer output (descent direction,
    /// `-∂loss/∂output`), one row per sample. Stores the parameter gradients
    /// and returns the error signal for the previous layer.
    ///
    /// # Errors
    ///
    /// `InvalidState` without a preceding [`forward_train`](Self::forward_train),
    /// `DimensionMismatch` if `error` does not match the cached output.
    pub fn compute_gradients(&mut self, error: &Array2<f64>) -> Result<Array2<f64>> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            Error::InvalidState("compute_gradients called before forward_train".to_string())
        })?;
        let (rows, cols) = cache.pre_activation.dim();
        if error.nrows() != rows {
            return Err(Error::mismatch("layer error rows", rows, error.nrows()));
        }
        if error.ncols() != cols {
            return Err(Error::mismatch("layer error columns", cols, error.ncols()));
        }

        let mut error = error.clone();
        if let Some(mask) = &cache.dropout_mask {
            error *= mask;
        }
        let n = rows.max(1) as f64;

        let delta = &error * &self.activation.prime_all(&cache.pre_activation);

        let mut weight_gradient = cache.input.t().dot(&delta) / -n;
        let effective_weights = match &cache.dropconnect_mask {
            Some(mask) => {
                weight_gradient *= mask;
                &self.weights * mask
            }
            None => self.weights.clone(),
        };
        let bias_gradient = delta.sum_axis(Axis(0)) / -n;

        let coefficient = if self.activation.is_learnable() {
            let activation = self.activation;
            let sensitivity = cache
                .pre_activation
                .mapv(|x| activation.coefficient_prime(x));
            -(&error * &sensitivity).sum() / n
        } else {
            0.0
        };

        self.gradients = Some(Gradients {
            weights: weight_gradient,
            bias: bias_gradient,
            coefficient,
        });
        Ok(delta.dot(&effective_weights.t()))
    }

    /// Applies the stored gradients.
    ///
    /// Order: optimizer step, L1 shrinkage, L2 shrinkage, weight decay,
    /// tack-on noise, then the activation coefficient step. The bias only
    /// receives the optimizer step.
    ///
    /// # Errors
    ///
    /// `InvalidState` without a preceding [`compute_gradients`](Self::compute_gradients).
    pub fn update(&mut self, params: &UpdateParams, rng: &mut StdRng) -> Result<()> {
        let gradients = self.gradients.take().ok_or_else(|| {
            Error::InvalidState("update called before compute_gradients".to_string())
        })?;
        let lr = params.learning_rate;

        for optimizer in [&mut self.weight_optimizer, &mut self.bias_optimizer] {
            optimizer.set_learning_rate(lr);
            optimizer.set_momentum(params.momentum);
        }
        self.weight_optimizer
            .update(contiguous_mut(&mut self.weights)?, contiguous(&gradients.weights)?);
        self.bias_optimizer
            .update(contiguous_mut(&mut self.bias)?, contiguous(&gradients.bias)?);

        if params.l1 > 0.0 {
            self.weights
                .mapv_inplace(|w| w - lr * params.l1 * sign(w));
        }
        if params.l2 > 0.0 {
            self.weights.mapv_inplace(|w| w - lr * params.l2 * w);
        }
        if params.decay > 0.0 {
            self.weights.mapv_inplace(|w| w * (1.0 - params.decay));
        }
        if params.tack_on > 0.0 {
            let noise = Normal::new(0.0, lr * params.tack_on).map_err(|e| {
                Error::InvalidConfig(format!("tack_on noise: {e}"))
            })?;
            self.weights.mapv_inplace(|w| w + noise.sample(rng));
        }

        self.activation.learn(gradients.coefficient, lr);
        Ok(())
    }

    /// Snapshot of weights, bias and activation.
    pub fn state(&self) -> LayerState {
        LayerState {
            weights: self.weights.clone(),
            bias: self.bias.clone(),
            activation: self.activation,
        }
    }

    /// Replaces the parameters with `state`.
    ///
    /// Shapes are validated before anything is assigned.
    pub fn load_state(&mut self, state: LayerState) -> Result<()> {
        check_state(&state, self.input_size(), self.output_size())?;
        self.weights = state.weights;
        self.bias = state.bias;
        self.activation = state.activation;
        self.cache = None;
        self.gradients = None;
        Ok(())
    }

    /// Remembers the current parameters as the best known state.
    pub fn keep(&mut self) {
        self.kept = Some(self.state());
    }

    /// Restores the parameters saved by the last [`keep`](Self::keep).
    ///
    /// # Errors
    ///
    /// `InvalidState` if nothing was kept.
    pub fn release(&mut self) -> Result<()> {
        let kept = self
            .kept
            .clone()
            .ok_or_else(|| Error::InvalidState("release called before keep".to_string()))?;
        self.load_state(kept)
    }

    pub fn has_kept_state(&self) -> bool {
        self.kept.is_some()
    }

    fn check_input(&self, width: usize) -> Result<()> {
        if width != self.input_size() {
            return Err(Error::mismatch("layer input width", self.input_size(), width));
        }
        Ok(())
    }
}

fn check_state(state: &LayerState, input_size: usize, output_size: usize) -> Result<()> {
    if state.weights.nrows() != input_size {
        return Err(Error::mismatch("layer state rows", input_size, state.weights.nrows()));
    }
    if state.weights.ncols() != output_size {
        return Err(Error::mismatch(
            "layer state columns",
            output_size,
            state.weights.ncols(),
        ));
    }
    if state.bias.len() != output_size {
        return Err(Error::mismatch("layer state bias", output_size, state.bias.len()));
    }
    Ok(())
}

// keep probability 1 - rate, kept entries scaled by 1 / (1 - rate)
fn mask(shape: (usize, usize), rate: f64, rng: &mut StdRng) -> Array2<f64> {
    let keep = 1.0 - rate;
    Array2::from_shape_simple_fn(shape, || {
        if rng.random::<f64>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    })
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn contiguous<D: ndarray::Dimension>(array: &ndarray::Array<f64, D>) -> Result<&[f64]> {
    array
        .as_slice()
        .ok_or_else(|| Error::InvalidState("parameter buffer is not contiguous".to_string()))
}

fn contiguous_mut<D: ndarray::Dimension>(array: &mut ndarray::Array<f64, D>) -> Result<&mut [f64]> {
    array
        .as_slice_mut()
        .ok_or_else(|| Error::InvalidState("parameter buffer is not contiguous".to_string()))
}
