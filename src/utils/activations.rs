//! Activation functions for neural networks
//!
//! This module provides the activation catalog consumed by dense layers and the
//! row-wise softmax used by cross-entropy losses and classification outputs.
//!
//! Every variant follows the same derivative convention: [`Activation::prime`]
//! takes the **pre-activation** value (the weighted sum `x·W + b`), never the
//! already activated output. Layers cache pre-activations for that reason.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Threshold under which a Softexp coefficient is treated as zero.
pub const SOFTEXP_EPSILON: f64 = 1.490_116_119_384_765_6e-8; // sqrt(f64::EPSILON)

/// Smallest logarithm argument of a negative-coefficient Softexp.
///
/// Below it the function saturates at `-ln(SOFTEXP_MIN_ARGUMENT) / coef`, so
/// the input derivative is at most `1 / SOFTEXP_MIN_ARGUMENT` and zero past
/// the edge.
pub const SOFTEXP_MIN_ARGUMENT: f64 = 1e-2;

/// Activation function of a layer.
///
/// One instance is owned by each layer and shared by all of its neurons, so a
/// learnable coefficient (PReLU, PELU, Softexp) is a single value per layer.
///
/// The JSON form is tagged by `type`:
///
/// ```json
/// { "type": "relu", "coef": 0.01 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activation {
    /// Identity.
    Linear,
    /// Logistic function `1 / (1 + e^-x)`.
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
    /// `ln(1 + e^x)`.
    Softplus,
    /// Leaky ReLU with a fixed leak slope.
    Relu {
        #[serde(default = "default_relu_coef")]
        coef: f64,
    },
    /// Parametric ReLU, the leak slope is learned.
    Prelu {
        #[serde(default = "default_prelu_coef")]
        coef: f64,
    },
    /// Exponential linear unit with a fixed scale.
    Elu {
        #[serde(default = "default_elu_coef")]
        coef: f64,
    },
    /// Parametric ELU, the scale is learned.
    Pelu {
        #[serde(default = "default_elu_coef")]
        coef: f64,
    },
    /// S-shaped ReLU: identity between two hinges, linear with its own slope outside.
    Srelu {
        #[serde(default = "default_left_hinge")]
        left_hinge: f64,
        #[serde(default = "default_srelu_slope")]
        left_slope: f64,
        #[serde(default = "default_right_hinge")]
        right_hinge: f64,
        #[serde(default = "default_srelu_slope")]
        right_slope: f64,
    },
    /// `e^(-x²)`.
    Gaussian,
    /// Parametric soft exponential: logarithmic for a negative coefficient,
    /// identity at zero, exponential for a positive coefficient.
    Softexp {
        #[serde(default)]
        coef: f64,
    },
}

fn default_relu_coef() -> f64 {
    0.01
}

fn default_prelu_coef() -> f64 {
    0.25
}

fn default_elu_coef() -> f64 {
    1.0
}

fn default_left_hinge() -> f64 {
    -1.0
}

fn default_right_hinge() -> f64 {
    1.0
}

fn default_srelu_slope() -> f64 {
    0.1
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Relu {
            coef: default_relu_coef(),
        }
    }
}

impl Activation {
    /// Leaky ReLU with the default leak slope (0.01).
    pub fn relu() -> Self {
        Activation::default()
    }

    /// Parametric ReLU starting at the given leak slope.
    pub fn prelu(coef: f64) -> Self {
        Activation::Prelu { coef }
    }

    /// Soft exponential starting at the given coefficient.
    pub fn softexp(coef: f64) -> Self {
        Activation::Softexp { coef }
    }

    /// Forward nonlinearity.
    pub fn activate(&self, x: f64) -> f64 {
        match *self {
            Activation::Linear => x,
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Softplus => x.max(0.0) + (-x.abs()).exp().ln_1p(),
            Activation::Relu { coef } | Activation::Prelu { coef } => {
                if x < 0.0 {
                    coef * x
                } else {
                    x
                }
            }
            Activation::Elu { coef } | Activation::Pelu { coef } => {
                if x < 0.0 {
                    coef * x.exp_m1()
                } else {
                    x
                }
            }
            Activation::Srelu {
                left_hinge,
                left_slope,
                right_hinge,
                right_slope,
            } => {
                if x <= left_hinge {
                    left_hinge + left_slope * (x - left_hinge)
                } else if x >= right_hinge {
                    right_hinge + right_slope * (x - right_hinge)
                } else {
                    x
                }
            }
            Activation::Gaussian => (-x * x).exp(),
            Activation::Softexp { coef } => {
                if coef < -SOFTEXP_EPSILON {
                    -softexp_log_argument(coef, x).ln() / coef
                } else if coef > SOFTEXP_EPSILON {
                    (coef * x).exp_m1() / coef + coef
                } else {
                    x
                }
            }
        }
    }

    /// Derivative of [`activate`](Self::activate) with respect to the
    /// pre-activation value `x`.
    pub fn prime(&self, x: f64) -> f64 {
        match *self {
            Activation::Linear => 1.0,
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Softplus => sigmoid(x),
            Activation::Relu { coef } | Activation::Prelu { coef } => {
                if x < 0.0 {
                    coef
                } else {
                    1.0
                }
            }
            Activation::Elu { coef } | Activation::Pelu { coef } => {
                if x < 0.0 {
                    coef * x.exp()
                } else {
                    1.0
                }
            }
            Activation::Srelu {
                left_hinge,
                left_slope,
                right_hinge,
                right_slope,
            } => {
                if x <= left_hinge {
                    left_slope
                } else if x >= right_hinge {
                    right_slope
                } else {
                    1.0
                }
            }
            Activation::Gaussian => -2.0 * x * (-x * x).exp(),
            Activation::Softexp { coef } => {
                if coef < -SOFTEXP_EPSILON {
                    let u = softexp_log_argument(coef, x);
                    if softexp_saturated(u) {
                        0.0
                    } else {
                        1.0 / u
                    }
                } else if coef > SOFTEXP_EPSILON {
                    (coef * x).exp()
                } else {
                    1.0
                }
            }
        }
    }

    /// Derivative of [`activate`](Self::activate) with respect to the learnable
    /// coefficient. Zero for fixed-shape variants.
    pub fn coefficient_prime(&self, x: f64) -> f64 {
        match *self {
            Activation::Prelu { .. } => {
                if x < 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Activation::Pelu { .. } => {
                if x < 0.0 {
                    x.exp_m1()
                } else {
                    0.0
                }
            }
            Activation::Softexp { coef } => {
                if coef < -SOFTEXP_EPSILON {
                    let u = softexp_log_argument(coef, x);
                    if softexp_saturated(u) {
                        u.ln() / (coef * coef)
                    } else {
                        u.ln() / (coef * coef) + (x + 2.0 * coef) / (coef * u)
                    }
                } else if coef > SOFTEXP_EPSILON {
                    let e = (coef * x).exp();
                    x * e / coef - (e - 1.0) / (coef * coef) + 1.0
                } else {
                    // limit of both branches when the coefficient goes to zero
                    1.0 + 0.5 * x * x
                }
            }
            _ => 0.0,
        }
    }

    /// Whether this variant carries a learnable coefficient.
    pub fn is_learnable(&self) -> bool {
        matches!(
            self,
            Activation::Prelu { .. } | Activation::Pelu { .. } | Activation::Softexp { .. }
        )
    }

    /// Current coefficient of a learnable variant.
    pub fn coefficient(&self) -> Option<f64> {
        match *self {
            Activation::Prelu { coef } | Activation::Pelu { coef } | Activation::Softexp { coef } => {
                Some(coef)
            }
            _ => None,
        }
    }

    /// Gradient step on the learnable coefficient.
    ///
    /// `gradient` is the derivative of the loss with respect to the coefficient.
    /// Fixed-shape variants ignore the call.
    pub fn learn(&mut self, gradient: f64, learning_rate: f64) {
        match self {
            Activation::Prelu { coef } | Activation::Pelu { coef } | Activation::Softexp { coef } => {
                *coef -= learning_rate * gradient;
            }
            _ => {}
        }
    }

    /// Applies [`activate`](Self::activate) to every element.
    pub fn activate_all(&self, values: &Array2<f64>) -> Array2<f64> {
        values.mapv(|x| self.activate(x))
    }

    /// Applies [`prime`](Self::prime) to every element.
    pub fn prime_all(&self, values: &Array2<f64>) -> Array2<f64> {
        values.mapv(|x| self.prime(x))
    }
}

/// Sigmoid activation function.
///
/// Returns the sigmoid of the input: 1 / (1 + exp(-x))
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

// 1 - coef * (x + coef), clamped to the saturation edge
fn softexp_log_argument(coef: f64, x: f64) -> f64 {
    (1.0 - coef * (x + coef)).max(SOFTEXP_MIN_ARGUMENT)
}

fn softexp_saturated(u: f64) -> bool {
    u <= SOFTEXP_MIN_ARGUMENT
}

/// Softmax of a single vector.
///
/// Subtracts the maximum before exponentiating so large inputs cannot overflow.
pub fn softmax(values: ArrayView1<f64>) -> Array1<f64> {
    if values.is_empty() {
        return Array1::zeros(0);
    }
    let max_value = values.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let mut exps = values.mapv(|v| (v - max_value).exp());
    let sum = exps.sum();
    exps /= sum;
    exps
}

/// Softmax applied row-wise.
///
/// Converts logits to probabilities for each row, using the max-subtraction
/// trick for numerical stability.
pub fn softmax_rows(values: ArrayView2<f64>) -> Array2<f64> {
    let mut output = values.to_owned();
    for mut row in output.axis_iter_mut(Axis(0)) {
        let normalized = softmax(row.view());
        row.assign(&normalized);
    }
    output
}
