//! Layer abstractions for neural networks
//!
//! Networks are a fixed stack of dense layers. [`LayerConfig`] describes one
//! layer before the network knows its input width; [`DenseLayer`] is the
//! trained layer.

pub mod dense;

pub use dense::{DenseLayer, LayerState, UpdateParams};

use crate::utils::Activation;
use serde::{Deserialize, Serialize};

/// Description of a layer to add to a network.
///
/// The input width is inferred when training starts, from the processed input
/// width for the first layer and from the previous layer otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Number of neurons.
    pub size: usize,
    #[serde(default)]
    pub activation: Activation,
}

impl LayerConfig {
    pub fn new(size: usize, activation: Activation) -> Self {
        Self { size, activation }
    }
}
