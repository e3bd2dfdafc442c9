//! Architecture configuration structures
//!
//! An architecture file describes a whole network: its hyperparameters and its
//! layer stack. Layer input widths are not listed; they follow from the data
//! and from the previous layer when training starts.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::layers::LayerConfig;
use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the entire neural network architecture.
///
/// Layers are applied in the order they appear in the configuration. The
/// `network` section may be omitted to train with default hyperparameters.
///
/// # Example
///
/// ```json
/// {
///   "network": { "seed": 42, "batch_size": 4, "learning_rate": 0.1 },
///   "layers": [
///     { "size": 4, "activation": { "type": "relu" } },
///     { "size": 1, "activation": { "type": "sigmoid" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    /// Checks the hyperparameters and the layer stack.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "architecture must contain at least one layer".to_string(),
            ));
        }
        if let Some(index) = self.layers.iter().position(|layer| layer.size == 0) {
            return Err(Error::InvalidConfig(format!(
                "layer {index} must have at least one neuron, got size 0"
            )));
        }
        Ok(())
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates the result.
///
/// # Examples
///
/// ```no_run
/// use neural_trainer::architecture::load_architecture;
///
/// let arch = load_architecture("config/xor.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Creates an untrained network with the configured layer stack.
pub fn build_network(architecture: &ArchitectureConfig) -> Result<Network> {
    architecture.validate()?;
    let mut network = Network::new(architecture.network.clone())?;
    for &layer in &architecture.layers {
        network.add_layer(layer)?;
    }
    log::debug!(
        "{}: built {} layers ({})",
        architecture.network.name,
        architecture.layers.len(),
        architecture
            .layers
            .iter()
            .map(|layer| layer.size.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(network)
}
