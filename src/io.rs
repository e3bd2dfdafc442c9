//! JSON persistence of trained networks
//!
//! A [`NetworkSnapshot`] holds everything inference needs (configuration,
//! layer parameters, fitted preprocessors, labels) plus the training history.

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::layers::LayerState;
use crate::network::EpochRecord;
use crate::preprocess::Preprocessor;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serializable state of a trained network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub config: NetworkConfig,
    pub layers: Vec<LayerState>,
    pub input_preprocessor: Preprocessor,
    pub output_preprocessor: Preprocessor,
    /// Range of every training output column, used by regression metrics.
    pub output_ranges: Array1<f64>,
    #[serde(default)]
    pub input_labels: Vec<String>,
    #[serde(default)]
    pub output_labels: Vec<String>,
    #[serde(default)]
    pub optimal_epoch: usize,
    #[serde(default)]
    pub history: Vec<EpochRecord>,
}

/// Writes `snapshot` as pretty-printed JSON.
pub fn save_snapshot(snapshot: &NetworkSnapshot, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads a snapshot written by [`save_snapshot`].
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<NetworkSnapshot> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
