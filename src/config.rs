//! Configuration structures for training
//!
//! [`NetworkConfig`] gathers every hyperparameter of a training run. All fields
//! have defaults, so a JSON file only lists what it changes:
//!
//! ```json
//! {
//!   "seed": 42,
//!   "batch_size": 10,
//!   "learning_rate": 0.001,
//!   "scheduler": "plateau",
//!   "scheduler_value": 2.0,
//!   "scheduler_delay": 3,
//!   "loss": "cross_entropy",
//!   "preprocess_inputs": ["center", "decorrelate", "whiten"]
//! }
//! ```

use crate::cost::Loss;
use crate::error::{Error, Result};
use crate::preprocess::{self, PreprocessKind};
use crate::utils::SchedulerKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Hyperparameters of a network and its training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Seed of every random decision; 0 derives one from the clock.
    pub seed: u64,

    /// Initial number of samples per batch.
    pub batch_size: usize,
    pub batch_size_scheduler: SchedulerKind,
    pub batch_size_scheduler_value: f64,
    pub batch_size_scheduler_delay: usize,
    /// Upper bound of the batch size, as a fraction of the training rows.
    pub max_batch_size_ratio: f64,

    pub learning_rate: f64,
    pub scheduler: SchedulerKind,
    pub scheduler_value: f64,
    pub scheduler_delay: usize,

    /// L1 regularization strength.
    pub l1: f64,
    /// L2 regularization strength.
    pub l2: f64,
    /// Decoupled weight decay, applied multiplicatively after each update.
    pub decay: f64,
    /// Standard deviation of the weight noise, relative to the learning rate.
    pub tack_on: f64,

    /// Initial momentum, grows towards `max_momentum` as its scheduler decays.
    pub momentum: f64,
    pub max_momentum: f64,
    pub momentum_scheduler: SchedulerKind,
    pub momentum_scheduler_value: f64,
    pub momentum_scheduler_delay: usize,

    /// Per-parameter adaptive steps (momentum and `window` as moment decays).
    pub adaptive_learning_rate: bool,
    pub window: f64,
    pub optimizer_bias: f64,

    pub max_epoch: usize,
    /// Epochs without improvement tolerated before stopping.
    pub patience: usize,
    /// Minimum relative decrease of the validation loss counted as improvement.
    ///
    /// A new best needs `loss <= best * (1 - improvement)`, or a strict
    /// decrease when `improvement` is zero.
    pub improvement: f64,

    pub dropout: f64,
    pub dropconnect: f64,

    pub validation_ratio: f64,
    pub test_ratio: f64,

    pub loss: Loss,
    pub use_class_weights: bool,
    pub cross_entropy_bias: f64,
    pub classification_threshold: f64,

    pub threads: usize,

    pub preprocess_inputs: Vec<PreprocessKind>,
    pub preprocess_outputs: Vec<PreprocessKind>,
    pub input_reduction_threshold: f64,
    /// Variance kept by an output reduce; predictions lose the dropped components.
    pub output_reduction_threshold: f64,
    pub whitening_bias: f64,

    pub name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            batch_size: 1,
            batch_size_scheduler: SchedulerKind::None,
            batch_size_scheduler_value: 2.0,
            batch_size_scheduler_delay: 2,
            max_batch_size_ratio: 0.1,
            learning_rate: 0.01,
            scheduler: SchedulerKind::None,
            scheduler_value: 2.0,
            scheduler_delay: 2,
            l1: 0.0,
            l2: 0.0,
            decay: 0.0,
            tack_on: 0.0,
            momentum: 0.0,
            max_momentum: 0.9,
            momentum_scheduler: SchedulerKind::None,
            momentum_scheduler_value: 1.0,
            momentum_scheduler_delay: 1,
            adaptive_learning_rate: false,
            window: 0.99,
            optimizer_bias: 1e-6,
            max_epoch: 1000,
            patience: 5,
            improvement: 0.01,
            dropout: 0.0,
            dropconnect: 0.0,
            validation_ratio: 0.2,
            test_ratio: 0.2,
            loss: Loss::L2,
            use_class_weights: false,
            cross_entropy_bias: 1e-10,
            classification_threshold: 0.5,
            threads: 1,
            preprocess_inputs: Vec::new(),
            preprocess_outputs: Vec::new(),
            input_reduction_threshold: 0.9995,
            output_reduction_threshold: 0.9995,
            whitening_bias: 1e-5,
            name: "neural_trainer_network".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Checks every field; the error names the field and its value.
    pub fn validate(&self) -> Result<()> {
        positive("batch_size", self.batch_size as f64)?;
        positive("learning_rate", self.learning_rate)?;
        positive("threads", self.threads as f64)?;
        positive("max_epoch", self.max_epoch as f64)?;
        positive("optimizer_bias", self.optimizer_bias)?;
        positive("cross_entropy_bias", self.cross_entropy_bias)?;

        for (name, value) in [
            ("l1", self.l1),
            ("l2", self.l2),
            ("tack_on", self.tack_on),
            ("improvement", self.improvement),
            ("whitening_bias", self.whitening_bias),
            ("max_batch_size_ratio", self.max_batch_size_ratio),
        ] {
            non_negative(name, value)?;
        }

        for (name, value) in [
            ("decay", self.decay),
            ("momentum", self.momentum),
            ("max_momentum", self.max_momentum),
            ("window", self.window),
            ("dropout", self.dropout),
            ("dropconnect", self.dropconnect),
        ] {
            unit_interval(name, value)?;
        }
        if self.momentum > self.max_momentum {
            return Err(Error::InvalidConfig(format!(
                "momentum ({}) must not exceed max_momentum ({})",
                self.momentum, self.max_momentum
            )));
        }

        for (name, value) in [
            ("validation_ratio", self.validation_ratio),
            ("test_ratio", self.test_ratio),
            ("classification_threshold", self.classification_threshold),
            ("input_reduction_threshold", self.input_reduction_threshold),
            ("output_reduction_threshold", self.output_reduction_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.validation_ratio + self.test_ratio >= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "validation_ratio + test_ratio must be below 1, got {}",
                self.validation_ratio + self.test_ratio
            )));
        }

        for (name, kind, value, delay) in [
            (
                "scheduler",
                self.scheduler,
                self.scheduler_value,
                self.scheduler_delay,
            ),
            (
                "momentum_scheduler",
                self.momentum_scheduler,
                self.momentum_scheduler_value,
                self.momentum_scheduler_delay,
            ),
            (
                "batch_size_scheduler",
                self.batch_size_scheduler,
                self.batch_size_scheduler_value,
                self.batch_size_scheduler_delay,
            ),
        ] {
            validate_scheduler(name, kind, value, delay)?;
        }

        preprocess::validate(&self.preprocess_inputs)?;
        preprocess::validate(&self.preprocess_outputs)?;
        if self.loss.is_classification() && !self.preprocess_outputs.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{:?} loss needs raw outputs, remove preprocess_outputs {:?}",
                self.loss, self.preprocess_outputs
            )));
        }

        Ok(())
    }
}

fn validate_scheduler(name: &str, kind: SchedulerKind, value: f64, delay: usize) -> Result<()> {
    match kind {
        SchedulerKind::None => Ok(()),
        _ if delay == 0 => Err(Error::InvalidConfig(format!(
            "{name}_delay must be at least 1 for {kind:?}"
        ))),
        SchedulerKind::Exponential if value < 0.0 => Err(Error::InvalidConfig(format!(
            "{name}_value must be non-negative for Exponential, got {value}"
        ))),
        SchedulerKind::Step | SchedulerKind::Plateau if value < 1.0 => {
            Err(Error::InvalidConfig(format!(
                "{name}_value must be at least 1 for {kind:?}, got {value}"
            )))
        }
        _ => Ok(()),
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be non-negative, got {value}"
        )))
    }
}

// [0, 1)
fn unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be in [0, 1), got {value}"
        )))
    }
}

/// Loads a network configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates the result.
///
/// # Examples
///
/// ```no_run
/// use neural_trainer::config::load_config;
///
/// let cfg = load_config("config/regression.json").unwrap();
/// assert_eq!(cfg.batch_size, 10);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<NetworkConfig> {
    let contents = fs::read_to_string(path)?;
    let config: NetworkConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
