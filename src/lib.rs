//! Neural Trainer Library
//!
//! A feed-forward neural network training engine: dense layers with pluggable
//! activations, mini-batch gradient descent with scheduled learning rate,
//! momentum and batch size, early stopping on a validation split, and data
//! preprocessing fitted on the training split.
//!
//! # Modules
//!
//! - `network`: the layer stack and its training loop
//! - `layers`: dense layer with forward/backward passes and keep/release
//! - `cost`: losses and their gradients, fanned out on the thread pool
//! - `optimizers`: parameter update rules (SGD with momentum, Adam)
//! - `preprocess`: center, normalize, standardize, decorrelate, whiten, reduce
//! - `data`: datasets and the batch-aligned split
//! - `metrics`: regression and classification metrics
//! - `thread_pool`: fixed-size worker pool
//! - `utils`: activations, seeded RNG, schedulers
//! - `config` / `architecture`: JSON configuration
//! - `io`: JSON snapshots of trained networks

pub mod architecture;
pub mod config;
pub mod cost;
pub mod data;
pub mod error;
pub mod io;
pub mod layers;
pub mod metrics;
pub mod network;
pub mod optimizers;
pub mod preprocess;
pub mod thread_pool;
pub mod utils;

pub use error::{Error, Result};
pub use network::{Network, StopReason, TrainingReport, TrainingState};
