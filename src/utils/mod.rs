//! Shared utilities for the training engine
//!
//! This module provides the activation catalog, seeded random number
//! generation and the hyperparameter schedulers.

pub mod activations;
pub mod rng;
pub mod scheduler;

pub use activations::{softmax, softmax_rows, Activation};
pub use rng::{permutation, resolve_seed, seeded_rng};
pub use scheduler::{Scheduler, SchedulerKind};
