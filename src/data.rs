//! Training data and its train/validation/test split
//!
//! A [`Dataset`] pairs an input matrix with an output matrix (one sample per
//! row). The network shuffles it and cuts it into a training split whose size
//! is a whole number of batches, then shares the remainder between validation
//! and test in proportion to their ratios.

use crate::error::{Error, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Paired input/output samples with optional column labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    inputs: Array2<f64>,
    outputs: Array2<f64>,
    input_labels: Vec<String>,
    output_labels: Vec<String>,
}

impl Dataset {
    /// # Errors
    ///
    /// `DimensionMismatch` if the matrices have different row counts.
    pub fn new(inputs: Array2<f64>, outputs: Array2<f64>) -> Result<Self> {
        if inputs.nrows() != outputs.nrows() {
            return Err(Error::mismatch(
                "dataset rows",
                inputs.nrows(),
                outputs.nrows(),
            ));
        }
        Ok(Self {
            inputs,
            outputs,
            input_labels: Vec::new(),
            output_labels: Vec::new(),
        })
    }

    /// Attaches column labels.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if a label list does not match its column count.
    pub fn with_labels(mut self, input_labels: Vec<String>, output_labels: Vec<String>) -> Result<Self> {
        if input_labels.len() != self.inputs.ncols() {
            return Err(Error::mismatch(
                "input labels",
                self.inputs.ncols(),
                input_labels.len(),
            ));
        }
        if output_labels.len() != self.outputs.ncols() {
            return Err(Error::mismatch(
                "output labels",
                self.outputs.ncols(),
                output_labels.len(),
            ));
        }
        self.input_labels = input_labels;
        self.output_labels = output_labels;
        Ok(self)
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Array2<f64> {
        &self.outputs
    }

    pub fn input_labels(&self) -> &[String] {
        &self.input_labels
    }

    pub fn output_labels(&self) -> &[String] {
        &self.output_labels
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn input_width(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn output_width(&self) -> usize {
        self.outputs.ncols()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            inputs: self.inputs.select(Axis(0), indices),
            outputs: self.outputs.select(Axis(0), indices),
            input_labels: self.input_labels.clone(),
            output_labels: self.output_labels.clone(),
        }
    }
}

/// Row counts of the three splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Computes batch-aligned split sizes.
///
/// With `v = validation_ratio · n` and `t = test_ratio · n`, the number of
/// training batches is `trunc((n - v - t) / batch_size)`, plus one when the
/// fractional part is at least one half, clamped to `n / batch_size`. The rows
/// left over go to validation and test in proportion to their ratios; test
/// takes the exact complement so no row is lost.
///
/// # Errors
///
/// `InvalidConfig` for a zero batch size or when not a single batch fits.
///
/// # Example
///
/// ```
/// use neural_trainer::data::split_sizes;
///
/// let sizes = split_sizes(100, 10, 0.2, 0.2).unwrap();
/// assert_eq!((sizes.train, sizes.validation, sizes.test), (60, 20, 20));
/// ```
pub fn split_sizes(
    len: usize,
    batch_size: usize,
    validation_ratio: f64,
    test_ratio: f64,
) -> Result<SplitSizes> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
    }
    let n = len as f64;
    let available = (n - validation_ratio * n - test_ratio * n).max(0.0) / batch_size as f64;

    let mut batches = available.trunc() as usize;
    if available.fract() >= 0.5 {
        batches += 1;
    }
    batches = batches.min(len / batch_size);
    if batches == 0 {
        return Err(Error::InvalidConfig(format!(
            "no full batch of {batch_size} fits in {len} samples with validation_ratio \
             {validation_ratio} and test_ratio {test_ratio}"
        )));
    }

    let train = batches * batch_size;
    let remainder = len - train;
    let ratio_sum = validation_ratio + test_ratio;
    let validation = if ratio_sum > 0.0 {
        ((remainder as f64) * validation_ratio / ratio_sum).round() as usize
    } else {
        remainder
    };
    let validation = validation.min(remainder);

    Ok(SplitSizes {
        train,
        validation,
        test: remainder - validation,
    })
}
