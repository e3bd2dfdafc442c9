//! Loss functions and their gradients
//!
//! Each loss family produces a per-element loss matrix (for monitoring and
//! averaging) and gradients that seed backpropagation. Gradients use the
//! error-signal convention: they are the descent direction `-∂loss/∂predicted`
//! (for L2 that is simply `real - predicted`).
//!
//! Rows are independent, so every matrix operation fans out one pool task per
//! row and joins them all before assembling the result.

use crate::error::{Error, Result};
use crate::thread_pool::ThreadPool;
use crate::utils::activations::softmax;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Loss family used for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// `|real - predicted|`, pair it with a linear output layer.
    L1,
    /// `½(real - predicted)²`, pair it with a linear output layer.
    #[default]
    L2,
    /// Softmax cross-entropy, the softmax is applied inside the loss.
    CrossEntropy,
    /// Per-output binary cross-entropy, outputs must lie in `[0, 1]`.
    BinaryCrossEntropy,
}

impl Loss {
    /// Whether this loss is a classification loss.
    pub fn is_classification(&self) -> bool {
        matches!(self, Loss::CrossEntropy | Loss::BinaryCrossEntropy)
    }
}

/// A configured loss: family, epsilon bias and optional class weighting.
#[derive(Debug, Clone)]
pub struct Cost {
    loss: Loss,
    bias: f64,
    ratios: Option<Arc<Array1<f64>>>,
}

impl Cost {
    /// Unweighted loss.
    ///
    /// `bias` is the epsilon added inside logarithms and denominators of the
    /// cross-entropy losses.
    pub fn new(loss: Loss, bias: f64) -> Self {
        Self {
            loss,
            bias,
            ratios: None,
        }
    }

    /// Class-weighted loss.
    ///
    /// `ratios[j]` is the prior proportion of positive samples of output `j`.
    /// Ratios are clamped to `[bias, 1 - bias]` so the weighting factor stays
    /// finite. Only the cross-entropy families use the weights.
    pub fn weighted(loss: Loss, bias: f64, ratios: Array1<f64>) -> Self {
        let low = bias.max(f64::EPSILON);
        let ratios = ratios.mapv(|ratio| ratio.clamp(low, 1.0 - low));
        Self {
            loss,
            bias,
            ratios: Some(Arc::new(ratios)),
        }
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Per-element loss matrix, one pool task per row.
    pub fn loss_matrix(
        &self,
        real: &Array2<f64>,
        predicted: &Array2<f64>,
        pool: &ThreadPool,
    ) -> Result<Array2<f64>> {
        check_shapes(real, predicted)?;
        let (rows, cols) = real.dim();
        let real = Arc::new(real.clone());
        let predicted = Arc::new(predicted.clone());
        let cost = self.clone();

        let loss_rows = pool.fan_out(rows, move |i| {
            cost.row_loss(real.row(i), predicted.row(i))
        })?;
        assemble(loss_rows, rows, cols)
    }

    /// Gradient matrix for a whole batch, one pool task per row (sample).
    pub fn gradient_matrix(
        &self,
        real: &Array2<f64>,
        predicted: &Array2<f64>,
        pool: &ThreadPool,
    ) -> Result<Array2<f64>> {
        check_shapes(real, predicted)?;
        let (rows, cols) = real.dim();
        let real = Arc::new(real.clone());
        let predicted = Arc::new(predicted.clone());
        let cost = self.clone();

        let gradient_rows = pool.fan_out(rows, move |i| {
            cost.row_gradient(real.row(i), predicted.row(i))
        })?;
        assemble(gradient_rows, rows, cols)
    }

    /// Gradient vector of a single sample, one pool task per element.
    pub fn gradient(
        &self,
        real: &Array1<f64>,
        predicted: &Array1<f64>,
        pool: &ThreadPool,
    ) -> Result<Array1<f64>> {
        if real.len() != predicted.len() {
            return Err(Error::mismatch(
                "gradient inputs",
                real.len(),
                predicted.len(),
            ));
        }
        let reference = match self.loss {
            Loss::CrossEntropy => softmax(predicted.view()),
            _ => predicted.clone(),
        };
        let real = Arc::new(real.clone());
        let reference = Arc::new(reference);
        let cost = self.clone();

        let values = pool.fan_out(real.len(), move |j| {
            cost.element_gradient(real[j], reference[j], j)
        })?;
        Ok(Array1::from(values))
    }

    /// Loss of every output of one sample.
    pub fn row_loss(&self, real: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Vec<f64> {
        let bias = self.bias;
        match self.loss {
            Loss::L1 => real
                .iter()
                .zip(predicted.iter())
                .map(|(&r, &p)| (r - p).abs())
                .collect(),
            Loss::L2 => real
                .iter()
                .zip(predicted.iter())
                .map(|(&r, &p)| 0.5 * (r - p).powi(2))
                .collect(),
            Loss::CrossEntropy => {
                let probabilities = softmax(predicted);
                real.iter()
                    .zip(probabilities.iter())
                    .enumerate()
                    .map(|(j, (&r, &s))| r * -(s + bias).ln() / self.weighting(r, j))
                    .collect()
            }
            Loss::BinaryCrossEntropy => real
                .iter()
                .zip(predicted.iter())
                .enumerate()
                .map(|(j, (&r, &p))| {
                    let loss = -(r * (p + bias).ln() + (1.0 - r) * (1.0 - p + bias).ln());
                    loss / self.weighting(r, j)
                })
                .collect(),
        }
    }

    /// Gradient of every output of one sample.
    pub fn row_gradient(&self, real: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Vec<f64> {
        let reference = match self.loss {
            Loss::CrossEntropy => softmax(predicted),
            _ => predicted.to_owned(),
        };
        real.iter()
            .zip(reference.iter())
            .enumerate()
            .map(|(j, (&r, &p))| self.element_gradient(r, p, j))
            .collect()
    }

    // `reference` is the softmax output for cross-entropy, the prediction otherwise.
    // Weighted cross-entropy divides each `r - s` by its own class weight. The
    // softmax couples the outputs, so this only approximates the derivative of
    // the weighted loss; it is exact for binary cross-entropy and when every
    // ratio is 0.5.
    fn element_gradient(&self, real: f64, reference: f64, index: usize) -> f64 {
        match self.loss {
            Loss::L1 => {
                if real > reference {
                    1.0
                } else if real < reference {
                    -1.0
                } else {
                    0.0
                }
            }
            Loss::L2 => real - reference,
            Loss::CrossEntropy => (real - reference) / self.weighting(real, index),
            Loss::BinaryCrossEntropy => {
                let gradient = (real - reference) / (reference * (1.0 - reference) + self.bias);
                gradient / self.weighting(real, index)
            }
        }
    }

    // -log2(ratio) for negatives, -log2(1 - ratio) for positives; 1 when a ratio is 0.5
    fn weighting(&self, real: f64, index: usize) -> f64 {
        let Some(ratios) = &self.ratios else {
            return 1.0;
        };
        let ratio = ratios[index];
        if (real - 1.0).abs() <= f64::EPSILON {
            -(1.0 - ratio).log2()
        } else {
            -ratio.log2()
        }
    }
}

/// Mean over samples of the per-sample summed loss.
pub fn average_loss(loss: &Array2<f64>) -> f64 {
    if loss.nrows() == 0 {
        return 0.0;
    }
    loss.sum_axis(Axis(1)).mean().unwrap_or(0.0)
}

fn check_shapes(real: &Array2<f64>, predicted: &Array2<f64>) -> Result<()> {
    if real.nrows() != predicted.nrows() {
        return Err(Error::mismatch("loss rows", real.nrows(), predicted.nrows()));
    }
    if real.ncols() != predicted.ncols() {
        return Err(Error::mismatch(
            "loss columns",
            real.ncols(),
            predicted.ncols(),
        ));
    }
    Ok(())
}

fn assemble(rows: Vec<Vec<f64>>, nrows: usize, ncols: usize) -> Result<Array2<f64>> {
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((nrows, ncols), flat)?)
}
