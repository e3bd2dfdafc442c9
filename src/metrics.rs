//! Evaluation metrics reported on the test split
//!
//! Regression runs report the mean absolute and mean squared error, each
//! column normalized by the range of the training outputs so that outputs on
//! different scales weigh the same. Classification runs report the accuracy on
//! positive targets and the share of positive predictions that were wrong,
//! both in percent.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    Regression {
        mae: f64,
        mse: f64,
    },
    Classification {
        accuracy: f64,
        false_prediction_rate: f64,
    },
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metrics::Regression { mae, mse } => write!(f, "mae {mae:.6} mse {mse:.6}"),
            Metrics::Classification {
                accuracy,
                false_prediction_rate,
            } => write!(
                f,
                "accuracy {accuracy:.2}% false predictions {false_prediction_rate:.2}%"
            ),
        }
    }
}

/// Range (`max - min`) of every column, 1 for constant or empty columns.
pub fn column_ranges(data: &Array2<f64>) -> Array1<f64> {
    data.map_axis(Axis(0), |column| {
        let min = column.iter().copied().fold(f64::INFINITY, f64::min);
        let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range.is_finite() && range > f64::EPSILON {
            range
        } else {
            1.0
        }
    })
}

/// Range-normalized mean absolute and mean squared error.
pub fn regression(
    real: &Array2<f64>,
    predicted: &Array2<f64>,
    ranges: &Array1<f64>,
) -> Result<Metrics> {
    check(real, predicted)?;
    if ranges.len() != real.ncols() {
        return Err(Error::mismatch("metric ranges", real.ncols(), ranges.len()));
    }
    let error = (real - predicted) / ranges;
    Ok(Metrics::Regression {
        mae: error.mapv(f64::abs).mean().unwrap_or(0.0),
        mse: error.mapv(|e| e * e).mean().unwrap_or(0.0),
    })
}

/// Classification accuracy and false prediction rate, in percent.
///
/// An output counts as predicted positive when it reaches `threshold`.
/// Accuracy is the share of positive targets (`real == 1`) predicted
/// positive; the false prediction rate is the share of positive predictions
/// whose target is negative.
pub fn classification(
    real: &Array2<f64>,
    predicted: &Array2<f64>,
    threshold: f64,
) -> Result<Metrics> {
    check(real, predicted)?;

    let mut positives = 0usize;
    let mut validated = 0usize;
    let mut false_positives = 0usize;
    for (&r, &p) in real.iter().zip(predicted.iter()) {
        let predicted_positive = p >= threshold;
        if (r - 1.0).abs() <= f64::EPSILON {
            positives += 1;
            if predicted_positive {
                validated += 1;
            }
        } else if predicted_positive {
            false_positives += 1;
        }
    }

    Ok(Metrics::Classification {
        accuracy: percent(validated, positives),
        false_prediction_rate: percent(false_positives, validated + false_positives),
    })
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn check(real: &Array2<f64>, predicted: &Array2<f64>) -> Result<()> {
    if real.dim() != predicted.dim() {
        return Err(Error::mismatch(
            "metric inputs",
            real.len(),
            predicted.len(),
        ));
    }
    Ok(())
}
