//! Data preprocessing fitted on the training split
//!
//! A [`Preprocessor`] is an ordered list of fitted [`Transform`]s. Transforms
//! are fitted one after the other, each on the output of the previous ones, so
//! the list reads as a pipeline: apply runs it front to back, revert back to
//! front.
//!
//! | step | apply | revert |
//! |---|---|---|
//! | center | `x - mean` | `x + mean` |
//! | normalize | `(x - min) / (max - min)` | `x · (max - min) + min` |
//! | standardize | `(x - mean) / std` | `x · std + mean` |
//! | decorrelate | `x · V` | `x · Vᵀ` |
//! | whiten | `x / sqrt(λ + bias)` | `x · sqrt(λ + bias)` |
//! | reduce | keep the leading components | pad with zeros (lossy) |
//! | recorrelate | `x · Vᵀ` | `x · V` |
//!
//! `V` and `λ` are the eigenvectors and eigenvalues (descending) of the
//! covariance matrix at the decorrelation step.

pub mod eigen;

pub use eigen::{covariance, SymmetricEigen};

use crate::error::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Preprocessing step, as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessKind {
    Center,
    Normalize,
    Standardize,
    Decorrelate,
    Whiten,
    Reduce,
    Recorrelate,
}

/// Fitting parameters shared by the steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessSettings {
    /// Fraction of the total variance the reduce step must keep.
    pub reduction_threshold: f64,
    /// Added to eigenvalues before whitening.
    pub whitening_bias: f64,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            reduction_threshold: 0.9995,
            whitening_bias: 1e-5,
        }
    }
}

/// A fitted preprocessing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Center { means: Array1<f64> },
    /// `(min, max)` per column.
    Normalize { ranges: Vec<(f64, f64)> },
    /// `(mean, std)` per column.
    Standardize { moments: Vec<(f64, f64)> },
    Decorrelate {
        rotation: Array2<f64>,
        eigenvalues: Array1<f64>,
    },
    Whiten { scales: Array1<f64> },
    Reduce { kept: usize, original: usize },
    Recorrelate { rotation: Array2<f64> },
}

impl Transform {
    fn kind(&self) -> PreprocessKind {
        match self {
            Transform::Center { .. } => PreprocessKind::Center,
            Transform::Normalize { .. } => PreprocessKind::Normalize,
            Transform::Standardize { .. } => PreprocessKind::Standardize,
            Transform::Decorrelate { .. } => PreprocessKind::Decorrelate,
            Transform::Whiten { .. } => PreprocessKind::Whiten,
            Transform::Reduce { .. } => PreprocessKind::Reduce,
            Transform::Recorrelate { .. } => PreprocessKind::Recorrelate,
        }
    }

    fn apply(&self, data: Array2<f64>) -> Array2<f64> {
        match self {
            Transform::Center { means } => data - means,
            Transform::Normalize { ranges } => map_columns(data, |j, x| {
                let (min, max) = ranges[j];
                (x - min) / non_zero(max - min)
            }),
            Transform::Standardize { moments } => map_columns(data, |j, x| {
                let (mean, std) = moments[j];
                (x - mean) / non_zero(std)
            }),
            Transform::Decorrelate { rotation, .. } => data.dot(rotation),
            Transform::Whiten { scales } => data / scales,
            Transform::Reduce { kept, .. } => data.slice(s![.., ..*kept]).to_owned(),
            Transform::Recorrelate { rotation } => data.dot(&rotation.t()),
        }
    }

    fn revert(&self, data: Array2<f64>) -> Array2<f64> {
        match self {
            Transform::Center { means } => data + means,
            Transform::Normalize { ranges } => map_columns(data, |j, x| {
                let (min, max) = ranges[j];
                x * non_zero(max - min) + min
            }),
            Transform::Standardize { moments } => map_columns(data, |j, x| {
                let (mean, std) = moments[j];
                x * non_zero(std) + mean
            }),
            Transform::Decorrelate { rotation, .. } => data.dot(&rotation.t()),
            Transform::Whiten { scales } => data * scales,
            Transform::Reduce { kept, original } => {
                let mut padded = Array2::zeros((data.nrows(), *original));
                padded.slice_mut(s![.., ..*kept]).assign(&data);
                padded
            }
            Transform::Recorrelate { rotation } => data.dot(rotation),
        }
    }

    fn output_width(&self, input_width: usize) -> usize {
        match self {
            Transform::Reduce { kept, .. } => *kept,
            _ => input_width,
        }
    }
}

/// Ordered, fitted preprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    input_width: usize,
    transforms: Vec<Transform>,
}

impl Preprocessor {
    /// Pipeline that leaves `width`-column data untouched.
    pub fn identity(width: usize) -> Self {
        Self {
            input_width: width,
            transforms: Vec::new(),
        }
    }

    /// Rebuilds a pipeline from already fitted transforms.
    pub fn from_transforms(input_width: usize, transforms: Vec<Transform>) -> Result<Self> {
        let kinds: Vec<_> = transforms.iter().map(Transform::kind).collect();
        validate(&kinds)?;
        Ok(Self {
            input_width,
            transforms,
        })
    }

    /// Fits `kinds` in order on `data`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the list breaks an ordering rule (see [`validate`]).
    pub fn fit(
        kinds: &[PreprocessKind],
        data: &Array2<f64>,
        settings: &PreprocessSettings,
    ) -> Result<Self> {
        validate(kinds)?;

        let mut current = data.clone();
        let mut transforms = Vec::with_capacity(kinds.len());
        // eigen basis of the last decorrelation, truncated by a reduction
        let mut basis: Option<(Array2<f64>, Array1<f64>)> = None;

        for &kind in kinds {
            let transform = match kind {
                PreprocessKind::Center => Transform::Center {
                    means: column_means(&current),
                },
                PreprocessKind::Normalize => Transform::Normalize {
                    ranges: current
                        .columns()
                        .into_iter()
                        .map(|column| {
                            let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                            let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                            if min.is_finite() && max.is_finite() {
                                (min, max)
                            } else {
                                (0.0, 1.0)
                            }
                        })
                        .collect(),
                },
                PreprocessKind::Standardize => Transform::Standardize {
                    moments: current
                        .columns()
                        .into_iter()
                        .map(|column| {
                            let mean = column.mean().unwrap_or(0.0);
                            (mean, column.std(0.0))
                        })
                        .collect(),
                },
                PreprocessKind::Decorrelate => {
                    let eigen = SymmetricEigen::new(&covariance(&current))?;
                    basis = Some((eigen.eigenvectors.clone(), eigen.eigenvalues.clone()));
                    Transform::Decorrelate {
                        rotation: eigen.eigenvectors,
                        eigenvalues: eigen.eigenvalues,
                    }
                }
                PreprocessKind::Whiten => {
                    let (_, eigenvalues) = require_basis(&basis, kind)?;
                    let bias = settings.whitening_bias;
                    Transform::Whiten {
                        scales: eigenvalues.mapv(|l| non_zero((l.max(0.0) + bias).sqrt())),
                    }
                }
                PreprocessKind::Reduce => {
                    let (rotation, eigenvalues) = require_basis(&basis, kind)?;
                    let kept = components_to_keep(eigenvalues, settings.reduction_threshold);
                    let truncated = (
                        rotation.slice(s![.., ..kept]).to_owned(),
                        eigenvalues.slice(s![..kept]).to_owned(),
                    );
                    let original = current.ncols();
                    basis = Some(truncated);
                    Transform::Reduce { kept, original }
                }
                PreprocessKind::Recorrelate => {
                    let (rotation, _) = require_basis(&basis, kind)?;
                    Transform::Recorrelate {
                        rotation: rotation.clone(),
                    }
                }
            };
            current = transform.apply(current);
            transforms.push(transform);
        }

        Ok(Self {
            input_width: data.ncols(),
            transforms,
        })
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Width of raw data accepted by [`apply`](Self::apply).
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Width of processed data.
    pub fn output_width(&self) -> usize {
        self.transforms
            .iter()
            .fold(self.input_width, |width, t| t.output_width(width))
    }

    /// Runs the pipeline front to back.
    pub fn apply(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.input_width {
            return Err(Error::mismatch(
                "preprocess input width",
                self.input_width,
                data.ncols(),
            ));
        }
        Ok(self
            .transforms
            .iter()
            .fold(data.to_owned(), |current, t| t.apply(current)))
    }

    /// Runs the inverse pipeline back to front.
    pub fn revert(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let width = self.output_width();
        if data.ncols() != width {
            return Err(Error::mismatch("preprocess revert width", width, data.ncols()));
        }
        Ok(self
            .transforms
            .iter()
            .rev()
            .fold(data.to_owned(), |current, t| t.revert(current)))
    }
}

/// Checks the ordering rules of a preprocessing list.
///
/// - a step appears at most once
/// - whiten, reduce and recorrelate need an earlier decorrelate
/// - recorrelate cannot be combined with reduce
pub fn validate(kinds: &[PreprocessKind]) -> Result<()> {
    for (i, kind) in kinds.iter().enumerate() {
        if kinds[..i].contains(kind) {
            return Err(Error::InvalidConfig(format!(
                "preprocessing step {kind:?} listed twice"
            )));
        }
        let needs_basis = matches!(
            kind,
            PreprocessKind::Whiten | PreprocessKind::Reduce | PreprocessKind::Recorrelate
        );
        if needs_basis && !kinds[..i].contains(&PreprocessKind::Decorrelate) {
            return Err(Error::InvalidConfig(format!(
                "preprocessing step {kind:?} requires an earlier Decorrelate"
            )));
        }
    }
    if kinds.contains(&PreprocessKind::Reduce) && kinds.contains(&PreprocessKind::Recorrelate) {
        return Err(Error::InvalidConfig(
            "Recorrelate cannot be combined with Reduce".to_string(),
        ));
    }
    Ok(())
}

/// Smallest number of leading components whose eigenvalues explain at least
/// `threshold` of the total variance. Keeps everything for degenerate spectra.
pub fn components_to_keep(eigenvalues: &Array1<f64>, threshold: f64) -> usize {
    let n = eigenvalues.len();
    let total: f64 = eigenvalues.iter().map(|l| l.max(0.0)).sum();
    if total <= 0.0 {
        return n;
    }
    let mut cumulative = 0.0;
    for (i, l) in eigenvalues.iter().enumerate() {
        cumulative += l.max(0.0);
        if cumulative / total >= threshold {
            return i + 1;
        }
    }
    n
}

fn require_basis(
    basis: &Option<(Array2<f64>, Array1<f64>)>,
    kind: PreprocessKind,
) -> Result<(&Array2<f64>, &Array1<f64>)> {
    basis
        .as_ref()
        .map(|(rotation, eigenvalues)| (rotation, eigenvalues))
        .ok_or_else(|| {
            Error::InvalidConfig(format!("preprocessing step {kind:?} requires an earlier Decorrelate"))
        })
}

fn column_means(data: &Array2<f64>) -> Array1<f64> {
    data.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()))
}

fn map_columns(mut data: Array2<f64>, f: impl Fn(usize, f64) -> f64) -> Array2<f64> {
    for (j, mut column) in data.columns_mut().into_iter().enumerate() {
        column.mapv_inplace(|x| f(j, x));
    }
    data
}

// zero ranges and deviations leave the column unscaled
fn non_zero(value: f64) -> f64 {
    if value.abs() <= f64::EPSILON {
        1.0
    } else {
        value
    }
}
