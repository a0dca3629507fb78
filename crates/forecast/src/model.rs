//! Linear forecast model: ordinary least squares over the six lag features.
//!
//! Training holds out 20% of the rows (shuffled with a fixed seed) and
//! reports R², RMSE and MAE on them.  The fitted state is six coefficients
//! plus an intercept, persisted as a small JSON document.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ForecastError, Result};
use crate::features::{build_features, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::reading::SensorReading;

/// Fewest usable rows `train` accepts.
pub const MIN_TRAINING_ROWS: usize = 10;

const TEST_PERCENT: usize = 20;
const SPLIT_SEED: u64 = 42;

/// Diagonal load on the standardized normal equations.  The delta feature
/// is an exact difference of two others, so the plain system is singular.
const RIDGE: f64 = 1e-8;

const PREDICTION_RANGE: (f64, f64) = (0.0, 100.0);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fitted parameters; this is exactly what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub coefficients: [f64; FEATURE_COUNT],
    pub intercept: f64,
}

impl LinearCoefficients {
    fn apply(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    fn is_finite(&self) -> bool {
        self.intercept.is_finite() && self.coefficients.iter().all(|c| c.is_finite())
    }
}

/// Held-out evaluation scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub metrics: Metrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Empty until trained or loaded.
#[derive(Debug, Clone, Default)]
pub struct ForecastModel {
    fitted: Option<LinearCoefficients>,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

impl ForecastModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_coefficients(fitted: LinearCoefficients) -> Self {
        Self {
            fitted: Some(fitted),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn coefficients(&self) -> Option<&LinearCoefficients> {
        self.fitted.as_ref()
    }

    /// Fit on an 80% split and score on the other 20%.
    ///
    /// With fewer than [`MIN_TRAINING_ROWS`] rows, or any non-finite value in
    /// a row or target, nothing changes: an untrained model stays untrained
    /// and a trained one keeps its coefficients.
    pub fn train(&mut self, features: &[FeatureVector], targets: &[f64]) -> Result<TrainingReport> {
        let rows = features.len().min(targets.len());
        if rows < MIN_TRAINING_ROWS {
            return Err(ForecastError::InsufficientData {
                rows,
                required: MIN_TRAINING_ROWS,
            });
        }

        // NaN survives clamping, so a single bad reading would otherwise
        // yield NaN coefficients.
        if features[..rows]
            .iter()
            .zip(&targets[..rows])
            .any(|(f, t)| !f.is_finite() || !t.is_finite())
        {
            return Err(ForecastError::NonFiniteFeatures);
        }

        let x: Vec<[f64; FEATURE_COUNT]> = features[..rows].iter().map(|f| f.as_array()).collect();
        let y = &targets[..rows];

        let mut order: Vec<usize> = (0..rows).collect();
        fastrand::Rng::with_seed(SPLIT_SEED).shuffle(&mut order);
        let test_rows = (rows * TEST_PERCENT).div_ceil(100);
        let (test_idx, train_idx) = order.split_at(test_rows);

        let pick_x = |idx: &[usize]| idx.iter().map(|&i| x[i]).collect::<Vec<_>>();
        let pick_y = |idx: &[usize]| idx.iter().map(|&i| y[i]).collect::<Vec<_>>();

        let fitted = fit_least_squares(&pick_x(train_idx), &pick_y(train_idx));
        if !fitted.is_finite() {
            return Err(ForecastError::NonFiniteFeatures);
        }

        let test_x = pick_x(test_idx);
        let predicted: Vec<f64> = test_x.iter().map(|row| fitted.apply(row)).collect();
        let metrics = score(&pick_y(test_idx), &predicted);

        for (name, coef) in FEATURE_NAMES.iter().zip(fitted.coefficients) {
            tracing::info!(feature = name, coefficient = format!("{coef:.4}"), "model coefficient");
        }
        tracing::info!(
            intercept = format!("{:.4}", fitted.intercept),
            train_rows = train_idx.len(),
            test_rows,
            r2 = format!("{:.4}", metrics.r2),
            rmse = format!("{:.3}", metrics.rmse),
            mae = format!("{:.3}", metrics.mae),
            "model trained"
        );

        self.fitted = Some(fitted);

        Ok(TrainingReport {
            metrics,
            train_rows: train_idx.len(),
            test_rows,
        })
    }

    /// Predict the lag-ahead moisture, clamped to 0..=100.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let fitted = self.fitted.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        if !features.is_finite() {
            return Err(ForecastError::NonFiniteFeatures);
        }
        let raw = fitted.apply(&features.as_array());
        if raw.is_nan() {
            return Err(ForecastError::NonFiniteFeatures);
        }
        Ok(raw.clamp(PREDICTION_RANGE.0, PREDICTION_RANGE.1))
    }

    /// Predict from the most recent complete feature row of `readings`.
    pub fn predict_next(&self, readings: &[SensorReading]) -> Result<f64> {
        if !self.is_trained() {
            return Err(ForecastError::ModelNotTrained);
        }
        let latest = build_features(readings)
            .and_then(|set| set.latest().copied())
            .ok_or(ForecastError::InsufficientData {
                rows: 0,
                required: 1,
            })?;
        self.predict(&latest)
    }

    // -- Persistence --------------------------------------------------------

    /// Write the coefficients to `path` atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let fitted = self.fitted.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        let json = serde_json::to_vec_pretty(fitted).map_err(|e| persistence(path, e))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| persistence(&tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| persistence(path, e))?;

        tracing::info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Replace the model with the coefficients stored at `path`.  On any
    /// failure the model is left untrained.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.fitted = None;

        let bytes = fs::read(path).map_err(|e| persistence(path, e))?;
        let fitted: LinearCoefficients =
            serde_json::from_slice(&bytes).map_err(|e| persistence(path, e))?;
        if !fitted.is_finite() {
            return Err(persistence(path, "non-finite coefficient"));
        }

        self.fitted = Some(fitted);
        tracing::info!(path = %path.display(), "model loaded");
        Ok(())
    }
}

fn persistence(path: &Path, reason: impl ToString) -> ForecastError {
    ForecastError::Persistence {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Least squares
// ---------------------------------------------------------------------------

/// Fit `y ≈ intercept + Σ coef·x` on centered, unit-variance columns.
/// Constant columns get a zero coefficient.
fn fit_least_squares(x: &[[f64; FEATURE_COUNT]], y: &[f64]) -> LinearCoefficients {
    let n = x.len() as f64;

    let mut mean_x = [0.0; FEATURE_COUNT];
    for row in x {
        for (m, v) in mean_x.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let mean_y = y.iter().sum::<f64>() / n;

    let mut scale = [0.0; FEATURE_COUNT];
    for row in x {
        for j in 0..FEATURE_COUNT {
            scale[j] += (row[j] - mean_x[j]).powi(2) / n;
        }
    }
    let active: [bool; FEATURE_COUNT] = std::array::from_fn(|j| scale[j] > 1e-12);
    for s in scale.iter_mut() {
        *s = s.sqrt();
    }

    // Normal equations on standardized columns: (ZᵀZ/n + λI) β = Zᵀy/n
    let mut gram = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
    let mut rhs = [0.0; FEATURE_COUNT];
    for (row, &target) in x.iter().zip(y) {
        let z: [f64; FEATURE_COUNT] = std::array::from_fn(|j| {
            if active[j] {
                (row[j] - mean_x[j]) / scale[j]
            } else {
                0.0
            }
        });
        for j in 0..FEATURE_COUNT {
            rhs[j] += z[j] * (target - mean_y) / n;
            for k in 0..FEATURE_COUNT {
                gram[j][k] += z[j] * z[k] / n;
            }
        }
    }
    for j in 0..FEATURE_COUNT {
        gram[j][j] += if active[j] { RIDGE } else { 1.0 };
    }

    let beta = solve(gram, rhs);

    let mut coefficients = [0.0; FEATURE_COUNT];
    for j in 0..FEATURE_COUNT {
        if active[j] {
            coefficients[j] = beta[j] / scale[j];
        }
    }
    let intercept = mean_y
        - coefficients
            .iter()
            .zip(mean_x)
            .map(|(c, m)| c * m)
            .sum::<f64>();

    LinearCoefficients {
        coefficients,
        intercept,
    }
}

/// Gaussian elimination with partial pivoting.  The system is symmetric
/// positive definite by construction, so pivots never vanish.
fn solve(
    mut a: [[f64; FEATURE_COUNT]; FEATURE_COUNT],
    mut b: [f64; FEATURE_COUNT],
) -> [f64; FEATURE_COUNT] {
    for col in 0..FEATURE_COUNT {
        let pivot = (col..FEATURE_COUNT)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..FEATURE_COUNT {
            let factor = a[row][col] / a[col][col];
            for k in col..FEATURE_COUNT {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; FEATURE_COUNT];
    for row in (0..FEATURE_COUNT).rev() {
        let tail: f64 = (row + 1..FEATURE_COUNT).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x
}

fn score(actual: &[f64], predicted: &[f64]) -> Metrics {
    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;

    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let abs_err: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();

    let r2 = if ss_tot > 1e-12 {
        1.0 - ss_res / ss_tot
    } else if ss_res < 1e-12 {
        1.0
    } else {
        0.0
    };

    Metrics {
        r2,
        rmse: (ss_res / n).sqrt(),
        mae: abs_err / n,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
