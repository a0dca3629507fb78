//! Single-flight front end over [`ForecastModel`].
//!
//! Training and forecasting share one model behind a mutex taken with
//! `try_lock`: while one pass runs, a second caller gets
//! [`ForecastError::Busy`] instead of waiting.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::error::{ForecastError, Result};
use crate::features::build_features;
use crate::model::{ForecastModel, TrainingReport};
use crate::reading::SensorReading;
use crate::recursive::{ForecastStep, RecursiveForecaster};

pub struct Predictor {
    model: Mutex<ForecastModel>,
    model_path: Option<PathBuf>,
}

impl Predictor {
    /// Predictor that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            model: Mutex::new(ForecastModel::new()),
            model_path: None,
        }
    }

    /// Predictor that saves after each successful train and can load from
    /// `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            model: Mutex::new(ForecastModel::new()),
            model_path: Some(path.into()),
        }
    }

    /// In-memory predictor around an already fitted model.
    pub fn with_model(model: ForecastModel) -> Self {
        Self {
            model: Mutex::new(model),
            model_path: None,
        }
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Waits for any running pass to finish.
    pub fn is_trained(&self) -> bool {
        self.model
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_trained()
    }

    /// Load the persisted model.  Returns whether a model is now present;
    /// failures are logged and leave the model unset.
    pub fn load(&self) -> Result<bool> {
        let Some(path) = self.model_path.as_deref() else {
            return Ok(false);
        };
        let mut model = self.lock()?;
        match model.load(path) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!("no usable model: {e}");
                Ok(false)
            }
        }
    }

    /// Build features from `readings`, train, and persist on success.
    pub fn train(&self, readings: &[SensorReading]) -> Result<TrainingReport> {
        let mut model = self.lock()?;

        let set = build_features(readings).ok_or(ForecastError::InsufficientData {
            rows: 0,
            required: crate::model::MIN_TRAINING_ROWS,
        })?;
        let report = model.train(&set.features, &set.targets)?;
        tracing::info!(readings = readings.len(), lag = set.lag, rows = set.len(), "predictor trained");

        if let Some(path) = self.model_path.as_deref() {
            if let Err(e) = model.save(path) {
                tracing::error!("model save failed: {e}");
            }
        }
        Ok(report)
    }

    pub fn predict_next(&self, readings: &[SensorReading]) -> Result<f64> {
        self.lock()?.predict_next(readings)
    }

    /// Recursive forecast; a short or empty result means a step could not be
    /// predicted.
    pub fn forecast(&self, readings: &[SensorReading], horizon: usize) -> Result<Vec<ForecastStep>> {
        let model = self.lock()?;
        Ok(RecursiveForecaster::new(&model).forecast(readings, horizon))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ForecastModel>> {
        match self.model.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(ForecastError::Busy),
            // A panic mid-train never stores partial coefficients.
            Err(TryLockError::Poisoned(e)) => Ok(e.into_inner()),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
