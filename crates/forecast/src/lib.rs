//! Soil moisture forecasting.
//!
//! Readings flow from the probe line protocol (or the weather simulator)
//! into lag features, a linear model predicts moisture one lag interval
//! ahead, the recursive forecaster rolls that out over several steps, and
//! the decision rules turn a prediction into a watering recommendation.

pub mod buffer;
pub mod decision;
pub mod error;
pub mod features;
pub mod model;
pub mod predictor;
pub mod protocol;
pub mod reading;
pub mod recursive;
pub mod sim;

pub use buffer::ReadingBuffer;
pub use decision::{recommend, Urgency, WateringRecommendation};
pub use error::{ForecastError, Result};
pub use features::{build_features, detect_lag, lag_interval, FeatureSet, FeatureVector};
pub use model::{ForecastModel, LinearCoefficients, Metrics, TrainingReport};
pub use predictor::Predictor;
pub use protocol::{parse_line, WaterCommand};
pub use reading::{SensorReading, Weather};
pub use recursive::{ForecastStep, RecursiveForecaster};
pub use sim::WeatherSim;
