//! Threshold-based watering decision.
//!
//! | predicted                           | urgency |
//! |-------------------------------------|---------|
//! | `>= threshold`                      | none    |
//! | `[threshold - 5, threshold)`        | low     |
//! | `[threshold - 10, threshold - 5)`   | medium  |
//! | `< threshold - 10`                  | high    |

use serde::Serialize;
use std::fmt;

use crate::error::Result;
use crate::protocol::WaterCommand;

const MEDIUM_MARGIN: f64 = 5.0;
const HIGH_MARGIN: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WateringRecommendation {
    pub current: f64,
    pub predicted: f64,
    pub threshold: f64,
    pub should_water: bool,
    pub urgency: Urgency,
    pub message: String,
}

impl WateringRecommendation {
    /// Command to send when watering is recommended.
    pub fn command(&self, duration_sec: u32) -> Result<Option<WaterCommand>> {
        if self.should_water {
            WaterCommand::new(duration_sec).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Classify `predicted` against `threshold`.  Pure; all comparisons strict.
pub fn recommend(current: f64, predicted: f64, threshold: f64) -> WateringRecommendation {
    let urgency = if predicted >= threshold {
        Urgency::None
    } else if predicted < threshold - HIGH_MARGIN {
        Urgency::High
    } else if predicted < threshold - MEDIUM_MARGIN {
        Urgency::Medium
    } else {
        Urgency::Low
    };

    let message = match urgency {
        Urgency::None => format!("OK: predicted moisture {predicted:.1}% is sufficient."),
        Urgency::Low => format!(
            "Notice: predicted moisture {predicted:.1}% is approaching the {threshold:.1}% threshold. Consider watering."
        ),
        Urgency::Medium => format!(
            "Warning: predicted moisture {predicted:.1}% is low. Watering recommended."
        ),
        Urgency::High => format!(
            "Urgent: predicted moisture {predicted:.1}% is very low. Water immediately."
        ),
    };

    WateringRecommendation {
        current,
        predicted,
        threshold,
        should_water: predicted < threshold,
        urgency,
        message,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
