//! Regression metrics and evaluation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Accumulates (actual, predicted) pairs for one evaluation pass
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    actuals: Vec<f64>,
    abs_error_sum: f64,
    sq_error_sum: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one prediction
    pub fn update(&mut self, actual: f64, predicted: f64) {
        let error = actual - predicted;
        self.actuals.push(actual);
        self.abs_error_sum += error.abs();
        self.sq_error_sum += error * error;
    }

    pub fn count(&self) -> usize {
        self.actuals.len()
    }

    /// Mean absolute error
    pub fn mae(&self) -> f64 {
        if self.actuals.is_empty() {
            0.0
        } else {
            self.abs_error_sum / self.count() as f64
        }
    }

    /// Root mean squared error
    pub fn rmse(&self) -> f64 {
        if self.actuals.is_empty() {
            0.0
        } else {
            (self.sq_error_sum / self.count() as f64).sqrt()
        }
    }

    /// Coefficient of determination
    ///
    /// With constant actuals R² is 1.0 for a perfect fit and 0.0 otherwise.
    pub fn r2(&self) -> f64 {
        if self.actuals.is_empty() {
            return 0.0;
        }
        let mean = self.actuals.iter().sum::<f64>() / self.count() as f64;
        let ss_tot: f64 = self.actuals.iter().map(|y| (y - mean).powi(2)).sum();

        if ss_tot == 0.0 {
            if self.sq_error_sum == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - self.sq_error_sum / ss_tot
        }
    }

    /// Freeze into the stored summary
    pub fn summary(&self) -> RegressionMetrics {
        RegressionMetrics {
            r2_score: self.r2(),
            mae: self.mae(),
            rmse: self.rmse(),
            samples: self.count(),
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R²: {:.4} | MAE: {:.2} | RMSE: {:.2} | n={}",
            self.r2(),
            self.mae(),
            self.rmse(),
            self.count()
        )
    }
}

/// Held-out metrics as stored in the model artifact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Samples the metrics were computed over
    pub samples: usize,
}

impl fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R²: {:.4} | MAE: {:.2} | RMSE: {:.2} | n={}",
            self.r2_score, self.mae, self.rmse, self.samples
        )
    }
}
