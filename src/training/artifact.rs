//! Trained model persistence

use super::metrics::RegressionMetrics;
use crate::data::{read_json, write_json_atomic};
use crate::{Result, TotalsError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MODEL_TYPE: &str = "ols_linear_regression";

/// One feature's contribution ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub coefficient: f64,
    /// |coefficient| x train standard deviation
    pub importance: f64,
}

/// Fitted linear model of combined score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: String,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Held-out metrics only
    pub metrics: RegressionMetrics,
    pub training_samples: usize,
    pub test_samples: usize,
    pub training_seasons: Vec<u16>,
    /// Sorted by importance, largest first
    pub feature_importance: Vec<FeatureImportance>,
}

impl ModelArtifact {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), self)?;
        log::info!("Saved model to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TotalsError::NoModel);
        }
        let artifact: ModelArtifact = read_json(path)?;
        if artifact.coefficients.len() != artifact.feature_names.len() {
            return Err(TotalsError::FeatureShapeMismatch {
                expected: format!("{} coefficients", artifact.feature_names.len()),
                found: format!("{} coefficients", artifact.coefficients.len()),
            });
        }
        Ok(artifact)
    }

    /// The `n` most important features
    pub fn top_features(&self, n: usize) -> &[FeatureImportance] {
        &self.feature_importance[..n.min(self.feature_importance.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            model_type: MODEL_TYPE.to_string(),
            created_at: Utc::now(),
            feature_names: vec!["a".into(), "b".into()],
            coefficients: vec![1.5, -2.0],
            intercept: 44.0,
            metrics: RegressionMetrics {
                r2_score: 0.2,
                mae: 9.5,
                rmse: 12.1,
                samples: 40,
            },
            training_samples: 160,
            test_samples: 40,
            training_seasons: vec![2024],
            feature_importance: vec![FeatureImportance {
                feature: "b".into(),
                coefficient: -2.0,
                importance: 3.0,
            }],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model/totals_model.json");

        let original = artifact();
        original.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.top_features(5).len(), 1);
    }

    #[test]
    fn test_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, TotalsError::NoModel));
    }
}
