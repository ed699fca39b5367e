//! Model inference for projections

use crate::features::FeatureVector;
use crate::training::ModelArtifact;
use crate::{Prediction, Result, TotalsError};

/// Applies a trained artifact to matchup vectors
pub struct PredictionEngine<'a> {
    artifact: &'a ModelArtifact,
}

impl<'a> PredictionEngine<'a> {
    pub fn new(artifact: &'a ModelArtifact) -> Self {
        PredictionEngine { artifact }
    }

    /// Reject vectors whose width or name order differs from the model's
    pub fn check_shape(&self, features: &FeatureVector) -> Result<()> {
        if features.names() != self.artifact.feature_names.as_slice() {
            return Err(TotalsError::FeatureShapeMismatch {
                expected: self.artifact.feature_names.join(", "),
                found: features.names().join(", "),
            });
        }
        Ok(())
    }

    /// Projected combined score
    pub fn project(&self, features: &FeatureVector) -> Result<f64> {
        self.check_shape(features)?;

        let dot: f64 = features
            .values()
            .iter()
            .zip(&self.artifact.coefficients)
            .map(|(x, c)| x * c)
            .sum();

        Ok(dot + self.artifact.intercept)
    }
}

/// Format a projection for display
pub fn format_prediction(pred: &Prediction) -> String {
    let edge_percent = pred
        .edge_percent
        .map(|p| format!("{:+.1}%", p))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {} @ {}
├─────────────────────────────────────────────────┤
│  Projected total:  {:.1}
│  Market total:     {:.1}
│  Edge:             {:+.1} ({})
│  Projected score:  {} {:.0} - {} {:.0}
│  Recommendation:   {}
└─────────────────────────────────────────────────┘
"#,
        pred.away_team.display_name(),
        pred.home_team.display_name(),
        pred.projected_total,
        pred.market_total,
        pred.edge,
        edge_percent,
        pred.home_team.display_name(),
        pred.projected_home_score,
        pred.away_team.display_name(),
        pred.projected_away_score,
        pred.recommendation
    )
}
