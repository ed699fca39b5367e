//! Projection vs. market grading

use crate::{Recommendation, Result, TotalsError};

/// Edge of one projection against the market total
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCall {
    /// projected - market, unrounded
    pub edge: f64,
    /// edge / market x 100; None for a zero market
    pub edge_percent: Option<f64>,
    pub recommendation: Recommendation,
}

/// Grades projections with a symmetric threshold; boundaries hold
#[derive(Debug, Clone, Copy)]
pub struct EdgeClassifier {
    threshold: f64,
}

impl Default for EdgeClassifier {
    fn default() -> Self {
        EdgeClassifier { threshold: 2.0 }
    }
}

impl EdgeClassifier {
    pub fn new(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(TotalsError::Config(format!(
                "edge threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        Ok(EdgeClassifier { threshold })
    }

    pub fn recommend(&self, edge: f64) -> Recommendation {
        if edge > self.threshold {
            Recommendation::Over
        } else if edge < -self.threshold {
            Recommendation::Under
        } else {
            Recommendation::Hold
        }
    }

    pub fn classify(&self, projected: f64, market: f64) -> EdgeCall {
        let edge = projected - market;
        EdgeCall {
            edge,
            edge_percent: if market == 0.0 {
                None
            } else {
                Some(edge / market * 100.0)
            },
            recommendation: self.recommend(edge),
        }
    }
}
