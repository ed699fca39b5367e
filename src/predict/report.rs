//! Analysis document written at the end of a run

use crate::data::feeds::FeedProvenance;
use crate::features::injury::TeamInjuryImpact;
use crate::features::TeamSeasonProfile;
use crate::training::{FeatureImportance, ModelArtifact};
use crate::{Prediction, Recommendation};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// One projected game as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameReport {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_abbr: String,
    pub away_abbr: String,
    pub game_date: Option<NaiveDate>,
    pub vegas_total: f64,
    pub model_total: f64,
    pub home_score: f64,
    pub away_score: f64,
    pub edge: f64,
    pub edge_percent: Option<f64>,
    pub recommendation: Recommendation,
    pub home_off_epa: f64,
    pub home_def_epa: f64,
    pub away_off_epa: f64,
    pub away_def_epa: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_moneyline: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_moneyline: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub injury_notes: Vec<String>,
}

impl GameReport {
    pub fn new(pred: &Prediction, home: &TeamSeasonProfile, away: &TeamSeasonProfile) -> Self {
        GameReport {
            game_id: pred.game_id.clone(),
            home_team: pred.home_team.display_name().to_string(),
            away_team: pred.away_team.display_name().to_string(),
            home_abbr: pred.home_team.to_string(),
            away_abbr: pred.away_team.to_string(),
            game_date: pred.date,
            vegas_total: pred.market_total,
            model_total: round_to(pred.projected_total, 1),
            home_score: round_to(pred.projected_home_score, 1),
            away_score: round_to(pred.projected_away_score, 1),
            edge: round_to(pred.edge, 1),
            edge_percent: pred.edge_percent.map(|p| round_to(p, 1)),
            recommendation: pred.recommendation,
            home_off_epa: round_to(home.off_epa, 3),
            home_def_epa: round_to(home.def_epa, 3),
            away_off_epa: round_to(away.off_epa, 3),
            away_def_epa: round_to(away.def_epa, 3),
            home_moneyline: None,
            away_moneyline: None,
            injury_notes: Vec::new(),
        }
    }

    pub fn with_moneylines(mut self, home: Option<i32>, away: Option<i32>) -> Self {
        self.home_moneyline = home;
        self.away_moneyline = away;
        self
    }

    /// Attach one note per listed injury
    pub fn with_injuries(mut self, impacts: &[&TeamInjuryImpact]) -> Self {
        for impact in impacts {
            for event in impact.applied.iter().chain(&impact.noted) {
                self.injury_notes.push(format!(
                    "{} {} {} ({})",
                    event.team, event.position, event.player, event.status
                ));
            }
        }
        self
    }
}

/// Held-out metrics as published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetricsReport {
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
    pub training_samples: usize,
    pub test_samples: usize,
}

/// Aggregates over the projected slate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub games_analyzed: usize,
    /// Mean absolute edge
    pub avg_edge: f64,
    pub over_picks: usize,
    pub under_picks: usize,
    pub hold_picks: usize,
    pub avg_model_total: f64,
    pub avg_vegas_total: f64,
}

impl SummaryStats {
    pub fn from_predictions(predictions: &[Prediction]) -> Self {
        let n = predictions.len();
        let mean = |f: &dyn Fn(&Prediction) -> f64| {
            if n == 0 {
                0.0
            } else {
                predictions.iter().map(f).sum::<f64>() / n as f64
            }
        };
        let count = |r: Recommendation| predictions.iter().filter(|p| p.recommendation == r).count();

        SummaryStats {
            games_analyzed: n,
            avg_edge: round_to(mean(&|p| p.edge.abs()), 2),
            over_picks: count(Recommendation::Over),
            under_picks: count(Recommendation::Under),
            hold_picks: count(Recommendation::Hold),
            avg_model_total: round_to(mean(&|p| p.projected_total), 1),
            avg_vegas_total: round_to(mean(&|p| p.market_total), 1),
        }
    }
}

/// The full analysis document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub generated_at: String,
    pub season: u16,
    pub training_seasons: Vec<u16>,
    pub line_source: Option<FeedProvenance>,
    pub injury_source: Option<FeedProvenance>,
    pub model_metrics: ModelMetricsReport,
    pub summary_stats: SummaryStats,
    pub feature_importance: Vec<FeatureImportance>,
    pub games: Vec<GameReport>,
}

impl AnalysisReport {
    pub fn new(
        season: u16,
        artifact: &ModelArtifact,
        predictions: &[Prediction],
        games: Vec<GameReport>,
    ) -> Self {
        AnalysisReport {
            generated_at: Utc::now().to_rfc3339(),
            season,
            training_seasons: artifact.training_seasons.clone(),
            line_source: None,
            injury_source: None,
            model_metrics: ModelMetricsReport {
                r2_score: round_to(artifact.metrics.r2_score, 4),
                mae: round_to(artifact.metrics.mae, 2),
                rmse: round_to(artifact.metrics.rmse, 2),
                training_samples: artifact.training_samples,
                test_samples: artifact.test_samples,
            },
            summary_stats: SummaryStats::from_predictions(predictions),
            feature_importance: artifact.top_features(10).to_vec(),
            games,
        }
    }

    pub fn with_sources(
        mut self,
        lines: Option<FeedProvenance>,
        injuries: Option<FeedProvenance>,
    ) -> Self {
        self.line_source = lines;
        self.injury_source = injuries;
        self
    }
}
