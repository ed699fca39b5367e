//! Matchup feature representation
//!
//! Each matchup is encoded as a fixed, named vector built from the two team
//! profiles. The order of `FEATURE_NAMES` is part of the model contract.

use super::season_blend::TeamSeasonProfile;
use crate::{Result, TotalsError};
use serde::{Deserialize, Serialize};

/// Dimension of the matchup vector
pub const FEATURE_COUNT: usize = 16;

/// Feature names in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_off_pass_epa",
    "home_off_rush_epa",
    "home_def_pass_epa",
    "home_def_rush_epa",
    "away_off_pass_epa",
    "away_off_rush_epa",
    "away_def_pass_epa",
    "away_def_rush_epa",
    "home_pass_yards",
    "home_rush_yards",
    "away_pass_yards",
    "away_rush_yards",
    "home_turnovers",
    "away_turnovers",
    "home_sacks",
    "away_sacks",
];

/// Named feature values in a fixed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build a vector, checking names and values line up
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(TotalsError::FeatureShapeMismatch {
                expected: format!("{} values", names.len()),
                found: format!("{} values", values.len()),
            });
        }
        Ok(FeatureVector { names, values })
    }

    /// Vector in the standard matchup order
    pub fn standard(values: [f64; FEATURE_COUNT]) -> Self {
        FeatureVector {
            names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            values: values.to_vec(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.values[i])
    }

    /// Copy with the named features multiplied by `factor`; unknown names are skipped
    pub fn scaled(&self, names: &[&str], factor: f64) -> FeatureVector {
        let mut scaled = self.clone();
        for name in names {
            if let Some(i) = self.index_of(name) {
                scaled.values[i] *= factor;
            }
        }
        scaled
    }
}

/// Builds matchup vectors from team profiles
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Pure function of the two profiles
    pub fn build(home: &TeamSeasonProfile, away: &TeamSeasonProfile) -> FeatureVector {
        FeatureVector::standard([
            home.off_pass_epa,
            home.off_rush_epa,
            home.def_pass_epa,
            home.def_rush_epa,
            away.off_pass_epa,
            away.off_rush_epa,
            away.def_pass_epa,
            away.def_rush_epa,
            home.pass_yards,
            home.rush_yards,
            away.pass_yards,
            away.rush_yards,
            home.turnovers,
            away.turnovers,
            home.sacks,
            away.sacks,
        ])
    }
}
