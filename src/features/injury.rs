//! Injury adjustments to matchup features

use super::match_repr::FeatureVector;
use crate::{Result, Side, TeamCode, TotalsError};
use serde::{Deserialize, Serialize};

const OFFENSIVE_POSITIONS: [&str; 11] = [
    "QB", "RB", "FB", "WR", "TE", "OL", "OT", "OG", "T", "G", "C",
];

/// How much an absence is expected to matter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactTier {
    High,
    Medium,
    Low,
}

/// A reported absence or limitation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryEvent {
    pub team: TeamCode,
    pub player: String,
    pub position: String,
    pub status: String,
    /// Side of the ball whose metrics the player affects
    pub category: Side,
    pub tier: ImpactTier,
}

impl InjuryEvent {
    /// Side a position plays on; anything not on offense counts as defense
    pub fn side_for_position(position: &str) -> Side {
        let position = position.trim().to_uppercase();
        if OFFENSIVE_POSITIONS.contains(&position.as_str()) {
            Side::Offense
        } else {
            Side::Defense
        }
    }

    fn cuts_offense(&self) -> bool {
        self.tier == ImpactTier::High && self.category == Side::Offense
    }
}

/// Injury effect on one team in a matchup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamInjuryImpact {
    pub team: TeamCode,
    /// Multiplier applied to the team's offensive EPA features
    pub offense_factor: f64,
    /// Events that changed the vector
    pub applied: Vec<InjuryEvent>,
    /// Events kept for display only
    pub noted: Vec<InjuryEvent>,
}

impl TeamInjuryImpact {
    pub fn is_adjusted(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Adjusted vector and the per-team breakdown
#[derive(Debug, Clone)]
pub struct AdjustedFeatures {
    pub features: FeatureVector,
    pub home: TeamInjuryImpact,
    pub away: TeamInjuryImpact,
}

/// Applies high-impact offensive injuries to a matchup vector
#[derive(Debug, Clone, Copy)]
pub struct InjuryAdjuster {
    reduction: f64,
}

impl InjuryAdjuster {
    pub fn new(reduction: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&reduction) {
            return Err(TotalsError::Config(format!(
                "injury reduction must be within [0, 1], got {}",
                reduction
            )));
        }
        Ok(InjuryAdjuster { reduction })
    }

    /// Adjusted copy of `features`; events for other teams are ignored
    pub fn adjust(
        &self,
        features: &FeatureVector,
        home: &TeamCode,
        away: &TeamCode,
        events: &[InjuryEvent],
    ) -> AdjustedFeatures {
        let home_impact = self.team_impact(home, events);
        let away_impact = self.team_impact(away, events);

        let adjusted = features
            .scaled(
                &["home_off_pass_epa", "home_off_rush_epa"],
                home_impact.offense_factor,
            )
            .scaled(
                &["away_off_pass_epa", "away_off_rush_epa"],
                away_impact.offense_factor,
            );

        AdjustedFeatures {
            features: adjusted,
            home: home_impact,
            away: away_impact,
        }
    }

    fn team_impact(&self, team: &TeamCode, events: &[InjuryEvent]) -> TeamInjuryImpact {
        let (applied, noted): (Vec<InjuryEvent>, Vec<InjuryEvent>) = events
            .iter()
            .filter(|e| &e.team == team)
            .cloned()
            .partition(|e| e.cuts_offense());

        let offense_factor = applied
            .iter()
            .fold(1.0, |factor, _| factor * (1.0 - self.reduction));

        if !applied.is_empty() {
            log::debug!(
                "{}: {} high-impact offensive injuries, offense x{:.4}",
                team,
                applied.len(),
                offense_factor
            );
        }

        TeamInjuryImpact {
            team: team.clone(),
            offense_factor,
            applied,
            noted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::match_repr::FEATURE_COUNT;

    fn event(team: &str, position: &str, tier: ImpactTier) -> InjuryEvent {
        InjuryEvent {
            team: TeamCode::new(team),
            player: format!("{team} {position}"),
            position: position.to_string(),
            status: "Out".to_string(),
            category: InjuryEvent::side_for_position(position),
            tier,
        }
    }

    fn base() -> FeatureVector {
        FeatureVector::standard([1.0; FEATURE_COUNT])
    }

    #[test]
    fn test_position_sides() {
        assert_eq!(InjuryEvent::side_for_position("qb"), Side::Offense);
        assert_eq!(InjuryEvent::side_for_position("WR"), Side::Offense);
        assert_eq!(InjuryEvent::side_for_position("CB"), Side::Defense);
        assert_eq!(InjuryEvent::side_for_position("LB"), Side::Defense);
    }

    #[test]
    fn test_single_high_impact_cut() {
        let adjuster = InjuryAdjuster::new(0.15).unwrap();
        let home = TeamCode::new("KC");
        let away = TeamCode::new("BUF");
        let events = vec![event("KC", "QB", ImpactTier::High)];

        let out = adjuster.adjust(&base(), &home, &away, &events);
        assert!((out.features.get("home_off_pass_epa").unwrap() - 0.85).abs() < 1e-12);
        assert!((out.features.get("home_off_rush_epa").unwrap() - 0.85).abs() < 1e-12);
        assert_eq!(out.features.get("away_off_pass_epa"), Some(1.0));
        assert_eq!(out.features.get("home_def_pass_epa"), Some(1.0));
        assert!(out.home.is_adjusted());
        assert!(!out.away.is_adjusted());
    }

    #[test]
    fn test_two_injuries_compound() {
        let adjuster = InjuryAdjuster::new(0.15).unwrap();
        let events = vec![
            event("BUF", "QB", ImpactTier::High),
            event("BUF", "WR", ImpactTier::High),
        ];

        let out = adjuster.adjust(&base(), &TeamCode::new("KC"), &TeamCode::new("BUF"), &events);
        assert!((out.away.offense_factor - 0.7225).abs() < 1e-12);
        assert!((out.features.get("away_off_rush_epa").unwrap() - 0.7225).abs() < 1e-12);
    }

    #[test]
    fn test_display_only_events() {
        let adjuster = InjuryAdjuster::new(0.15).unwrap();
        let events = vec![
            event("KC", "RB", ImpactTier::Medium),
            event("KC", "CB", ImpactTier::High),
            event("DAL", "QB", ImpactTier::High),
        ];

        let input = base();
        let out = adjuster.adjust(&input, &TeamCode::new("KC"), &TeamCode::new("BUF"), &events);
        assert_eq!(out.features, input);
        assert_eq!(out.home.noted.len(), 2);
        assert!(out.away.noted.is_empty());
        assert_eq!(out.home.offense_factor, 1.0);
    }

    #[test]
    fn test_reduction_bounds() {
        assert!(InjuryAdjuster::new(1.5).is_err());
        assert!(InjuryAdjuster::new(-0.1).is_err());
        assert!(InjuryAdjuster::new(0.0).is_ok());
    }
}
