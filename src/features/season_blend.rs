//! Recency-weighted season profiles
//!
//! A team's profile for an upcoming game is the weighted mean of its per-season
//! aggregates. Seasons the team did not play in drop out and the remaining
//! weights are renormalised.

use super::team_stats::{EpaTally, TeamGameStats};
use crate::{Result, SeasonWeight, TeamCode, TotalsError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allowed distance of the weight sum from 1.0
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Blended per-team statistics used to build feature vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSeasonProfile {
    pub team: TeamCode,
    /// Games behind the profile across all blended seasons
    pub games: u32,
    pub off_epa: f64,
    pub off_pass_epa: f64,
    pub off_rush_epa: f64,
    pub def_epa: f64,
    pub def_pass_epa: f64,
    pub def_rush_epa: f64,
    /// Per-game averages
    pub pass_yards: f64,
    pub rush_yards: f64,
    pub touchdowns: f64,
    pub turnovers: f64,
    pub sacks: f64,
    pub plays: f64,
    /// None when no blended game had a final score
    pub points_per_game: Option<f64>,
}

/// One team's totals for a single season
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonAggregate {
    pub season: u16,
    pub games: u32,
    pub offense: EpaTally,
    pub defense: EpaTally,
    pub pass_yards: f64,
    pub rush_yards: f64,
    pub touchdowns: u32,
    pub turnovers: u32,
    pub sacks: u32,
    points: u32,
    scored_games: u32,
}

impl SeasonAggregate {
    fn empty(season: u16) -> Self {
        SeasonAggregate {
            season,
            games: 0,
            offense: EpaTally::default(),
            defense: EpaTally::default(),
            pass_yards: 0.0,
            rush_yards: 0.0,
            touchdowns: 0,
            turnovers: 0,
            sacks: 0,
            points: 0,
            scored_games: 0,
        }
    }

    fn add(&mut self, game: &TeamGameStats) {
        self.games += 1;
        self.offense.merge(&game.offense);
        self.defense.merge(&game.defense);
        self.pass_yards += game.pass_yards;
        self.rush_yards += game.rush_yards;
        self.touchdowns += game.touchdowns;
        self.turnovers += game.turnovers;
        self.sacks += game.sacks;
        if let Some(points) = game.points_for {
            self.points += points as u32;
            self.scored_games += 1;
        }
    }

    fn per_game(&self, total: f64) -> f64 {
        total / self.games as f64
    }

    fn points_per_game(&self) -> Option<f64> {
        if self.scored_games == 0 {
            None
        } else {
            Some(self.points as f64 / self.scored_games as f64)
        }
    }

    /// Rates in profile order; split rates fall back to the overall rate
    fn scalars(&self) -> [f64; 12] {
        let off = self.offense.per_play().unwrap_or(0.0);
        let def = self.defense.per_play().unwrap_or(0.0);
        [
            off,
            self.offense.pass_per_play().unwrap_or(off),
            self.offense.rush_per_play().unwrap_or(off),
            def,
            self.defense.pass_per_play().unwrap_or(def),
            self.defense.rush_per_play().unwrap_or(def),
            self.per_game(self.pass_yards),
            self.per_game(self.rush_yards),
            self.per_game(self.touchdowns as f64),
            self.per_game(self.turnovers as f64),
            self.per_game(self.sacks as f64),
            self.per_game(self.offense.plays as f64),
        ]
    }
}

/// Check that weights are finite, non-negative and sum to one
pub fn validate_weights(weights: &[SeasonWeight]) -> Result<()> {
    for w in weights {
        if !w.weight.is_finite() || w.weight < 0.0 {
            return Err(TotalsError::InvalidWeightValue {
                season: w.season,
                weight: w.weight,
            });
        }
    }

    let sum: f64 = weights.iter().map(|w| w.weight).sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(TotalsError::InvalidWeight { sum });
    }

    Ok(())
}

/// Combines per-season statistics into one profile per team
#[derive(Debug, Clone)]
pub struct SeasonBlender {
    weights: BTreeMap<u16, f64>,
}

impl SeasonBlender {
    pub fn new(weights: &[SeasonWeight]) -> Result<Self> {
        validate_weights(weights)?;

        let mut by_season = BTreeMap::new();
        for w in weights {
            *by_season.entry(w.season).or_insert(0.0) += w.weight;
        }

        Ok(SeasonBlender { weights: by_season })
    }

    pub fn weight(&self, season: u16) -> Option<f64> {
        self.weights.get(&season).copied()
    }

    /// Profiles for every team with games in a weighted season
    pub fn blend<'a, I>(&self, stats: I) -> BTreeMap<TeamCode, TeamSeasonProfile>
    where
        I: IntoIterator<Item = &'a TeamGameStats>,
    {
        let mut by_team: BTreeMap<TeamCode, Vec<&TeamGameStats>> = BTreeMap::new();
        for game in stats {
            by_team.entry(game.team.clone()).or_default().push(game);
        }

        by_team
            .into_iter()
            .filter_map(|(team, games)| {
                let profile = self.blend_team(&team, games)?;
                Some((team, profile))
            })
            .collect()
    }

    /// Profile for one team from its games; None when no weighted season has any
    pub fn blend_team<'a, I>(&self, team: &TeamCode, games: I) -> Option<TeamSeasonProfile>
    where
        I: IntoIterator<Item = &'a TeamGameStats>,
    {
        let mut seasons: BTreeMap<u16, SeasonAggregate> = BTreeMap::new();
        for game in games {
            if &game.team != team || !self.weights.contains_key(&game.season) {
                continue;
            }
            seasons
                .entry(game.season)
                .or_insert_with(|| SeasonAggregate::empty(game.season))
                .add(game);
        }

        let parts: Vec<(f64, SeasonAggregate)> = seasons
            .into_values()
            .filter_map(|agg| Some((self.weight(agg.season)?, agg)))
            .collect();

        blend_aggregates(team, &parts)
    }
}

/// Weighted mean of season aggregates, renormalised over the seasons present
fn blend_aggregates(team: &TeamCode, parts: &[(f64, SeasonAggregate)]) -> Option<TeamSeasonProfile> {
    let total_weight: f64 = parts.iter().map(|(w, _)| w).sum();
    if parts.is_empty() || total_weight <= 0.0 {
        return None;
    }

    let mut blended = [0.0; 12];
    for (weight, agg) in parts {
        let share = weight / total_weight;
        for (slot, value) in blended.iter_mut().zip(agg.scalars()) {
            *slot += share * value;
        }
    }

    let scored: Vec<(f64, f64)> = parts
        .iter()
        .filter_map(|(w, agg)| Some((*w, agg.points_per_game()?)))
        .collect();
    let scored_weight: f64 = scored.iter().map(|(w, _)| w).sum();
    let points_per_game = if scored.is_empty() || scored_weight <= 0.0 {
        None
    } else {
        Some(scored.iter().map(|(w, p)| w * p).sum::<f64>() / scored_weight)
    };

    let [off_epa, off_pass_epa, off_rush_epa, def_epa, def_pass_epa, def_rush_epa, pass_yards, rush_yards, touchdowns, turnovers, sacks, plays] =
        blended;

    Some(TeamSeasonProfile {
        team: team.clone(),
        games: parts.iter().map(|(_, agg)| agg.games).sum(),
        off_epa,
        off_pass_epa,
        off_rush_epa,
        def_epa,
        def_pass_epa,
        def_rush_epa,
        pass_yards,
        rush_yards,
        touchdowns,
        turnovers,
        sacks,
        plays,
        points_per_game,
    })
}
