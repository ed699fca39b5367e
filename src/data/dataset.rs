//! Labelled training samples from aggregated games
//!
//! Every sample only sees information available before kickoff: the team's
//! earlier games that season plus its full previous season.

use crate::features::season_blend::SeasonBlender;
use crate::features::team_stats::{Aggregation, TeamGameStats};
use crate::features::{FeatureBuilder, FeatureVector};
use crate::{Result, SeasonWeight, TeamCode, TrainingConfig};
use std::collections::BTreeMap;

/// One completed game as a regression sample
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub game_id: String,
    pub season: u16,
    pub week: u8,
    pub features: FeatureVector,
    /// Home score + away score
    pub actual_total: f64,
}

/// Builds samples with prior-only team profiles
pub struct TrainingSetBuilder {
    in_season_weight: f64,
    prior_season_weight: f64,
    max_week: u8,
}

impl TrainingSetBuilder {
    pub fn new(config: &TrainingConfig) -> Result<Self> {
        let builder = TrainingSetBuilder {
            in_season_weight: config.in_season_weight,
            prior_season_weight: config.prior_season_weight,
            max_week: config.max_week,
        };
        // Validate once up front with placeholder seasons
        builder.blender_for(1)?;
        Ok(builder)
    }

    fn blender_for(&self, season: u16) -> Result<SeasonBlender> {
        SeasonBlender::new(&[
            SeasonWeight {
                season,
                weight: self.in_season_weight,
            },
            SeasonWeight {
                season: season.saturating_sub(1),
                weight: self.prior_season_weight,
            },
        ])
    }

    /// Samples for completed regular-season games in `seasons`, in
    /// (season, week, game id) order
    pub fn build(&self, aggregation: &Aggregation, seasons: &[u16]) -> Result<Vec<TrainingSample>> {
        let mut by_team: BTreeMap<&TeamCode, Vec<&TeamGameStats>> = BTreeMap::new();
        for stats in &aggregation.stats {
            by_team.entry(&stats.team).or_default().push(stats);
        }

        let mut blenders: BTreeMap<u16, SeasonBlender> = BTreeMap::new();
        for &season in seasons {
            blenders.insert(season, self.blender_for(season)?);
        }

        let mut samples = Vec::new();
        let mut unscored = 0;
        let mut no_history = 0;

        for result in aggregation
            .results
            .iter()
            .filter(|r| seasons.contains(&r.season) && r.week <= self.max_week)
        {
            let Some(total) = result.total_points() else {
                unscored += 1;
                continue;
            };

            let Some(blender) = blenders.get(&result.season) else {
                continue;
            };

            let profile = |team: &TeamCode| {
                let games = by_team.get(team)?;
                let before_kickoff = games
                    .iter()
                    .copied()
                    .filter(|g| g.season != result.season || g.week < result.week);
                blender.blend_team(team, before_kickoff)
            };

            let (Some(home), Some(away)) = (profile(&result.home_team), profile(&result.away_team))
            else {
                log::debug!("No prior data for {}, skipping", result.game_id);
                no_history += 1;
                continue;
            };

            samples.push(TrainingSample {
                game_id: result.game_id.clone(),
                season: result.season,
                week: result.week,
                features: FeatureBuilder::build(&home, &away),
                actual_total: total as f64,
            });
        }

        log::info!(
            "Built {} training samples ({} without prior data, {} without final score)",
            samples.len(),
            no_history,
            unscored
        );

        Ok(samples)
    }
}
