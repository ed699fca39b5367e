//! Feature extraction
//!
//! Converts raw plays into team profiles and matchup vectors.

pub mod injury;
pub mod match_repr;
pub mod season_blend;
pub mod team_stats;

pub use injury::{ImpactTier, InjuryAdjuster, InjuryEvent};
pub use match_repr::{FeatureBuilder, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use season_blend::{SeasonBlender, TeamSeasonProfile};
pub use team_stats::{Aggregation, PlayAggregator, TeamGameStats};
