//! NFL game total predictions
//!
//! Aggregates play-by-play efficiency into team profiles, fits a linear model of
//! combined score and grades each projection against the market over/under.

pub mod data;
pub mod features;
pub mod pipeline;
pub mod predict;
pub mod training;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Canonical team abbreviations and their display names
const TEAMS: [(&str, &str); 32] = [
    ("ARI", "Cardinals"),
    ("ATL", "Falcons"),
    ("BAL", "Ravens"),
    ("BUF", "Bills"),
    ("CAR", "Panthers"),
    ("CHI", "Bears"),
    ("CIN", "Bengals"),
    ("CLE", "Browns"),
    ("DAL", "Cowboys"),
    ("DEN", "Broncos"),
    ("DET", "Lions"),
    ("GB", "Packers"),
    ("HOU", "Texans"),
    ("IND", "Colts"),
    ("JAX", "Jaguars"),
    ("KC", "Chiefs"),
    ("LAC", "Chargers"),
    ("LAR", "Rams"),
    ("LV", "Raiders"),
    ("MIA", "Dolphins"),
    ("MIN", "Vikings"),
    ("NE", "Patriots"),
    ("NO", "Saints"),
    ("NYG", "Giants"),
    ("NYJ", "Jets"),
    ("PHI", "Eagles"),
    ("PIT", "Steelers"),
    ("SF", "49ers"),
    ("SEA", "Seahawks"),
    ("TB", "Buccaneers"),
    ("TEN", "Titans"),
    ("WAS", "Commanders"),
];

/// Team abbreviation in the canonical convention (`LAR`, `LAC`, `LV`, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TeamCode(String);

impl TeamCode {
    /// Build a code, folding feed-specific and historical abbreviations
    pub fn new(code: &str) -> Self {
        let upper = code.trim().to_uppercase();
        let canonical = match upper.as_str() {
            "LA" | "STL" => "LAR",
            "SD" => "LAC",
            "OAK" => "LV",
            "WSH" => "WAS",
            "JAC" => "JAX",
            other => other,
        };
        TeamCode(canonical.to_string())
    }

    /// Resolve a full or partial team name ("Denver Broncos", "49ers") to a code
    pub fn from_name(name: &str) -> Option<Self> {
        let name_upper = name.trim().to_uppercase();
        if name_upper.is_empty() {
            return None;
        }

        if let Some((code, _)) = TEAMS.iter().find(|(code, _)| *code == name_upper) {
            return Some(TeamCode(code.to_string()));
        }

        TEAMS
            .iter()
            .find(|(_, nickname)| name_upper.contains(&nickname.to_uppercase()))
            .map(|(code, _)| TeamCode(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nickname used on the dashboard, falling back to the code itself
    pub fn display_name(&self) -> &str {
        match TEAMS.iter().find(|(code, _)| *code == self.0) {
            Some((_, nickname)) => *nickname,
            None => self.0.as_str(),
        }
    }

    /// Whether the code names one of the 32 current franchises
    pub fn is_known(&self) -> bool {
        TEAMS.iter().any(|(code, _)| *code == self.0)
    }
}

impl From<String> for TeamCode {
    fn from(code: String) -> Self {
        TeamCode::new(&code)
    }
}

impl From<TeamCode> for String {
    fn from(code: TeamCode) -> Self {
        code.0
    }
}

impl From<&str> for TeamCode {
    fn from(code: &str) -> Self {
        TeamCode::new(code)
    }
}

impl fmt::Display for TeamCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Kind of scrimmage play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayType {
    Pass,
    #[serde(alias = "rush")]
    Run,
    /// Kicks, penalties, kneels and anything else the provider emits
    #[serde(other)]
    Other,
}

/// A single play from the play-by-play feed
///
/// Provider exports carry timeouts, quarter ends and other non-plays with
/// null teams and types, and encode flags as 0/1; those rows load and are
/// ignored by aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub game_id: String,
    pub season: u16,
    pub week: u8,
    pub home_team: TeamCode,
    pub away_team: TeamCode,
    /// Team in possession
    #[serde(default)]
    pub posteam: Option<TeamCode>,
    /// Team on defense
    #[serde(default)]
    pub defteam: Option<TeamCode>,
    #[serde(default = "other_play", deserialize_with = "nullable_play_type")]
    pub play_type: PlayType,
    /// Missing for plays the provider could not model
    #[serde(default)]
    pub epa: Option<f64>,
    #[serde(default)]
    pub yards_gained: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    pub interception: bool,
    #[serde(default, deserialize_with = "flag")]
    pub fumble_lost: bool,
    #[serde(default, deserialize_with = "flag")]
    pub sack: bool,
    #[serde(default, deserialize_with = "flag")]
    pub touchdown: bool,
    /// Final home score, repeated on every row by the provider
    #[serde(default)]
    pub home_score: Option<u16>,
    #[serde(default)]
    pub away_score: Option<u16>,
}

fn other_play() -> PlayType {
    PlayType::Other
}

fn nullable_play_type<'de, D>(deserializer: D) -> std::result::Result<PlayType, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<PlayType>::deserialize(deserializer)?.unwrap_or(PlayType::Other))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// true/false, 0/1 or null (false)
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<RawFlag>::deserialize(deserializer)? {
        None => false,
        Some(RawFlag::Bool(b)) => b,
        Some(RawFlag::Int(n)) => n != 0,
        Some(RawFlag::Float(x)) => x != 0.0,
    })
}

impl PlayRecord {
    /// Interception thrown or fumble lost by the offense
    pub fn is_turnover(&self) -> bool {
        self.interception || self.fumble_lost
    }

    /// Offense and defense, when the row names two distinct teams
    pub fn teams(&self) -> Option<(&TeamCode, &TeamCode)> {
        match (&self.posteam, &self.defteam) {
            (Some(off), Some(def)) if off != def => Some((off, def)),
            _ => None,
        }
    }

    /// EPA of a pass or run, None for every other play
    pub fn scrimmage_epa(&self) -> Option<f64> {
        match self.play_type {
            PlayType::Pass | PlayType::Run => self.epa.filter(|epa| epa.is_finite()),
            PlayType::Other => None,
        }
    }
}

/// Over/under signal derived from the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Over,
    Under,
    Hold,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Over => write!(f, "OVER"),
            Recommendation::Under => write!(f, "UNDER"),
            Recommendation::Hold => write!(f, "HOLD"),
        }
    }
}

/// Model projection for one matchup, graded against the market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub game_id: String,
    pub date: Option<NaiveDate>,
    pub home_team: TeamCode,
    pub away_team: TeamCode,
    pub projected_total: f64,
    pub projected_home_score: f64,
    pub projected_away_score: f64,
    pub market_total: f64,
    /// projected_total - market_total, unrounded
    pub edge: f64,
    /// None when the market total is zero
    pub edge_percent: Option<f64>,
    pub recommendation: Recommendation,
}

/// Which side of the ball a statistic or injury belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Offense,
    Defense,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Offense => write!(f, "offense"),
            Side::Defense => write!(f, "defense"),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TotalsError {
    #[error("No {side} plays for {team} in game {game_id} (season {season})")]
    InsufficientData {
        team: TeamCode,
        season: u16,
        game_id: String,
        side: Side,
    },

    #[error("Season weights must sum to 1.0, got {sum}")]
    InvalidWeight { sum: f64 },

    #[error("Season {season} has an invalid weight {weight}")]
    InvalidWeightValue { season: u16, weight: f64 },

    #[error("Not enough training data: {samples} samples, need {required}")]
    InsufficientTrainingData { samples: usize, required: usize },

    #[error("Feature vector does not match model: expected [{expected}], got [{found}]")]
    FeatureShapeMismatch { expected: String, found: String },

    #[error("{feed} feed unavailable after {attempts} attempts")]
    FeedUnavailable { feed: String, attempts: usize },

    #[error("No market total for {away} @ {home}")]
    MissingMarketTotal { home: TeamCode, away: TeamCode },

    #[error("No season profile for {team}")]
    NoProfile { team: TeamCode },

    #[error("Unknown team: {0}")]
    UnknownTeam(String),

    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Model not trained - run `totals train` first")]
    NoModel,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, TotalsError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Games to project this run; empty means every game in the line feed
    #[serde(default)]
    pub matchups: Vec<MatchupConfig>,
    pub data: DataConfig,
    pub blend: BlendConfig,
    pub training: TrainingConfig,
    pub edge: EdgeConfig,
    pub injury: InjuryConfig,
    pub feeds: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Play-by-play JSON files (arrays of plays)
    pub play_files: Vec<String>,
    pub model_path: String,
    pub output_path: String,
    /// Last-known-good market lines
    pub line_cache_path: String,
    /// Last-known-good injury report
    pub injury_cache_path: String,
}

/// Recency weights used to build the profiles for upcoming games
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendConfig {
    /// Season whose games are being predicted
    pub current_season: u16,
    pub weights: Vec<SeasonWeight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonWeight {
    pub season: u16,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Completed seasons whose games become training samples
    pub seasons: Vec<u16>,
    /// Share of games held out for evaluation
    pub test_percent: u8,
    pub min_samples: usize,
    /// Weight of a team's earlier games in the same season
    pub in_season_weight: f64,
    /// Weight of a team's previous full season
    pub prior_season_weight: f64,
    /// Last regular-season week; later (playoff) games are not labels
    #[serde(default = "default_max_week")]
    pub max_week: u8,
}

fn default_max_week() -> u8 {
    18
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Points the projection must clear before a side is recommended
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryConfig {
    /// Fractional cut to offensive EPA per high-impact offensive injury
    pub high_impact_reduction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Environment variable holding the paid odds API key
    pub api_key_env: String,
    pub odds_api_url: String,
    pub scoreboard_url: String,
    pub injuries_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

/// One game to project, optionally with its market total already known
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchupConfig {
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub market_total: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            matchups: Vec::new(),
            data: DataConfig {
                play_files: vec![
                    "data/pbp_2024.json".to_string(),
                    "data/pbp_2025.json".to_string(),
                ],
                model_path: "model/totals_model.json".to_string(),
                output_path: "public/data/nfl_analysis.json".to_string(),
                line_cache_path: "public/data/vegas_lines.json".to_string(),
                injury_cache_path: "public/data/injury_report.json".to_string(),
            },
            blend: BlendConfig {
                current_season: 2025,
                weights: vec![
                    SeasonWeight {
                        season: 2025,
                        weight: 0.7,
                    },
                    SeasonWeight {
                        season: 2024,
                        weight: 0.3,
                    },
                ],
            },
            training: TrainingConfig {
                seasons: vec![2024, 2025],
                test_percent: 20,
                min_samples: 32,
                in_season_weight: 0.7,
                prior_season_weight: 0.3,
                max_week: default_max_week(),
            },
            edge: EdgeConfig { threshold: 2.0 },
            injury: InjuryConfig {
                high_impact_reduction: 0.15,
            },
            feeds: FeedConfig {
                api_key_env: "THE_ODDS_API_KEY".to_string(),
                odds_api_url: "https://api.the-odds-api.com/v4/sports/americanfootball_nfl/odds"
                    .to_string(),
                scoreboard_url:
                    "https://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard"
                        .to_string(),
                injuries_url: "https://www.espn.com/nfl/injuries".to_string(),
                timeout_secs: 10,
                max_attempts: 2,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TotalsError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| TotalsError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TotalsError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
