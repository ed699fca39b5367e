//! Market line feed
//!
//! Sources, in fallback order: The Odds API (paid, needs a key), the ESPN
//! scoreboard, and the last saved line sheet.

use super::{http_client, FeedChain, FeedSource};
use crate::data::read_json;
use crate::{FeedConfig, Result, TeamCode, TotalsError};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One game on the line sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGame {
    pub id: String,
    /// Kickoff as reported by the provider (ISO 8601)
    #[serde(default)]
    pub date: Option<String>,
    pub home_team: TeamCode,
    pub away_team: TeamCode,
    #[serde(default)]
    pub over_under: Option<f64>,
    #[serde(default)]
    pub spread: Option<f64>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_moneyline: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_moneyline: Option<i32>,
}

impl LineGame {
    /// Calendar date of kickoff, if the provider gave one
    pub fn game_date(&self) -> Option<NaiveDate> {
        let date = self.date.as_deref()?;
        NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()
    }
}

/// All current lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSheet {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub games_count: usize,
    pub games: Vec<LineGame>,
}

impl LineSheet {
    pub fn new(games: Vec<LineGame>) -> Self {
        LineSheet {
            generated_at: Utc::now().to_rfc3339(),
            games_count: games.len(),
            games,
        }
    }

    /// Line for a home/away pairing
    pub fn find(&self, home: &TeamCode, away: &TeamCode) -> Option<&LineGame> {
        self.games
            .iter()
            .find(|g| &g.home_team == home && &g.away_team == away)
    }
}

/// Convert decimal odds to American odds
pub fn decimal_to_american(decimal: f64) -> Option<i32> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return None;
    }
    let american = if decimal < 2.0 {
        -100.0 / (decimal - 1.0)
    } else {
        (decimal - 1.0) * 100.0
    };
    Some(american.round() as i32)
}

#[derive(Debug, Deserialize)]
struct OddsEvent {
    id: String,
    commence_time: Option<String>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    #[serde(default)]
    markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct Market {
    key: String,
    #[serde(default)]
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    name: String,
    price: f64,
    #[serde(default)]
    point: Option<f64>,
}

impl OddsEvent {
    /// First bookmaker quoting the given market
    fn market(&self, key: &str) -> Option<&Market> {
        self.bookmakers
            .iter()
            .flat_map(|b| b.markets.iter())
            .find(|m| m.key == key)
    }

    fn outcome(&self, market: &str, name: &str) -> Option<&Outcome> {
        self.market(market)?.outcomes.iter().find(|o| o.name == name)
    }

    fn into_line(self) -> Option<LineGame> {
        let (Some(home), Some(away)) = (
            TeamCode::from_name(&self.home_team),
            TeamCode::from_name(&self.away_team),
        ) else {
            log::debug!("Unrecognised teams {} / {}", self.home_team, self.away_team);
            return None;
        };

        Some(LineGame {
            over_under: self.outcome("totals", "Over").and_then(|o| o.point),
            spread: self.outcome("spreads", &self.home_team).and_then(|o| o.point),
            home_moneyline: self
                .outcome("h2h", &self.home_team)
                .and_then(|o| decimal_to_american(o.price)),
            away_moneyline: self
                .outcome("h2h", &self.away_team)
                .and_then(|o| decimal_to_american(o.price)),
            status: "Scheduled".to_string(),
            date: self.commence_time.clone(),
            id: self.id,
            home_team: home,
            away_team: away,
        })
    }
}

/// Parse an Odds API response body
pub fn parse_odds_events(body: &str) -> Result<LineSheet> {
    let events: Vec<OddsEvent> = serde_json::from_str(body)?;
    Ok(LineSheet::new(
        events.into_iter().filter_map(OddsEvent::into_line).collect(),
    ))
}

/// Paid odds API
pub struct OddsApiSource {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
}

impl OddsApiSource {
    pub fn new(client: reqwest::blocking::Client, url: &str, api_key: Option<String>) -> Self {
        OddsApiSource {
            client,
            url: url.to_string(),
            api_key,
        }
    }
}

impl FeedSource<LineSheet> for OddsApiSource {
    fn name(&self) -> &str {
        "the-odds-api"
    }

    fn fetch(&self) -> Result<LineSheet> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TotalsError::Config("no odds API key set".to_string()))?;

        let body = self
            .client
            .get(&self.url)
            .query(&[
                ("apiKey", key),
                ("regions", "us"),
                ("markets", "totals,spreads,h2h"),
                ("oddsFormat", "decimal"),
            ])
            .send()?
            .error_for_status()?
            .text()?;

        parse_odds_events(&body)
    }
}

#[derive(Debug, Deserialize)]
struct Scoreboard {
    #[serde(default)]
    events: Vec<ScoreboardEvent>,
}

#[derive(Debug, Deserialize)]
struct ScoreboardEvent {
    id: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    competitions: Vec<Competition>,
    #[serde(default)]
    status: Option<EventStatus>,
}

#[derive(Debug, Deserialize)]
struct EventStatus {
    #[serde(rename = "type")]
    kind: StatusType,
}

#[derive(Debug, Deserialize)]
struct StatusType {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Competition {
    #[serde(default)]
    competitors: Vec<Competitor>,
    #[serde(default)]
    odds: Vec<ScoreboardOdds>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Competitor {
    home_away: String,
    team: CompetitorTeam,
}

#[derive(Debug, Deserialize)]
struct CompetitorTeam {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreboardOdds {
    #[serde(default)]
    over_under: Option<f64>,
    #[serde(default)]
    spread: Option<f64>,
    #[serde(default)]
    home_team_odds: Option<TeamOdds>,
    #[serde(default)]
    away_team_odds: Option<TeamOdds>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamOdds {
    #[serde(default)]
    money_line: Option<i32>,
}

impl ScoreboardEvent {
    fn into_line(self) -> Option<LineGame> {
        let competition = self.competitions.first()?;
        let team = |side: &str| {
            competition
                .competitors
                .iter()
                .find(|c| c.home_away == side)
                .map(|c| TeamCode::new(&c.team.abbreviation))
        };
        let (home, away) = (team("home")?, team("away")?);
        let odds = competition.odds.first();

        Some(LineGame {
            over_under: odds.and_then(|o| o.over_under),
            spread: odds.and_then(|o| o.spread),
            home_moneyline: odds
                .and_then(|o| o.home_team_odds.as_ref())
                .and_then(|o| o.money_line),
            away_moneyline: odds
                .and_then(|o| o.away_team_odds.as_ref())
                .and_then(|o| o.money_line),
            status: self
                .status
                .as_ref()
                .map(|s| s.kind.description.clone())
                .unwrap_or_default(),
            id: self.id,
            date: self.date,
            home_team: home,
            away_team: away,
        })
    }
}

/// Parse an ESPN scoreboard response body
pub fn parse_scoreboard(body: &str) -> Result<LineSheet> {
    let scoreboard: Scoreboard = serde_json::from_str(body)?;
    Ok(LineSheet::new(
        scoreboard
            .events
            .into_iter()
            .filter_map(ScoreboardEvent::into_line)
            .collect(),
    ))
}

/// Free scoreboard with consensus lines
pub struct EspnScoreboardSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl EspnScoreboardSource {
    pub fn new(client: reqwest::blocking::Client, url: &str) -> Self {
        EspnScoreboardSource {
            client,
            url: url.to_string(),
        }
    }
}

impl FeedSource<LineSheet> for EspnScoreboardSource {
    fn name(&self) -> &str {
        "espn-scoreboard"
    }

    fn fetch(&self) -> Result<LineSheet> {
        let body = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .text()?;
        let sheet = parse_scoreboard(&body)?;
        if sheet.games.iter().all(|g| g.over_under.is_none()) {
            return Err(TotalsError::Parse("scoreboard has no totals".to_string()));
        }
        Ok(sheet)
    }
}

/// Last line sheet saved by a successful live fetch
pub struct CachedLines {
    path: PathBuf,
}

impl CachedLines {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CachedLines { path: path.into() }
    }
}

impl FeedSource<LineSheet> for CachedLines {
    fn name(&self) -> &str {
        "cache"
    }

    fn fetch(&self) -> Result<LineSheet> {
        read_json(&self.path)
    }

    fn is_cache(&self) -> bool {
        true
    }
}

/// Line chain for the configured providers; `offline` keeps only the cache
pub fn line_chain(
    config: &FeedConfig,
    api_key: Option<String>,
    cache_path: &str,
    offline: bool,
) -> Result<FeedChain<LineSheet>> {
    let mut chain = FeedChain::new("lines", config.max_attempts);
    if !offline {
        let client = http_client(config)?;
        if api_key.is_some() {
            chain = chain.with_source(OddsApiSource::new(client.clone(), &config.odds_api_url, api_key));
        } else {
            log::info!("{} not set, skipping the odds API", config.api_key_env);
        }
        chain = chain.with_source(EspnScoreboardSource::new(client, &config.scoreboard_url));
    }
    Ok(chain.with_source(CachedLines::new(cache_path)))
}
