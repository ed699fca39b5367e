//! Per-game team statistics
//!
//! Reduces play-by-play rows into offensive and defensive efficiency for each
//! team in each game.

use crate::{PlayRecord, PlayType, Side, TeamCode, TotalsError};
use std::collections::BTreeMap;

/// EPA tallies for one side of the ball
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpaTally {
    /// Scrimmage plays
    pub plays: u32,
    /// Summed EPA over all scrimmage plays
    pub epa: f64,
    pub pass_plays: u32,
    pub pass_epa: f64,
    pub rush_plays: u32,
    pub rush_epa: f64,
}

impl EpaTally {
    fn record(&mut self, play_type: PlayType, epa: f64) {
        self.plays += 1;
        self.epa += epa;
        match play_type {
            PlayType::Pass => {
                self.pass_plays += 1;
                self.pass_epa += epa;
            }
            PlayType::Run => {
                self.rush_plays += 1;
                self.rush_epa += epa;
            }
            PlayType::Other => {}
        }
    }

    /// Combine with another tally (used when summing a season)
    pub fn merge(&mut self, other: &EpaTally) {
        self.plays += other.plays;
        self.epa += other.epa;
        self.pass_plays += other.pass_plays;
        self.pass_epa += other.pass_epa;
        self.rush_plays += other.rush_plays;
        self.rush_epa += other.rush_epa;
    }

    /// EPA per play, None without plays
    pub fn per_play(&self) -> Option<f64> {
        ratio(self.epa, self.plays)
    }

    pub fn pass_per_play(&self) -> Option<f64> {
        ratio(self.pass_epa, self.pass_plays)
    }

    pub fn rush_per_play(&self) -> Option<f64> {
        ratio(self.rush_epa, self.rush_plays)
    }
}

fn ratio(sum: f64, count: u32) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// One team's statistics for one game
#[derive(Debug, Clone, PartialEq)]
pub struct TeamGameStats {
    pub game_id: String,
    pub season: u16,
    pub week: u8,
    pub team: TeamCode,
    pub opponent: TeamCode,
    pub is_home: bool,
    /// Plays with this team in possession
    pub offense: EpaTally,
    /// Plays with this team defending; EPA here is what the team allowed
    pub defense: EpaTally,
    pub pass_yards: f64,
    pub rush_yards: f64,
    pub touchdowns: u32,
    /// Interceptions thrown plus fumbles lost
    pub turnovers: u32,
    /// Sacks made by this team's defense
    pub sacks: u32,
    pub points_for: Option<u16>,
    pub points_against: Option<u16>,
}

impl TeamGameStats {
    fn new(game: &GameAccumulator, team: &TeamCode, is_home: bool) -> Self {
        let (opponent, points_for, points_against) = if is_home {
            (game.away_team.clone(), game.home_score, game.away_score)
        } else {
            (game.home_team.clone(), game.away_score, game.home_score)
        };

        TeamGameStats {
            game_id: game.game_id.clone(),
            season: game.season,
            week: game.week,
            team: team.clone(),
            opponent,
            is_home,
            offense: EpaTally::default(),
            defense: EpaTally::default(),
            pass_yards: 0.0,
            rush_yards: 0.0,
            touchdowns: 0,
            turnovers: 0,
            sacks: 0,
            points_for,
            points_against,
        }
    }

    /// Offensive EPA per play (aggregated stats always have offensive plays)
    pub fn off_epa_per_play(&self) -> f64 {
        self.offense.per_play().unwrap_or(0.0)
    }

    /// Defensive EPA per play allowed; negative is good defense
    pub fn def_epa_per_play(&self) -> f64 {
        self.defense.per_play().unwrap_or(0.0)
    }
}

/// Final result of an aggregated game
#[derive(Debug, Clone, PartialEq)]
pub struct GameResult {
    pub game_id: String,
    pub season: u16,
    pub week: u8,
    pub home_team: TeamCode,
    pub away_team: TeamCode,
    pub home_score: Option<u16>,
    pub away_score: Option<u16>,
}

impl GameResult {
    /// Combined score, None while the game is unfinished
    pub fn total_points(&self) -> Option<u16> {
        Some(self.home_score? + self.away_score?)
    }
}

/// Output of an aggregation run
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Ordered by (season, week, game id, team)
    pub stats: Vec<TeamGameStats>,
    /// Ordered by (season, week, game id)
    pub results: Vec<GameResult>,
    /// Games left out because a team had no offensive or defensive plays
    pub excluded: Vec<TotalsError>,
}

impl Aggregation {
    /// Stats for one team in one game
    pub fn get(&self, game_id: &str, team: &TeamCode) -> Option<&TeamGameStats> {
        self.stats
            .iter()
            .find(|s| s.game_id == game_id && &s.team == team)
    }

    /// Seasons present, ascending
    pub fn seasons(&self) -> Vec<u16> {
        let mut seasons: Vec<u16> = self.results.iter().map(|r| r.season).collect();
        seasons.dedup();
        seasons
    }
}

/// Per-game accumulator keyed in play order
#[derive(Debug, Clone)]
struct GameAccumulator {
    game_id: String,
    season: u16,
    week: u8,
    home_team: TeamCode,
    away_team: TeamCode,
    home: Option<TeamGameStats>,
    away: Option<TeamGameStats>,
    home_score: Option<u16>,
    away_score: Option<u16>,
}

impl GameAccumulator {
    fn new(play: &PlayRecord) -> Self {
        GameAccumulator {
            game_id: play.game_id.clone(),
            season: play.season,
            week: play.week,
            home_team: play.home_team.clone(),
            away_team: play.away_team.clone(),
            home: None,
            away: None,
            home_score: None,
            away_score: None,
        }
    }

    fn side_mut(&mut self, team: &TeamCode) -> Option<&mut TeamGameStats> {
        if team == &self.home_team {
            Some(self.home.get_or_insert_with(|| placeholder(team, true)))
        } else if team == &self.away_team {
            Some(self.away.get_or_insert_with(|| placeholder(team, false)))
        } else {
            None
        }
    }

    fn record(&mut self, play: &PlayRecord) {
        // Scores are repeated on every row; the max is the final
        self.home_score = max_score(self.home_score, play.home_score);
        self.away_score = max_score(self.away_score, play.away_score);

        let Some(epa) = play.scrimmage_epa() else {
            return;
        };

        let Some((posteam, defteam)) = play.teams() else {
            return;
        };
        if self.side_mut(posteam).is_none() || self.side_mut(defteam).is_none() {
            log::debug!(
                "Skipping play in {} with teams {} / {}",
                self.game_id,
                posteam,
                defteam
            );
            return;
        }

        let yards = play.yards_gained.unwrap_or(0.0);
        if let Some(offense) = self.side_mut(posteam) {
            offense.offense.record(play.play_type, epa);
            match play.play_type {
                PlayType::Pass => offense.pass_yards += yards,
                PlayType::Run => offense.rush_yards += yards,
                PlayType::Other => {}
            }
            if play.touchdown {
                offense.touchdowns += 1;
            }
            if play.is_turnover() {
                offense.turnovers += 1;
            }
        }

        if let Some(defense) = self.side_mut(defteam) {
            defense.defense.record(play.play_type, epa);
            if play.sack {
                defense.sacks += 1;
            }
        }
    }

    /// Validate play counts and emit both teams' stats
    fn finish(self) -> Result<(GameResult, TeamGameStats, TeamGameStats), TotalsError> {
        let home = self
            .home
            .clone()
            .unwrap_or_else(|| placeholder(&self.home_team, true));
        let away = self
            .away
            .clone()
            .unwrap_or_else(|| placeholder(&self.away_team, false));

        for stats in [&home, &away] {
            for (side, tally) in [(Side::Offense, &stats.offense), (Side::Defense, &stats.defense)] {
                if tally.plays == 0 {
                    return Err(TotalsError::InsufficientData {
                        team: stats.team.clone(),
                        season: self.season,
                        game_id: self.game_id.clone(),
                        side,
                    });
                }
            }
        }

        let home = TeamGameStats {
            offense: home.offense,
            defense: home.defense,
            pass_yards: home.pass_yards,
            rush_yards: home.rush_yards,
            touchdowns: home.touchdowns,
            turnovers: home.turnovers,
            sacks: home.sacks,
            ..TeamGameStats::new(&self, &self.home_team, true)
        };
        let away = TeamGameStats {
            offense: away.offense,
            defense: away.defense,
            pass_yards: away.pass_yards,
            rush_yards: away.rush_yards,
            touchdowns: away.touchdowns,
            turnovers: away.turnovers,
            sacks: away.sacks,
            ..TeamGameStats::new(&self, &self.away_team, false)
        };

        let result = GameResult {
            game_id: self.game_id.clone(),
            season: self.season,
            week: self.week,
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            home_score: self.home_score,
            away_score: self.away_score,
        };

        Ok((result, home, away))
    }
}

/// Empty stats used while accumulating; identity fields are filled in `finish`
fn placeholder(team: &TeamCode, is_home: bool) -> TeamGameStats {
    TeamGameStats {
        game_id: String::new(),
        season: 0,
        week: 0,
        team: team.clone(),
        opponent: team.clone(),
        is_home,
        offense: EpaTally::default(),
        defense: EpaTally::default(),
        pass_yards: 0.0,
        rush_yards: 0.0,
        touchdowns: 0,
        turnovers: 0,
        sacks: 0,
        points_for: None,
        points_against: None,
    }
}

fn max_score(current: Option<u16>, seen: Option<u16>) -> Option<u16> {
    match (current, seen) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Aggregate plays into per-team, per-game statistics
pub struct PlayAggregator {
    /// Games keyed by (season, week, game id)
    games: BTreeMap<(u16, u8, String), GameAccumulator>,
}

impl PlayAggregator {
    pub fn new() -> Self {
        PlayAggregator {
            games: BTreeMap::new(),
        }
    }

    /// Aggregate a complete play set in one call
    pub fn aggregate(plays: &[PlayRecord]) -> Aggregation {
        let mut aggregator = Self::new();
        aggregator.process_plays(plays);
        aggregator.finish()
    }

    /// Accumulate plays, in the order given
    pub fn process_plays(&mut self, plays: &[PlayRecord]) {
        for play in plays {
            let key = (play.season, play.week, play.game_id.clone());
            self.games
                .entry(key)
                .or_insert_with(|| GameAccumulator::new(play))
                .record(play);
        }
    }

    /// Close out every game, excluding those without plays on both sides
    pub fn finish(self) -> Aggregation {
        let mut aggregation = Aggregation::default();

        for (_, game) in self.games {
            match game.finish() {
                Ok((result, home, away)) => {
                    let (first, second) = if home.team <= away.team {
                        (home, away)
                    } else {
                        (away, home)
                    };
                    aggregation.stats.push(first);
                    aggregation.stats.push(second);
                    aggregation.results.push(result);
                }
                Err(e) => {
                    log::warn!("Excluding game: {}", e);
                    aggregation.excluded.push(e);
                }
            }
        }

        log::info!(
            "Aggregated {} games ({} excluded)",
            aggregation.results.len(),
            aggregation.excluded.len()
        );

        aggregation
    }
}

impl Default for PlayAggregator {
    fn default() -> Self {
        Self::new()
    }
}
