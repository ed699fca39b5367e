//! Injury report feed
//!
//! Sources: the ESPN injuries page (scraped HTML) and the last saved report.
//! An unavailable feed is not fatal; callers fall back to no injuries.

use super::{http_client, FeedChain, FeedSource};
use crate::data::read_json;
use crate::features::injury::{ImpactTier, InjuryEvent};
use crate::{FeedConfig, Result, Side, TeamCode, TotalsError};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One listed player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryEntry {
    pub team: TeamCode,
    pub player: String,
    pub position: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Side>,
}

/// Players grouped by expected impact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    #[serde(default)]
    pub high_impact: Vec<InjuryEntry>,
    #[serde(default)]
    pub medium_impact: Vec<InjuryEntry>,
    #[serde(default)]
    pub low_impact: Vec<InjuryEntry>,
}

/// Injury report document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjuryReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    pub advisory: Advisory,
}

impl InjuryReport {
    /// Flatten into events, deriving the side from position when absent
    pub fn events(&self) -> Vec<InjuryEvent> {
        let tiers = [
            (ImpactTier::High, &self.advisory.high_impact),
            (ImpactTier::Medium, &self.advisory.medium_impact),
            (ImpactTier::Low, &self.advisory.low_impact),
        ];

        tiers
            .into_iter()
            .flat_map(|(tier, entries)| {
                entries.iter().map(move |e| InjuryEvent {
                    team: e.team.clone(),
                    player: e.player.clone(),
                    position: e.position.clone(),
                    status: e.status.clone(),
                    category: e
                        .category
                        .unwrap_or_else(|| InjuryEvent::side_for_position(&e.position)),
                    tier,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.advisory.high_impact.len()
            + self.advisory.medium_impact.len()
            + self.advisory.low_impact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tier for a scraped row: a missing quarterback is high impact, other
/// short-term absences at skill positions medium, everything else low
pub fn impact_tier(position: &str, status: &str) -> ImpactTier {
    let position = position.trim().to_uppercase();
    let status = status.trim().to_lowercase();
    let missing = status == "out" || status == "doubtful";

    match position.as_str() {
        "QB" if missing => ImpactTier::High,
        "RB" | "WR" | "TE" if missing => ImpactTier::Medium,
        _ => ImpactTier::Low,
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| TotalsError::Parse(format!("bad selector {}: {:?}", css, e)))
}

fn text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parse the ESPN league injuries page
pub fn parse_injuries_page(html: &str) -> Result<InjuryReport> {
    let document = Html::parse_document(html);
    let table_selector = selector("div.ResponsiveTable")?;
    let title_selector = selector(".Table__Title")?;
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td")?;

    let mut advisory = Advisory::default();

    for table in document.select(&table_selector) {
        let Some(team_name) = table.select(&title_selector).next().map(text) else {
            continue;
        };
        let Some(team) = TeamCode::from_name(&team_name) else {
            log::debug!("Skipping injury table for unknown team {}", team_name);
            continue;
        };

        for row in table.select(&row_selector) {
            let cells: Vec<String> = row.select(&cell_selector).map(text).collect();
            // NAME, POS, EST. RETURN DATE, STATUS, COMMENT
            if cells.len() < 4 || cells[0].is_empty() {
                continue;
            }

            let entry = InjuryEntry {
                team: team.clone(),
                player: cells[0].clone(),
                position: cells[1].clone(),
                status: cells[3].clone(),
                category: None,
            };
            match impact_tier(&entry.position, &entry.status) {
                ImpactTier::High => advisory.high_impact.push(entry),
                ImpactTier::Medium => advisory.medium_impact.push(entry),
                ImpactTier::Low => advisory.low_impact.push(entry),
            }
        }
    }

    Ok(InjuryReport {
        generated_at: Some(Utc::now().to_rfc3339()),
        advisory,
    })
}

/// Scraped league injury page
pub struct EspnInjuriesSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl EspnInjuriesSource {
    pub fn new(client: reqwest::blocking::Client, url: &str) -> Self {
        EspnInjuriesSource {
            client,
            url: url.to_string(),
        }
    }
}

impl FeedSource<InjuryReport> for EspnInjuriesSource {
    fn name(&self) -> &str {
        "espn-injuries"
    }

    fn fetch(&self) -> Result<InjuryReport> {
        let html = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .text()?;
        let report = parse_injuries_page(&html)?;
        if report.is_empty() {
            return Err(TotalsError::Parse("injury page had no rows".to_string()));
        }
        Ok(report)
    }
}

/// Last saved injury report
pub struct CachedInjuries {
    path: PathBuf,
}

impl CachedInjuries {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CachedInjuries { path: path.into() }
    }
}

impl FeedSource<InjuryReport> for CachedInjuries {
    fn name(&self) -> &str {
        "cache"
    }

    fn fetch(&self) -> Result<InjuryReport> {
        read_json(&self.path)
    }

    fn is_cache(&self) -> bool {
        true
    }
}

/// Injury chain for the configured providers; `offline` keeps only the cache
pub fn injury_chain(config: &FeedConfig, cache_path: &str, offline: bool) -> Result<FeedChain<InjuryReport>> {
    let mut chain = FeedChain::new("injuries", config.max_attempts);
    if !offline {
        chain = chain.with_source(EspnInjuriesSource::new(http_client(config)?, &config.injuries_url));
    }
    Ok(chain.with_source(CachedInjuries::new(cache_path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
      <div class="ResponsiveTable Table__league-injuries">
        <div class="Table__Title"><span class="injuries__teamName">Buffalo Bills</span></div>
        <table class="Table"><thead><tr><th>NAME</th><th>POS</th><th>EST. RETURN DATE</th><th>STATUS</th><th>COMMENT</th></tr></thead>
        <tbody class="Table__TBODY">
          <tr class="Table__TR"><td><a href="/p/1">Josh Allen</a></td><td>QB</td><td>Sep 14</td><td><span>Out</span></td><td>Wrist</td></tr>
          <tr class="Table__TR"><td><a href="/p/2">Khalil Shakir</a></td><td>WR</td><td>Sep 14</td><td><span>Questionable</span></td><td>Ankle</td></tr>
        </tbody></table>
      </div>
      <div class="ResponsiveTable Table__league-injuries">
        <div class="Table__Title"><span class="injuries__teamName">Los Angeles Rams</span></div>
        <table class="Table"><tbody class="Table__TBODY">
          <tr class="Table__TR"><td><a href="/p/3">Puka Nacua</a></td><td>WR</td><td>Sep 21</td><td><span>Out</span></td><td>Knee</td></tr>
          <tr class="Table__TR"><td><a href="/p/4">Jared Verse</a></td><td>LB</td><td>Sep 21</td><td><span>Out</span></td><td>Hip</td></tr>
        </tbody></table>
      </div>
    </body></html>"#;

    #[test]
    fn test_parse_page() {
        let report = parse_injuries_page(PAGE).unwrap();
        assert_eq!(report.len(), 4);

        let high = &report.advisory.high_impact;
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].player, "Josh Allen");
        assert_eq!(high[0].team, TeamCode::new("BUF"));

        assert_eq!(report.advisory.medium_impact[0].team, TeamCode::new("LAR"));
        assert_eq!(report.advisory.low_impact.len(), 2);
    }

    #[test]
    fn test_events_derive_side() {
        let json = r#"{"advisory": {"high_impact": [
            {"team": "KC", "player": "A", "position": "QB", "status": "Out"},
            {"team": "KC", "player": "B", "position": "CB", "status": "Out"},
            {"team": "KC", "player": "C", "position": "WR", "status": "Out", "category": "defense"}
        ]}}"#;
        let report: InjuryReport = serde_json::from_str(json).unwrap();
        let events = report.events();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].category, Side::Offense);
        assert_eq!(events[1].category, Side::Defense);
        assert_eq!(events[2].category, Side::Defense);
        assert!(events.iter().all(|e| e.tier == ImpactTier::High));
    }

    #[test]
    fn test_impact_tiers() {
        assert_eq!(impact_tier("QB", "Doubtful"), ImpactTier::High);
        assert_eq!(impact_tier("QB", "Questionable"), ImpactTier::Low);
        assert_eq!(impact_tier("te", "out"), ImpactTier::Medium);
        assert_eq!(impact_tier("DE", "Out"), ImpactTier::Low);
    }

    #[test]
    fn test_cached_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("injury_report.json");
        std::fs::write(&path, r#"{"advisory": {"high_impact": []}}"#).unwrap();

        let report = CachedInjuries::new(&path).fetch().unwrap();
        assert!(report.is_empty());
    }
}
