//! External feeds with ordered fallback
//!
//! Each feed is a chain of sources tried in order: live providers first, the
//! last-known-good cache last. The snapshot records which source answered.

pub mod injuries;
pub mod lines;

use crate::data::write_json_atomic;
use crate::{FeedConfig, Result, TotalsError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A provider in a feed chain
pub trait FeedSource<T> {
    /// Short identifier recorded in provenance
    fn name(&self) -> &str;

    /// Fetch the full feed
    fn fetch(&self) -> Result<T>;

    /// Whether this source serves previously saved data
    fn is_cache(&self) -> bool {
        false
    }
}

/// Outcome of one request to one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedAttempt {
    pub source: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where a snapshot came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedProvenance {
    pub feed: String,
    pub source: String,
    /// True when the data came from the cache rather than a live provider
    pub stale: bool,
    pub attempts: Vec<FeedAttempt>,
}

/// Immutable feed data plus provenance
#[derive(Debug, Clone)]
pub struct FeedSnapshot<T> {
    pub data: T,
    pub provenance: FeedProvenance,
}

/// Retry an operation with exponential backoff
pub fn with_retry<T, F>(mut operation: F, max_attempts: u32) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                log::warn!("Attempt {} failed: {}", attempt, e);
                let delay = std::time::Duration::from_millis(100 * 2u64.pow(attempt - 1));
                std::thread::sleep(delay);
            }
        }
    }
}

/// Ordered list of sources for one feed
pub struct FeedChain<T> {
    feed: String,
    sources: Vec<Box<dyn FeedSource<T>>>,
    max_attempts: u32,
}

impl<T> FeedChain<T> {
    pub fn new(feed: &str, max_attempts: u32) -> Self {
        FeedChain {
            feed: feed.to_string(),
            sources: Vec::new(),
            max_attempts,
        }
    }

    pub fn with_source(mut self, source: impl FeedSource<T> + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Try each source in order; the cache gets a single attempt
    pub fn fetch(&self) -> Result<FeedSnapshot<T>> {
        let mut attempts = Vec::new();

        for source in &self.sources {
            let tries = if source.is_cache() { 1 } else { self.max_attempts };
            let result = with_retry(
                || {
                    let outcome = source.fetch();
                    attempts.push(FeedAttempt {
                        source: source.name().to_string(),
                        ok: outcome.is_ok(),
                        error: outcome.as_ref().err().map(|e| e.to_string()),
                    });
                    outcome
                },
                tries,
            );

            match result {
                Ok(data) => {
                    let stale = source.is_cache();
                    if stale {
                        log::warn!("{} feed served from cache ({})", self.feed, source.name());
                    } else {
                        log::info!("{} feed served by {}", self.feed, source.name());
                    }
                    return Ok(FeedSnapshot {
                        data,
                        provenance: FeedProvenance {
                            feed: self.feed.clone(),
                            source: source.name().to_string(),
                            stale,
                            attempts,
                        },
                    });
                }
                Err(e) => log::warn!("{} source {} failed: {}", self.feed, source.name(), e),
            }
        }

        Err(TotalsError::FeedUnavailable {
            feed: self.feed.clone(),
            attempts: attempts.len(),
        })
    }
}

/// Save a live snapshot as the new last-known-good file
pub fn refresh_cache<T: Serialize>(snapshot: &FeedSnapshot<T>, path: impl AsRef<Path>) -> Result<()> {
    if snapshot.provenance.stale {
        return Ok(());
    }
    write_json_atomic(path.as_ref(), &snapshot.data)?;
    log::debug!("Refreshed {} cache at {}", snapshot.provenance.feed, path.as_ref().display());
    Ok(())
}

/// Blocking HTTP client shared by the live sources
pub fn http_client(config: &FeedConfig) -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("totals/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Source that fails a fixed number of times before answering
    pub(crate) struct Flaky {
        pub name: &'static str,
        pub failures: Cell<u32>,
        pub value: Option<u32>,
        pub cache: bool,
    }

    impl FeedSource<u32> for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        fn fetch(&self) -> Result<u32> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(TotalsError::Parse(format!("{} down", self.name)));
            }
            self.value
                .ok_or_else(|| TotalsError::Parse(format!("{} empty", self.name)))
        }

        fn is_cache(&self) -> bool {
            self.cache
        }
    }

    fn flaky(name: &'static str, failures: u32, value: Option<u32>, cache: bool) -> Flaky {
        Flaky {
            name,
            failures: Cell::new(failures),
            value,
            cache,
        }
    }

    #[test]
    fn test_retry_recovers() {
        let snapshot = FeedChain::new("lines", 2)
            .with_source(flaky("api", 1, Some(7), false))
            .fetch()
            .unwrap();

        assert_eq!(snapshot.data, 7);
        assert!(!snapshot.provenance.stale);
        assert_eq!(snapshot.provenance.attempts.len(), 2);
        assert!(!snapshot.provenance.attempts[0].ok);
        assert!(snapshot.provenance.attempts[1].ok);
    }

    #[test]
    fn test_falls_through_to_cache() {
        let chain = FeedChain::new("lines", 2)
            .with_source(flaky("api", 5, Some(1), false))
            .with_source(flaky("scoreboard", 0, None, false))
            .with_source(flaky("cache", 0, Some(3), true));
        assert_eq!(chain.source_names(), vec!["api", "scoreboard", "cache"]);

        let snapshot = chain.fetch().unwrap();
        assert_eq!(snapshot.data, 3);
        assert_eq!(snapshot.provenance.source, "cache");
        assert!(snapshot.provenance.stale);
        assert_eq!(snapshot.provenance.attempts.len(), 5);
    }

    #[test]
    fn test_all_sources_fail() {
        let err = FeedChain::new("injuries", 1)
            .with_source(flaky("espn", 1, None, false))
            .with_source(flaky("cache", 0, None, true))
            .fetch()
            .unwrap_err();

        match err {
            TotalsError::FeedUnavailable { feed, attempts } => {
                assert_eq!(feed, "injuries");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stale_snapshot_does_not_refresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.json");
        let snapshot = FeedSnapshot {
            data: 5u32,
            provenance: FeedProvenance {
                feed: "lines".into(),
                source: "cache".into(),
                stale: true,
                attempts: vec![],
            },
        };
        refresh_cache(&snapshot, &path).unwrap();
        assert!(!path.exists());

        let live = FeedSnapshot {
            provenance: FeedProvenance {
                stale: false,
                ..snapshot.provenance.clone()
            },
            ..snapshot
        };
        refresh_cache(&live, &path).unwrap();
        assert!(path.exists());
    }
}
