//! Chart data lifecycle for one view.
//!
//! `Idle → Loading → Ready | Failed`. Every load cycle is keyed by
//! (series id, season count) and stamped with a generation; a result only
//! commits while its ticket is still the latest one issued.

use crate::ratings::{load_ratings, AggregatedSeries};
use crate::tmdb::TmdbApi;
use anyhow::Result;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RatingsKey {
    pub series_id: String,
    pub season_count: u32,
}

impl RatingsKey {
    pub fn new(series_id: impl Into<String>, season_count: u32) -> Self {
        Self {
            series_id: series_id.into(),
            season_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    key: RatingsKey,
}

impl Ticket {
    pub fn key(&self) -> &RatingsKey {
        &self.key
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ChartState {
    #[default]
    Idle,
    Loading(RatingsKey),
    Ready(RatingsKey, AggregatedSeries),
    Failed(RatingsKey),
}

#[derive(Debug, Default)]
pub struct RatingsView {
    generation: u64,
    state: ChartState,
}

impl RatingsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ChartState {
        &self.state
    }

    /// The aggregated series, once a cycle has committed successfully.
    pub fn series(&self) -> Option<&AggregatedSeries> {
        match &self.state {
            ChartState::Ready(_, series) => Some(series),
            _ => None,
        }
    }

    /// Starts a cycle for `key`. Any ticket issued earlier becomes stale.
    pub fn begin(&mut self, key: RatingsKey) -> Ticket {
        self.generation += 1;
        self.state = ChartState::Loading(key.clone());
        Ticket {
            generation: self.generation,
            key,
        }
    }

    /// Drops back to `Idle`, e.g. when the series has no season count.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = ChartState::Idle;
    }

    /// Commits a cycle's outcome. Returns false and leaves the state alone
    /// when the ticket is stale.
    pub fn complete(&mut self, ticket: Ticket, outcome: Result<AggregatedSeries>) -> bool {
        let current = matches!(&self.state, ChartState::Loading(k) if *k == ticket.key);
        if ticket.generation != self.generation || !current {
            debug!(
                series_id = %ticket.key.series_id,
                season_count = ticket.key.season_count,
                "Discarding stale ratings result"
            );
            return false;
        }
        self.state = match outcome {
            Ok(series) => ChartState::Ready(ticket.key, series),
            Err(e) => {
                warn!(
                    "Ratings unavailable for series {}: {:#}",
                    ticket.key.series_id, e
                );
                ChartState::Failed(ticket.key)
            }
        };
        true
    }

    /// Runs a full cycle for `key` against `api`. Failures end in `Failed`;
    /// they are never returned to the caller.
    pub async fn load(&mut self, api: &dyn TmdbApi, key: RatingsKey) -> &ChartState {
        let ticket = self.begin(key);
        let outcome = load_ratings(api, &ticket.key.series_id, ticket.key.season_count).await;
        self.complete(ticket, outcome);
        &self.state
    }
}
