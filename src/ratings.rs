//! Episode ratings across every season of a series.
//!
//! A load cycle fans out one season request per season number, joins them,
//! then flattens and summarizes the episodes. Nothing is cached between
//! cycles.

use crate::tmdb::{SeasonPayload, TmdbApi};
use anyhow::{bail, Context, Result};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub season_number: i64,
    pub episode_number: i64,
    pub name: String,
    pub still_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
}

impl Episode {
    /// The rating, if it is usable for averages and the chart line.
    pub fn rating(&self) -> Option<f64> {
        self.vote_average.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeasonSummary {
    pub episode_count: usize,
    /// Mean over rated episodes; `0.0` when the season has none.
    pub average_rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonBoundary {
    pub index: usize,
    pub season: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedSeries {
    pub episodes: Vec<Episode>,
    pub overall_average: Option<f64>,
    pub per_season: BTreeMap<i64, SeasonSummary>,
    pub boundaries: Vec<SeasonBoundary>,
}

impl AggregatedSeries {
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// Upper bound on one cycle's fan-out.
pub const MAX_SEASONS: u32 = 100;

/// Fetches seasons `1..=season_count` concurrently. One failed season fails
/// the whole batch. Counts above [`MAX_SEASONS`] are refused before any
/// request is issued.
pub async fn fetch_seasons(
    api: &dyn TmdbApi,
    series_id: &str,
    season_count: u32,
) -> Result<Vec<SeasonPayload>> {
    if season_count == 0 {
        return Ok(Vec::new());
    }
    if season_count > MAX_SEASONS {
        bail!("series {series_id} asks for {season_count} seasons, limit is {MAX_SEASONS}");
    }
    debug!(series_id, season_count, "Fetching seasons");
    let requests = (1..=season_count).map(|season| async move {
        let upstream = api
            .tv_season(series_id, season)
            .await
            .with_context(|| format!("season {season} of series {series_id} unavailable"))?;
        let mut payload: SeasonPayload = upstream
            .json()
            .with_context(|| format!("season {season} of series {series_id} unavailable"))?;
        payload.season_number.get_or_insert(i64::from(season));
        Ok::<_, anyhow::Error>(payload)
    });
    try_join_all(requests).await
}

pub async fn load_ratings(
    api: &dyn TmdbApi,
    series_id: &str,
    season_count: u32,
) -> Result<AggregatedSeries> {
    let seasons = fetch_seasons(api, series_id, season_count).await?;
    let series = aggregate(seasons);
    info!(
        "Aggregated {} episodes across {} seasons for series {}",
        series.episodes.len(),
        series.per_season.len(),
        series_id
    );
    Ok(series)
}

pub fn aggregate(seasons: Vec<SeasonPayload>) -> AggregatedSeries {
    let episodes = flatten(seasons);
    let overall_average = mean(episodes.iter().filter_map(Episode::rating));
    let per_season = season_summaries(&episodes);
    let boundaries = season_boundaries(&episodes);
    AggregatedSeries {
        episodes,
        overall_average,
        per_season,
        boundaries,
    }
}

/// Flattens payloads into episodes ordered by (season, episode). The season
/// number comes from the payload, not the episode entry.
pub fn flatten(seasons: Vec<SeasonPayload>) -> Vec<Episode> {
    let mut episodes: Vec<Episode> = seasons
        .into_iter()
        .flat_map(|season| {
            let season_number = season.season_number.unwrap_or_default();
            season
                .episodes
                .unwrap_or_default()
                .into_iter()
                .map(move |e| Episode {
                    season_number,
                    episode_number: e.episode_number,
                    name: e.name,
                    still_path: e.still_path,
                    vote_average: e.vote_average,
                    vote_count: e.vote_count,
                })
        })
        .collect();
    episodes.sort_by_key(|e| (e.season_number, e.episode_number));
    episodes
}

pub fn season_summaries(episodes: &[Episode]) -> BTreeMap<i64, SeasonSummary> {
    let mut acc: BTreeMap<i64, (usize, f64, usize)> = BTreeMap::new();
    for e in episodes {
        let entry = acc.entry(e.season_number).or_default();
        entry.0 += 1;
        if let Some(r) = e.rating() {
            entry.1 += r;
            entry.2 += 1;
        }
    }
    acc.into_iter()
        .map(|(season, (count, sum, rated))| {
            let average_rating = if rated > 0 { sum / rated as f64 } else { 0.0 };
            (
                season,
                SeasonSummary {
                    episode_count: count,
                    average_rating,
                },
            )
        })
        .collect()
}

pub fn season_boundaries(episodes: &[Episode]) -> Vec<SeasonBoundary> {
    let mut starts = Vec::new();
    let mut current = None;
    for (index, e) in episodes.iter().enumerate() {
        if current != Some(e.season_number) {
            current = Some(e.season_number);
            starts.push(SeasonBoundary {
                index,
                season: e.season_number,
            });
        }
    }
    starts
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
