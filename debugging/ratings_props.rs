//! Fetch every season of a TMDB series and print the aggregated ratings.
//! Usage:
//!   cargo run --bin ratings_props -- <tmdb_id> [season_count]
//!   cargo run --bin ratings_props -- <tmdb_id> [season_count] --svg > chart.svg
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use episodegraph::chart::{chart_points, ChartSurface};
use episodegraph::ratings::load_ratings;
use episodegraph::tmdb::{SeriesDetails, TmdbApi, TmdbClient};
use serde_json::json;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let args: Vec<String> = env::args().skip(1).collect();
    let svg = args.iter().any(|a| a == "--svg");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let series_id = positional
        .first()
        .context("usage: ratings_props <tmdb_id> [season_count] [--svg]")?;

    let client = TmdbClient::from_env()?;
    let season_count = match positional.get(1) {
        Some(n) => n.parse::<u32>().context("season_count must be a number")?,
        None => {
            let details: SeriesDetails = client.tv_details(series_id).await?.json()?;
            eprintln!("{} ({} seasons)", details.name, details.number_of_seasons.unwrap_or(0));
            details.number_of_seasons.unwrap_or(0)
        }
    };

    let series = load_ratings(&client, series_id, season_count).await?;
    if series.is_empty() {
        eprintln!("No episodes returned for series {}", series_id);
    }
    if svg {
        println!("{}", ChartSurface::new(series).render_svg());
        return Ok(());
    }

    let rated = chart_points(&series.episodes)
        .iter()
        .filter(|p| p.rating.is_some())
        .count();
    let out = json!({
        "series_id": series_id,
        "season_count": season_count,
        "episodes": series.episodes.len(),
        "rated_episodes": rated,
        "overall_average": series.overall_average,
        "per_season": series.per_season,
        "boundaries": series.boundaries,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
