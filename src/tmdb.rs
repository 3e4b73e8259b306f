use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::time::Duration;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const STILL_BASE: &str = "https://image.tmdb.org/t/p/w185";
pub const POSTER_THUMB_BASE: &str = "https://image.tmdb.org/t/p/w92";
pub const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w342";

/// Raw upstream response, kept intact so the proxy routes can forward it.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl Upstream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body, treating any non-2xx status as a failure.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        if !self.is_success() {
            return Err(anyhow!("upstream returned {}: {}", self.status, self.body));
        }
        serde_json::from_str(&self.body).context("JSON parse failed")
    }
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn search_tv(&self, query: &str) -> Result<Upstream>;
    async fn tv_details(&self, series_id: &str) -> Result<Upstream>;
    async fn tv_season(&self, series_id: &str, season: u32) -> Result<Upstream>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self> {
        let user_agent = format!("episodegraph/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| TMDB_BASE.to_string()),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        let base_url = env::var("TMDB_BASE_URL").ok().filter(|s| !s.is_empty());
        Self::new(api_key, base_url)
    }

    async fn get_raw(&self, url: &str) -> Result<Upstream> {
        let res = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = res.text().await.context("reading body failed")?;
        Ok(Upstream {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn search_tv(&self, query: &str) -> Result<Upstream> {
        let url = format!(
            "{}/search/tv?query={}",
            self.base_url,
            urlencoding::encode(query)
        );
        self.get_raw(&url).await
    }

    async fn tv_details(&self, series_id: &str) -> Result<Upstream> {
        let url = format!("{}/tv/{}", self.base_url, urlencoding::encode(series_id));
        self.get_raw(&url).await
    }

    async fn tv_season(&self, series_id: &str, season: u32) -> Result<Upstream> {
        let url = format!(
            "{}/tv/{}/season/{season}",
            self.base_url,
            urlencoding::encode(series_id)
        );
        self.get_raw(&url).await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDetails {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub first_air_date: Option<String>,
    pub number_of_seasons: Option<u32>,
    pub number_of_episodes: Option<u32>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvResult {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub first_air_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub page: Option<u32>,
    #[serde(default)]
    pub results: Vec<TvResult>,
    pub total_pages: Option<u32>,
    pub total_results: Option<u32>,
}

/// One season as returned by `/tv/{id}/season/{n}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SeasonPayload {
    pub season_number: Option<i64>,
    #[serde(default, deserialize_with = "episode_list")]
    pub episodes: Option<Vec<EpisodeEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpisodeEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub episode_number: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub still_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
}

// Only a JSON array counts as an episode list; null, objects and scalars yield None.
fn episode_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<EpisodeEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
