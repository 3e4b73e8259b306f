use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use episodegraph::app::{build_router, AppState};
use episodegraph::ratings::{load_ratings, SeasonBoundary, MAX_SEASONS};
use episodegraph::tmdb::{TmdbApi, Upstream};
use episodegraph::view::{ChartState, RatingsKey, RatingsView};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

enum SeasonReply {
    Ok { body: Value, delay_ms: u64 },
    Status(u16),
    Transport,
}

#[derive(Default)]
struct FakeTmdb {
    details: Option<Value>,
    search: Option<Upstream>,
    seasons: HashMap<u32, SeasonReply>,
    season_calls: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn ok_json(body: &Value) -> Upstream {
    Upstream {
        status: 200,
        content_type: Some("application/json;charset=utf-8".to_string()),
        body: body.to_string(),
    }
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn search_tv(&self, _query: &str) -> anyhow::Result<Upstream> {
        self.search
            .clone()
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }

    async fn tv_details(&self, _series_id: &str) -> anyhow::Result<Upstream> {
        self.details
            .as_ref()
            .map(ok_json)
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }

    async fn tv_season(&self, _series_id: &str, season: u32) -> anyhow::Result<Upstream> {
        self.season_calls.lock().unwrap().push(season);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let reply = match self.seasons.get(&season) {
            Some(SeasonReply::Ok { body, delay_ms }) => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(ok_json(body))
            }
            Some(SeasonReply::Status(status)) => Ok(Upstream {
                status: *status,
                content_type: Some("application/json".to_string()),
                body: json!({ "status_message": "boom" }).to_string(),
            }),
            Some(SeasonReply::Transport) | None => Err(anyhow::anyhow!("connection reset")),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

fn season(number: u32, ratings: &[Option<f64>]) -> SeasonReply {
    let episodes: Vec<Value> = ratings
        .iter()
        .enumerate()
        .map(|(i, r)| {
            json!({
                "episode_number": i + 1,
                "name": format!("Episode {}", i + 1),
                "still_path": null,
                "vote_average": r,
                "vote_count": 12
            })
        })
        .collect();
    SeasonReply::Ok {
        body: json!({ "season_number": number, "episodes": episodes }),
        delay_ms: 5,
    }
}

fn two_season_fake() -> FakeTmdb {
    FakeTmdb {
        details: Some(json!({
            "id": 1,
            "name": "Series One",
            "overview": "A show.",
            "number_of_seasons": 2,
            "number_of_episodes": 2,
            "genres": [{ "id": 18, "name": "Drama" }]
        })),
        seasons: HashMap::from([(1, season(1, &[Some(8.0)])), (2, season(2, &[Some(6.0)]))]),
        ..Default::default()
    }
}

fn app(fake: FakeTmdb) -> (Router, Arc<FakeTmdb>) {
    let fake = Arc::new(fake);
    (build_router(AppState::new(fake.clone())), fake)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let res = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn zero_seasons_yield_empty_series_without_requests() {
    let fake = FakeTmdb::default();
    let series = load_ratings(&fake, "S1", 0).await.unwrap();
    assert!(series.episodes.is_empty());
    assert!(series.overall_average.is_none());
    assert!(fake.season_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn end_to_end_two_seasons() {
    let fake = two_season_fake();
    let series = load_ratings(&fake, "S1", 2).await.unwrap();
    let order: Vec<(i64, i64)> = series
        .episodes
        .iter()
        .map(|e| (e.season_number, e.episode_number))
        .collect();
    assert_eq!(order, vec![(1, 1), (2, 1)]);
    assert_eq!(series.overall_average, Some(7.0));
    assert_eq!(
        series.boundaries,
        vec![
            SeasonBoundary { index: 0, season: 1 },
            SeasonBoundary { index: 1, season: 2 },
        ]
    );
}

#[tokio::test]
async fn seasons_are_fetched_concurrently_and_sorted_after_join() {
    let mut fake = FakeTmdb::default();
    // season 1 finishes last
    fake.seasons.insert(
        1,
        SeasonReply::Ok {
            body: json!({ "season_number": 1, "episodes": [
                { "episode_number": 2, "name": "b", "vote_average": 5.0 },
                { "episode_number": 1, "name": "a", "vote_average": 7.0 }
            ]}),
            delay_ms: 60,
        },
    );
    fake.seasons.insert(2, season(2, &[Some(9.0)]));
    fake.seasons.insert(
        3,
        SeasonReply::Ok {
            body: json!({ "season_number": 3, "episodes": null }),
            delay_ms: 20,
        },
    );

    let series = load_ratings(&fake, "S1", 3).await.unwrap();
    let names: Vec<&str> = series.episodes.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "Episode 1"]);
    assert_eq!(fake.max_in_flight.load(Ordering::SeqCst), 3);
    let mut calls = fake.season_calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec![1, 2, 3]);
}

#[tokio::test]
async fn one_failed_season_fails_the_batch() {
    let mut fake = FakeTmdb::default();
    fake.seasons.insert(1, season(1, &[Some(8.0)]));
    fake.seasons.insert(2, SeasonReply::Transport);
    fake.seasons.insert(3, season(3, &[Some(6.0)]));
    let err = load_ratings(&fake, "S1", 3).await.unwrap_err();
    assert!(format!("{:#}", err).contains("season 2"));
}

#[tokio::test]
async fn non_success_season_status_is_a_failure() {
    let mut fake = FakeTmdb::default();
    fake.seasons.insert(1, season(1, &[Some(8.0)]));
    fake.seasons.insert(2, SeasonReply::Status(404));
    assert!(load_ratings(&fake, "S1", 2).await.is_err());
}

#[tokio::test]
async fn view_absorbs_failures() {
    let mut fake = FakeTmdb::default();
    fake.seasons.insert(1, SeasonReply::Status(500));
    let mut view = RatingsView::new();
    let key = RatingsKey::new("S1", 1);
    let state = view.load(&fake, key.clone()).await;
    assert_eq!(state, &ChartState::Failed(key));
}

#[tokio::test]
async fn ratings_endpoint_returns_aggregate() {
    let (app, _) = app(two_season_fake());
    let (status, _, body) = get(app, "/api/tv/S1/ratings?seasons=2").await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["episodes"].as_array().unwrap().len(), 2);
    assert_eq!(v["overall_average"].as_f64(), Some(7.0));
    assert_eq!(v["boundaries"][1]["index"].as_u64(), Some(1));
    assert_eq!(v["per_season"]["2"]["episode_count"].as_u64(), Some(1));
}

#[tokio::test]
async fn ratings_endpoint_reads_season_count_from_details() {
    let (app, fake) = app(two_season_fake());
    let (status, _, body) = get(app, "/api/tv/S1/ratings").await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["episodes"].as_array().unwrap().len(), 2);
    assert_eq!(fake.season_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn ratings_endpoint_never_fetches_more_seasons_than_the_series_has() {
    let (app, fake) = app(two_season_fake());
    let (status, _, body) = get(app, "/api/tv/S1/ratings?seasons=50").await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["episodes"].as_array().unwrap().len(), 2);
    let mut calls = fake.season_calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec![1, 2]);
}

#[tokio::test]
async fn ratings_endpoint_rejects_huge_season_counts() {
    let (app, fake) = app(two_season_fake());
    let (status, _, body) = get(app.clone(), "/api/tv/S1/ratings?seasons=200000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Season count out of range."));
    let (status, _, _) = get(app, "/api/tv/S1/chart.svg?seasons=4000000000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fake.season_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fetcher_refuses_counts_above_the_limit() {
    let fake = two_season_fake();
    assert!(load_ratings(&fake, "S1", MAX_SEASONS + 1).await.is_err());
    assert!(fake.season_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ratings_endpoint_maps_failure_to_bad_gateway() {
    let mut fake = two_season_fake();
    fake.seasons.insert(2, SeasonReply::Transport);
    let (app, _) = app(fake);
    let (status, _, body) = get(app, "/api/tv/S1/ratings?seasons=2").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Failed to load episode ratings."));
}

#[tokio::test]
async fn chart_endpoint_serves_svg() {
    let (app, _) = app(two_season_fake());
    let (status, content_type, body) = get(app, "/api/tv/S1/chart.svg?seasons=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/svg+xml"));
    assert!(body.starts_with("<svg"));
    assert!(body.contains("Average episode rating: 7.0"));
}

#[tokio::test]
async fn search_proxy_requires_query() {
    let (app, _) = app(FakeTmdb::default());
    let (status, _, body) = get(app.clone(), "/api/search/tv").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Missing required query parameter"));
    let (status, _, _) = get(app, "/api/search/tv?q=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_proxy_forwards_upstream_verbatim() {
    let upstream_body = r#"{"status_code":7,"status_message":"Invalid API key"}"#;
    let fake = FakeTmdb {
        search: Some(Upstream {
            status: 401,
            content_type: Some("application/json;charset=utf-8".to_string()),
            body: upstream_body.to_string(),
        }),
        ..Default::default()
    };
    let (app, _) = app(fake);
    let (status, content_type, body) = get(app, "/api/search/tv?q=lost").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(content_type.as_deref(), Some("application/json;charset=utf-8"));
    assert_eq!(body, upstream_body);
}

#[tokio::test]
async fn proxies_map_transport_errors_to_bad_gateway() {
    let (app, _) = app(FakeTmdb::default());
    let (status, _, body) = get(app.clone(), "/api/tv/S1").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Failed to fetch TV show details from TMDB."));

    let (status, _, body) = get(app.clone(), "/api/tv/S1/season/3").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Failed to fetch TV season details from TMDB."));

    let (status, _, _) = get(app, "/api/tv/S1/season/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn season_proxy_forwards_upstream_status() {
    let mut fake = FakeTmdb::default();
    fake.seasons.insert(9, SeasonReply::Status(404));
    let (app, _) = app(fake);
    let (status, _, body) = get(app, "/api/tv/S1/season/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("boom"));
}

#[tokio::test]
async fn detail_page_includes_chart() {
    let (app, _) = app(two_season_fake());
    let (status, content_type, body) = get(app, "/tv/S1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(body.contains("<h1>Series One</h1>"));
    assert!(body.contains("<svg"));
    assert!(body.contains(">S2</text>"));
}

#[tokio::test]
async fn detail_page_survives_ratings_failure() {
    let mut fake = two_season_fake();
    fake.seasons.insert(2, SeasonReply::Status(500));
    let (app, _) = app(fake);
    let (status, _, body) = get(app, "/tv/S1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<h1>Series One</h1>"));
    assert!(body.contains("Episode ratings are unavailable."));
    assert!(!body.contains("<svg"));
}

#[tokio::test]
async fn detail_page_reports_missing_details() {
    let (app, _) = app(FakeTmdb::default());
    let (status, _, body) = get(app, "/tv/S1").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Failed to load TV show details."));
}

#[tokio::test]
async fn search_page_lists_results() {
    let fake = FakeTmdb {
        search: Some(ok_json(&json!({
            "page": 1,
            "results": [{ "id": 5, "name": "Lost", "overview": "", "poster_path": null, "first_air_date": "2004-09-22" }],
            "total_pages": 1,
            "total_results": 1
        }))),
        ..Default::default()
    };
    let (app, _) = app(fake);
    let (status, _, body) = get(app.clone(), "/?q=lost").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("href=\"/tv/5\""));
    assert!(body.contains("2004-09-22"));
    assert!(body.contains("No overview available."));

    let (_, _, body) = get(app, "/").await;
    assert!(!body.contains("<table>"));
}

#[tokio::test]
async fn search_page_hides_upstream_error_bodies() {
    let fake = FakeTmdb {
        search: Some(Upstream {
            status: 401,
            content_type: Some("application/json".to_string()),
            body: r#"{"status_code":7,"status_message":"Invalid API key"}"#.to_string(),
        }),
        ..Default::default()
    };
    let (app, _) = app(fake);
    let (status, _, body) = get(app, "/?q=lost").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Error: Failed to fetch from TMDB."));
    assert!(!body.contains("Invalid API key"));
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app(FakeTmdb::default());
    let (status, _, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}
