use crate::chart::{render_svg, ChartLayout};
use crate::pages;
use crate::ratings::{load_ratings, AggregatedSeries, MAX_SEASONS};
use crate::tmdb::{SearchResults, SeriesDetails, TmdbApi, TmdbClient, Upstream};
use crate::view::{ChartState, RatingsKey, RatingsView};
use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{env, net::SocketAddr, sync::Arc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_PORT: u16 = 3146;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub layout: ChartLayout,
}

impl AppState {
    pub fn new(tmdb: Arc<dyn TmdbApi>) -> Self {
        Self {
            tmdb,
            layout: ChartLayout::default(),
        }
    }
}

pub async fn run_server() -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env()?);
    let app = build_router(AppState::new(tmdb));

    let port = match env::var("PORT") {
        Ok(p) => p
            .parse::<u16>()
            .map_err(|e| anyhow!("PORT must be a port number ({}): {}", p, e))?,
        Err(_) => DEFAULT_PORT,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(search_page))
        .route("/tv/:id", get(detail_page))
        .route("/health", get(health))
        .route("/api/search/tv", get(search_proxy))
        .route("/api/tv/:id", get(details_proxy))
        .route("/api/tv/:id/season/:season", get(season_proxy))
        .route("/api/tv/:id/ratings", get(ratings_json))
        .route("/api/tv/:id/chart.svg", get(chart_svg))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RatingsQuery {
    seasons: Option<u32>,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Forwards an upstream response: status, content type and body unchanged.
fn forward(upstream: Upstream) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .content_type
        .unwrap_or_else(|| "application/json".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(upstream.body))
        .unwrap_or_else(|_| json_error(StatusCode::BAD_GATEWAY, "Invalid upstream response."))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn search_proxy(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    let Some(q) = non_empty(query.q.as_deref()) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Missing required query parameter `q`.",
        );
    };
    match state.tmdb.search_tv(q).await {
        Ok(upstream) => forward(upstream),
        Err(e) => {
            warn!("TMDB search for '{}' failed: {:#}", q, e);
            json_error(StatusCode::BAD_GATEWAY, "Failed to fetch from TMDB.")
        }
    }
}

async fn details_proxy(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(id) = non_empty(Some(id.as_str())) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing TV series id.");
    };
    match state.tmdb.tv_details(id).await {
        Ok(upstream) => forward(upstream),
        Err(e) => {
            warn!("TMDB details for series {} failed: {:#}", id, e);
            json_error(
                StatusCode::BAD_GATEWAY,
                "Failed to fetch TV show details from TMDB.",
            )
        }
    }
}

async fn season_proxy(
    State(state): State<AppState>,
    Path((id, season)): Path<(String, String)>,
) -> Response {
    let (Some(id), Some(season)) = (non_empty(Some(id.as_str())), non_empty(Some(season.as_str()))) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing tv id or season number.");
    };
    let Ok(season) = season.parse::<u32>() else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid season number.");
    };
    match state.tmdb.tv_season(id, season).await {
        Ok(upstream) => forward(upstream),
        Err(e) => {
            warn!("TMDB season {} for series {} failed: {:#}", season, id, e);
            json_error(
                StatusCode::BAD_GATEWAY,
                "Failed to fetch TV season details from TMDB.",
            )
        }
    }
}

/// Season count for one cycle: the series' own count, lowered to the
/// requested one when the caller asks for fewer.
async fn resolve_season_count(
    tmdb: &dyn TmdbApi,
    series_id: &str,
    requested: Option<u32>,
) -> Result<u32> {
    let details: SeriesDetails = tmdb.tv_details(series_id).await?.json()?;
    let available = details.number_of_seasons.unwrap_or(0);
    Ok(requested.map_or(available, |n| n.min(available)))
}

async fn aggregate_for(
    state: &AppState,
    id: &str,
    query: RatingsQuery,
) -> std::result::Result<AggregatedSeries, Response> {
    let Some(id) = non_empty(Some(id)) else {
        return Err(json_error(StatusCode::BAD_REQUEST, "Missing TV series id."));
    };
    if query.seasons.is_some_and(|n| n > MAX_SEASONS) {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Season count out of range.",
        ));
    }
    let outcome = match resolve_season_count(state.tmdb.as_ref(), id, query.seasons).await {
        Ok(count) => load_ratings(state.tmdb.as_ref(), id, count).await,
        Err(e) => Err(e),
    };
    outcome.map_err(|e| {
        warn!("Ratings for series {} failed: {:#}", id, e);
        json_error(StatusCode::BAD_GATEWAY, "Failed to load episode ratings.")
    })
}

async fn ratings_json(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RatingsQuery>,
) -> Response {
    match aggregate_for(&state, &id, query).await {
        Ok(series) => Json(series).into_response(),
        Err(res) => res,
    }
}

async fn chart_svg(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RatingsQuery>,
) -> Response {
    match aggregate_for(&state, &id, query).await {
        Ok(series) => (
            [(header::CONTENT_TYPE, "image/svg+xml")],
            render_svg(&series, &state.layout),
        )
            .into_response(),
        Err(res) => res,
    }
}

async fn search_page(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Html<String> {
    let Some(q) = non_empty(query.q.as_deref()) else {
        return Html(pages::search("", None));
    };
    let outcome = match state.tmdb.search_tv(q).await {
        Ok(upstream) => upstream.json::<SearchResults>(),
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        warn!("Search page query '{}' failed: {:#}", q, e);
    }
    Html(pages::search(q, Some(outcome)))
}

async fn detail_page(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(id) = non_empty(Some(id.as_str())) else {
        return (StatusCode::BAD_REQUEST, Html(pages::detail_error())).into_response();
    };
    let details = match state.tmdb.tv_details(id).await {
        Ok(upstream) if upstream.is_success() => upstream.json::<SeriesDetails>(),
        Ok(upstream) => {
            warn!("TMDB details for series {} returned {}", id, upstream.status);
            let status =
                StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            return (status, Html(pages::detail_error())).into_response();
        }
        Err(e) => Err(e),
    };
    let details = match details {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to load details for series {}: {:#}", id, e);
            return (StatusCode::BAD_GATEWAY, Html(pages::detail_error())).into_response();
        }
    };

    // The page renders whatever happens to the ratings cycle.
    let mut view = RatingsView::new();
    match details.number_of_seasons {
        Some(n) => {
            view.load(state.tmdb.as_ref(), RatingsKey::new(id, n)).await;
        }
        None => view.reset(),
    }
    let chart = match view.state() {
        ChartState::Ready(_, series) => pages::Chart::Ready(render_svg(series, &state.layout)),
        ChartState::Failed(_) => pages::Chart::Unavailable,
        ChartState::Idle | ChartState::Loading(_) => {
            pages::Chart::Ready(render_svg(&AggregatedSeries::default(), &state.layout))
        }
    };
    Html(pages::detail(&details, &chart)).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
