use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::{TrackerConfig, POST_LIMIT_RANGE, TOP_N_RANGE};
use crate::insights::market_insights;
use crate::models::RankedResult;
use crate::pipeline::{Pipeline, PipelineError};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub default_post_limit: usize,
    pub default_top_n: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, cfg: &TrackerConfig) -> Self {
        Self {
            pipeline,
            default_post_limit: cfg.default_post_limit,
            default_top_n: cfg.default_top_n,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/stocks", get(get_stocks).delete(clear_stocks))
        .route("/api/status", get(get_status))
        .route("/api/symbols", post(update_symbols).get(list_symbols))
        .route("/api/insights", get(get_insights))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Response envelope shared by every `/api` route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cached: None,
            stale: None,
            last_updated: None,
        }
    }

    fn from_run(data: T, run: &RankedResult) -> Self {
        Self {
            cached: Some(run.from_cache),
            stale: Some(run.stale),
            last_updated: Some(run.as_of),
            ..Self::ok(data)
        }
    }
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(msg.into()),
        cached: None,
        stale: None,
        last_updated: None,
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct RunQuery {
    post_limit: Option<usize>,
    top_n: Option<usize>,
    #[serde(default)]
    force_refresh: bool,
}

impl RunQuery {
    /// Fill defaults and enforce bounds; `Err` carries the 400 message.
    fn resolve(&self, state: &AppState) -> Result<(usize, usize), String> {
        let post_limit = self.post_limit.unwrap_or(state.default_post_limit);
        let top_n = self.top_n.unwrap_or(state.default_top_n);
        let (lo, hi) = POST_LIMIT_RANGE;
        if !(lo..=hi).contains(&post_limit) {
            return Err(format!("post_limit must be between {lo} and {hi}"));
        }
        let (lo, hi) = TOP_N_RANGE;
        if !(lo..=hi).contains(&top_n) {
            return Err(format!("top_n must be between {lo} and {hi}"));
        }
        Ok((post_limit, top_n))
    }
}

async fn run_pipeline(state: &AppState, q: &RunQuery) -> Result<RankedResult, Response> {
    let (post_limit, top_n) = q
        .resolve(state)
        .map_err(|msg| error_response(StatusCode::BAD_REQUEST, msg))?;

    state
        .pipeline
        .run(post_limit, top_n, q.force_refresh)
        .await
        .map_err(|e| match e {
            PipelineError::SourceUnavailable(_) => {
                tracing::error!(target: "api", error = %e, "run failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        })
}

async fn get_stocks(State(state): State<AppState>, Query(q): Query<RunQuery>) -> Response {
    match run_pipeline(&state, &q).await {
        Ok(run) => {
            tracing::info!(
                target: "api",
                symbols = run.results.len(),
                cached = run.from_cache,
                stale = run.stale,
                "GET /api/stocks"
            );
            let body = ApiResponse::from_run(&run.results, &run);
            Json(body).into_response()
        }
        Err(resp) => resp,
    }
}

async fn clear_stocks(State(state): State<AppState>) -> Response {
    state.pipeline.clear_cache();
    Json(ApiResponse::ok("cache cleared")).into_response()
}

async fn get_status(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(state.pipeline.status())).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct SymbolsReq {
    #[serde(default)]
    add: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
}

async fn update_symbols(State(state): State<AppState>, Json(req): Json<SymbolsReq>) -> Response {
    if req.add.is_empty() && req.remove.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "nothing to add or remove");
    }
    let change = state.pipeline.configure_symbols(&req.add, &req.remove);
    Json(ApiResponse::ok(change)).into_response()
}

async fn list_symbols(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(state.pipeline.known_symbols())).into_response()
}

async fn get_insights(State(state): State<AppState>, Query(q): Query<RunQuery>) -> Response {
    match run_pipeline(&state, &q).await {
        Ok(run) => {
            let insights = market_insights(&run.results);
            Json(ApiResponse::from_run(insights, &run)).into_response()
        }
        Err(resp) => resp,
    }
}
