use super::error::{ApiError, ApiResult};
use super::session::{Session, UiStateUpdate};
use super::types::{
    AboveSmaParams, CleanupParams, FetchParams, FetchStatus, LatestPriceParams, LimitParams,
    ListResponse, NearSmaParams, PeriodParams, PriceParams,
};
use super::AppState;
use crate::analysis::{
    AboveSmaRow, FetchRequest, NearSmaRow, OpenHighPattern, Summary, MIN_RETENTION_DAYS,
};
use crate::api::yahoo::VALID_PERIODS;
use crate::db::CleanupStats;
use crate::export::{above_sma_csv, near_sma_csv, patterns_csv, ExportKind};
use crate::models::PriceBar;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

const MAX_CHART_SYMBOLS: usize = 10;
const MAX_PRICE_ROWS: i64 = 1000;

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> ApiResult<Json<Summary>> {
    Ok(Json(state.analyzer.summary(params.sma_period).await?))
}

/// `min_pct` is a floor on % above SMA, `max_pct` a ceiling
pub async fn above_sma(
    State(state): State<AppState>,
    Query(params): Query<AboveSmaParams>,
) -> ApiResult<Json<ListResponse<AboveSmaRow>>> {
    if let (Some(min), Some(max)) = (params.min_pct, params.max_pct) {
        if min > max {
            return Err(ApiError::BadRequest(format!(
                "min_pct ({}) is greater than max_pct ({})",
                min, max
            )));
        }
    }

    let mut rows = state
        .analyzer
        .stocks_above_sma(params.sma_period, params.max_pct)
        .await?;
    if let Some(min) = params.min_pct {
        rows.retain(|row| row.pct_above_sma >= min);
    }

    Ok(Json(ListResponse::truncated(rows, params.limit)))
}

pub async fn near_sma(
    State(state): State<AppState>,
    Query(params): Query<NearSmaParams>,
) -> ApiResult<Json<ListResponse<NearSmaRow>>> {
    if params.max_distance.is_some_and(|d| !d.is_finite() || d <= 0.0) {
        return Err(ApiError::BadRequest("max_distance must be positive".into()));
    }

    let rows = state
        .analyzer
        .stocks_near_sma(params.sma_period, params.max_distance)
        .await?;
    Ok(Json(ListResponse::truncated(rows, params.limit)))
}

pub async fn open_high(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<ListResponse<OpenHighPattern>>> {
    let rows = state.analyzer.open_high_patterns().await?;
    Ok(Json(ListResponse::truncated(rows, params.limit)))
}

/// Oldest-first history per requested symbol, for charting
pub async fn prices(
    State(state): State<AppState>,
    Query(params): Query<PriceParams>,
) -> ApiResult<Json<BTreeMap<String, Vec<PriceBar>>>> {
    let symbols = params.symbol_list();
    if symbols.is_empty() {
        return Err(ApiError::BadRequest("symbols is required".into()));
    }
    if symbols.len() > MAX_CHART_SYMBOLS {
        return Err(ApiError::BadRequest(format!(
            "at most {} symbols per request",
            MAX_CHART_SYMBOLS
        )));
    }
    check_limit(params.limit)?;

    let mut out = BTreeMap::new();
    for symbol in symbols {
        let history = state
            .analyzer
            .data()
            .price_history(&symbol, Some(params.limit))
            .await?;
        out.insert(symbol, history);
    }

    Ok(Json(out))
}

/// Newest rows first, optionally for one symbol
pub async fn latest_prices(
    State(state): State<AppState>,
    Query(params): Query<LatestPriceParams>,
) -> ApiResult<Json<Vec<PriceBar>>> {
    check_limit(params.limit)?;
    let symbol = params.symbol.as_deref().map(str::to_uppercase);
    let rows = state
        .analyzer
        .data()
        .latest_prices(symbol.as_deref(), params.limit)
        .await?;
    Ok(Json(rows))
}

pub async fn symbols(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.analyzer.data().symbols_with_data().await?))
}

/// `above-sma.csv`, `near-sma.csv` or `patterns.csv`
pub async fn export_csv(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(params): Query<PeriodParams>,
) -> ApiResult<Response> {
    let (kind, body) = match file.as_str() {
        "above-sma.csv" => {
            let rows = state.analyzer.stocks_above_sma(params.sma_period, None).await?;
            (ExportKind::AboveSma, above_sma_csv(&rows)?)
        }
        "near-sma.csv" => {
            let rows = state.analyzer.stocks_near_sma(params.sma_period, None).await?;
            (ExportKind::NearSma, near_sma_csv(&rows)?)
        }
        "patterns.csv" => {
            let rows = state.analyzer.open_high_patterns().await?;
            (ExportKind::Patterns, patterns_csv(&rows)?)
        }
        other => return Err(ApiError::NotFound(format!("unknown export: {}", other))),
    };

    let filename = kind.filename(params.sma_period, Utc::now().date_naive());
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Start a background fetch; only one may run at a time
pub async fn start_fetch(
    State(state): State<AppState>,
    Json(params): Json<FetchParams>,
) -> ApiResult<(StatusCode, Json<FetchStatus>)> {
    if params.max_stocks == Some(0) {
        return Err(ApiError::BadRequest("max_stocks must be at least 1".into()));
    }
    if let Some(period) = params.period.as_deref() {
        if !VALID_PERIODS.contains(&period) {
            return Err(ApiError::BadRequest(format!("invalid period: {}", period)));
        }
    }

    let snapshot = {
        let mut status = state.fetch_status.lock().await;
        if status.running {
            return Err(ApiError::Conflict("a fetch is already running".into()));
        }
        status.running = true;
        status.last_error = None;
        status.clone()
    };

    let request = FetchRequest {
        mode: params.mode,
        max_stocks: params.max_stocks,
        period: params.period,
    };

    tracing::info!("🔄 Starting background fetch: {:?}", request);

    let analyzer = state.analyzer.clone();
    let fetch_status = state.fetch_status.clone();
    tokio::spawn(async move {
        // The worker runs in its own task so a panic still clears `running`
        let worker = tokio::spawn(async move {
            analyzer
                .fetch_and_store(&request)
                .await
                .map_err(|e| e.to_string())
        });
        let result = match worker.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(format!("fetch task panicked: {}", e)),
            Err(e) => Err(format!("fetch task cancelled: {}", e)),
        };

        let mut status = fetch_status.lock().await;
        status.running = false;
        status.last_fetch_time = Some(Utc::now());
        match result {
            Ok(outcome) => {
                status.last_outcome = Some(outcome);
            }
            Err(e) => {
                tracing::error!("❌ Background fetch failed: {}", e);
                status.last_error = Some(e);
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

pub async fn fetch_status(State(state): State<AppState>) -> Json<FetchStatus> {
    Json(state.fetch_status.lock().await.clone())
}

pub async fn cleanup(
    State(state): State<AppState>,
    Json(params): Json<CleanupParams>,
) -> ApiResult<Json<CleanupStats>> {
    if params.days < MIN_RETENTION_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be at least {}",
            MIN_RETENTION_DAYS
        )));
    }
    Ok(Json(state.analyzer.cleanup_old_data(params.days).await?))
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<Session>) {
    (StatusCode::CREATED, Json(state.sessions.create().await))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", id)))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<UiStateUpdate>,
) -> ApiResult<Json<Session>> {
    let id = parse_session_id(&id)?;
    match state.sessions.update(id, update).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err(ApiError::NotFound(format!("session {} not found", id))),
        Err(msg) => Err(ApiError::BadRequest(msg)),
    }
}

fn parse_session_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("session {} not found", raw)))
}

fn check_limit(limit: i64) -> ApiResult<()> {
    if !(1..=MAX_PRICE_ROWS).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PRICE_ROWS
        )));
    }
    Ok(())
}
