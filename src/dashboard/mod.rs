//! Web dashboard: a single-page UI plus the JSON API it talks to.

pub mod error;
pub mod handlers;
pub mod session;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use session::{SessionStore, UiState};
pub use types::FetchStatus;

use crate::analysis::Analyzer;
use crate::settings::ServerSettings;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub sessions: SessionStore,
    pub fetch_status: Arc<Mutex<FetchStatus>>,
}

impl AppState {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self {
            analyzer,
            sessions: SessionStore::new(),
            fetch_status: Arc::new(Mutex::new(FetchStatus::default())),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let api = Router::new()
        .route("/summary", get(handlers::summary))
        .route("/stocks/above-sma", get(handlers::above_sma))
        .route("/stocks/near-sma", get(handlers::near_sma))
        .route("/patterns/open-high", get(handlers::open_high))
        .route("/prices", get(handlers::prices))
        .route("/prices/latest", get(handlers::latest_prices))
        .route("/symbols", get(handlers::symbols))
        .route("/export/{file}", get(handlers::export_csv))
        .route("/fetch", post(handlers::start_fetch))
        .route("/fetch/status", get(handlers::fetch_status))
        .route("/cleanup", post(handlers::cleanup))
        .route("/session", post(handlers::create_session))
        .route(
            "/session/{id}",
            get(handlers::get_session).put(handlers::update_session),
        );

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn run(settings: &ServerSettings, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
