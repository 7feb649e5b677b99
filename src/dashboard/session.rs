// Per-browser UI state, keyed by UUID

use crate::models::{FetchMode, SmaPeriod};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const MAX_RESULTS_OPTIONS: [usize; 4] = [10, 25, 50, 100];

/// Idle sessions older than this are dropped when new ones are created
const SESSION_IDLE_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    #[default]
    Overview,
    AboveSma,
    BreakoutPatterns,
    NearSma,
    DataExplorer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    pub page: Page,
    pub sma_period: SmaPeriod,
    pub fetch_mode: FetchMode,
    pub max_stocks: Option<usize>,
    pub min_pct: f64,
    pub max_results: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            page: Page::Overview,
            sma_period: SmaPeriod::Twenty,
            fetch_mode: FetchMode::PopularOnly,
            max_stocks: Some(50),
            min_pct: 0.0,
            max_results: 25,
        }
    }
}

/// Partial update; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
pub struct UiStateUpdate {
    pub page: Option<Page>,
    pub sma_period: Option<SmaPeriod>,
    pub fetch_mode: Option<FetchMode>,
    pub max_stocks: Option<usize>,
    pub min_pct: Option<f64>,
    pub max_results: Option<usize>,
}

impl UiState {
    /// Apply `update`, leaving `self` untouched when any field is invalid
    pub fn apply(&mut self, update: UiStateUpdate) -> Result<(), String> {
        if let Some(max_results) = update.max_results {
            if !MAX_RESULTS_OPTIONS.contains(&max_results) {
                return Err(format!(
                    "max_results must be one of {:?}, got {}",
                    MAX_RESULTS_OPTIONS, max_results
                ));
            }
        }
        if let Some(min_pct) = update.min_pct {
            if !min_pct.is_finite() || min_pct < 0.0 {
                return Err(format!("min_pct must be a non-negative number, got {}", min_pct));
            }
        }
        if update.max_stocks == Some(0) {
            return Err("max_stocks must be at least 1".to_string());
        }

        if let Some(page) = update.page {
            self.page = page;
        }
        if let Some(period) = update.sma_period {
            self.sma_period = period;
        }
        if let Some(mode) = update.fetch_mode {
            self.fetch_mode = mode;
        }
        if update.max_stocks.is_some() {
            self.max_stocks = update.max_stocks;
        }
        if let Some(min_pct) = update.min_pct {
            self.min_pct = min_pct;
        }
        if let Some(max_results) = update.max_results {
            self.max_results = max_results;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub state: UiState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            state: UiState::default(),
            updated_at: now,
        };

        let mut sessions = self.inner.write().await;
        let cutoff = now - Duration::hours(SESSION_IDLE_HOURS);
        sessions.retain(|_, s| s.updated_at >= cutoff);
        sessions.insert(session.id, session.clone());

        tracing::debug!("New session {} ({} active)", session.id, sessions.len());
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.read().await.get(&id).cloned()
    }

    /// `Ok(None)` when the session does not exist
    pub async fn update(&self, id: Uuid, update: UiStateUpdate) -> Result<Option<Session>, String> {
        let mut sessions = self.inner.write().await;
        let Some(session) = sessions.get_mut(&id) else {
            return Ok(None);
        };

        let mut state = session.state.clone();
        state.apply(update)?;
        session.state = state;
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
