//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`;
//! the round loop publishes into it after every tick.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::engine::pool::PoolDelta;
use crate::engine::{OperatorOverride, RoundSettlement, RoundSnapshot, SimulationSession};
use crate::strategy::selector::SelectionReason;
use crate::types::{parse_areas, WinningStructure};

/// Rounds kept for `/api/rounds`.
pub const ROUND_HISTORY_LIMIT: usize = 100;
const POOL_DELTA_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub round: RwLock<Option<RoundSnapshot>>,
    pub pool: RwLock<PoolStatus>,
    pub rounds: RwLock<Vec<RoundSummary>>,
    /// Configured structures, used to resolve the weight of an override.
    pub structures: Vec<WinningStructure>,
    pub operator: OperatorOverride,
}

impl DashboardState {
    pub fn new(session: &SimulationSession, operator: OperatorOverride) -> Self {
        Self {
            round: RwLock::new(None),
            pool: RwLock::new(PoolStatus::from_session(session)),
            rounds: RwLock::new(Vec::new()),
            structures: session.rules().structures.clone(),
            operator,
        }
    }

    /// Replace the current round view and pool view.
    pub async fn publish(&self, snapshot: RoundSnapshot, session: &SimulationSession) {
        *self.round.write().await = Some(snapshot);
        *self.pool.write().await = PoolStatus::from_session(session);
    }

    /// Append a settled round, keeping the last [`ROUND_HISTORY_LIMIT`].
    pub async fn record_settlement(&self, settlement: &RoundSettlement) {
        let mut rounds = self.rounds.write().await;
        rounds.push(RoundSummary::from(settlement));
        let excess = rounds.len().saturating_sub(ROUND_HISTORY_LIMIT);
        rounds.drain(..excess);
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub value: Decimal,
    pub target_rtp: f64,
    pub tax_rate: Decimal,
    pub recent_deltas: Vec<PoolDelta>,
}

impl PoolStatus {
    fn from_session(session: &SimulationSession) -> Self {
        let pool = session.pool();
        Self {
            value: pool.value(),
            target_rtp: pool.current_target_rtp(),
            tax_rate: pool.tax_rate(),
            recent_deltas: pool.recent_deltas(POOL_DELTA_LIMIT).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round_id: u64,
    pub timestamp: String,
    pub outcome: WinningStructure,
    pub reason: SelectionReason,
    pub players: usize,
    pub total_wagered: f64,
    pub total_payout: f64,
    pub platform_profit: f64,
    pub pool_after: Decimal,
    pub target_rtp: f64,
}

impl From<&RoundSettlement> for RoundSummary {
    fn from(s: &RoundSettlement) -> Self {
        Self {
            round_id: s.round_id,
            timestamp: Utc::now().to_rfc3339(),
            outcome: s.outcome.clone(),
            reason: s.reason,
            players: s.players.len(),
            total_wagered: s.total_wagered,
            total_payout: s.total_payout,
            platform_profit: s.platform_profit,
            pool_after: s.pool_after,
            target_rtp: s.target_rtp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverrideRequest {
    pub areas: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/round
pub async fn get_round(State(state): State<AppState>) -> Json<Option<RoundSnapshot>> {
    Json(state.round.read().await.clone())
}

/// GET /api/pool
pub async fn get_pool(State(state): State<AppState>) -> Json<PoolStatus> {
    Json(state.pool.read().await.clone())
}

/// GET /api/rounds
pub async fn get_rounds(State(state): State<AppState>) -> Json<Vec<RoundSummary>> {
    let rounds = state.rounds.read().await;
    let start = rounds.len().saturating_sub(ROUND_HISTORY_LIMIT);
    Json(rounds[start..].to_vec())
}

/// POST /api/override
pub async fn set_override(
    State(state): State<AppState>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<WinningStructure>, ApiError> {
    if request.areas.is_empty() {
        return Err(bad_request("override needs at least one area"));
    }
    let mut areas = parse_areas(&request.areas).map_err(|e| bad_request(e.to_string()))?;
    areas.sort_unstable();
    areas.dedup();

    // Keep the configured weight when the areas name a known structure.
    let weight = state
        .structures
        .iter()
        .find(|s| {
            let mut known = s.areas.clone();
            known.sort_unstable();
            known == areas
        })
        .map_or(0, |s| s.weight);
    let structure = WinningStructure::new(areas, weight);

    info!(outcome = %structure, "Operator override set");
    state.operator.set(structure.clone());
    Ok(Json(structure))
}

/// DELETE /api/override
pub async fn clear_override(State(state): State<AppState>) -> StatusCode {
    state.operator.clear();
    info!("Operator override cleared");
    StatusCode::NO_CONTENT
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::RoundInput;
    use crate::types::OutcomeArea;

    fn session() -> SimulationSession {
        SimulationSession::new(AppConfig::default().rules().unwrap(), 1)
    }

    fn state() -> AppState {
        Arc::new(DashboardState::new(&session(), OperatorOverride::new()))
    }

    #[tokio::test]
    async fn test_round_history_is_capped() {
        let mut session = session();
        let state = DashboardState::new(&session, OperatorOverride::new());
        for _ in 0..(ROUND_HISTORY_LIMIT + 5) {
            let mut round = session.begin_round(RoundInput::default());
            let settled = round.run_to_completion(&mut session).unwrap();
            state.record_settlement(&settled).await;
        }
        let rounds = state.rounds.read().await;
        assert_eq!(rounds.len(), ROUND_HISTORY_LIMIT);
        assert_eq!(rounds[0].round_id, 6);
    }

    #[tokio::test]
    async fn test_set_override_handler_resolves_weight() {
        let state = state();
        let request = OverrideRequest { areas: vec![4, 2, 3, 1] };
        let Json(structure) = set_override(State(state.clone()), Json(request)).await.unwrap();
        assert_eq!(structure.weight, 60);
        assert_eq!(state.operator.peek(), Some(structure));
    }

    #[tokio::test]
    async fn test_set_override_rejects_bad_areas() {
        let state = state();
        let err = set_override(State(state.clone()), Json(OverrideRequest { areas: vec![0] }))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = set_override(State(state.clone()), Json(OverrideRequest { areas: vec![] }))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(state.operator.peek().is_none());
    }

    #[tokio::test]
    async fn test_clear_override_handler() {
        let state = state();
        state
            .operator
            .set(WinningStructure::new(vec![OutcomeArea::new(5).unwrap()], 965));
        assert_eq!(clear_override(State(state.clone())).await, StatusCode::NO_CONTENT);
        assert!(state.operator.peek().is_none());
    }

    #[test]
    fn test_pool_status_serializes() {
        let status = PoolStatus::from_session(&session());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["target_rtp"], 1.0);
        assert!(json["recent_deltas"].as_array().unwrap().is_empty());
    }
}
