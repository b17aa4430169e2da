//! HTTP request handlers

use super::types::{
    CreateSessionResponse, ErrorResponse, MenuResponse, OrderListQuery, OrderListResponse,
    SessionResponse, TurnRequest,
};
use super::AppState;
use crate::db::{ArchivedOrder, DbError};
use crate::session::{SessionError, TurnOutcome};
use crate::state_machine::state::format_cents;
use crate::state_machine::{next_handler, Route};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

const DEFAULT_ORDER_LIMIT: u32 = 50;
const MAX_ORDER_LIMIT: u32 = 500;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/turn", post(run_turn))
        .route("/api/sessions/:id/abandon", post(abandon_session))
        // Archive
        .route("/api/orders", get(list_orders))
        .route("/api/orders/:id", get(get_order))
        // Catalog
        .route("/api/menu", get(get_menu))
        // Version
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreateSessionResponse>) {
    let session_id = state.sessions.create_session().await;
    tracing::info!(session_id = %session_id, "Session created");
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let order = state.sessions.snapshot(&id).await?;
    let upcoming = match next_handler(&order) {
        Route::Dispatch(handler) => Some(handler),
        Route::Terminal => None,
    };
    Ok(Json(SessionResponse {
        session_id: id,
        total: format_cents(order.total_cents()),
        next_handler: upcoming,
        order,
    }))
}

async fn run_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    let utterance = req.utterance.trim();
    if utterance.is_empty() {
        return Err(AppError::BadRequest("utterance must not be empty".to_string()));
    }
    let outcome = state.sessions.turn(&id, utterance).await?;
    Ok(Json(outcome))
}

async fn abandon_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TurnOutcome>, AppError> {
    Ok(Json(state.sessions.abandon(&id).await?))
}

// ============================================================
// Archive
// ============================================================

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ORDER_LIMIT)
        .clamp(1, MAX_ORDER_LIMIT);
    let orders = state.db.list_archived_orders(query.status, limit)?;
    Ok(Json(OrderListResponse { orders }))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArchivedOrder>, AppError> {
    Ok(Json(state.db.get_archived_order(&id)?))
}

// ============================================================
// Catalog
// ============================================================

async fn get_menu(State(state): State<AppState>) -> Json<MenuResponse> {
    Json(MenuResponse {
        menu: state.sessions.menu().clone(),
    })
}

async fn get_version() -> &'static str {
    concat!("order-flow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Closed(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::OrderNotFound(_) => AppError::NotFound(e.to_string()),
            other => {
                tracing::error!(error = %other, "Database request failed");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
