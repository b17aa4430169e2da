//! API request and response types

use crate::db::ArchivedOrder;
use crate::menu::Menu;
use crate::state_machine::{HandlerId, OrderState, OrderStatus};
use serde::{Deserialize, Serialize};

/// Request to run one customer turn
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub utterance: String,
}

/// Response for session creation
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// Response with a live session's order
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub order: OrderState,
    pub total: String,
    /// Stage that will handle the next turn; `None` once the order is closed
    pub next_handler: Option<HandlerId>,
}

/// Query for archived order listing
#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Response with a list of archived orders
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<ArchivedOrder>,
}

/// Response for the menu
#[derive(Debug, Serialize)]
pub struct MenuResponse {
    pub menu: Menu,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
