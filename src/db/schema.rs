//! Database schema and types

use crate::state_machine::{OrderState, OrderStatus, OrderType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS archived_orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    status TEXT NOT NULL,
    order_type TEXT NOT NULL,
    total_cents INTEGER NOT NULL,
    item_count INTEGER NOT NULL,
    turn_count INTEGER NOT NULL,
    state TEXT NOT NULL,
    archived_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archived_orders_session ON archived_orders(session_id, id DESC);
CREATE INDEX IF NOT EXISTS idx_archived_orders_archived ON archived_orders(archived_at DESC);
CREATE INDEX IF NOT EXISTS idx_archived_orders_status ON archived_orders(status);
";

/// A finished order as stored
///
/// Summary columns are denormalized from `state` for querying; `state` is
/// the source of truth when reading back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedOrder {
    pub id: i64,
    pub session_id: String,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub total_cents: u64,
    pub state: OrderState,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedOrder {
    pub fn from_state(id: i64, session_id: String, state: OrderState, archived_at: DateTime<Utc>) -> Self {
        Self {
            id,
            session_id,
            status: state.order_status,
            order_type: state.order_type,
            total_cents: state.total_cents(),
            state,
            archived_at,
        }
    }
}
