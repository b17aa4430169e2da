//! HTTP session transport
//!
//! Thin adapter over [`SessionManager`]: every turn goes through the session
//! loop, archived orders are read straight from the database.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::session::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub db: Database,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, db: Database) -> Self {
        Self { sessions, db }
    }
}
