//! Database module
//!
//! Archives the final state of completed and abandoned orders.

mod schema;

pub use schema::*;

use crate::state_machine::{OrderState, OrderStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Archive Operations ====================

    /// Store the final state of a session
    pub fn archive_order(&self, session_id: &str, state: &OrderState) -> DbResult<ArchivedOrder> {
        let conn = self.conn()?;
        let now = Utc::now();
        let state_json = serde_json::to_string(state)?;
        let total_cents = i64::try_from(state.total_cents()).unwrap_or(i64::MAX);
        let item_count = i64::try_from(state.item_count()).unwrap_or(i64::MAX);

        conn.execute(
            "INSERT INTO archived_orders (session_id, status, order_type, total_cents, item_count, turn_count, state, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session_id,
                state.order_status.as_str(),
                state.order_type.as_str(),
                total_cents,
                item_count,
                state.turn_count,
                state_json,
                now.to_rfc3339()
            ],
        )?;

        Ok(ArchivedOrder::from_state(
            conn.last_insert_rowid(),
            session_id.to_string(),
            state.clone(),
            now,
        ))
    }

    /// Most recent archived order for a session
    pub fn get_archived_order(&self, session_id: &str) -> DbResult<ArchivedOrder> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, state, archived_at FROM archived_orders
             WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;

        let row = stmt
            .query_row(params![session_id], read_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::OrderNotFound(session_id.to_string()),
                other => DbError::Sqlite(other),
            })?;
        row.into_order()
    }

    /// List archived orders, newest first
    pub fn list_archived_orders(
        &self,
        status: Option<OrderStatus>,
        limit: u32,
    ) -> DbResult<Vec<ArchivedOrder>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, state, archived_at FROM archived_orders
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![status.map(OrderStatus::as_str), limit], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_order).collect()
    }
}

/// Columns read before the state JSON is decoded
struct RawRow {
    id: i64,
    session_id: String,
    state: String,
    archived_at: String,
}

impl RawRow {
    fn into_order(self) -> DbResult<ArchivedOrder> {
        let state: OrderState = serde_json::from_str(&self.state)?;
        Ok(ArchivedOrder::from_state(
            self.id,
            self.session_id,
            state,
            parse_datetime(&self.archived_at),
        ))
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        state: row.get(2)?,
        archived_at: row.get(3)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
