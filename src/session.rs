//! Session loop and manager
//!
//! Each session runs as its own tokio task that exclusively owns its
//! [`OrderState`]. Turns arrive over a channel, so a session processes
//! exactly one turn at a time without locks around the order.

mod runtime;
pub mod traits;

#[cfg(test)]
pub mod testing;

use runtime::{SessionCommand, SessionDeps, SessionRuntime};
pub use traits::*;

use crate::handlers::HandlerRegistry;
use crate::menu::Menu;
use crate::state_machine::{OrderState, OrderStatus, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Session loop tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Generation attempts per turn
    pub max_attempts: u32,
    /// Per-call generation timeout
    pub llm_timeout: Duration,
    /// First retry delay; doubles each attempt
    pub backoff_base: Duration,
    pub idle_timeout: Duration,
    /// Successful turns before the session is abandoned
    pub max_turns: u32,
    /// Conversation messages kept for the generator
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            llm_timeout: Duration::from_secs(20),
            backoff_base: Duration::from_millis(250),
            idle_timeout: Duration::from_secs(15 * 60),
            max_turns: 60,
            history_limit: 20,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_or("ORDER_FLOW_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            llm_timeout: parse_env("ORDER_FLOW_LLM_TIMEOUT_SECS")
                .map_or(defaults.llm_timeout, Duration::from_secs),
            backoff_base: defaults.backoff_base,
            idle_timeout: parse_env("ORDER_FLOW_IDLE_TIMEOUT_SECS")
                .map_or(defaults.idle_timeout, Duration::from_secs),
            max_turns: env_or("ORDER_FLOW_MAX_TURNS", defaults.max_turns),
            history_limit: env_or("ORDER_FLOW_HISTORY_LIMIT", defaults.history_limit),
        }
    }

    /// Delay before retry number `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_env(key).unwrap_or(default)
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

/// Result of one turn as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub response: String,
    pub status: OrderStatus,
    /// True once the order is completed or abandoned
    pub finished: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session {0} stopped before replying")]
    Closed(String),
}

/// Handle to a running session task
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    fn is_live(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

/// Maps session ids to running session tasks
pub struct SessionManager {
    deps: SessionDeps,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        menu: Arc<Menu>,
        llm: Arc<dyn LlmClient>,
        archive: Arc<dyn OrderArchive>,
    ) -> Self {
        Self {
            deps: SessionDeps {
                config,
                menu,
                router: Arc::new(Router::default()),
                handlers: Arc::new(HandlerRegistry::default()),
                llm,
                archive,
            },
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn menu(&self) -> &Menu {
        &self.deps.menu
    }

    /// Start a new session and return its id
    pub async fn create_session(&self) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let handle = self.spawn(&session_id);
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, h| h.is_live());
        sessions.insert(session_id.clone(), handle);
        session_id
    }

    /// Number of sessions whose task is still running
    #[cfg(test)]
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.values().filter(|h| h.is_live()).count()
    }

    /// Number of handles held, live or not
    #[cfg(test)]
    pub async fn tracked_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Run one turn. Unknown or finished ids start a fresh session.
    pub async fn turn(&self, session_id: &str, utterance: &str) -> Result<TurnOutcome, SessionError> {
        // The task may exit between lookup and send; one retry covers that
        for _ in 0..2 {
            let handle = self.get_or_create(session_id).await;
            let (reply, rx) = oneshot::channel();
            let command = SessionCommand::Turn {
                utterance: utterance.to_string(),
                reply,
            };
            if handle.command_tx.send(command).await.is_err() {
                continue;
            }
            return rx.await.map_err(|_| SessionError::Closed(session_id.to_string()));
        }
        Err(SessionError::Closed(session_id.to_string()))
    }

    /// Current order of a live session
    pub async fn snapshot(&self, session_id: &str) -> Result<OrderState, SessionError> {
        let handle = self.live_handle(session_id).await?;
        let (reply, rx) = oneshot::channel();
        handle
            .command_tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::NotFound(session_id.to_string()))?;
        rx.await.map_err(|_| SessionError::Closed(session_id.to_string()))
    }

    /// Abandon a live session
    pub async fn abandon(&self, session_id: &str) -> Result<TurnOutcome, SessionError> {
        let handle = self.live_handle(session_id).await?;
        let (reply, rx) = oneshot::channel();
        handle
            .command_tx
            .send(SessionCommand::Abandon { reply })
            .await
            .map_err(|_| SessionError::NotFound(session_id.to_string()))?;
        rx.await.map_err(|_| SessionError::Closed(session_id.to_string()))
    }

    async fn live_handle(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|h| h.is_live())
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Ok(handle) = self.live_handle(session_id).await {
            return handle;
        }

        let mut sessions = self.sessions.write().await;
        // Another caller may have started it while we waited for the lock
        if let Some(handle) = sessions.get(session_id).filter(|h| h.is_live()) {
            return handle.clone();
        }
        sessions.retain(|_, h| h.is_live());
        tracing::info!(session_id = %session_id, "Starting fresh session for unknown id");
        let handle = self.spawn(session_id);
        sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    fn spawn(&self, session_id: &str) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(8);
        let runtime = SessionRuntime::new(session_id.to_string(), self.deps.clone(), command_rx);
        tokio::spawn(runtime.run());
        SessionHandle { command_tx }
    }
}
