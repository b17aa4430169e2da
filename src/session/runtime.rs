//! Per-session turn loop

use super::traits::{LlmClient, OrderArchive};
use super::{SessionConfig, TurnOutcome};
use crate::handlers::{Handler, HandlerError, HandlerRegistry, TurnContext};
use crate::llm::{LlmError, LlmMessage};
use crate::menu::Menu;
use crate::state_machine::{abandon, apply, OrderState, Route, Router, TransitionResult};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Reply when generation keeps producing unusable output
pub const CLARIFY_REPLY: &str = "Sorry, I didn't quite catch that. Could you say that again?";
/// Reply when the generator is unreachable
pub const TROUBLE_REPLY: &str = "Sorry, I'm having trouble right now. Please try again in a moment.";
pub const ABANDONED_REPLY: &str = "Okay, I've cancelled this order.";
pub const TURN_LIMIT_REPLY: &str =
    "Sorry, this order has gone on too long, so I've cancelled it. Please start a new order.";
pub const CLOSED_REPLY: &str = "This order is already closed. Please start a new order.";

/// Commands accepted by a session task
#[derive(Debug)]
pub enum SessionCommand {
    Turn {
        utterance: String,
        reply: oneshot::Sender<TurnOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<OrderState>,
    },
    Abandon {
        reply: oneshot::Sender<TurnOutcome>,
    },
}

/// Why a turn produced no committed update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnFailure {
    /// Output failed validation or was rejected by the updater
    Invalid,
    /// Generator errored or timed out
    Upstream,
}

/// Shared, read-only collaborators of every session
#[derive(Clone)]
pub struct SessionDeps {
    pub config: SessionConfig,
    pub menu: Arc<Menu>,
    pub router: Arc<Router>,
    pub handlers: Arc<HandlerRegistry>,
    pub llm: Arc<dyn LlmClient>,
    pub archive: Arc<dyn OrderArchive>,
}

/// Owns one session's order state for the lifetime of the session
pub struct SessionRuntime {
    session_id: String,
    state: OrderState,
    history: Vec<LlmMessage>,
    deps: SessionDeps,
    command_rx: mpsc::Receiver<SessionCommand>,
}

impl SessionRuntime {
    pub fn new(
        session_id: String,
        deps: SessionDeps,
        command_rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            session_id,
            state: OrderState::new(),
            history: Vec::new(),
            deps,
            command_rx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "Starting session");

        loop {
            let command =
                match tokio::time::timeout(self.deps.config.idle_timeout, self.command_rx.recv()).await {
                    Ok(Some(command)) => command,
                    Ok(None) => {
                        self.abandon_with_reason("closed");
                        break;
                    }
                    Err(_) => {
                        self.abandon_with_reason("idle_timeout");
                        break;
                    }
                };

            match command {
                SessionCommand::Turn { utterance, reply } => {
                    let outcome = self.handle_turn(&utterance).await;
                    let _ = reply.send(outcome);
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                SessionCommand::Abandon { reply } => {
                    self.abandon_with_reason("customer");
                    let _ = reply.send(self.outcome(ABANDONED_REPLY));
                }
            }

            if self.state.is_terminal() {
                break;
            }
        }

        if self.state.is_terminal() {
            self.archive();
        }

        tracing::info!(
            session_id = %self.session_id,
            status = %self.state.order_status,
            turns = self.state.turn_count,
            "Session stopped"
        );
    }

    async fn handle_turn(&mut self, utterance: &str) -> TurnOutcome {
        if self.state.is_terminal() {
            return self.outcome(CLOSED_REPLY);
        }
        if self.state.turn_count >= self.deps.config.max_turns {
            self.abandon_with_reason("max_turns");
            return self.outcome(TURN_LIMIT_REPLY);
        }

        let decision = self.deps.router.route(&self.state);
        if let Some(anomaly) = &decision.anomaly {
            anomaly.emit(&self.session_id);
        }
        let handler_id = match decision.route {
            Route::Dispatch(id) => id,
            Route::Terminal => return self.outcome(CLOSED_REPLY),
        };
        let Some(handler) = self.deps.handlers.get(handler_id) else {
            tracing::error!(session_id = %self.session_id, handler = %handler_id, "No handler registered");
            return self.outcome(TROUBLE_REPLY);
        };

        tracing::debug!(
            session_id = %self.session_id,
            handler = %handler_id,
            status = %self.state.order_status,
            "Dispatching turn"
        );

        match self.run_attempts(handler.as_ref(), utterance).await {
            Ok(result) => {
                let response = result.response.clone();
                self.commit(utterance, result);
                self.outcome(&response)
            }
            Err(TurnFailure::Invalid) => self.outcome(CLARIFY_REPLY),
            Err(TurnFailure::Upstream) => self.outcome(TROUBLE_REPLY),
        }
    }

    /// Generate, validate and apply with a bounded number of attempts.
    /// Never touches `self.state`.
    async fn run_attempts(
        &self,
        handler: &dyn Handler,
        utterance: &str,
    ) -> Result<TransitionResult, TurnFailure> {
        let config = &self.deps.config;
        let ctx = TurnContext {
            state: &self.state,
            menu: &self.deps.menu,
            history: &self.history,
            utterance,
        };
        let mut failure = TurnFailure::Invalid;

        for attempt in 1..=config.max_attempts {
            let result = tokio::time::timeout(config.llm_timeout, handler.handle(&ctx, self.deps.llm.as_ref()))
                .await
                .unwrap_or_else(|_| Err(HandlerError::Upstream(LlmError::timeout(config.llm_timeout))));

            match result {
                Ok(contract) => match apply(&self.state, &contract) {
                    Ok(applied) => return Ok(applied),
                    Err(e) => {
                        tracing::warn!(
                            session_id = %self.session_id,
                            handler = %handler.id(),
                            attempt,
                            error = %e,
                            "Handler output rejected"
                        );
                        failure = TurnFailure::Invalid;
                    }
                },
                Err(HandlerError::Validation(e)) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        handler = %handler.id(),
                        attempt,
                        error = %e,
                        "Handler output failed validation"
                    );
                    failure = TurnFailure::Invalid;
                }
                Err(HandlerError::Upstream(e)) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        handler = %handler.id(),
                        attempt,
                        error = %e,
                        retryable = e.kind.is_retryable(),
                        "Generation failed"
                    );
                    failure = TurnFailure::Upstream;
                    if !e.kind.is_retryable() {
                        break;
                    }
                    if attempt < config.max_attempts {
                        let delay = e.retry_after.unwrap_or_else(|| config.backoff(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            session_id = %self.session_id,
            handler = %handler.id(),
            failure = ?failure,
            "Turn failed, state unchanged"
        );
        Err(failure)
    }

    fn commit(&mut self, utterance: &str, result: TransitionResult) {
        for anomaly in &result.anomalies {
            anomaly.emit(&self.session_id);
        }
        if result.new_state.order_status != self.state.order_status {
            tracing::info!(
                session_id = %self.session_id,
                from = %self.state.order_status,
                to = %result.new_state.order_status,
                "Order status changed"
            );
        }

        self.state = result.new_state;
        self.state.record_turn(Utc::now());

        self.history.push(LlmMessage::user(utterance));
        self.history.push(LlmMessage::assistant(result.response));
        let limit = self.deps.config.history_limit;
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    fn abandon_with_reason(&mut self, reason: &'static str) {
        if let Ok(next) = abandon(&self.state) {
            tracing::info!(session_id = %self.session_id, reason, "Order abandoned");
            self.state = next;
        }
    }

    /// Fire-and-forget handoff of the final state
    fn archive(&self) {
        let archive = Arc::clone(&self.deps.archive);
        let session_id = self.session_id.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            match archive.archive(&session_id, &state).await {
                Ok(()) => tracing::info!(session_id = %session_id, status = %state.order_status, "Order archived"),
                Err(e) => tracing::error!(session_id = %session_id, error = %e, "Failed to archive order"),
            }
        });
    }

    fn outcome(&self, response: &str) -> TurnOutcome {
        TurnOutcome {
            session_id: self.session_id.clone(),
            response: response.to_string(),
            status: self.state.order_status,
            finished: self.state.is_terminal(),
        }
    }
}
