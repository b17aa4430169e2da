//! Mock implementations for testing
//!
//! These mocks drive the session loop without network or disk I/O.

use super::traits::{LlmClient, OrderArchive};
use crate::llm::{LlmError, LlmRequest, LlmResponse};
use crate::state_machine::OrderState;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue raw model text
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::text(text));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Archive
// ============================================================================

/// Archive that keeps finished orders in memory
#[derive(Default)]
pub struct MockArchive {
    pub archived: Mutex<Vec<(String, OrderState)>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the fire-and-forget handoff to land
    pub async fn wait_for(&self, count: usize) -> Vec<(String, OrderState)> {
        for _ in 0..200 {
            {
                let archived = self.archived.lock().unwrap();
                if archived.len() >= count {
                    return archived.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.archived.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderArchive for MockArchive {
    async fn archive(&self, session_id: &str, state: &OrderState) -> Result<(), String> {
        self.archived
            .lock()
            .unwrap()
            .push((session_id.to_string(), state.clone()));
        Ok(())
    }
}

// ============================================================================
// Session loop tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::LlmErrorKind;
    use crate::llm::MessageRole;
    use crate::menu::Menu;
    use crate::session::runtime::{CLARIFY_REPLY, TROUBLE_REPLY, TURN_LIMIT_REPLY};
    use crate::session::{SessionConfig, SessionError, SessionManager};
    use crate::state_machine::{OrderStatus, OrderType};
    use std::sync::Arc;

    const TAKEOUT: &str = r#"{"agent_response": "Great, takeout it is! What would you like to order?",
        "order_update": {"order_type": "takeout"}}"#;
    const KING_BURGER: &str = r#"{"agent_response": "Sure, a King Burger. Anything else?",
        "order_update": {"items": [{"op": "upsert", "name": "King Burger", "quantity": 1}]}}"#;
    const FINISHED: &str = r#"{"agent_response": "That's one King Burger for $9.99. Is that correct?",
        "order_finished": true}"#;
    const CONFIRMED: &str = r#"{"agent_response": "Great! Can I have a name for this order, please?",
        "order_confirmed": "true"}"#;
    const NAME: &str = r#"{"agent_response": "Alright, Sam! Give me one second as I place the order.",
        "order_update": {"customer_info": {"name": "Sam"}}, "info_complete": true}"#;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            backoff_base: Duration::from_millis(1),
            llm_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        }
    }

    fn manager_with(
        config: SessionConfig,
        llm: &Arc<MockLlmClient>,
        archive: &Arc<MockArchive>,
    ) -> SessionManager {
        SessionManager::new(
            config,
            Arc::new(Menu::default()),
            llm.clone(),
            archive.clone(),
        )
    }

    fn setup() -> (SessionManager, Arc<MockLlmClient>, Arc<MockArchive>) {
        let llm = Arc::new(MockLlmClient::new());
        let archive = Arc::new(MockArchive::new());
        (manager_with(fast_config(), &llm, &archive), llm, archive)
    }

    #[tokio::test]
    async fn test_full_order_flow() {
        let (manager, llm, archive) = setup();
        for raw in [TAKEOUT, KING_BURGER, FINISHED, CONFIRMED, NAME] {
            llm.queue_text(raw);
        }
        let id = manager.create_session().await;

        let steps = [
            ("takeout please", OrderStatus::CollectingItems),
            ("a king burger", OrderStatus::CollectingItems),
            ("that's all", OrderStatus::ItemsConfirmed),
            ("yes", OrderStatus::AwaitingUserInfo),
            ("Sam", OrderStatus::Completed),
        ];
        for (utterance, expected) in steps {
            let outcome = manager.turn(&id, utterance).await.unwrap();
            assert_eq!(outcome.status, expected, "after {utterance:?}");
            assert_eq!(outcome.session_id, id);
        }

        let archived = archive.wait_for(1).await;
        assert_eq!(archived.len(), 1);
        let (archived_id, state) = &archived[0];
        assert_eq!(archived_id, &id);
        assert_eq!(state.order_status, OrderStatus::Completed);
        assert_eq!(state.order_type, OrderType::Takeout);
        assert_eq!(state.total_cents(), 999);
        assert_eq!(state.customer_info.name.as_deref(), Some("Sam"));
        assert_eq!(state.turn_count, 5);
        assert!(state.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_response_is_agent_text_verbatim() {
        let (manager, llm, _) = setup();
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;

        let outcome = manager.turn(&id, "I'd like takeout").await.unwrap();
        assert_eq!(
            outcome.response,
            "Great, takeout it is! What would you like to order?"
        );
        assert!(!outcome.finished);
    }

    #[tokio::test]
    async fn test_finished_session_restarts_fresh() {
        let (manager, llm, archive) = setup();
        for raw in [TAKEOUT, KING_BURGER, FINISHED, CONFIRMED, NAME] {
            llm.queue_text(raw);
        }
        let id = manager.create_session().await;
        for utterance in ["takeout", "king burger", "done", "yes", "Sam"] {
            manager.turn(&id, utterance).await.unwrap();
        }
        archive.wait_for(1).await;

        llm.queue_text(r#"{"agent_response": "Is this for here or to go?"}"#);
        let outcome = manager.turn(&id, "hello again").await.unwrap();
        assert_eq!(outcome.status, OrderStatus::Started);
        let fresh = manager.snapshot(&id).await.unwrap();
        assert!(fresh.items.is_empty());
        assert_eq!(fresh.order_type, OrderType::Unset);
        assert_eq!(fresh.turn_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_starts_new_session() {
        let (manager, llm, _) = setup();
        llm.queue_text(TAKEOUT);

        let outcome = manager.turn("walk-in", "takeout").await.unwrap();
        assert_eq!(outcome.status, OrderStatus::CollectingItems);
        assert_eq!(manager.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_dead_sessions_are_pruned_on_lookup() {
        let (manager, llm, archive) = setup();
        let ids = [
            manager.create_session().await,
            manager.create_session().await,
        ];
        for id in &ids {
            manager.abandon(id).await.unwrap();
        }
        archive.wait_for(2).await;
        for _ in 0..100 {
            if manager.active_sessions().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.tracked_sessions().await, 2);

        llm.queue_text(TAKEOUT);
        manager.turn("walk-in", "takeout").await.unwrap();
        assert_eq!(manager.tracked_sessions().await, 1);
        assert_eq!(manager.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_output_is_retried() {
        let (manager, llm, _) = setup();
        llm.queue_text("not json at all");
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;

        let outcome = manager.turn(&id, "takeout").await.unwrap();
        assert_eq!(outcome.status, OrderStatus::CollectingItems);
        assert_eq!(llm.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_validation_leaves_state_unchanged() {
        let (manager, llm, _) = setup();
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;
        manager.turn(&id, "takeout").await.unwrap();
        let before = manager.snapshot(&id).await.unwrap();

        llm.queue_text(r#"{"agent_response": "Sure", "order_update": {"items": [{"op": "upsert", "name": "Pizza"}]}}"#);
        llm.queue_text(r#"{"agent_response": ""}"#);
        llm.queue_text(r#"{"order_finished": true}"#);

        let outcome = manager.turn(&id, "a pizza").await.unwrap();
        assert_eq!(outcome.response, CLARIFY_REPLY);
        assert_eq!(outcome.status, OrderStatus::CollectingItems);
        assert_eq!(manager.snapshot(&id).await.unwrap(), before);
        assert_eq!(llm.recorded_requests().len(), 4);
    }

    #[tokio::test]
    async fn test_menu_stage_cannot_switch_order_type() {
        let (manager, llm, _) = setup();
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;
        manager.turn(&id, "takeout").await.unwrap();

        llm.queue_text(r#"{"agent_response": "Delivery it is", "order_update": {"order_type": "delivery"}}"#);

        let outcome = manager.turn(&id, "actually make it delivery").await.unwrap();
        assert_eq!(outcome.response, "Delivery it is");
        assert_eq!(llm.recorded_requests().len(), 2);
        let after = manager.snapshot(&id).await.unwrap();
        assert_eq!(after.order_type, OrderType::Takeout);
        assert_eq!(after.turn_count, 2);
    }

    #[tokio::test]
    async fn test_confirmation_item_delta_is_ignored_and_commits() {
        let (manager, llm, _) = setup();
        for raw in [TAKEOUT, KING_BURGER, FINISHED] {
            llm.queue_text(raw);
        }
        let id = manager.create_session().await;
        for utterance in ["takeout", "king burger", "that's all"] {
            manager.turn(&id, utterance).await.unwrap();
        }
        let before = manager.snapshot(&id).await.unwrap();
        assert_eq!(before.order_status, OrderStatus::ItemsConfirmed);

        llm.queue_text(r#"{"agent_response": "We don't have milkshakes. Is the order correct?",
            "order_update": {"items": [{"op": "upsert", "name": "Milkshake"}]}}"#);
        let outcome = manager.turn(&id, "and a milkshake").await.unwrap();
        assert_eq!(
            outcome.response,
            "We don't have milkshakes. Is the order correct?"
        );
        assert_eq!(outcome.status, OrderStatus::ItemsConfirmed);
        assert_eq!(llm.recorded_requests().len(), 4);

        let after = manager.snapshot(&id).await.unwrap();
        assert_eq!(after.items, before.items);
        assert_eq!(after.turn_count, before.turn_count + 1);
    }

    #[tokio::test]
    async fn test_retryable_upstream_errors_exhaust_budget() {
        let (manager, llm, _) = setup();
        for _ in 0..3 {
            llm.queue_error(LlmError::server_error("overloaded"));
        }
        let id = manager.create_session().await;

        let outcome = manager.turn(&id, "hi").await.unwrap();
        assert_eq!(outcome.response, TROUBLE_REPLY);
        assert_eq!(outcome.status, OrderStatus::Started);
        assert_eq!(llm.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let (manager, llm, _) = setup();
        llm.queue_error(LlmError::auth("bad key"));
        let id = manager.create_session().await;

        let outcome = manager.turn(&id, "hi").await.unwrap();
        assert_eq!(outcome.response, TROUBLE_REPLY);
        assert_eq!(llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_upstream_failure() {
        let llm = Arc::new(MockLlmClient::new().with_delay(Duration::from_millis(500)));
        let archive = Arc::new(MockArchive::new());
        let config = SessionConfig {
            max_attempts: 2,
            llm_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let manager = manager_with(config, &llm, &archive);
        llm.queue_text(TAKEOUT);
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;

        let outcome = manager.turn(&id, "takeout").await.unwrap();
        assert_eq!(outcome.response, TROUBLE_REPLY);
        assert_eq!(outcome.status, OrderStatus::Started);
        assert_eq!(llm.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_sent_to_generator() {
        let (manager, llm, _) = setup();
        llm.queue_text(TAKEOUT);
        llm.queue_text(KING_BURGER);
        let id = manager.create_session().await;

        manager.turn(&id, "takeout").await.unwrap();
        manager.turn(&id, "king burger").await.unwrap();

        let requests = llm.recorded_requests();
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].role, MessageRole::User);
        assert_eq!(second[0].text, "takeout");
        assert_eq!(second[1].role, MessageRole::Assistant);
        assert_eq!(second[2].text, "king burger");
        assert!(requests[1].system.contains("Fresh Burger"));
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let llm = Arc::new(MockLlmClient::new());
        let archive = Arc::new(MockArchive::new());
        let config = SessionConfig {
            history_limit: 2,
            ..fast_config()
        };
        let manager = manager_with(config, &llm, &archive);
        let id = manager.create_session().await;

        llm.queue_text(TAKEOUT);
        manager.turn(&id, "takeout").await.unwrap();
        for _ in 0..3 {
            llm.queue_text(KING_BURGER);
            manager.turn(&id, "king burger").await.unwrap();
        }

        let last = llm.recorded_requests().pop().unwrap();
        assert_eq!(last.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_abandon_archives_and_closes() {
        let (manager, llm, archive) = setup();
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;
        manager.turn(&id, "takeout").await.unwrap();

        let outcome = manager.abandon(&id).await.unwrap();
        assert_eq!(outcome.status, OrderStatus::Abandoned);
        assert!(outcome.finished);

        let archived = archive.wait_for(1).await;
        assert_eq!(archived[0].1.order_status, OrderStatus::Abandoned);
        assert_eq!(archived[0].1.order_type, OrderType::Takeout);

        // Task exits after archiving
        for _ in 0..100 {
            if manager.snapshot(&id).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            manager.snapshot(&id).await,
            Err(SessionError::NotFound(id.clone()))
        );
    }

    #[tokio::test]
    async fn test_abandon_unknown_session() {
        let (manager, _, _) = setup();
        assert_eq!(
            manager.abandon("ghost").await,
            Err(SessionError::NotFound("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_turn_limit_abandons() {
        let llm = Arc::new(MockLlmClient::new());
        let archive = Arc::new(MockArchive::new());
        let config = SessionConfig {
            max_turns: 1,
            ..fast_config()
        };
        let manager = manager_with(config, &llm, &archive);
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;

        manager.turn(&id, "takeout").await.unwrap();
        let outcome = manager.turn(&id, "king burger").await.unwrap();
        assert_eq!(outcome.response, TURN_LIMIT_REPLY);
        assert_eq!(outcome.status, OrderStatus::Abandoned);
        assert!(outcome.finished);
        assert_eq!(llm.recorded_requests().len(), 1);
        assert_eq!(archive.wait_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_session_is_abandoned() {
        let llm = Arc::new(MockLlmClient::new());
        let archive = Arc::new(MockArchive::new());
        let config = SessionConfig {
            idle_timeout: Duration::from_millis(30),
            ..fast_config()
        };
        let manager = manager_with(config, &llm, &archive);
        let id = manager.create_session().await;

        let archived = archive.wait_for(1).await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].0, id);
        assert_eq!(archived[0].1.order_status, OrderStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let llm = Arc::new(MockLlmClient::new().with_delay(Duration::from_millis(10)));
        let archive = Arc::new(MockArchive::new());
        let manager = Arc::new(manager_with(fast_config(), &llm, &archive));
        llm.queue_text(TAKEOUT);
        let id = manager.create_session().await;
        manager.turn(&id, "takeout").await.unwrap();

        llm.queue_text(KING_BURGER);
        llm.queue_text(KING_BURGER);
        let a = tokio::spawn({
            let (manager, id) = (Arc::clone(&manager), id.clone());
            async move { manager.turn(&id, "king burger").await }
        });
        let b = tokio::spawn({
            let (manager, id) = (Arc::clone(&manager), id.clone());
            async move { manager.turn(&id, "king burger").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let state = manager.snapshot(&id).await.unwrap();
        assert_eq!(state.turn_count, 3);
        // Absolute upserts: the duplicate delta is a no-op
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_user_info_preflight_skips_model() {
        let (manager, llm, archive) = setup();
        for raw in [TAKEOUT, KING_BURGER, FINISHED, CONFIRMED] {
            llm.queue_text(raw);
        }
        // Name given, then the customer changes their mind about the items
        llm.queue_text(
            r#"{"agent_response": "Sure, what would you like to change?",
                "order_update": {"customer_info": {"name": "Sam"}}, "requires_order_update": true}"#,
        );
        llm.queue_text(FINISHED);
        llm.queue_text(CONFIRMED);
        let id = manager.create_session().await;

        for utterance in ["takeout", "king burger", "done", "yes", "Sam, wait, change it", "no it's fine", "yes"] {
            manager.turn(&id, utterance).await.unwrap();
        }
        assert_eq!(llm.recorded_requests().len(), 7);

        let outcome = manager.turn(&id, "thanks").await.unwrap();
        assert_eq!(
            outcome.response,
            "Alright, Sam! Give me one second as I place the order."
        );
        assert_eq!(outcome.status, OrderStatus::Completed);
        assert_eq!(llm.recorded_requests().len(), 7);
        assert_eq!(archive.wait_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_model_reports_trouble() {
        let (manager, llm, _) = setup();
        llm.queue_error(LlmError::unavailable("no model"));
        let id = manager.create_session().await;
        let outcome = manager.turn(&id, "hi").await.unwrap();
        assert_eq!(outcome.response, TROUBLE_REPLY);
        assert!(!LlmErrorKind::Unavailable.is_retryable());
    }
}
