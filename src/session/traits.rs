//! Trait abstractions for session I/O
//!
//! These traits let the session loop run against mock implementations.

use crate::db::Database;
use crate::llm::{LlmError, LlmRequest, LlmResponse, ModelRegistry};
use crate::state_machine::OrderState;
use async_trait::async_trait;
use std::sync::Arc;

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Receives finished orders
#[async_trait]
pub trait OrderArchive: Send + Sync {
    /// Store the final state of a completed or abandoned session
    async fn archive(&self, session_id: &str, state: &OrderState) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: OrderArchive + ?Sized> OrderArchive for Arc<T> {
    async fn archive(&self, session_id: &str, state: &OrderState) -> Result<(), String> {
        (**self).archive(session_id, state).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use `ModelRegistry` as `LlmClient`
pub struct RegistryLlmClient {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryLlmClient {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let model_id = registry.default_model_id().to_string();
        Self { registry, model_id }
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let llm = self
            .registry
            .default_service()
            .ok_or_else(|| LlmError::unavailable(format!("Model {} is not configured", self.model_id)))?;
        llm.complete(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Adapter to use `Database` as `OrderArchive`
#[derive(Clone)]
pub struct DatabaseArchive {
    db: Database,
}

impl DatabaseArchive {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderArchive for DatabaseArchive {
    async fn archive(&self, session_id: &str, state: &OrderState) -> Result<(), String> {
        let db = self.db.clone();
        let session_id = session_id.to_string();
        let state = state.clone();
        tokio::task::spawn_blocking(move || db.archive_order(&session_id, &state))
            .await
            .map_err(|e| e.to_string())?
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
