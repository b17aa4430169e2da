//! Stage handlers
//!
//! A handler turns the current order plus the customer's utterance into a
//! validated [`OutputContract`]. It never decides its own successor; the
//! router does that on the next turn.

mod confirmation;
mod menu;
mod preorder;
mod user_info;

pub use confirmation::ConfirmationHandler;
pub use menu::MenuHandler;
pub use preorder::PreorderHandler;
pub use user_info::UserInfoHandler;

use crate::llm::{LlmError, LlmMessage, LlmRequest};
use crate::menu::Menu;
use crate::session::LlmClient;
use crate::state_machine::{response_schema, HandlerId, OrderState, OutputContract, ValidationError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Output budget for one structured reply
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Read-only view of one turn handed to a handler
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub state: &'a OrderState,
    pub menu: &'a Menu,
    /// Prior turns, oldest first, not including `utterance`
    pub history: &'a [LlmMessage],
    pub utterance: &'a str,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Upstream failure: {0}")]
    Upstream(#[from] LlmError),
    #[error("Invalid handler output: {0}")]
    Validation(#[from] ValidationError),
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> HandlerId;

    /// Natural-language instructions for the generator
    fn instructions(&self, ctx: &TurnContext<'_>) -> String;

    /// Answer without a model call when the outcome is already known
    fn preflight(&self, _ctx: &TurnContext<'_>) -> Option<OutputContract> {
        None
    }

    fn request(&self, ctx: &TurnContext<'_>) -> LlmRequest {
        let mut messages = ctx.history.to_vec();
        messages.push(LlmMessage::user(ctx.utterance));
        LlmRequest {
            system: self.instructions(ctx),
            messages,
            response_schema: Some(response_schema(self.id())),
            max_tokens: Some(MAX_OUTPUT_TOKENS),
        }
    }

    /// One attempt: preflight, else generate and validate
    async fn handle(
        &self,
        ctx: &TurnContext<'_>,
        llm: &dyn LlmClient,
    ) -> Result<OutputContract, HandlerError> {
        if let Some(contract) = self.preflight(ctx) {
            tracing::debug!(handler = %self.id(), "Handled without model call");
            return Ok(contract);
        }
        let response = llm.complete(&self.request(ctx)).await?;
        Ok(OutputContract::parse(self.id(), &response.text, ctx.menu)?)
    }
}

/// Handlers keyed by id
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn Handler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PreorderHandler));
        registry.register(Arc::new(MenuHandler));
        registry.register(Arc::new(ConfirmationHandler));
        registry.register(Arc::new(UserInfoHandler));
        registry
    }
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any with the same id
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.id(), handler);
    }

    pub fn get(&self, id: HandlerId) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&id).cloned()
    }
}

/// Shared instruction preamble with the live order
fn order_context(state: &OrderState) -> String {
    format!(
        "# ORDER\nOrder type: {}\nItems: {}\nTotal: {}\nStatus: {}\n",
        state.order_type,
        state.cart_summary(),
        crate::state_machine::state::format_cents(state.total_cents()),
        state.order_status,
    )
}

const OUTPUT_RULES: &str = "# OUTPUT\nRespond with a single JSON object matching the response schema. \
agent_response must never be empty; it is read to the customer verbatim.\n";
