//! Handler output contract and its validation
//!
//! Raw model text is parsed and validated in one step. Anything that fails
//! here never reaches the state updater.

use super::router::HandlerId;
use super::state::{normalize_modifiers, CustomerInfo, ItemKey, OrderType};
use crate::menu::Menu;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

// ============================================================================
// Validated contract
// ============================================================================

/// Validated structured result of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputContract {
    /// Handler that produced this output (the active stage)
    pub handler: HandlerId,
    pub agent_response: String,
    pub order_update: OrderUpdate,
    pub flags: CompletionFlags,
}

/// State deltas; which fields apply depends on the active stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderUpdate {
    pub order_type: Option<OrderType>,
    pub items: Vec<ItemDelta>,
    pub customer_info: Option<CustomerInfo>,
    /// Fields present in the output that the producing stage doesn't own.
    /// They are dropped unvalidated.
    pub out_of_scope: Vec<&'static str>,
}

/// Item delta resolved against the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDelta {
    /// Set the absolute quantity for this identity, appending if new
    Upsert {
        key: ItemKey,
        quantity: u32,
        unit_price_cents: u64,
    },
    Remove { key: ItemKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionFlags {
    pub order_finished: bool,
    /// `None` while the customer hasn't answered the read-back
    pub order_confirmed: Option<bool>,
    pub info_complete: bool,
    pub requires_order_update: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Output is not valid contract JSON: {0}")]
    Malformed(String),
    #[error("agent_response is empty")]
    EmptyResponse,
    #[error("Unknown order type: {0}")]
    InvalidOrderType(String),
    #[error("Flag {flag} has invalid value {value}")]
    InvalidFlag { flag: &'static str, value: String },
    #[error("Item delta has a blank name")]
    BlankItemName,
    #[error("Item not on the menu: {0}")]
    UnknownItem(String),
    #[error("Upsert of {0} with zero quantity")]
    ZeroQuantity(String),
    #[error("Upsert of {name} with quantity {quantity} above {MAX_QUANTITY}")]
    QuantityTooLarge { name: String, quantity: u32 },
}

/// Largest quantity accepted for one line item
pub const MAX_QUANTITY: u32 = 99;

impl OutputContract {
    /// A contract that only carries text (used by handler preflight paths)
    pub fn reply(handler: HandlerId, agent_response: impl Into<String>) -> Self {
        Self {
            handler,
            agent_response: agent_response.into(),
            order_update: OrderUpdate::default(),
            flags: CompletionFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: CompletionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Parse and validate raw handler output
    pub fn parse(handler: HandlerId, raw: &str, menu: &Menu) -> Result<Self, ValidationError> {
        let body = strip_code_fence(raw);
        let parsed: RawOutput =
            serde_json::from_str(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if parsed.agent_response.trim().is_empty() {
            return Err(ValidationError::EmptyResponse);
        }
        let agent_response = parsed.agent_response;

        let order_update = match parsed.order_update {
            Some(raw_update) => validate_update(raw_update, handler, menu)?,
            None => OrderUpdate::default(),
        };

        let order_confirmed = match parsed.order_confirmed {
            Some(value) => value.resolve("order_confirmed")?,
            None => None,
        };

        Ok(Self {
            handler,
            agent_response,
            order_update,
            flags: CompletionFlags {
                order_finished: parsed.order_finished.unwrap_or(false),
                order_confirmed,
                info_complete: parsed.info_complete.unwrap_or(false),
                requires_order_update: parsed.requires_order_update.unwrap_or(false),
            },
        })
    }
}

// ============================================================================
// Raw wire shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawOutput {
    agent_response: String,
    #[serde(default)]
    order_update: Option<RawOrderUpdate>,
    #[serde(default)]
    order_finished: Option<bool>,
    #[serde(default)]
    order_confirmed: Option<RawTristate>,
    #[serde(default)]
    info_complete: Option<bool>,
    #[serde(default)]
    requires_order_update: Option<bool>,
}

#[derive(Debug, Deserialize)]
/// Fields stay untyped until the producing stage is known to own them
struct RawOrderUpdate {
    #[serde(default)]
    order_type: Option<Value>,
    #[serde(default)]
    items: Option<Value>,
    #[serde(default)]
    customer_info: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawItemOp {
    Upsert,
    Remove,
}

#[derive(Debug, Deserialize)]
struct RawItemDelta {
    op: RawItemOp,
    name: String,
    #[serde(default)]
    quantity: Option<u32>,
    #[serde(default)]
    modifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCustomerInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    pickup_time: Option<String>,
    #[serde(default)]
    delivery_address: Option<String>,
}

/// Models sometimes answer a yes/no/unknown flag as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTristate {
    Bool(bool),
    Text(String),
}

impl RawTristate {
    fn resolve(self, flag: &'static str) -> Result<Option<bool>, ValidationError> {
        match self {
            RawTristate::Bool(b) => Ok(Some(b)),
            RawTristate::Text(text) => match text.trim().to_lowercase().as_str() {
                "true" | "yes" => Ok(Some(true)),
                "false" | "no" => Ok(Some(false)),
                "" | "unknown" | "null" => Ok(None),
                _ => Err(ValidationError::InvalidFlag { flag, value: text }),
            },
        }
    }
}

/// Validate the fields `handler` owns; anything else is set aside unread
fn validate_update(
    raw: RawOrderUpdate,
    handler: HandlerId,
    menu: &Menu,
) -> Result<OrderUpdate, ValidationError> {
    let mut update = OrderUpdate::default();

    if let Some(value) = raw.order_type {
        if handler == HandlerId::Preorder {
            let text: String = decode(value, "order_type")?;
            update.order_type = parse_order_type(&text)?;
        } else {
            update.out_of_scope.push("order_type");
        }
    }

    if let Some(value) = raw.items {
        if handler == HandlerId::Menu {
            let items: Vec<RawItemDelta> = decode(value, "items")?;
            update.items = items
                .into_iter()
                .map(|delta| validate_item(delta, menu))
                .collect::<Result<Vec<_>, _>>()?;
        } else if !matches!(&value, Value::Array(items) if items.is_empty()) {
            update.out_of_scope.push("items");
        }
    }

    if let Some(value) = raw.customer_info {
        if handler == HandlerId::UserInfo {
            let info: RawCustomerInfo = decode(value, "customer_info")?;
            let info = CustomerInfo {
                name: non_blank(info.name),
                contact: non_blank(info.contact),
                pickup_time: non_blank(info.pickup_time),
                delivery_address: non_blank(info.delivery_address),
            };
            update.customer_info = (info != CustomerInfo::default()).then_some(info);
        } else {
            update.out_of_scope.push("customer_info");
        }
    }

    Ok(update)
}

/// `None` means the customer hasn't answered yet
fn parse_order_type(text: &str) -> Result<Option<OrderType>, ValidationError> {
    let normalized = text.trim().to_lowercase().replace(['-', ' '], "_");
    match normalized.as_str() {
        "" | "unset" | "unknown" => Ok(None),
        "dine_in" | "for_here" | "for_here_order" => Ok(Some(OrderType::DineIn)),
        "takeout" | "take_out" | "to_go" | "to_go_order" => Ok(Some(OrderType::Takeout)),
        "delivery" => Ok(Some(OrderType::Delivery)),
        _ => Err(ValidationError::InvalidOrderType(text.to_string())),
    }
}

fn validate_item(raw: RawItemDelta, menu: &Menu) -> Result<ItemDelta, ValidationError> {
    if raw.name.trim().is_empty() {
        return Err(ValidationError::BlankItemName);
    }
    let item = menu
        .lookup(&raw.name)
        .ok_or_else(|| ValidationError::UnknownItem(raw.name.trim().to_string()))?;
    let key = ItemKey {
        name: item.name.clone(),
        modifiers: normalize_modifiers(&raw.modifiers),
    };

    match raw.op {
        RawItemOp::Upsert => {
            let quantity = raw.quantity.unwrap_or(1);
            if quantity == 0 {
                return Err(ValidationError::ZeroQuantity(item.name.clone()));
            }
            if quantity > MAX_QUANTITY {
                return Err(ValidationError::QuantityTooLarge {
                    name: item.name.clone(),
                    quantity,
                });
            }
            Ok(ItemDelta::Upsert {
                key,
                quantity,
                unit_price_cents: item.price_cents,
            })
        }
        RawItemOp::Remove => Ok(ItemDelta::Remove { key }),
    }
}

fn decode<T: DeserializeOwned>(value: Value, field: &str) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::Malformed(format!("{field}: {e}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ============================================================================
// Response schemas
// ============================================================================

/// JSON response schema for a handler, limited to the fields its stage owns
pub fn response_schema(handler: HandlerId) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "agent_response".to_string(),
        json!({ "type": "STRING", "description": "Reply to the customer" }),
    );

    match handler {
        HandlerId::Preorder => {
            properties.insert(
                "order_update".to_string(),
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "order_type": {
                            "type": "STRING",
                            "enum": ["dine_in", "takeout", "delivery", "unknown"],
                            "description": "unknown until the customer answers"
                        }
                    }
                }),
            );
        }
        HandlerId::Menu => {
            properties.insert(
                "order_update".to_string(),
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "items": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "op": { "type": "STRING", "enum": ["upsert", "remove"] },
                                    "name": { "type": "STRING" },
                                    "quantity": {
                                        "type": "INTEGER",
                                        "description": "Total quantity after this change"
                                    },
                                    "modifiers": { "type": "ARRAY", "items": { "type": "STRING" } }
                                },
                                "required": ["op", "name"]
                            }
                        }
                    }
                }),
            );
            properties.insert(
                "order_finished".to_string(),
                json!({ "type": "BOOLEAN", "description": "Customer is done adding items" }),
            );
        }
        HandlerId::Confirmation => {
            properties.insert(
                "order_confirmed".to_string(),
                json!({
                    "type": "BOOLEAN",
                    "nullable": true,
                    "description": "true if confirmed, false if the customer wants changes, null if no answer yet"
                }),
            );
        }
        HandlerId::UserInfo => {
            properties.insert(
                "order_update".to_string(),
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "customer_info": {
                            "type": "OBJECT",
                            "properties": {
                                "name": { "type": "STRING" },
                                "contact": { "type": "STRING" },
                                "pickup_time": { "type": "STRING" },
                                "delivery_address": { "type": "STRING" }
                            }
                        }
                    }
                }),
            );
            properties.insert(
                "info_complete".to_string(),
                json!({ "type": "BOOLEAN", "description": "All required details collected" }),
            );
            properties.insert(
                "requires_order_update".to_string(),
                json!({ "type": "BOOLEAN", "description": "Customer wants to change the items" }),
            );
        }
    }

    json!({
        "type": "OBJECT",
        "properties": Value::Object(properties),
        "required": ["agent_response"]
    })
}
