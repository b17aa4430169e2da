//! Order state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Order Type & Status
// ============================================================================

/// How the customer receives the order. Set once by the preorder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Unset,
    DineIn,
    Takeout,
    Delivery,
}

impl OrderType {
    pub fn is_set(self) -> bool {
        !matches!(self, OrderType::Unset)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Unset => "unset",
            OrderType::DineIn => "dine_in",
            OrderType::Takeout => "takeout",
            OrderType::Delivery => "delivery",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage of the order. Drives routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Started,
    CollectingItems,
    /// Customer finished adding items; read-back confirmation pending
    ItemsConfirmed,
    /// Read-back confirmed; collecting name and contact details
    AwaitingUserInfo,
    Completed,
    Abandoned,
}

impl OrderStatus {
    /// The single happy-path successor, `None` for terminal states
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Started => Some(OrderStatus::CollectingItems),
            OrderStatus::CollectingItems => Some(OrderStatus::ItemsConfirmed),
            OrderStatus::ItemsConfirmed => Some(OrderStatus::AwaitingUserInfo),
            OrderStatus::AwaitingUserInfo => Some(OrderStatus::Completed),
            OrderStatus::Completed | OrderStatus::Abandoned => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Abandoned)
    }

    /// Stages that must never be reached with an empty cart
    pub fn requires_items(self) -> bool {
        matches!(
            self,
            OrderStatus::ItemsConfirmed | OrderStatus::AwaitingUserInfo | OrderStatus::Completed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Started => "started",
            OrderStatus::CollectingItems => "collecting_items",
            OrderStatus::ItemsConfirmed => "items_confirmed",
            OrderStatus::AwaitingUserInfo => "awaiting_user_info",
            OrderStatus::Completed => "completed",
            OrderStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Line Items
// ============================================================================

/// Identity of a line item: canonical name plus normalized modifier set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub name: String,
    pub modifiers: Vec<String>,
}

impl ItemKey {
    pub fn new(name: impl Into<String>, modifiers: &[String]) -> Self {
        Self {
            name: name.into(),
            modifiers: normalize_modifiers(modifiers),
        }
    }
}

/// Trim, drop blanks, sort and de-duplicate so the modifier signature is order-free
pub fn normalize_modifiers(modifiers: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = modifiers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub unit_price_cents: u64,
}

impl LineItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.name, &self.modifiers)
    }

    pub fn line_total_cents(&self) -> u64 {
        self.unit_price_cents * u64::from(self.quantity)
    }
}

// ============================================================================
// Customer Info
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CustomerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
}

impl CustomerInfo {
    /// Fields still needed before the order can complete
    pub fn missing_fields(&self, order_type: OrderType) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if order_type == OrderType::Delivery {
            if self.contact.is_none() {
                missing.push("contact");
            }
            if self.delivery_address.is_none() {
                missing.push("delivery_address");
            }
        }
        missing
    }

    pub fn is_complete_for(&self, order_type: OrderType) -> bool {
        self.missing_fields(order_type).is_empty()
    }
}

// ============================================================================
// Order State
// ============================================================================

/// Canonical record for one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrderState {
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub order_status: OrderStatus,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub customer_info: CustomerInfo,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A violated order invariant
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Past the preorder stage without an order type
    #[error("order type unset in status {status}")]
    OrderTypeUnset { status: OrderStatus },
    /// Status requires a non-empty cart
    #[error("no items in status {status}")]
    EmptyItems { status: OrderStatus },
    /// Two line items share an identity
    #[error("duplicate line item {name}")]
    DuplicateItem { name: String },
    /// Line item with zero quantity
    #[error("zero quantity for {name}")]
    ZeroQuantity { name: String },
}

impl OrderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.order_status.is_terminal()
    }

    pub fn total_cents(&self) -> u64 {
        self.items.iter().map(LineItem::line_total_cents).sum()
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Bookkeeping stamp for a committed turn
    pub fn record_turn(&mut self, at: DateTime<Utc>) {
        self.turn_count = self.turn_count.saturating_add(1);
        self.last_updated = Some(at);
    }

    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let status = self.order_status;

        if !self.order_type.is_set()
            && !matches!(status, OrderStatus::Started | OrderStatus::Abandoned)
        {
            violations.push(InvariantViolation::OrderTypeUnset { status });
        }
        if status.requires_items() && self.items.is_empty() {
            violations.push(InvariantViolation::EmptyItems { status });
        }

        let mut seen: Vec<ItemKey> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if item.quantity == 0 {
                violations.push(InvariantViolation::ZeroQuantity {
                    name: item.name.clone(),
                });
            }
            let key = item.key();
            if seen.contains(&key) {
                violations.push(InvariantViolation::DuplicateItem {
                    name: item.name.clone(),
                });
            } else {
                seen.push(key);
            }
        }

        violations
    }

    /// Human-readable cart summary used in handler instructions
    pub fn cart_summary(&self) -> String {
        if self.items.is_empty() {
            return "(empty)".to_string();
        }
        self.items
            .iter()
            .map(|item| {
                if item.modifiers.is_empty() {
                    format!("{} x {}", item.quantity, item.name)
                } else {
                    format!(
                        "{} x {} ({})",
                        item.quantity,
                        item.name,
                        item.modifiers.join(", ")
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Format cents as a dollar amount
pub fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
