//! Pure state updater
//!
//! Applies a validated handler output to an order state. Given the same
//! inputs it always produces the same outputs, and it never leaves a state
//! partially applied: either the whole result is returned or an error is.

use super::anomaly::Anomaly;
use super::output::{ItemDelta, OutputContract};
use super::router::HandlerId;
use super::state::{
    CustomerInfo, InvariantViolation, LineItem, OrderState, OrderStatus, OrderType,
};
use thiserror::Error;

/// Result of applying one handler output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: OrderState,
    /// Exactly the handler's `agent_response`
    pub response: String,
    pub anomalies: Vec<Anomaly>,
}

/// Output that cannot be applied; the state is left untouched
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Order is already {0}")]
    TerminalState(OrderStatus),
    #[error("Order type is {from} and cannot change to {to}")]
    OrderTypeChange { from: OrderType, to: OrderType },
    #[error("Update would violate order invariant: {0}")]
    InvariantViolation(#[from] InvariantViolation),
}

/// A status change requested by a completion flag
struct StatusRequest {
    flag: &'static str,
    owner: HandlerId,
    target: OrderStatus,
    correction: bool,
}

/// Apply a validated contract to the state
pub fn apply(
    state: &OrderState,
    contract: &OutputContract,
) -> Result<TransitionResult, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::TerminalState(state.order_status));
    }

    let handler = contract.handler;
    let update = &contract.order_update;
    let mut next = state.clone();
    let mut anomalies = Vec::new();

    // ------------------------------------------------------------------
    // Stage-scoped deltas
    // ------------------------------------------------------------------

    if let Some(requested) = update.order_type {
        if state.order_type.is_set() && requested != state.order_type {
            return Err(TransitionError::OrderTypeChange {
                from: state.order_type,
                to: requested,
            });
        }
        if handler == HandlerId::Preorder {
            next.order_type = requested;
        } else if !state.order_type.is_set() {
            anomalies.push(Anomaly::OutOfScopeField {
                handler,
                field: "order_type",
            });
        }
    }

    if !update.items.is_empty() {
        if handler == HandlerId::Menu {
            for delta in &update.items {
                apply_item_delta(&mut next.items, delta);
            }
        } else {
            anomalies.push(Anomaly::OutOfScopeField {
                handler,
                field: "items",
            });
        }
    }

    if let Some(info) = &update.customer_info {
        if handler == HandlerId::UserInfo {
            merge_customer_info(&mut next.customer_info, info);
        } else {
            anomalies.push(Anomaly::OutOfScopeField {
                handler,
                field: "customer_info",
            });
        }
    }

    for &field in &update.out_of_scope {
        anomalies.push(Anomaly::OutOfScopeField { handler, field });
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    let requests = status_requests(contract, &next);
    let (owned, foreign): (Vec<_>, Vec<_>) =
        requests.into_iter().partition(|r| r.owner == handler);

    for request in foreign {
        anomalies.push(Anomaly::StatusSkip {
            handler,
            flag: request.flag,
            from: state.order_status,
            to: request.target,
        });
    }

    // A correction outranks a forward step emitted alongside it
    let chosen = owned
        .iter()
        .find(|r| r.correction)
        .or_else(|| owned.first());

    if let Some(request) = chosen {
        if request.correction {
            if correction_allowed(state.order_status) {
                next.order_status = request.target;
            } else {
                anomalies.push(Anomaly::StatusSkip {
                    handler,
                    flag: request.flag,
                    from: state.order_status,
                    to: request.target,
                });
            }
        } else if state.order_status.next() == Some(request.target) {
            let missing = missing_for(request.target, &next);
            if missing.is_empty() {
                next.order_status = request.target;
            } else {
                anomalies.push(Anomaly::IncompleteStage {
                    handler,
                    status: state.order_status,
                    missing,
                });
            }
        } else {
            anomalies.push(Anomaly::StatusSkip {
                handler,
                flag: request.flag,
                from: state.order_status,
                to: request.target,
            });
        }
    }

    // Reject anything that introduces a violation the input didn't have
    let before = state.check_invariants();
    if let Some(violation) = next
        .check_invariants()
        .into_iter()
        .find(|v| !before.contains(v))
    {
        return Err(violation.into());
    }

    Ok(TransitionResult {
        new_state: next,
        response: contract.agent_response.clone(),
        anomalies,
    })
}

/// Move a live order to `Abandoned`
pub fn abandon(state: &OrderState) -> Result<OrderState, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::TerminalState(state.order_status));
    }
    let mut next = state.clone();
    next.order_status = OrderStatus::Abandoned;
    Ok(next)
}

fn status_requests(contract: &OutputContract, next: &OrderState) -> Vec<StatusRequest> {
    let flags = &contract.flags;
    let mut requests = Vec::new();

    if contract.handler == HandlerId::Preorder && next.order_type.is_set() {
        requests.push(StatusRequest {
            flag: "order_type",
            owner: HandlerId::Preorder,
            target: OrderStatus::CollectingItems,
            correction: false,
        });
    }
    if flags.order_finished {
        requests.push(StatusRequest {
            flag: "order_finished",
            owner: HandlerId::Menu,
            target: OrderStatus::ItemsConfirmed,
            correction: false,
        });
    }
    match flags.order_confirmed {
        Some(true) => requests.push(StatusRequest {
            flag: "order_confirmed",
            owner: HandlerId::Confirmation,
            target: OrderStatus::AwaitingUserInfo,
            correction: false,
        }),
        Some(false) => requests.push(StatusRequest {
            flag: "order_confirmed",
            owner: HandlerId::Confirmation,
            target: OrderStatus::CollectingItems,
            correction: true,
        }),
        None => {}
    }
    if flags.info_complete {
        requests.push(StatusRequest {
            flag: "info_complete",
            owner: HandlerId::UserInfo,
            target: OrderStatus::Completed,
            correction: false,
        });
    }
    if flags.requires_order_update {
        requests.push(StatusRequest {
            flag: "requires_order_update",
            owner: HandlerId::UserInfo,
            target: OrderStatus::CollectingItems,
            correction: true,
        });
    }

    requests
}

/// Backward moves to item collection only leave the post-collection stages
fn correction_allowed(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::ItemsConfirmed | OrderStatus::AwaitingUserInfo
    )
}

fn missing_for(target: OrderStatus, next: &OrderState) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if target != OrderStatus::Started && !next.order_type.is_set() {
        missing.push("order_type");
    }
    if target.requires_items() && next.items.is_empty() {
        missing.push("items");
    }
    if target == OrderStatus::Completed {
        missing.extend(next.customer_info.missing_fields(next.order_type));
    }
    missing
}

fn apply_item_delta(items: &mut Vec<LineItem>, delta: &ItemDelta) {
    match delta {
        ItemDelta::Upsert {
            key,
            quantity,
            unit_price_cents,
        } => {
            if let Some(existing) = items.iter_mut().find(|item| &item.key() == key) {
                existing.quantity = *quantity;
                existing.unit_price_cents = *unit_price_cents;
            } else {
                items.push(LineItem {
                    name: key.name.clone(),
                    quantity: *quantity,
                    modifiers: key.modifiers.clone(),
                    unit_price_cents: *unit_price_cents,
                });
            }
        }
        ItemDelta::Remove { key } => {
            items.retain(|item| &item.key() != key);
        }
    }
}

fn merge_customer_info(current: &mut CustomerInfo, delta: &CustomerInfo) {
    if let Some(name) = &delta.name {
        current.name = Some(name.clone());
    }
    if let Some(contact) = &delta.contact {
        current.contact = Some(contact.clone());
    }
    if let Some(pickup_time) = &delta.pickup_time {
        current.pickup_time = Some(pickup_time.clone());
    }
    if let Some(address) = &delta.delivery_address {
        current.delivery_address = Some(address.clone());
    }
}
