//! Property-based tests for the order state machine
//!
//! These tests verify routing and update invariants across generated states
//! and handler outputs.

use super::anomaly::Anomaly;
use super::output::{CompletionFlags, ItemDelta, OrderUpdate};
use super::router::{TransitionRule, TypeGuard, DEFAULT_RULES, FAIL_CLOSED_ROUTE};
use super::state::{CustomerInfo, ItemKey, LineItem};
use super::*;
use crate::menu::Menu;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_order_type() -> impl Strategy<Value = OrderType> {
    prop_oneof![
        Just(OrderType::Unset),
        Just(OrderType::DineIn),
        Just(OrderType::Takeout),
        Just(OrderType::Delivery),
    ]
}

fn arb_set_order_type() -> impl Strategy<Value = OrderType> {
    prop_oneof![
        Just(OrderType::DineIn),
        Just(OrderType::Takeout),
        Just(OrderType::Delivery),
    ]
}

fn arb_status() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Started),
        Just(OrderStatus::CollectingItems),
        Just(OrderStatus::ItemsConfirmed),
        Just(OrderStatus::AwaitingUserInfo),
        Just(OrderStatus::Completed),
        Just(OrderStatus::Abandoned),
    ]
}

fn arb_handler() -> impl Strategy<Value = HandlerId> {
    prop_oneof![
        Just(HandlerId::Preorder),
        Just(HandlerId::Menu),
        Just(HandlerId::Confirmation),
        Just(HandlerId::UserInfo),
    ]
}

fn arb_menu_name() -> impl Strategy<Value = String> {
    let names: Vec<String> = Menu::default().items.into_iter().map(|i| i.name).collect();
    proptest::sample::select(names)
}

fn arb_modifiers() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(
        prop_oneof![
            Just("no onions".to_string()),
            Just("extra cheese".to_string()),
            Just("no ice".to_string()),
        ],
        0..2,
    )
}

fn arb_key() -> impl Strategy<Value = ItemKey> {
    (arb_menu_name(), arb_modifiers()).prop_map(|(name, modifiers)| ItemKey::new(name, &modifiers))
}

fn arb_item_delta() -> impl Strategy<Value = ItemDelta> {
    prop_oneof![
        (arb_key(), 1u32..5, 100u64..1500).prop_map(|(key, quantity, unit_price_cents)| {
            ItemDelta::Upsert {
                key,
                quantity,
                unit_price_cents,
            }
        }),
        arb_key().prop_map(|key| ItemDelta::Remove { key }),
    ]
}

fn arb_items() -> impl Strategy<Value = Vec<LineItem>> {
    proptest::collection::vec(arb_item_delta(), 0..4).prop_map(|deltas| {
        let mut items: Vec<LineItem> = Vec::new();
        for delta in deltas {
            if let ItemDelta::Upsert {
                key,
                quantity,
                unit_price_cents,
            } = delta
            {
                if !items.iter().any(|i| i.key() == key) {
                    items.push(LineItem {
                        name: key.name,
                        quantity,
                        modifiers: key.modifiers,
                        unit_price_cents,
                    });
                }
            }
        }
        items
    })
}

fn arb_customer_info() -> impl Strategy<Value = CustomerInfo> {
    (
        proptest::option::of("[A-Z][a-z]{2,8}"),
        proptest::option::of("[0-9]{7}"),
        proptest::option::of("[0-9]{1,3} Main St"),
    )
        .prop_map(|(name, contact, delivery_address)| CustomerInfo {
            name,
            contact,
            pickup_time: None,
            delivery_address,
        })
}

/// Any state, including ones that break invariants
fn arb_state() -> impl Strategy<Value = OrderState> {
    (
        arb_order_type(),
        arb_status(),
        arb_items(),
        arb_customer_info(),
        0u32..50,
    )
        .prop_map(
            |(order_type, order_status, items, customer_info, turn_count)| OrderState {
                order_type,
                order_status,
                items,
                customer_info,
                turn_count,
                last_updated: None,
            },
        )
}

/// States reachable through the normal flow
fn arb_reachable_state() -> impl Strategy<Value = OrderState> {
    arb_state().prop_filter("reachable states satisfy invariants", |s| {
        s.check_invariants().is_empty()
    })
}

fn arb_flags() -> impl Strategy<Value = CompletionFlags> {
    (
        any::<bool>(),
        proptest::option::of(any::<bool>()),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(order_finished, order_confirmed, info_complete, requires_order_update)| {
                CompletionFlags {
                    order_finished,
                    order_confirmed,
                    info_complete,
                    requires_order_update,
                }
            },
        )
}

fn arb_contract() -> impl Strategy<Value = OutputContract> {
    (
        arb_handler(),
        proptest::option::of(arb_set_order_type()),
        proptest::collection::vec(arb_item_delta(), 0..3),
        proptest::option::of(arb_customer_info()),
        arb_flags(),
    )
        .prop_map(|(handler, order_type, items, customer_info, flags)| {
            let mut contract = OutputContract::reply(handler, "response").with_flags(flags);
            contract.order_update = OrderUpdate {
                order_type,
                items,
                customer_info,
                ..OrderUpdate::default()
            };
            contract
        })
}

/// Backward moves allowed by the correction paths
fn is_allowed_move(from: OrderStatus, to: OrderStatus) -> bool {
    to == from
        || from.next() == Some(to)
        || (to == OrderStatus::CollectingItems
            && matches!(
                from,
                OrderStatus::ItemsConfirmed | OrderStatus::AwaitingUserInfo
            ))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Routing is a pure function of the state
    #[test]
    fn prop_routing_is_deterministic(state in arb_state()) {
        let first = Router::default().route(&state);
        let second = Router::default().route(&state);
        let router = Router::default();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first, &router.route(&state));
        prop_assert_eq!(first.route, next_handler(&state));
    }

    // Every state routes to a handler or to terminal; reachable states never need fail-closed
    #[test]
    fn prop_routing_is_total(state in arb_reachable_state()) {
        let decision = Router::default().route(&state);
        prop_assert!(decision.anomaly.is_none(), "anomaly for {:?}", state);
        match decision.route {
            Route::Terminal => prop_assert!(state.is_terminal()),
            Route::Dispatch(_) => prop_assert!(!state.is_terminal()),
        }
    }

    // Unmatched states fail closed to confirmation
    #[test]
    fn prop_routing_anomalies_fail_closed(state in arb_state()) {
        let decision = Router::default().route(&state);
        if decision.anomaly.is_some() {
            prop_assert_eq!(decision.route, FAIL_CLOSED_ROUTE);
        }
    }

    // Overlapping tables fail closed and leave the state untouched
    #[test]
    fn prop_overlapping_rules_fail_closed(state in arb_state(), handler in arb_handler()) {
        let mut rules = DEFAULT_RULES.to_vec();
        rules.push(TransitionRule::new(state.order_status, TypeGuard::Any, Route::Dispatch(handler)));
        let before = state.clone();

        let decision = Router::new(rules).route(&state);
        let matched_default = DEFAULT_RULES.iter().any(|r| {
            r.status == state.order_status
                && match r.order_type {
                    TypeGuard::Any => true,
                    TypeGuard::Set => state.order_type.is_set(),
                }
        });
        if matched_default {
            prop_assert_eq!(decision.route, FAIL_CLOSED_ROUTE);
            let is_routing_anomaly = matches!(decision.anomaly, Some(Anomaly::RoutingAnomaly { matched_rules: 2, .. }));
            prop_assert!(is_routing_anomaly);
        }
        prop_assert_eq!(state, before);
    }

    // Applying the same item deltas twice equals applying them once
    #[test]
    fn prop_item_deltas_are_idempotent(
        items in arb_items(),
        deltas in proptest::collection::vec(arb_item_delta(), 1..5),
    ) {
        let state = OrderState {
            order_type: OrderType::Takeout,
            order_status: OrderStatus::CollectingItems,
            items,
            ..OrderState::default()
        };
        let mut contract = OutputContract::reply(HandlerId::Menu, "ok");
        contract.order_update.items = deltas;

        let once = apply(&state, &contract).unwrap().new_state;
        let twice = apply(&once, &contract).unwrap().new_state;
        prop_assert_eq!(once.items, twice.items);
    }

    // Any contract either fails cleanly or yields a valid, permitted move
    #[test]
    fn prop_apply_preserves_validity(state in arb_reachable_state(), contract in arb_contract()) {
        let before = state.clone();
        match apply(&state, &contract) {
            Ok(result) => {
                let next = result.new_state;
                prop_assert!(next.check_invariants().is_empty(), "invalid: {:?}", next);
                prop_assert!(
                    is_allowed_move(state.order_status, next.order_status),
                    "{:?} -> {:?}", state.order_status, next.order_status
                );
                if state.order_type.is_set() {
                    prop_assert_eq!(next.order_type, state.order_type);
                }
                if contract.handler != HandlerId::Menu {
                    prop_assert_eq!(&next.items, &state.items);
                }
                if contract.handler != HandlerId::UserInfo {
                    prop_assert_eq!(&next.customer_info, &state.customer_info);
                }
                prop_assert_eq!(result.response, contract.agent_response);
            }
            Err(_) => prop_assert_eq!(&state, &before),
        }
    }

    // The scripted happy path visits every stage in order
    #[test]
    fn prop_happy_path_is_monotonic(
        order_type in arb_set_order_type(),
        deltas in proptest::collection::vec(arb_item_delta(), 0..4),
        first in arb_key(),
    ) {
        let mut state = OrderState::new();
        let mut visited = vec![state.order_status];

        let mut preorder = OutputContract::reply(HandlerId::Preorder, "What can I get you?");
        preorder.order_update.order_type = Some(order_type);

        let mut menu = OutputContract::reply(HandlerId::Menu, "Anything else?");
        menu.order_update.items = vec![ItemDelta::Upsert { key: first, quantity: 1, unit_price_cents: 500 }];
        menu.order_update.items.extend(deltas.into_iter().filter(|d| matches!(d, ItemDelta::Upsert { .. })));
        let finish = OutputContract::reply(HandlerId::Menu, "Let me read that back")
            .with_flags(CompletionFlags { order_finished: true, ..CompletionFlags::default() });
        let confirm = OutputContract::reply(HandlerId::Confirmation, "Great")
            .with_flags(CompletionFlags { order_confirmed: Some(true), ..CompletionFlags::default() });
        let mut info = OutputContract::reply(HandlerId::UserInfo, "Placing it now")
            .with_flags(CompletionFlags { info_complete: true, ..CompletionFlags::default() });
        info.order_update.customer_info = Some(CustomerInfo {
            name: Some("Ada".to_string()),
            contact: Some("5550100".to_string()),
            pickup_time: None,
            delivery_address: Some("1 Main St".to_string()),
        });

        for contract in [preorder, menu, finish, confirm, info] {
            let route = next_handler(&state);
            prop_assert_eq!(route, Route::Dispatch(contract.handler));
            state = apply(&state, &contract).unwrap().new_state;
            if visited.last() != Some(&state.order_status) {
                visited.push(state.order_status);
            }
        }

        prop_assert_eq!(visited, vec![
            OrderStatus::Started,
            OrderStatus::CollectingItems,
            OrderStatus::ItemsConfirmed,
            OrderStatus::AwaitingUserInfo,
            OrderStatus::Completed,
        ]);
        prop_assert_eq!(next_handler(&state), Route::Terminal);
    }

    // Random walks through the router never corrupt the order
    #[test]
    fn prop_random_walk_stays_valid(contracts in proptest::collection::vec(arb_contract(), 0..25)) {
        let mut state = OrderState::new();
        for mut contract in contracts {
            let Route::Dispatch(handler) = next_handler(&state) else {
                break;
            };
            contract.handler = handler;
            let type_before = state.order_type;
            if let Ok(result) = apply(&state, &contract) {
                prop_assert!(is_allowed_move(state.order_status, result.new_state.order_status));
                state = result.new_state;
            }
            prop_assert!(state.check_invariants().is_empty(), "invalid: {:?}", state);
            if type_before.is_set() {
                prop_assert_eq!(state.order_type, type_before);
            }
        }
    }
}
