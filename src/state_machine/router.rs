//! Deterministic handler selection
//!
//! The router is a pure lookup over a transition table. It never consults a
//! model, has no hidden state, and maps every order state to exactly one
//! route.

use super::anomaly::Anomaly;
use super::state::{OrderState, OrderStatus, OrderType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one handler in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerId {
    Preorder,
    Menu,
    Confirmation,
    UserInfo,
}

impl HandlerId {
    #[cfg(test)]
    pub const ALL: [HandlerId; 4] = [
        HandlerId::Preorder,
        HandlerId::Menu,
        HandlerId::Confirmation,
        HandlerId::UserInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerId::Preorder => "preorder",
            HandlerId::Menu => "menu",
            HandlerId::Confirmation => "confirmation",
            HandlerId::UserInfo => "user_info",
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of routing one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dispatch(HandlerId),
    /// Order is finished; nothing is dispatched
    Terminal,
}

/// Guard on the order type column of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeGuard {
    Any,
    Set,
}

impl TypeGuard {
    fn matches(self, order_type: OrderType) -> bool {
        match self {
            TypeGuard::Any => true,
            TypeGuard::Set => order_type.is_set(),
        }
    }
}

/// One row of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub status: OrderStatus,
    pub order_type: TypeGuard,
    pub route: Route,
}

impl TransitionRule {
    pub const fn new(status: OrderStatus, order_type: TypeGuard, route: Route) -> Self {
        Self {
            status,
            order_type,
            route,
        }
    }

    fn matches(&self, state: &OrderState) -> bool {
        self.status == state.order_status && self.order_type.matches(state.order_type)
    }
}

/// Default table. `Started` stays on preorder until an order type is set.
pub const DEFAULT_RULES: &[TransitionRule] = &[
    TransitionRule::new(OrderStatus::Started, TypeGuard::Any, Route::Dispatch(HandlerId::Preorder)),
    TransitionRule::new(OrderStatus::CollectingItems, TypeGuard::Set, Route::Dispatch(HandlerId::Menu)),
    TransitionRule::new(OrderStatus::ItemsConfirmed, TypeGuard::Set, Route::Dispatch(HandlerId::Confirmation)),
    TransitionRule::new(OrderStatus::AwaitingUserInfo, TypeGuard::Set, Route::Dispatch(HandlerId::UserInfo)),
    TransitionRule::new(OrderStatus::Completed, TypeGuard::Any, Route::Terminal),
    TransitionRule::new(OrderStatus::Abandoned, TypeGuard::Any, Route::Terminal),
];

/// Route used when the table matches zero or several rules
pub const FAIL_CLOSED_ROUTE: Route = Route::Dispatch(HandlerId::Confirmation);

/// Routing result plus the anomaly, if the router had to fail closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub anomaly: Option<Anomaly>,
}

#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<TransitionRule>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

impl Router {
    pub fn new(rules: Vec<TransitionRule>) -> Self {
        Self { rules }
    }

    /// Pure and total: every state yields exactly one route
    pub fn route(&self, state: &OrderState) -> RouteDecision {
        let matched: Vec<&TransitionRule> =
            self.rules.iter().filter(|rule| rule.matches(state)).collect();

        match matched.as_slice() {
            [rule] => RouteDecision {
                route: rule.route,
                anomaly: None,
            },
            _ => RouteDecision {
                route: FAIL_CLOSED_ROUTE,
                anomaly: Some(Anomaly::RoutingAnomaly {
                    status: state.order_status,
                    order_type: state.order_type,
                    matched_rules: matched.len(),
                }),
            },
        }
    }
}

/// Route with the default table
pub fn next_handler(state: &OrderState) -> Route {
    Router::default().route(state).route
}
