//! Non-fatal inconsistencies surfaced for observability

use super::router::HandlerId;
use super::state::{OrderStatus, OrderType};
use std::fmt;

/// A detected inconsistency that was contained without corrupting state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// Router matched zero or several rules and failed closed
    RoutingAnomaly {
        status: OrderStatus,
        order_type: OrderType,
        matched_rules: usize,
    },
    /// Handler emitted a delta field its stage does not own
    OutOfScopeField { handler: HandlerId, field: &'static str },
    /// Completion flag would skip a stage or was emitted by the wrong stage
    StatusSkip {
        handler: HandlerId,
        flag: &'static str,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// Forward step refused because the stage's data is incomplete
    IncompleteStage {
        handler: HandlerId,
        status: OrderStatus,
        missing: Vec<&'static str>,
    },
}

impl Anomaly {
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::RoutingAnomaly { .. } => "routing_anomaly",
            Anomaly::OutOfScopeField { .. } => "out_of_scope_field",
            Anomaly::StatusSkip { .. } => "status_skip",
            Anomaly::IncompleteStage { .. } => "incomplete_stage",
        }
    }

    /// Emit the anomaly as a structured warning
    pub fn emit(&self, session_id: &str) {
        tracing::warn!(
            session_id = %session_id,
            anomaly = self.kind(),
            detail = %self,
            "Order anomaly"
        );
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::RoutingAnomaly {
                status,
                order_type,
                matched_rules,
            } => write!(
                f,
                "{matched_rules} transition rules matched status={status} order_type={order_type}"
            ),
            Anomaly::OutOfScopeField { handler, field } => {
                write!(f, "{handler} emitted out-of-scope field {field}")
            }
            Anomaly::StatusSkip {
                handler,
                flag,
                from,
                to,
            } => write!(f, "{handler} flag {flag} requested {from} -> {to}"),
            Anomaly::IncompleteStage {
                handler,
                status,
                missing,
            } => write!(
                f,
                "{handler} cannot leave {status}, missing {}",
                missing.join(", ")
            ),
        }
    }
}
