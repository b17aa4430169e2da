//! Core order state machine
//!
//! Routing, validation and state updates are pure functions over
//! [`OrderState`]; the session loop is the only place that performs I/O.

pub mod anomaly;
pub mod output;
pub mod router;
pub mod state;
pub mod transition;

#[cfg(test)]
mod proptests;

pub use output::{response_schema, OutputContract, ValidationError};
pub use router::{next_handler, HandlerId, Route, Router};
pub use state::{OrderState, OrderStatus, OrderType};
pub use transition::{abandon, apply, TransitionResult};
