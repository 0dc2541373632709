//! mkt-orders
//!
//! Order lifecycle with dispute-driven locking.
//!
//! - [`status_machine`]: pure validation and application of status
//!   transitions (authorization → dispute gate → transition graph).
//! - [`dispute_gate`]: pure rules for taking and releasing the per-order lock.
//! - [`OrderService`]: composes both over the store with conditional writes,
//!   so a transition and a dispute-open racing on the same order serialize on
//!   the order record's version.

pub mod dispute_gate;
mod service;
pub mod status_machine;

pub use dispute_gate::DisputeGate;
pub use service::{NewDispute, NewOrder, OrderService};
pub use status_machine::{
    allowed_targets, next_status, verify_history, StatusMachine, TransitionPolicy,
};
