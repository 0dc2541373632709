//! Order Status Machine
//!
//! # State diagram
//!
//! ```text
//!    new ──► processing ──► shipped ──► delivered (term.)
//!     │          │             │
//!     └──────────┴─────────────┴──────► cancelled (term.)
//! ```
//!
//! A transition request is checked in a fixed order:
//!
//! 1. **Authorization.** Only the vendor drives status. With
//!    [`TransitionPolicy::buyer_may_cancel`] the buyer may also cancel.
//! 2. **Dispute gate.** An order with an open dispute refuses every
//!    transition with `Conflict`, even one the graph would allow.
//! 3. **Graph.** Anything not drawn above is `InvalidTransition`, including
//!    every transition out of a terminal state.
//!
//! All logic is pure: the caller supplies the timestamp and persists.

use chrono::{DateTime, Utc};
use mkt_access::{order_role, OrderRole};
use mkt_schemas::{Order, OrderStatus, ServiceError, ServiceResult, StatusChange};

use crate::DisputeGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionPolicy {
    /// Let the buyer request `cancelled` (vendor-only when false).
    pub buyer_may_cancel: bool,
}

/// Validate one edge of the graph.
pub fn next_status(from: OrderStatus, to: OrderStatus) -> ServiceResult<OrderStatus> {
    use OrderStatus::*;

    match (from, to) {
        // Forward path.
        (New, Processing) | (Processing, Shipped) | (Shipped, Delivered) => Ok(to),

        // Cancellation from any non-terminal state.
        (New | Processing | Shipped, Cancelled) => Ok(to),

        // Everything else, including all exits from Delivered / Cancelled.
        (from, to) => Err(ServiceError::InvalidTransition { from, to }),
    }
}

/// Every status reachable in one step from `from`.
pub fn allowed_targets(from: OrderStatus) -> Vec<OrderStatus> {
    use OrderStatus::*;
    [New, Processing, Shipped, Delivered, Cancelled]
        .into_iter()
        .filter(|to| next_status(from, *to).is_ok())
        .collect()
}

/// Check that the recorded history replays from `new` to the current status
/// through valid edges only.
pub fn verify_history(order: &Order) -> ServiceResult<()> {
    let mut at = OrderStatus::New;
    for (i, change) in order.status_history.iter().enumerate() {
        if change.from != at {
            return Err(ServiceError::Internal(format!(
                "order {} history entry {i} starts at {} but previous status was {at}",
                order.id, change.from
            )));
        }
        at = next_status(change.from, change.to)?;
    }
    if at != order.status {
        return Err(ServiceError::Internal(format!(
            "order {} history ends at {at} but status is {}",
            order.id, order.status
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMachine {
    policy: TransitionPolicy,
}

impl StatusMachine {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// `target` is `None` when the requested name matched no status.
    fn authorize(
        &self,
        order: &Order,
        caller: &str,
        target: Option<OrderStatus>,
    ) -> ServiceResult<()> {
        match order_role(caller, order) {
            Some(OrderRole::Vendor) => Ok(()),
            Some(OrderRole::Buyer)
                if self.policy.buyer_may_cancel && target == Some(OrderStatus::Cancelled) =>
            {
                Ok(())
            }
            Some(OrderRole::Buyer) => Err(ServiceError::Forbidden(format!(
                "buyer may not move order {} to {}",
                order.id,
                target.map_or_else(|| "that status".to_string(), |t| t.to_string())
            ))),
            None => Err(ServiceError::Forbidden(format!(
                "caller is not a party to order {}",
                order.id
            ))),
        }
    }

    /// Validate and apply a transition in place.
    ///
    /// On error `order` is left untouched.
    pub fn apply(
        &self,
        order: &mut Order,
        caller: &str,
        target: OrderStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> ServiceResult<StatusChange> {
        self.authorize(order, caller, Some(target))?;
        DisputeGate::check_transition(order)?;
        let to = next_status(order.status, target)?;

        let change = StatusChange {
            from: order.status,
            to,
            by: caller.to_string(),
            note,
            at,
        };
        order.status = to;
        order.status_history.push(change.clone());
        Ok(change)
    }

    /// [`Self::apply`] for a target given by name.
    ///
    /// A name that matches no status still goes through authorization and
    /// the dispute gate first, then fails as `UnknownStatus`.
    pub fn apply_named(
        &self,
        order: &mut Order,
        caller: &str,
        requested: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> ServiceResult<StatusChange> {
        if let Some(target) = OrderStatus::parse(requested) {
            return self.apply(order, caller, target, note, at);
        }
        self.authorize(order, caller, None)?;
        DisputeGate::check_transition(order)?;
        Err(ServiceError::UnknownStatus {
            from: order.status,
            requested: requested.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mkt_schemas::{Amount, LineItem};
    use uuid::Uuid;

    fn order() -> Order {
        Order::new(
            "buyer",
            "vendor",
            vec![LineItem {
                product_id: "p".to_string(),
                quantity: 1,
            }],
            Amount::ZERO,
        )
    }

    fn step(m: &StatusMachine, o: &mut Order, who: &str, to: OrderStatus) -> ServiceResult<()> {
        m.apply(o, who, to, None, Utc::now()).map(|_| ())
    }

    #[test]
    fn forward_path_reaches_delivered() {
        let m = StatusMachine::default();
        let mut o = order();
        step(&m, &mut o, "vendor", OrderStatus::Processing).unwrap();
        step(&m, &mut o, "vendor", OrderStatus::Shipped).unwrap();
        step(&m, &mut o, "vendor", OrderStatus::Delivered).unwrap();
        assert_eq!(o.status, OrderStatus::Delivered);
        assert_eq!(o.status_history.len(), 3);
        verify_history(&o).unwrap();
    }

    #[test]
    fn skipping_a_state_is_invalid() {
        let m = StatusMachine::default();
        let mut o = order();
        let err = step(&m, &mut o, "vendor", OrderStatus::Shipped).unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidTransition {
                from: OrderStatus::New,
                to: OrderStatus::Shipped
            }
        );
        assert_eq!(o.status, OrderStatus::New, "state must not change on error");
        assert!(o.status_history.is_empty());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for term in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert!(allowed_targets(term).is_empty(), "{term} must be terminal");
        }
        assert_eq!(
            allowed_targets(OrderStatus::Shipped),
            vec![OrderStatus::Delivered, OrderStatus::Cancelled]
        );
    }

    #[test]
    fn cancel_from_every_live_state() {
        for start in [OrderStatus::New, OrderStatus::Processing, OrderStatus::Shipped] {
            assert_eq!(
                next_status(start, OrderStatus::Cancelled),
                Ok(OrderStatus::Cancelled)
            );
        }
    }

    #[test]
    fn buyer_cannot_drive_status_by_default() {
        let m = StatusMachine::default();
        let mut o = order();
        let err = step(&m, &mut o, "buyer", OrderStatus::Cancelled).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = step(&m, &mut o, "stranger", OrderStatus::Processing).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn buyer_cancel_policy_allows_only_cancel() {
        let m = StatusMachine::new(TransitionPolicy {
            buyer_may_cancel: true,
        });
        let mut o = order();
        let err = step(&m, &mut o, "buyer", OrderStatus::Processing).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        step(&m, &mut o, "buyer", OrderStatus::Cancelled).unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
    }

    #[test]
    fn open_dispute_beats_an_otherwise_valid_transition() {
        let m = StatusMachine::default();
        let mut o = order();
        o.open_dispute_id = Some(Uuid::new_v4());
        let err = step(&m, &mut o, "vendor", OrderStatus::Processing).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn authorization_is_checked_before_the_dispute_lock() {
        let m = StatusMachine::default();
        let mut o = order();
        o.open_dispute_id = Some(Uuid::new_v4());
        let err = step(&m, &mut o, "stranger", OrderStatus::Processing).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn dispute_lock_is_checked_before_the_graph() {
        let m = StatusMachine::default();
        let mut o = order();
        o.status = OrderStatus::Delivered;
        o.open_dispute_id = Some(Uuid::new_v4());
        let err = step(&m, &mut o, "vendor", OrderStatus::Shipped).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn unknown_status_name_is_checked_after_auth_and_lock() {
        let m = StatusMachine::default();
        let mut o = order();
        let named = |m: &StatusMachine, o: &mut Order, who: &str, to: &str| {
            m.apply_named(o, who, to, None, Utc::now()).map(|_| ())
        };

        let err = named(&m, &mut o, "stranger", "returned").unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = named(&m, &mut o, "vendor", "returned").unwrap_err();
        assert_eq!(
            err,
            ServiceError::UnknownStatus {
                from: OrderStatus::New,
                requested: "returned".to_string()
            }
        );

        o.open_dispute_id = Some(Uuid::new_v4());
        let err = named(&m, &mut o, "vendor", "returned").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(o.status_history.is_empty());

        o.open_dispute_id = None;
        named(&m, &mut o, "vendor", "Processing").unwrap();
        assert_eq!(o.status, OrderStatus::Processing);
    }

    #[test]
    fn note_is_recorded_in_history() {
        let m = StatusMachine::default();
        let mut o = order();
        m.apply(
            &mut o,
            "vendor",
            OrderStatus::Processing,
            Some("packed".to_string()),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(o.status_history[0].note.as_deref(), Some("packed"));
        assert_eq!(o.status_history[0].by, "vendor");
    }

    #[test]
    fn tampered_history_is_detected() {
        let mut o = order();
        o.status = OrderStatus::Shipped;
        assert!(matches!(
            verify_history(&o),
            Err(ServiceError::Internal(_))
        ));
    }
}
