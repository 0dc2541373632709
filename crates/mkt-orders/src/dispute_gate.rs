//! Per-order dispute lock.
//!
//! The lock is the order's `openDisputeId`. Taking and releasing it are
//! ordinary conditional writes of the order record, so a lock and a status
//! transition on the same order can never both apply against one version.

use mkt_access::ensure_buyer;
use mkt_schemas::{Order, ServiceError, ServiceResult};
use uuid::Uuid;

pub struct DisputeGate;

impl DisputeGate {
    /// Veto a status transition while a dispute is open.
    pub fn check_transition(order: &Order) -> ServiceResult<()> {
        match order.open_dispute_id {
            Some(dispute_id) => Err(ServiceError::Conflict(format!(
                "order {} is locked by open dispute {dispute_id}",
                order.id
            ))),
            None => Ok(()),
        }
    }

    /// Buyer only, and at most one open dispute per order.
    pub fn check_open(order: &Order, caller: &str) -> ServiceResult<()> {
        ensure_buyer(caller, order)?;
        if let Some(existing) = order.open_dispute_id {
            return Err(ServiceError::Conflict(format!(
                "order {} already has open dispute {existing}",
                order.id
            )));
        }
        Ok(())
    }

    /// Copy of `order` locked by `dispute_id`.
    pub fn locked(order: &Order, dispute_id: Uuid) -> Order {
        let mut next = order.clone();
        next.open_dispute_id = Some(dispute_id);
        next
    }

    /// Copy of `order` with the lock cleared, or `None` when `dispute_id` is
    /// not the dispute holding it.
    pub fn released(order: &Order, dispute_id: Uuid) -> Option<Order> {
        if order.open_dispute_id != Some(dispute_id) {
            return None;
        }
        let mut next = order.clone();
        next.open_dispute_id = None;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mkt_schemas::{Amount, LineItem};

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

    #[test]
    fn only_the_buyer_may_open() {
        let o = order();
        assert!(DisputeGate::check_open(&o, "buyer").is_ok());
        assert!(matches!(
            DisputeGate::check_open(&o, "vendor"),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn second_open_dispute_conflicts() {
        let o = DisputeGate::locked(&order(), Uuid::new_v4());
        assert!(matches!(
            DisputeGate::check_open(&o, "buyer"),
            Err(ServiceError::Conflict(_))
        ));
        assert!(DisputeGate::check_transition(&o).is_err());
    }

    #[test]
    fn release_requires_the_holding_dispute() {
        let d = Uuid::new_v4();
        let o = DisputeGate::locked(&order(), d);
        assert!(DisputeGate::released(&o, Uuid::new_v4()).is_none());
        let open = DisputeGate::released(&o, d).unwrap();
        assert!(open.open_dispute_id.is_none());
        assert!(DisputeGate::check_transition(&open).is_ok());
    }
}
