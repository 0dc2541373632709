//! mkt-access
//!
//! Access Control Policy for orders and conversations.
//!
//! Responsibilities:
//! - Decide whether a caller may see or act on an order (buyer or vendor).
//! - Decide whether a caller may read or write a conversation (participant).
//! - Role checks used by the order service (vendor drives status, buyer
//!   opens disputes).
//!
//! Everything here is pure: no IO, no clock, no store access. Services must
//! consult it before any read or mutation that is not already scoped by a
//! listing filter.

use mkt_schemas::{Conversation, Order, ServiceError, ServiceResult};

/// Party role of a caller relative to one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Buyer,
    Vendor,
}

/// The caller's role on `order`, if any.
pub fn order_role(caller: &str, order: &Order) -> Option<OrderRole> {
    if caller == order.vendor_id {
        Some(OrderRole::Vendor)
    } else if caller == order.buyer_id {
        Some(OrderRole::Buyer)
    } else {
        None
    }
}

/// True iff `caller` is the order's buyer or vendor.
pub fn can_access_order(caller: &str, order: &Order) -> bool {
    order_role(caller, order).is_some()
}

/// True iff `caller` is a listed participant.
pub fn can_access_conversation(caller: &str, conversation: &Conversation) -> bool {
    conversation.has_participant(caller)
}

pub fn ensure_order_access(caller: &str, order: &Order) -> ServiceResult<OrderRole> {
    order_role(caller, order).ok_or_else(|| {
        ServiceError::Forbidden(format!("caller is not a party to order {}", order.id))
    })
}

pub fn ensure_buyer(caller: &str, order: &Order) -> ServiceResult<()> {
    match order_role(caller, order) {
        Some(OrderRole::Buyer) => Ok(()),
        _ => Err(ServiceError::Forbidden(format!(
            "only the buyer may open a dispute on order {}",
            order.id
        ))),
    }
}

pub fn ensure_participant(caller: &str, conversation: &Conversation) -> ServiceResult<()> {
    if can_access_conversation(caller, conversation) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "caller is not a participant of conversation {}",
            conversation.id
        )))
    }
}
