//! mkt-schemas
//!
//! Statically typed records shared by every marketplace crate. The backing
//! store keeps these as opaque JSON bodies; nothing here knows about that.
//!
//! Wire/body field names are camelCase and the identifier is `objectId`, so
//! the same serialization is used for persistence and for HTTP responses.

mod amount;
mod conversation;
mod dispute;
mod error;
mod order;

pub use amount::{Amount, AmountError, MICROS_PER_UNIT};
pub use conversation::{Conversation, Message};
pub use dispute::{Dispute, DisputeStatus};
pub use error::{ServiceError, ServiceResult};
pub use order::{LineItem, Order, OrderStatus, StatusChange};

/// Identifier of an authenticated caller (buyer, vendor or any participant).
///
/// Opaque: issued by the upstream session layer and only compared for
/// equality here.
pub type UserId = String;
