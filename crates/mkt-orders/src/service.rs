use chrono::Utc;
use mkt_access::ensure_order_access;
use mkt_schemas::{
    Amount, Dispute, DisputeStatus, LineItem, Order, OrderStatus, ServiceError, ServiceResult,
    StatusChange,
};
use mkt_store::{Repository, StoreError, Stored};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{DisputeGate, StatusMachine, TransitionPolicy};

/// Re-reads allowed when a lock-only write loses to a concurrent write.
///
/// Taking or clearing the lock does not depend on the order's status, so
/// re-evaluating against the fresh record cannot double-apply anything.
const LOCK_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub vendor_id: String,
    pub items: Vec<LineItem>,
    pub total: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDispute {
    pub reason: String,
    #[serde(default)]
    pub description: String,
    pub amount_requested: Amount,
}

#[derive(Clone)]
pub struct OrderService {
    repo: Repository,
    machine: StatusMachine,
}

impl OrderService {
    pub fn new(repo: Repository, policy: TransitionPolicy) -> Self {
        Self {
            repo,
            machine: StatusMachine::new(policy),
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.machine.policy()
    }

    /// Operator read: no access check. Request paths use [`Self::get_order`].
    pub async fn load_order(&self, order_id: Uuid) -> ServiceResult<Stored<Order>> {
        self.repo
            .get::<Order>(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("order {order_id}")))
    }

    async fn load_dispute(&self, dispute_id: Uuid) -> ServiceResult<Stored<Dispute>> {
        self.repo
            .get::<Dispute>(dispute_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("dispute {dispute_id}")))
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Place an order with the caller as buyer.
    pub async fn create_order(&self, caller: &str, req: NewOrder) -> ServiceResult<Stored<Order>> {
        let vendor = req.vendor_id.trim();
        if vendor.is_empty() {
            return Err(ServiceError::InvalidArgument("vendorId is required".into()));
        }
        if vendor == caller {
            return Err(ServiceError::InvalidArgument(
                "buyer and vendor must differ".into(),
            ));
        }
        if req.items.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "order must contain at least one item".into(),
            ));
        }
        for (i, item) in req.items.iter().enumerate() {
            if item.product_id.trim().is_empty() {
                return Err(ServiceError::InvalidArgument(format!(
                    "items[{i}].productId is required"
                )));
            }
            if item.quantity == 0 {
                return Err(ServiceError::InvalidArgument(format!(
                    "items[{i}].quantity must be positive"
                )));
            }
        }

        let order = Order::new(caller, vendor, req.items, req.total);
        let stored = self.repo.insert(&order).await?;
        info!(order_id = %order.id, buyer = caller, vendor, "order created");
        Ok(stored)
    }

    pub async fn get_order(&self, caller: &str, order_id: Uuid) -> ServiceResult<Stored<Order>> {
        let order = self.load_order(order_id).await?;
        ensure_order_access(caller, &order.record)?;
        Ok(order)
    }

    /// Move an order to `target`.
    ///
    /// Errors, in precedence order: `NotFound`, `Forbidden`, `Conflict` (open
    /// dispute), `InvalidTransition`. A conditional write that loses to a
    /// concurrent write is `Conflict` and is not retried here.
    pub async fn request_transition(
        &self,
        caller: &str,
        order_id: Uuid,
        target: OrderStatus,
        note: Option<String>,
    ) -> ServiceResult<Stored<Order>> {
        self.transition(caller, order_id, |machine, order| {
            machine.apply(order, caller, target, note, Utc::now())
        })
        .await
    }

    /// [`Self::request_transition`] with the target as sent by a client. A
    /// name matching no status fails last, as `UnknownStatus`.
    pub async fn request_named_transition(
        &self,
        caller: &str,
        order_id: Uuid,
        target: &str,
        note: Option<String>,
    ) -> ServiceResult<Stored<Order>> {
        self.transition(caller, order_id, |machine, order| {
            machine.apply_named(order, caller, target, note, Utc::now())
        })
        .await
    }

    async fn transition<F>(
        &self,
        caller: &str,
        order_id: Uuid,
        apply: F,
    ) -> ServiceResult<Stored<Order>>
    where
        F: FnOnce(&StatusMachine, &mut Order) -> ServiceResult<StatusChange>,
    {
        let current = self.load_order(order_id).await?;
        let mut next = current.record.clone();
        let change = apply(&self.machine, &mut next)?;

        match self.repo.replace(&current, &next).await {
            Ok(stored) => {
                info!(
                    %order_id,
                    from = %change.from,
                    to = %change.to,
                    by = caller,
                    "order status changed"
                );
                Ok(stored)
            }
            Err(e @ StoreError::VersionMismatch { .. }) => {
                warn!(%order_id, to = %change.to, "status change lost to a concurrent write");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Disputes
    // -----------------------------------------------------------------------

    /// Open a dispute and lock the order.
    ///
    /// The dispute record is written first and the lock is taken after it
    /// with a conditional write on the order. If the lock cannot be taken
    /// the record is withdrawn. A failure part way leaves at worst an open
    /// dispute holding no lock, which `resolve_dispute` still closes; the
    /// order is never locked by an id with no dispute record behind it.
    pub async fn open_dispute(
        &self,
        caller: &str,
        order_id: Uuid,
        req: NewDispute,
    ) -> ServiceResult<Stored<Dispute>> {
        let current = self.load_order(order_id).await?;
        DisputeGate::check_open(&current.record, caller)?;
        if req.reason.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("reason is required".into()));
        }

        let dispute = Dispute {
            id: Uuid::new_v4(),
            order_id,
            opened_by: caller.to_string(),
            reason: req.reason.trim().to_string(),
            description: req.description,
            amount_requested: req.amount_requested,
            status: DisputeStatus::Open,
            resolution: None,
            resolved_at: None,
        };
        let dispute_id = dispute.id;
        let stored = self.create_dispute(&dispute).await?;

        match self.take_lock(caller, order_id, dispute_id).await {
            Ok(()) => {
                info!(%order_id, %dispute_id, by = caller, "dispute opened; order locked");
                Ok(stored)
            }
            Err(e) => {
                warn!(
                    %order_id,
                    %dispute_id,
                    error = %e,
                    "order lock not taken; withdrawing dispute"
                );
                if let Err(withdraw) = self.withdraw(&stored).await {
                    warn!(
                        %order_id,
                        %dispute_id,
                        error = %withdraw,
                        "withdrawal failed; dispute stays open without a lock"
                    );
                }
                // A timed-out lock write may still have landed.
                if let Err(release) = self.release_lock(order_id, dispute_id).await {
                    warn!(%order_id, %dispute_id, error = %release, "lock release failed");
                }
                Err(e)
            }
        }
    }

    /// Insert a dispute record. A timed-out insert may have committed, so
    /// the id is read back before the timeout is reported.
    async fn create_dispute(&self, dispute: &Dispute) -> ServiceResult<Stored<Dispute>> {
        match self.repo.insert(dispute).await {
            Ok(stored) => Ok(stored),
            Err(e @ StoreError::Timeout(_)) => match self.repo.get::<Dispute>(dispute.id).await {
                Ok(Some(stored)) => {
                    warn!(dispute_id = %dispute.id, "dispute insert timed out but committed");
                    Ok(stored)
                }
                _ => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Point the order's lock at `dispute_id`.
    ///
    /// The write is conditional on the version just read, so retrying after
    /// a lost race or a timeout cannot apply it twice.
    async fn take_lock(&self, caller: &str, order_id: Uuid, dispute_id: Uuid) -> ServiceResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load_order(order_id).await?;
            if current.record.open_dispute_id == Some(dispute_id) {
                return Ok(());
            }
            DisputeGate::check_open(&current.record, caller)?;

            let locked = DisputeGate::locked(&current.record, dispute_id);
            match self.repo.replace(&current, &locked).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionMismatch { .. } | StoreError::Timeout(_))
                    if attempt < LOCK_ATTEMPTS =>
                {
                    warn!(%order_id, attempt, "dispute lock write not confirmed; re-reading order");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn withdraw(&self, dispute: &Stored<Dispute>) -> ServiceResult<()> {
        let mut next = dispute.record.clone();
        next.status = DisputeStatus::Withdrawn;
        next.resolved_at = Some(Utc::now());
        self.repo.replace(dispute, &next).await?;
        Ok(())
    }

    pub async fn get_dispute(
        &self,
        caller: &str,
        dispute_id: Uuid,
    ) -> ServiceResult<Stored<Dispute>> {
        let dispute = self.load_dispute(dispute_id).await?;
        let order = self.load_order(dispute.record.order_id).await?;
        ensure_order_access(caller, &order.record)?;
        Ok(dispute)
    }

    /// Mark a dispute resolved and unlock its order. Order status is not
    /// touched.
    ///
    /// Resolving a closed (resolved or withdrawn) dispute whose order is
    /// still locked by it only finishes the unlock; otherwise it is
    /// `Conflict`.
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        resolution: &str,
    ) -> ServiceResult<Stored<Dispute>> {
        let resolution = resolution.trim();
        if resolution.is_empty() {
            return Err(ServiceError::InvalidArgument("resolution is required".into()));
        }

        let current = self.load_dispute(dispute_id).await?;
        let order_id = current.record.order_id;

        let resolved = if current.record.is_open() {
            let mut next = current.record.clone();
            next.status = DisputeStatus::Resolved;
            next.resolution = Some(resolution.to_string());
            next.resolved_at = Some(Utc::now());
            self.repo.replace(&current, &next).await?
        } else {
            let order = self.load_order(order_id).await?;
            if order.record.open_dispute_id != Some(dispute_id) {
                return Err(ServiceError::Conflict(format!(
                    "dispute {dispute_id} is already closed"
                )));
            }
            current
        };

        self.release_lock(order_id, dispute_id).await?;
        info!(%order_id, %dispute_id, "dispute resolved; order unlocked");
        Ok(resolved)
    }

    /// Clear the order's lock if `dispute_id` still holds it.
    async fn release_lock(&self, order_id: Uuid, dispute_id: Uuid) -> ServiceResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load_order(order_id).await?;
            let Some(next) = DisputeGate::released(&current.record, dispute_id) else {
                return Ok(());
            };
            match self.repo.replace(&current, &next).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionMismatch { .. }) if attempt < LOCK_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
