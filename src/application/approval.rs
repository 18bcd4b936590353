use super::engine::BillingEngine;
use super::policy::{self, PolicyDecision};
use crate::domain::approval::ApprovalState;
use crate::domain::ids::{PaymentId, Principal, SubscriptionId};
use crate::error::{BillingError, Result};
use tracing::{debug, info, warn};

impl BillingEngine {
    /// Opens an approval for the subscription's current cycle ahead of
    /// settlement. Subscriber only.
    ///
    /// Returns the reserved payment id. Requesting again while an approval
    /// for the same cycle is open returns that approval's id.
    pub async fn request_approval(
        &self,
        caller: &Principal,
        id: SubscriptionId,
    ) -> Result<PaymentId> {
        let _guard = self.locks.acquire(id).await;
        let subscription = self.load_owned(caller, id).await?;

        let settings = self.store.get_settings(&subscription.subscriber).await?;
        if policy::evaluate(settings.as_ref(), subscription.amount) == PolicyDecision::Allowed {
            return Err(BillingError::ApprovalNotRequired);
        }

        let open = self.store.open_approval(id).await?;
        if let Some(approval) = &open
            && approval.covers(&subscription)
        {
            debug!(subscription = %id, payment = %approval.payment_id, "approval already open");
            return Ok(approval.payment_id);
        }

        let approval = self
            .open_fresh_approval(&subscription, open, self.clock.now())
            .await?;
        Ok(approval.payment_id)
    }

    /// Grants a pending approval. Only the paying user may approve.
    ///
    /// Approving twice is harmless; approvals that were consumed or expired
    /// cannot be revived.
    pub async fn approve(
        &self,
        caller: &Principal,
        id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut approval = self
            .store
            .get_approval(id, payment_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("approval {id}/{payment_id}")))?;
        if &approval.user != caller {
            warn!(subscription = %id, payment = %payment_id, caller = %caller, "rejected approval by non-payer");
            return Err(BillingError::NotAuthorized);
        }

        match approval.state {
            ApprovalState::Pending => {
                approval.state = ApprovalState::Approved;
                self.store.put_approval(approval).await?;
                info!(subscription = %id, payment = %payment_id, "approval granted");
                Ok(())
            }
            ApprovalState::Approved => Ok(()),
            ApprovalState::Consumed | ApprovalState::Expired => {
                Err(BillingError::ApprovalClosed { payment_id })
            }
        }
    }
}
