//! Settlement of due subscription payments.

use super::engine::{BillingEngine, schedule_overflow};
use super::policy::{self, PolicyDecision};
use super::scheduler;
use crate::domain::approval::{ApprovalState, PendingApproval};
use crate::domain::ids::{PaymentId, Principal, SubscriptionId};
use crate::domain::ports::SettlementRecord;
use crate::domain::subscription::Subscription;
use crate::error::{BillingError, Result};
use tracing::{debug, info, warn};

impl BillingEngine {
    /// Settles the current cycle of a subscription.
    ///
    /// Anyone may trigger a settlement; the payer is always the subscriber.
    /// Payments above the subscriber's auto-pay threshold need an approved
    /// approval for this exact cycle, otherwise one is opened and
    /// `ApprovalRequired` is returned. Nothing is written unless the transfer
    /// succeeds, and a transfer whose records fail to commit is reversed.
    pub async fn settle(&self, caller: &Principal, id: SubscriptionId) -> Result<PaymentId> {
        let _guard = self.locks.acquire(id).await;
        let mut subscription = self.load_subscription(id).await?;

        if !subscription.is_active() {
            return Err(BillingError::NotActive);
        }
        let now = self.clock.now();
        if !scheduler::is_due(now, subscription.next_payment_due) {
            return Err(BillingError::NotDue {
                next_due: subscription.next_payment_due,
                now,
            });
        }
        let next_due = scheduler::next_due(subscription.next_payment_due, subscription.period)
            .ok_or_else(schedule_overflow)?;

        let settings = self.store.get_settings(&subscription.subscriber).await?;
        let approval = match policy::evaluate(settings.as_ref(), subscription.amount) {
            PolicyDecision::Allowed => None,
            PolicyDecision::RequiresApproval => {
                Some(self.approval_for_cycle(&subscription, now).await?)
            }
        };

        debug!(
            subscription = %id,
            caller = %caller,
            amount = %subscription.amount,
            "settling subscription"
        );
        self.transfer
            .transfer(
                subscription.amount,
                &subscription.subscriber,
                &subscription.recipient,
                subscription.token.as_ref(),
            )
            .await
            .inspect_err(|e| warn!(subscription = %id, error = %e, "settlement transfer failed"))?;

        let (amount, payer, recipient, token) = (
            subscription.amount,
            subscription.subscriber.clone(),
            subscription.recipient.clone(),
            subscription.token.clone(),
        );
        subscription.record_settlement(next_due);
        let payment_count = subscription.payment_count;
        let record = SettlementRecord {
            payment_id: approval.as_ref().map(|a| a.payment_id),
            subscription,
            amount,
            settled_at: now,
            consumed_approval: approval.map(|mut a| {
                a.state = ApprovalState::Consumed;
                a
            }),
        };
        let payment_id = match self.store.commit_settlement(record).await {
            Ok(payment_id) => payment_id,
            Err(e) => {
                warn!(subscription = %id, error = %e, "settlement commit failed");
                self.reverse_transfer(amount, &payer, &recipient, token.as_ref())
                    .await;
                return Err(e);
            }
        };

        info!(
            subscription = %id,
            payment = %payment_id,
            %amount,
            next_due,
            payment_count,
            "payment settled"
        );
        Ok(payment_id)
    }

    /// Returns the approved approval covering the subscription's current
    /// cycle, or opens one and fails with `ApprovalRequired`.
    async fn approval_for_cycle(
        &self,
        subscription: &Subscription,
        now: u64,
    ) -> Result<PendingApproval> {
        match self.store.open_approval(subscription.id).await? {
            Some(approval) if approval.covers(subscription) && approval.is_approved() => {
                Ok(approval)
            }
            Some(approval) if approval.covers(subscription) => {
                debug!(
                    subscription = %subscription.id,
                    payment = %approval.payment_id,
                    "approval still pending"
                );
                Err(BillingError::ApprovalRequired {
                    payment_id: approval.payment_id,
                })
            }
            stale => {
                let approval = self.open_fresh_approval(subscription, stale, now).await?;
                Err(BillingError::ApprovalRequired {
                    payment_id: approval.payment_id,
                })
            }
        }
    }

    /// Opens a pending approval for the current cycle, expiring `stale` first.
    pub(crate) async fn open_fresh_approval(
        &self,
        subscription: &Subscription,
        stale: Option<PendingApproval>,
        now: u64,
    ) -> Result<PendingApproval> {
        if let Some(mut stale) = stale {
            info!(
                subscription = %subscription.id,
                payment = %stale.payment_id,
                "expiring approval for a superseded cycle"
            );
            stale.state = ApprovalState::Expired;
            self.store.put_approval(stale).await?;
        }

        let payment_id = self.store.next_payment_id().await?;
        let approval = PendingApproval::for_subscription(subscription, payment_id, now);
        self.store.put_approval(approval.clone()).await?;
        info!(
            subscription = %subscription.id,
            payment = %payment_id,
            user = %approval.user,
            amount = %approval.amount,
            due_date = approval.due_date,
            "approval requested"
        );
        Ok(approval)
    }
}
