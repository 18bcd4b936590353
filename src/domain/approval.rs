use super::Timestamp;
use super::ids::{PaymentId, Principal, SubscriptionId};
use super::money::Amount;
use super::subscription::Subscription;
use serde::{Deserialize, Serialize};

/// Lifecycle of an approval. `Consumed` and `Expired` are terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    #[default]
    Pending,
    Approved,
    /// Redeemed by a completed settlement.
    Consumed,
    /// Superseded because the subscription's amount or due date changed.
    Expired,
}

/// An explicit authorization gate for one above-threshold payment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PendingApproval {
    pub subscription_id: SubscriptionId,
    /// Reserved up front; the settlement that redeems the approval records
    /// its payment under this id.
    pub payment_id: PaymentId,
    pub user: Principal,
    pub amount: Amount,
    pub due_date: Timestamp,
    pub state: ApprovalState,
    pub created_at: Timestamp,
}

impl PendingApproval {
    pub fn for_subscription(
        subscription: &Subscription,
        payment_id: PaymentId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            subscription_id: subscription.id,
            payment_id,
            user: subscription.subscriber.clone(),
            amount: subscription.amount,
            due_date: subscription.next_payment_due,
            state: ApprovalState::Pending,
            created_at,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ApprovalState::Pending | ApprovalState::Approved)
    }

    pub fn is_approved(&self) -> bool {
        self.state == ApprovalState::Approved
    }

    /// True while the approval still covers the subscription's current cycle.
    pub fn covers(&self, subscription: &Subscription) -> bool {
        self.subscription_id == subscription.id
            && self.amount == subscription.amount
            && self.due_date == subscription.next_payment_due
    }
}
