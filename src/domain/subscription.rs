use super::Timestamp;
use super::ids::{Principal, ServiceId, SubscriptionId, TokenId};
use super::money::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Paused,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// A recurring obligation of `subscriber` to pay `amount` to `recipient`
/// every `period`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub service_id: ServiceId,
    /// The payer, and the only principal allowed to change the subscription.
    pub subscriber: Principal,
    pub recipient: Principal,
    pub amount: Amount,
    /// Always greater than zero.
    pub period: u64,
    /// Only moves forward, and only on a completed settlement.
    pub next_payment_due: Timestamp,
    pub payment_count: u64,
    pub token: Option<TokenId>,
    pub status: SubscriptionStatus,
    pub created_at: Timestamp,
}

impl Subscription {
    pub fn is_owned_by(&self, principal: &Principal) -> bool {
        &self.subscriber == principal
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Applies a completed settlement: moves the schedule to `next_due` and
    /// counts the payment.
    pub fn record_settlement(&mut self, next_due: Timestamp) {
        debug_assert!(next_due >= self.next_payment_due);
        self.next_payment_due = next_due;
        self.payment_count += 1;
    }
}
