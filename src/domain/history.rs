use super::Timestamp;
use super::ids::PaymentId;
use super::money::Amount;
use super::subscription::SubscriptionStatus;
use serde::{Deserialize, Serialize};

/// One status transition of a subscription, in audit order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct StatusChange {
    pub status: SubscriptionStatus,
    pub at: Timestamp,
}

/// One settled payment of a subscription, in audit order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentEntry {
    pub payment_id: PaymentId,
    pub amount: Amount,
    pub at: Timestamp,
}
