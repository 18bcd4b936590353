use super::Timestamp;
use super::ids::{PaymentId, Principal, SubscriptionId, TokenId};
use super::money::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Failed,
    Refunded,
}

/// The record of one settled payment. Immutable apart from a refund.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub payer: Principal,
    pub recipient: Principal,
    pub amount: Amount,
    pub token: Option<TokenId>,
    pub settled_at: Timestamp,
    pub status: PaymentStatus,
}
