use super::Timestamp;
use super::approval::PendingApproval;
use super::history::{PaymentEntry, StatusChange};
use super::ids::{PaymentId, Principal, ServiceId, SubscriptionId, TokenId};
use super::money::Amount;
use super::payment::{Payment, PaymentStatus};
use super::service::Service;
use super::settings::AutoPaySettings;
use super::subscription::Subscription;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn next_service_id(&self) -> Result<ServiceId>;
    async fn put_service(&self, service: Service) -> Result<()>;
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn next_subscription_id(&self) -> Result<SubscriptionId>;
    async fn put_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>>;
    /// Removes the primary row only; histories and index entries stay.
    async fn delete_subscription(&self, id: SubscriptionId) -> Result<()>;
    async fn all_subscriptions(&self) -> Result<Vec<Subscription>>;
    /// Appends `id` to the user's subscription list. The list is never compacted.
    async fn index_subscription(&self, user: &Principal, id: SubscriptionId) -> Result<()>;
    async fn subscriptions_of(&self, user: &Principal) -> Result<Vec<SubscriptionId>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn next_payment_id(&self) -> Result<PaymentId>;
    async fn put_payment(&self, payment: Payment) -> Result<()>;
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn put_settings(&self, settings: AutoPaySettings) -> Result<()>;
    async fn get_settings(&self, user: &Principal) -> Result<Option<AutoPaySettings>>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn put_approval(&self, approval: PendingApproval) -> Result<()>;
    async fn get_approval(
        &self,
        subscription_id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<Option<PendingApproval>>;
    /// The most recent approval of the subscription that is still pending or
    /// approved, if any.
    async fn open_approval(&self, subscription_id: SubscriptionId)
    -> Result<Option<PendingApproval>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_status(&self, id: SubscriptionId, change: StatusChange) -> Result<()>;
    async fn status_history(&self, id: SubscriptionId) -> Result<Vec<StatusChange>>;
    async fn append_payment(&self, id: SubscriptionId, entry: PaymentEntry) -> Result<()>;
    async fn payment_history(&self, id: SubscriptionId) -> Result<Vec<PaymentEntry>>;
}

/// Every row a completed settlement writes.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRecord {
    /// Reserved by the redeemed approval. `None` lets the commit allocate one.
    pub payment_id: Option<PaymentId>,
    /// The subscription with its schedule already advanced.
    pub subscription: Subscription,
    pub amount: Amount,
    pub settled_at: Timestamp,
    /// The approval this settlement redeemed, already marked consumed.
    pub consumed_approval: Option<PendingApproval>,
}

impl SettlementRecord {
    pub fn payment(&self, id: PaymentId) -> Payment {
        Payment {
            id,
            subscription_id: self.subscription.id,
            payer: self.subscription.subscriber.clone(),
            recipient: self.subscription.recipient.clone(),
            amount: self.amount,
            token: self.subscription.token.clone(),
            settled_at: self.settled_at,
            status: PaymentStatus::Completed,
        }
    }

    pub fn entry(&self, id: PaymentId) -> PaymentEntry {
        PaymentEntry {
            payment_id: id,
            amount: self.amount,
            at: self.settled_at,
        }
    }
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Writes the payment, the advanced subscription, the payment-history
    /// entry and the consumed approval as one unit, and returns the payment
    /// id. On error nothing was written, and no payment id was used up.
    async fn commit_settlement(&self, record: SettlementRecord) -> Result<PaymentId>;
}

/// Everything the billing engine persists.
pub trait EntityStore:
    ServiceStore
    + SubscriptionStore
    + PaymentStore
    + SettingsStore
    + ApprovalStore
    + HistoryStore
    + SettlementStore
{
}

impl<T> EntityStore for T where
    T: ServiceStore
        + SubscriptionStore
        + PaymentStore
        + SettingsStore
        + ApprovalStore
        + HistoryStore
        + SettlementStore
{
}

pub type EntityStoreBox = Box<dyn EntityStore>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// The value-transfer primitive the engine settles through.
///
/// A transfer either moves the full amount or fails without effect.
#[async_trait]
pub trait ValueTransfer: Send + Sync {
    async fn transfer(
        &self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
        token: Option<&TokenId>,
    ) -> std::result::Result<(), TransferError>;
}

pub type ValueTransferRef = Arc<dyn ValueTransfer>;

/// Monotonic time (or block height) source supplied by the environment.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub type ClockRef = Arc<dyn Clock>;
