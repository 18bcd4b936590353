use crate::domain::approval::PendingApproval;
use crate::domain::history::{PaymentEntry, StatusChange};
use crate::domain::ids::{PaymentId, Principal, ServiceId, SubscriptionId};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    ApprovalStore, HistoryStore, PaymentStore, ServiceStore, SettingsStore, SettlementRecord,
    SettlementStore, SubscriptionStore,
};
use crate::domain::service::Service;
use crate::domain::settings::AutoPaySettings;
use crate::domain::subscription::Subscription;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Counters {
    services: AtomicU64,
    subscriptions: AtomicU64,
    payments: AtomicU64,
}

impl Counters {
    /// Ids start at 1 and never repeat.
    fn next(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Default)]
struct Tables {
    services: RwLock<HashMap<ServiceId, Service>>,
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
    user_index: RwLock<HashMap<Principal, Vec<SubscriptionId>>>,
    payments: RwLock<HashMap<PaymentId, Payment>>,
    settings: RwLock<HashMap<Principal, AutoPaySettings>>,
    approvals: RwLock<BTreeMap<(SubscriptionId, PaymentId), PendingApproval>>,
    status_log: RwLock<HashMap<SubscriptionId, Vec<StatusChange>>>,
    payment_log: RwLock<HashMap<SubscriptionId, Vec<PaymentEntry>>>,
}

/// A thread-safe in-memory entity store.
///
/// Every table sits behind its own `RwLock`; `Clone` shares the same tables.
/// Ideal for tests and replay runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Tables>,
    counters: Arc<Counters>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceStore for InMemoryStore {
    async fn next_service_id(&self) -> Result<ServiceId> {
        Ok(ServiceId(Counters::next(&self.counters.services)))
    }

    async fn put_service(&self, service: Service) -> Result<()> {
        let mut services = self.tables.services.write().await;
        services.insert(service.id, service);
        Ok(())
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>> {
        let services = self.tables.services.read().await;
        Ok(services.get(&id).cloned())
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn next_subscription_id(&self) -> Result<SubscriptionId> {
        Ok(SubscriptionId(Counters::next(&self.counters.subscriptions)))
    }

    async fn put_subscription(&self, subscription: Subscription) -> Result<()> {
        let mut subscriptions = self.tables.subscriptions.write().await;
        subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        let subscriptions = self.tables.subscriptions.read().await;
        Ok(subscriptions.get(&id).cloned())
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<()> {
        let mut subscriptions = self.tables.subscriptions.write().await;
        subscriptions.remove(&id);
        Ok(())
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subscriptions = self.tables.subscriptions.read().await;
        Ok(subscriptions.values().cloned().collect())
    }

    async fn index_subscription(&self, user: &Principal, id: SubscriptionId) -> Result<()> {
        let mut index = self.tables.user_index.write().await;
        index.entry(user.clone()).or_default().push(id);
        Ok(())
    }

    async fn subscriptions_of(&self, user: &Principal) -> Result<Vec<SubscriptionId>> {
        let index = self.tables.user_index.read().await;
        Ok(index.get(user).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn next_payment_id(&self) -> Result<PaymentId> {
        Ok(PaymentId(Counters::next(&self.counters.payments)))
    }

    async fn put_payment(&self, payment: Payment) -> Result<()> {
        let mut payments = self.tables.payments.write().await;
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let payments = self.tables.payments.read().await;
        Ok(payments.get(&id).cloned())
    }
}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn put_settings(&self, settings: AutoPaySettings) -> Result<()> {
        let mut all = self.tables.settings.write().await;
        all.insert(settings.user.clone(), settings);
        Ok(())
    }

    async fn get_settings(&self, user: &Principal) -> Result<Option<AutoPaySettings>> {
        let all = self.tables.settings.read().await;
        Ok(all.get(user).cloned())
    }
}

#[async_trait]
impl ApprovalStore for InMemoryStore {
    async fn put_approval(&self, approval: PendingApproval) -> Result<()> {
        let mut approvals = self.tables.approvals.write().await;
        approvals.insert((approval.subscription_id, approval.payment_id), approval);
        Ok(())
    }

    async fn get_approval(
        &self,
        subscription_id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<Option<PendingApproval>> {
        let approvals = self.tables.approvals.read().await;
        Ok(approvals.get(&(subscription_id, payment_id)).cloned())
    }

    async fn open_approval(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<PendingApproval>> {
        let approvals = self.tables.approvals.read().await;
        let range = (subscription_id, PaymentId(0))..=(subscription_id, PaymentId(u64::MAX));
        Ok(approvals
            .range(range)
            .rev()
            .map(|(_, approval)| approval)
            .find(|approval| approval.is_open())
            .cloned())
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn append_status(&self, id: SubscriptionId, change: StatusChange) -> Result<()> {
        let mut log = self.tables.status_log.write().await;
        log.entry(id).or_default().push(change);
        Ok(())
    }

    async fn status_history(&self, id: SubscriptionId) -> Result<Vec<StatusChange>> {
        let log = self.tables.status_log.read().await;
        Ok(log.get(&id).cloned().unwrap_or_default())
    }

    async fn append_payment(&self, id: SubscriptionId, entry: PaymentEntry) -> Result<()> {
        let mut log = self.tables.payment_log.write().await;
        log.entry(id).or_default().push(entry);
        Ok(())
    }

    async fn payment_history(&self, id: SubscriptionId) -> Result<Vec<PaymentEntry>> {
        let log = self.tables.payment_log.read().await;
        Ok(log.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn commit_settlement(&self, record: SettlementRecord) -> Result<PaymentId> {
        // All four tables are held at once so readers never see half a settlement.
        let mut subscriptions = self.tables.subscriptions.write().await;
        let mut payments = self.tables.payments.write().await;
        let mut approvals = self.tables.approvals.write().await;
        let mut payment_log = self.tables.payment_log.write().await;

        let id = match record.payment_id {
            Some(id) => id,
            None => PaymentId(Counters::next(&self.counters.payments)),
        };
        let subscription_id = record.subscription.id;
        payments.insert(id, record.payment(id));
        payment_log
            .entry(subscription_id)
            .or_default()
            .push(record.entry(id));
        if let Some(approval) = record.consumed_approval {
            approvals.insert((approval.subscription_id, approval.payment_id), approval);
        }
        subscriptions.insert(subscription_id, record.subscription);
        Ok(id)
    }
}
