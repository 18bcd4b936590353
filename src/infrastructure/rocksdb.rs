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
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Layout version written on first open and checked on every later open.
pub const SCHEMA_VERSION: u32 = 1;

pub const CF_SERVICES: &str = "services";
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
pub const CF_USER_INDEX: &str = "user_index";
pub const CF_PAYMENTS: &str = "payments";
pub const CF_SETTINGS: &str = "settings";
pub const CF_APPROVALS: &str = "approvals";
pub const CF_STATUS_LOG: &str = "status_log";
pub const CF_PAYMENT_LOG: &str = "payment_log";
/// Schema version and sequence counters.
pub const CF_META: &str = "meta";

const ALL_CFS: [&str; 9] = [
    CF_SERVICES,
    CF_SUBSCRIPTIONS,
    CF_USER_INDEX,
    CF_PAYMENTS,
    CF_SETTINGS,
    CF_APPROVALS,
    CF_STATUS_LOG,
    CF_PAYMENT_LOG,
    CF_META,
];

const KEY_SCHEMA_VERSION: &[u8] = b"schema_version";
const SEQ_SERVICES: &[u8] = b"seq:services";
const SEQ_SUBSCRIPTIONS: &[u8] = b"seq:subscriptions";
const SEQ_PAYMENTS: &[u8] = b"seq:payments";
const SEQ_HISTORY: &[u8] = b"seq:history";

/// A persistent entity store backed by RocksDB.
///
/// Each table lives in its own column family with JSON values and
/// big-endian id keys, so iteration follows id order. History logs are keyed
/// by `subscription_id ++ sequence` and read back with a forward scan.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    sequence_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Creates missing column families and rejects databases written with a
    /// different [`SCHEMA_VERSION`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            sequence_lock: Arc::new(Mutex::new(())),
        };
        store.check_schema_version()?;
        Ok(store)
    }

    fn check_schema_version(&self) -> Result<()> {
        let meta = self.cf(CF_META)?;
        match self.db.get_cf(meta, KEY_SCHEMA_VERSION)? {
            None => {
                self.db
                    .put_cf(meta, KEY_SCHEMA_VERSION, SCHEMA_VERSION.to_be_bytes())?;
                Ok(())
            }
            Some(bytes) => {
                let found = bytes
                    .as_slice()
                    .try_into()
                    .map(u32::from_be_bytes)
                    .map_err(|_| internal("Corrupt schema version"))?;
                if found == SCHEMA_VERSION {
                    Ok(())
                } else {
                    Err(BillingError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    })
                }
            }
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| internal(format!("Column family {name} not found")))
    }

    /// Returns the next value of a persisted counter, starting at 1.
    fn next_sequence(&self, key: &[u8]) -> Result<u64> {
        let _guard = self
            .sequence_lock
            .lock()
            .map_err(|_| internal("Sequence lock poisoned"))?;
        let next = self.current_sequence(key)? + 1;
        self.db.put_cf(self.cf(CF_META)?, key, next.to_be_bytes())?;
        Ok(next)
    }

    /// Reads a counter without advancing it. Callers hold `sequence_lock`.
    fn current_sequence(&self, key: &[u8]) -> Result<u64> {
        match self.db.get_cf(self.cf(CF_META)?, key)? {
            Some(bytes) => bytes
                .as_slice()
                .try_into()
                .map(u64::from_be_bytes)
                .map_err(|_| internal("Corrupt sequence counter")),
            None => Ok(0),
        }
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Collects every value whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn append_log<T: Serialize>(&self, cf_name: &str, id: SubscriptionId, entry: &T) -> Result<()> {
        let seq = self.next_sequence(SEQ_HISTORY)?;
        self.put_json(cf_name, &compound_key(id.0, seq), entry)
    }
}

fn internal(message: impl Into<String>) -> BillingError {
    BillingError::InternalError(Box::new(std::io::Error::other(message.into())))
}

fn compound_key(high: u64, low: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&high.to_be_bytes());
    key[8..].copy_from_slice(&low.to_be_bytes());
    key
}

#[async_trait]
impl ServiceStore for RocksDBStore {
    async fn next_service_id(&self) -> Result<ServiceId> {
        self.next_sequence(SEQ_SERVICES).map(ServiceId)
    }

    async fn put_service(&self, service: Service) -> Result<()> {
        self.put_json(CF_SERVICES, &service.id.to_be_bytes(), &service)
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>> {
        self.get_json(CF_SERVICES, &id.to_be_bytes())
    }
}

#[async_trait]
impl SubscriptionStore for RocksDBStore {
    async fn next_subscription_id(&self) -> Result<SubscriptionId> {
        self.next_sequence(SEQ_SUBSCRIPTIONS).map(SubscriptionId)
    }

    async fn put_subscription(&self, subscription: Subscription) -> Result<()> {
        self.put_json(
            CF_SUBSCRIPTIONS,
            &subscription.id.to_be_bytes(),
            &subscription,
        )
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.get_json(CF_SUBSCRIPTIONS, &id.to_be_bytes())
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<()> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        self.db.delete_cf(cf, id.to_be_bytes())?;
        Ok(())
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.scan_prefix(CF_SUBSCRIPTIONS, &[])
    }

    async fn index_subscription(&self, user: &Principal, id: SubscriptionId) -> Result<()> {
        // Read-modify-write of the whole list, serialized with the counters.
        let _guard = self
            .sequence_lock
            .lock()
            .map_err(|_| internal("Sequence lock poisoned"))?;
        let key = user.as_str().as_bytes();
        let mut ids: Vec<SubscriptionId> = self.get_json(CF_USER_INDEX, key)?.unwrap_or_default();
        ids.push(id);
        self.put_json(CF_USER_INDEX, key, &ids)
    }

    async fn subscriptions_of(&self, user: &Principal) -> Result<Vec<SubscriptionId>> {
        Ok(self
            .get_json(CF_USER_INDEX, user.as_str().as_bytes())?
            .unwrap_or_default())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn next_payment_id(&self) -> Result<PaymentId> {
        self.next_sequence(SEQ_PAYMENTS).map(PaymentId)
    }

    async fn put_payment(&self, payment: Payment) -> Result<()> {
        self.put_json(CF_PAYMENTS, &payment.id.to_be_bytes(), &payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, &id.to_be_bytes())
    }
}

#[async_trait]
impl SettingsStore for RocksDBStore {
    async fn put_settings(&self, settings: AutoPaySettings) -> Result<()> {
        self.put_json(CF_SETTINGS, settings.user.as_str().as_bytes(), &settings)
    }

    async fn get_settings(&self, user: &Principal) -> Result<Option<AutoPaySettings>> {
        self.get_json(CF_SETTINGS, user.as_str().as_bytes())
    }
}

#[async_trait]
impl ApprovalStore for RocksDBStore {
    async fn put_approval(&self, approval: PendingApproval) -> Result<()> {
        let key = compound_key(approval.subscription_id.0, approval.payment_id.0);
        self.put_json(CF_APPROVALS, &key, &approval)
    }

    async fn get_approval(
        &self,
        subscription_id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<Option<PendingApproval>> {
        self.get_json(CF_APPROVALS, &compound_key(subscription_id.0, payment_id.0))
    }

    async fn open_approval(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<PendingApproval>> {
        let approvals: Vec<PendingApproval> =
            self.scan_prefix(CF_APPROVALS, &subscription_id.to_be_bytes())?;
        Ok(approvals.into_iter().rev().find(|a| a.is_open()))
    }
}

#[async_trait]
impl HistoryStore for RocksDBStore {
    async fn append_status(&self, id: SubscriptionId, change: StatusChange) -> Result<()> {
        self.append_log(CF_STATUS_LOG, id, &change)
    }

    async fn status_history(&self, id: SubscriptionId) -> Result<Vec<StatusChange>> {
        self.scan_prefix(CF_STATUS_LOG, &id.to_be_bytes())
    }

    async fn append_payment(&self, id: SubscriptionId, entry: PaymentEntry) -> Result<()> {
        self.append_log(CF_PAYMENT_LOG, id, &entry)
    }

    async fn payment_history(&self, id: SubscriptionId) -> Result<Vec<PaymentEntry>> {
        self.scan_prefix(CF_PAYMENT_LOG, &id.to_be_bytes())
    }
}

#[async_trait]
impl SettlementStore for RocksDBStore {
    async fn commit_settlement(&self, record: SettlementRecord) -> Result<PaymentId> {
        // Counters are read under the lock and bumped inside the batch, so a
        // failed write leaves them untouched.
        let _guard = self
            .sequence_lock
            .lock()
            .map_err(|_| internal("Sequence lock poisoned"))?;
        let meta = self.cf(CF_META)?;
        let mut batch = WriteBatch::default();

        let id = match record.payment_id {
            Some(id) => id,
            None => {
                let next = self.current_sequence(SEQ_PAYMENTS)? + 1;
                batch.put_cf(meta, SEQ_PAYMENTS, next.to_be_bytes());
                PaymentId(next)
            }
        };
        let history_seq = self.current_sequence(SEQ_HISTORY)? + 1;
        batch.put_cf(meta, SEQ_HISTORY, history_seq.to_be_bytes());

        let subscription_id = record.subscription.id;
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            id.to_be_bytes(),
            serde_json::to_vec(&record.payment(id))?,
        );
        batch.put_cf(
            self.cf(CF_PAYMENT_LOG)?,
            compound_key(subscription_id.0, history_seq),
            serde_json::to_vec(&record.entry(id))?,
        );
        batch.put_cf(
            self.cf(CF_SUBSCRIPTIONS)?,
            subscription_id.to_be_bytes(),
            serde_json::to_vec(&record.subscription)?,
        );
        if let Some(approval) = &record.consumed_approval {
            batch.put_cf(
                self.cf(CF_APPROVALS)?,
                compound_key(approval.subscription_id.0, approval.payment_id.0),
                serde_json::to_vec(approval)?,
            );
        }

        self.db.write(batch)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approval::ApprovalState;
    use crate::domain::money::Amount;
    use crate::domain::subscription::SubscriptionStatus;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn subscription(id: u64) -> Subscription {
        Subscription {
            id: SubscriptionId(id),
            service_id: ServiceId(1),
            subscriber: Principal::new("alice"),
            recipient: Principal::new("bob"),
            amount: Amount::new(dec!(100.0)).unwrap(),
            period: 30,
            next_payment_due: 130,
            payment_count: 0,
            token: None,
            status: SubscriptionStatus::Active,
            created_at: 100,
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in ALL_CFS {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_rejects_other_schema_version() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let meta = store.cf(CF_META).unwrap();
            store
                .db
                .put_cf(meta, KEY_SCHEMA_VERSION, 99u32.to_be_bytes())
                .unwrap();
        }

        let reopened = RocksDBStore::open(dir.path());
        assert!(matches!(
            reopened,
            Err(BillingError::SchemaMismatch {
                found: 99,
                expected: SCHEMA_VERSION
            })
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_subscription_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let sub = subscription(1);
        store.put_subscription(sub.clone()).await.unwrap();
        store.put_subscription(subscription(2)).await.unwrap();

        let retrieved = store.get_subscription(SubscriptionId(1)).await.unwrap().unwrap();
        assert_eq!(retrieved, sub);
        assert_eq!(store.all_subscriptions().await.unwrap().len(), 2);

        store.delete_subscription(SubscriptionId(1)).await.unwrap();
        assert!(store.get_subscription(SubscriptionId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_counters_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            assert_eq!(store.next_payment_id().await.unwrap(), PaymentId(1));
            assert_eq!(store.next_payment_id().await.unwrap(), PaymentId(2));
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.next_payment_id().await.unwrap(), PaymentId(3));
    }

    #[tokio::test]
    async fn test_rocksdb_history_scan_stays_within_subscription() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        store
            .append_status(
                SubscriptionId(1),
                StatusChange {
                    status: SubscriptionStatus::Active,
                    at: 100,
                },
            )
            .await
            .unwrap();
        store
            .append_status(
                SubscriptionId(2),
                StatusChange {
                    status: SubscriptionStatus::Active,
                    at: 105,
                },
            )
            .await
            .unwrap();
        store
            .append_status(
                SubscriptionId(1),
                StatusChange {
                    status: SubscriptionStatus::Paused,
                    at: 110,
                },
            )
            .await
            .unwrap();

        let history = store.status_history(SubscriptionId(1)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, SubscriptionStatus::Paused);
    }

    #[tokio::test]
    async fn test_rocksdb_user_index_and_approvals() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let alice = Principal::new("alice");

        store.index_subscription(&alice, SubscriptionId(1)).await.unwrap();
        store.index_subscription(&alice, SubscriptionId(4)).await.unwrap();
        assert_eq!(
            store.subscriptions_of(&alice).await.unwrap(),
            vec![SubscriptionId(1), SubscriptionId(4)]
        );

        let approval = PendingApproval::for_subscription(&subscription(1), PaymentId(3), 130);
        store.put_approval(approval.clone()).await.unwrap();
        assert_eq!(
            store.open_approval(SubscriptionId(1)).await.unwrap(),
            Some(approval)
        );
        assert!(store.open_approval(SubscriptionId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_commit_settlement_survives_reopen() {
        let dir = tempdir().unwrap();
        let mut sub = subscription(1);
        let mut approval = PendingApproval::for_subscription(&sub, PaymentId(1), 120);
        sub.record_settlement(160);
        approval.state = ApprovalState::Consumed;
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            assert_eq!(store.next_payment_id().await.unwrap(), PaymentId(1));

            let redeemed = SettlementRecord {
                payment_id: Some(PaymentId(1)),
                subscription: sub.clone(),
                amount: sub.amount,
                settled_at: 130,
                consumed_approval: Some(approval.clone()),
            };
            assert_eq!(store.commit_settlement(redeemed).await.unwrap(), PaymentId(1));

            let allocated = SettlementRecord {
                payment_id: None,
                subscription: sub.clone(),
                amount: sub.amount,
                settled_at: 160,
                consumed_approval: None,
            };
            assert_eq!(store.commit_settlement(allocated).await.unwrap(), PaymentId(2));
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.get_subscription(SubscriptionId(1)).await.unwrap(), Some(sub));
        assert_eq!(
            store.get_approval(SubscriptionId(1), PaymentId(1)).await.unwrap(),
            Some(approval)
        );
        assert!(store.open_approval(SubscriptionId(1)).await.unwrap().is_none());
        let history = store.payment_history(SubscriptionId(1)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].payment_id, PaymentId(2));
        assert!(store.get_payment(PaymentId(2)).await.unwrap().is_some());
        assert_eq!(store.next_payment_id().await.unwrap(), PaymentId(3));
    }
}
