use super::locks::SubscriptionLocks;
use super::policy::{self, PolicyDecision};
use super::scheduler;
use crate::domain::approval::PendingApproval;
use crate::domain::history::{PaymentEntry, StatusChange};
use crate::domain::ids::{PaymentId, Principal, ServiceId, SubscriptionId, TokenId};
use crate::domain::money::Amount;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{ClockRef, EntityStoreBox, ValueTransferRef};
use crate::domain::service::Service;
use crate::domain::settings::AutoPaySettings;
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

/// The entry point for every billing operation.
///
/// `BillingEngine` owns the entity store, the transfer primitive and the
/// clock. Every operation that mutates a subscription holds that
/// subscription's lock for its whole duration and validates before writing,
/// so a failed operation leaves the store as it found it.
pub struct BillingEngine {
    pub(crate) store: EntityStoreBox,
    pub(crate) transfer: ValueTransferRef,
    pub(crate) clock: ClockRef,
    pub(crate) locks: SubscriptionLocks,
}

impl BillingEngine {
    /// Creates a new `BillingEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - Storage for every billing entity.
    /// * `transfer` - The primitive settlements and refunds move value through.
    /// * `clock` - The monotonic time source due dates are measured against.
    pub fn new(store: EntityStoreBox, transfer: ValueTransferRef, clock: ClockRef) -> Self {
        Self {
            store,
            transfer,
            clock,
            locks: SubscriptionLocks::new(),
        }
    }

    // ── Services ─────────────────────────────────────────────────────────

    /// Registers a service owned by `caller`. New services accept subscriptions.
    pub async fn register_service(&self, caller: &Principal, name: &str) -> Result<ServiceId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BillingError::InvalidParameter(
                "service name must not be empty".to_string(),
            ));
        }

        let id = self.store.next_service_id().await?;
        self.store
            .put_service(Service::new(id, name.to_string(), caller.clone()))
            .await?;
        info!(service = %id, owner = %caller, name, "service registered");
        Ok(id)
    }

    /// Opens or closes a service to new subscriptions. Owner only.
    pub async fn set_service_active(
        &self,
        caller: &Principal,
        id: ServiceId,
        active: bool,
    ) -> Result<()> {
        let mut service = self
            .store
            .get_service(id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("service {id}")))?;
        if &service.owner != caller {
            return Err(BillingError::NotAuthorized);
        }

        service.active = active;
        self.store.put_service(service).await?;
        info!(service = %id, active, "service availability changed");
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    /// Subscribes `caller` to a service, paying `amount` to `recipient`
    /// every `period`. The first payment falls due one period from now.
    pub async fn create_subscription(
        &self,
        caller: &Principal,
        service_id: ServiceId,
        recipient: Principal,
        amount: Decimal,
        period: u64,
        token: Option<TokenId>,
    ) -> Result<SubscriptionId> {
        let service = self
            .store
            .get_service(service_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("service {service_id}")))?;
        if !service.active {
            return Err(BillingError::InvalidSubscription);
        }
        let amount = Amount::new(amount)?;
        validate_period(period)?;

        let now = self.clock.now();
        let next_payment_due = scheduler::next_due(now, period).ok_or_else(schedule_overflow)?;

        let id = self.store.next_subscription_id().await?;
        let subscription = Subscription {
            id,
            service_id,
            subscriber: caller.clone(),
            recipient,
            amount,
            period,
            next_payment_due,
            payment_count: 0,
            token,
            status: SubscriptionStatus::Active,
            created_at: now,
        };
        let (recipient, amount) = (subscription.recipient.clone(), subscription.amount);
        self.store.put_subscription(subscription).await?;
        self.store.index_subscription(caller, id).await?;
        self.store
            .append_status(
                id,
                StatusChange {
                    status: SubscriptionStatus::Active,
                    at: now,
                },
            )
            .await?;
        info!(
            subscription = %id,
            service = %service_id,
            subscriber = %caller,
            recipient = %recipient,
            %amount,
            period,
            next_payment_due,
            "subscription created"
        );
        Ok(id)
    }

    /// Moves a subscription to `status`. Subscriber only.
    ///
    /// Setting the current status again is a no-op and records nothing.
    pub async fn set_status(
        &self,
        caller: &Principal,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut subscription = self.load_owned(caller, id).await?;
        if subscription.status == status {
            debug!(subscription = %id, %status, "status unchanged");
            return Ok(());
        }

        let from = subscription.status;
        subscription.status = status;
        self.store.put_subscription(subscription).await?;
        self.store
            .append_status(
                id,
                StatusChange {
                    status,
                    at: self.clock.now(),
                },
            )
            .await?;
        info!(subscription = %id, %from, to = %status, "subscription status changed");
        Ok(())
    }

    pub async fn pause(&self, caller: &Principal, id: SubscriptionId) -> Result<()> {
        self.set_status(caller, id, SubscriptionStatus::Paused).await
    }

    pub async fn resume(&self, caller: &Principal, id: SubscriptionId) -> Result<()> {
        self.set_status(caller, id, SubscriptionStatus::Active).await
    }

    /// Cancels a subscription. The row stays, marked `Inactive`, because its
    /// payments still reference it.
    pub async fn cancel_subscription(&self, caller: &Principal, id: SubscriptionId) -> Result<()> {
        self.set_status(caller, id, SubscriptionStatus::Inactive).await
    }

    /// Removes the subscription row outright. Subscriber only.
    ///
    /// Payments, approvals, histories and the subscriber's index entry are
    /// kept; the id is never reused.
    pub async fn delete_subscription(&self, caller: &Principal, id: SubscriptionId) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let subscription = self.load_owned(caller, id).await?;

        self.store.delete_subscription(id).await?;
        if subscription.status != SubscriptionStatus::Inactive {
            self.store
                .append_status(
                    id,
                    StatusChange {
                        status: SubscriptionStatus::Inactive,
                        at: self.clock.now(),
                    },
                )
                .await?;
        }
        info!(subscription = %id, "subscription deleted");
        Ok(())
    }

    /// Changes the amount charged from the next settlement on. Subscriber only.
    pub async fn update_amount(
        &self,
        caller: &Principal,
        id: SubscriptionId,
        new_amount: Decimal,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut subscription = self.load_owned(caller, id).await?;
        let amount = Amount::new(new_amount)?;

        let old = subscription.amount;
        subscription.amount = amount;
        self.store.put_subscription(subscription).await?;
        info!(subscription = %id, %old, new = %amount, "subscription amount updated");
        Ok(())
    }

    /// Changes the billing period. The current due date stands; the new
    /// period applies when it is next advanced. Subscriber only.
    pub async fn update_period(
        &self,
        caller: &Principal,
        id: SubscriptionId,
        new_period: u64,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut subscription = self.load_owned(caller, id).await?;
        validate_period(new_period)?;

        let old = subscription.period;
        subscription.period = new_period;
        self.store.put_subscription(subscription).await?;
        info!(subscription = %id, old, new = new_period, "subscription period updated");
        Ok(())
    }

    // ── Auto-pay settings ────────────────────────────────────────────────

    /// Replaces the caller's auto-pay settings.
    pub async fn configure_auto_pay(
        &self,
        caller: &Principal,
        enabled: bool,
        max_payment_threshold: Decimal,
        requires_approval_above_threshold: bool,
    ) -> Result<()> {
        if max_payment_threshold < Decimal::ZERO {
            return Err(BillingError::InvalidParameter(
                "threshold must not be negative".to_string(),
            ));
        }

        self.store
            .put_settings(AutoPaySettings {
                user: caller.clone(),
                enabled,
                max_payment_threshold,
                requires_approval_above_threshold,
            })
            .await?;
        info!(
            user = %caller,
            enabled,
            threshold = %max_payment_threshold,
            requires_approval_above_threshold,
            "auto-pay configured"
        );
        Ok(())
    }

    // ── Refunds ──────────────────────────────────────────────────────────

    /// Returns a completed payment to its payer. Recipient only, once.
    pub async fn refund_payment(&self, caller: &Principal, payment_id: PaymentId) -> Result<()> {
        let subscription_id = self.load_payment(payment_id).await?.subscription_id;
        let _guard = self.locks.acquire(subscription_id).await;

        // Re-read under the lock so two refunds cannot both pass the check.
        let mut payment = self.load_payment(payment_id).await?;
        if &payment.recipient != caller {
            return Err(BillingError::NotAuthorized);
        }
        if payment.status != PaymentStatus::Completed {
            return Err(BillingError::InvalidParameter(format!(
                "payment {payment_id} is not refundable"
            )));
        }

        self.transfer
            .transfer(
                payment.amount,
                &payment.recipient,
                &payment.payer,
                payment.token.as_ref(),
            )
            .await
            .inspect_err(|e| warn!(payment = %payment_id, error = %e, "refund transfer failed"))?;

        payment.status = PaymentStatus::Refunded;
        if let Err(e) = self.store.put_payment(payment.clone()).await {
            self.reverse_transfer(
                payment.amount,
                &payment.recipient,
                &payment.payer,
                payment.token.as_ref(),
            )
            .await;
            return Err(e);
        }
        info!(payment = %payment_id, subscription = %subscription_id, "payment refunded");
        Ok(())
    }

    /// Undoes a transfer from `from` to `to` whose records could not be
    /// written. A failed reversal is logged and the original error stands.
    pub(crate) async fn reverse_transfer(
        &self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
        token: Option<&TokenId>,
    ) {
        match self.transfer.transfer(amount, to, from, token).await {
            Ok(()) => warn!(from = %from, to = %to, %amount, "transfer reversed after failed write"),
            Err(e) => error!(
                from = %from,
                to = %to,
                %amount,
                error = %e,
                "transfer reversal failed, ledger no longer matches the store"
            ),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// The user's auto-pay settings, or the conservative default when none
    /// were configured.
    pub async fn get_settings(&self, user: &Principal) -> Result<AutoPaySettings> {
        Ok(self
            .store
            .get_settings(user)
            .await?
            .unwrap_or_else(|| AutoPaySettings::default_for(user.clone())))
    }

    pub async fn get_service(&self, id: ServiceId) -> Result<Option<Service>> {
        self.store.get_service(id).await
    }

    pub async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.store.get_subscription(id).await
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.store.get_payment(id).await
    }

    pub async fn get_pending_approval(
        &self,
        subscription_id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<Option<PendingApproval>> {
        self.store.get_approval(subscription_id, payment_id).await
    }

    /// The approval currently pending or approved for the subscription.
    pub async fn open_approval(&self, id: SubscriptionId) -> Result<Option<PendingApproval>> {
        self.store.open_approval(id).await
    }

    /// Whether a payment of `amount` by `user` would be held for approval.
    pub async fn needs_approval(&self, user: &Principal, amount: Amount) -> Result<bool> {
        let settings = self.store.get_settings(user).await?;
        Ok(policy::evaluate(settings.as_ref(), amount) == PolicyDecision::RequiresApproval)
    }

    /// Whether the subscription is active and its payment is due now.
    pub async fn is_payable(&self, id: SubscriptionId) -> Result<bool> {
        let subscription = self.load_subscription(id).await?;
        Ok(subscription.is_active()
            && scheduler::is_due(self.clock.now(), subscription.next_payment_due))
    }

    /// The user's active subscriptions falling due within `window` ticks,
    /// overdue ones included.
    pub async fn upcoming_renewals(
        &self,
        user: &Principal,
        window: u64,
    ) -> Result<Vec<Subscription>> {
        let now = self.clock.now();
        let mut upcoming = Vec::new();
        for id in self.store.subscriptions_of(user).await? {
            if let Some(subscription) = self.store.get_subscription(id).await?
                && subscription.is_active()
                && scheduler::is_upcoming(now, subscription.next_payment_due, window)
            {
                upcoming.push(subscription);
            }
        }
        Ok(upcoming)
    }

    pub async fn subscriptions_of(&self, user: &Principal) -> Result<Vec<SubscriptionId>> {
        self.store.subscriptions_of(user).await
    }

    pub async fn status_history(&self, id: SubscriptionId) -> Result<Vec<StatusChange>> {
        self.store.status_history(id).await
    }

    pub async fn payment_history(&self, id: SubscriptionId) -> Result<Vec<PaymentEntry>> {
        self.store.payment_history(id).await
    }

    /// Every stored subscription, in id order.
    pub async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = self.store.all_subscriptions().await?;
        subscriptions.sort_by_key(|s| s.id);
        Ok(subscriptions)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    pub(crate) async fn load_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.store
            .get_subscription(id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("subscription {id}")))
    }

    /// Loads a subscription the caller is the subscriber of.
    pub(crate) async fn load_owned(
        &self,
        caller: &Principal,
        id: SubscriptionId,
    ) -> Result<Subscription> {
        let subscription = self.load_subscription(id).await?;
        if !subscription.is_owned_by(caller) {
            warn!(subscription = %id, caller = %caller, "rejected change by non-subscriber");
            return Err(BillingError::NotAuthorized);
        }
        Ok(subscription)
    }

    async fn load_payment(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .get_payment(id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("payment {id}")))
    }
}

fn validate_period(period: u64) -> Result<()> {
    if period == 0 {
        return Err(BillingError::InvalidParameter(
            "period must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn schedule_overflow() -> BillingError {
    BillingError::InvalidParameter("due date overflows the clock range".to_string())
}
