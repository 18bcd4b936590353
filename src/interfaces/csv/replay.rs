use super::command::{Command, CommandKind};
use crate::application::engine::BillingEngine;
use crate::domain::ids::Principal;
use crate::domain::ports::EntityStoreBox;
use crate::error::{BillingError, Result};
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::ledger::InMemoryLedger;
use std::sync::Arc;
use tracing::{debug, info};

/// Drives a [`BillingEngine`] from replayed commands.
///
/// The replay owns a manual clock, advanced by each row's `at` column, and
/// an in-memory ledger that `fund` rows credit.
pub struct Replay {
    engine: BillingEngine,
    clock: Arc<ManualClock>,
    ledger: InMemoryLedger,
}

impl Replay {
    pub fn new(store: EntityStoreBox) -> Self {
        let clock = Arc::new(ManualClock::default());
        let ledger = InMemoryLedger::new();
        let engine = BillingEngine::new(store, Arc::new(ledger.clone()), clock.clone());
        Self {
            engine,
            clock,
            ledger,
        }
    }

    pub fn engine(&self) -> &BillingEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    /// Applies one command. Failures leave the engine state untouched.
    pub async fn apply(&self, command: Command) -> Result<()> {
        if let Some(at) = command.at {
            self.clock.advance_to(at)?;
        }
        let caller = command.caller();
        let engine = &self.engine;
        debug!(kind = ?command.kind, caller = %caller, "applying command");

        match command.kind {
            CommandKind::Fund => {
                let amount = command.positive_amount()?;
                self.ledger
                    .fund(&caller, command.token().as_ref(), amount)
                    .await;
                info!(owner = %caller, %amount, "wallet funded");
            }
            CommandKind::Register => {
                engine.register_service(&caller, command.label()?).await?;
            }
            CommandKind::DeactivateService => {
                engine
                    .set_service_active(&caller, command.service_id()?, false)
                    .await?;
            }
            CommandKind::ActivateService => {
                engine
                    .set_service_active(&caller, command.service_id()?, true)
                    .await?;
            }
            CommandKind::Subscribe => {
                engine
                    .create_subscription(
                        &caller,
                        command.service_id()?,
                        command.counterparty()?,
                        command.amount()?,
                        command.period()?,
                        command.token(),
                    )
                    .await?;
            }
            CommandKind::Autopay => {
                engine
                    .configure_auto_pay(
                        &caller,
                        command.enabled.unwrap_or(false),
                        command.amount()?,
                        command.approval.unwrap_or(true),
                    )
                    .await?;
            }
            CommandKind::RequestApproval => {
                engine
                    .request_approval(&caller, command.subscription_id()?)
                    .await?;
            }
            CommandKind::Approve => self.approve_open(&caller, &command).await?,
            CommandKind::Settle => {
                engine.settle(&caller, command.subscription_id()?).await?;
            }
            CommandKind::Pause => engine.pause(&caller, command.subscription_id()?).await?,
            CommandKind::Resume => engine.resume(&caller, command.subscription_id()?).await?,
            CommandKind::Cancel => {
                engine
                    .cancel_subscription(&caller, command.subscription_id()?)
                    .await?;
            }
            CommandKind::Delete => {
                engine
                    .delete_subscription(&caller, command.subscription_id()?)
                    .await?;
            }
            CommandKind::UpdateAmount => {
                engine
                    .update_amount(&caller, command.subscription_id()?, command.amount()?)
                    .await?;
            }
            CommandKind::UpdatePeriod => {
                engine
                    .update_period(&caller, command.subscription_id()?, command.period()?)
                    .await?;
            }
            CommandKind::Refund => {
                engine.refund_payment(&caller, command.payment_id()?).await?;
            }
        }
        Ok(())
    }

    /// Approves whatever approval is currently open for the subscription.
    async fn approve_open(&self, caller: &Principal, command: &Command) -> Result<()> {
        let id = command.subscription_id()?;
        let approval = self
            .engine
            .open_approval(id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("open approval for subscription {id}")))?;
        self.engine.approve(caller, id, approval.payment_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::SubscriptionId;
    use crate::domain::money::Balance;
    use crate::domain::subscription::SubscriptionStatus;
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::interfaces::csv::command_reader::CommandReader;
    use rust_decimal_macros::dec;

    async fn replay(data: &str) -> (Replay, Vec<Result<()>>) {
        let replay = Replay::new(Box::new(InMemoryStore::new()));
        let mut outcomes = Vec::new();
        for command in CommandReader::new(data.as_bytes()).commands() {
            outcomes.push(match command {
                Ok(command) => replay.apply(command).await,
                Err(e) => Err(e),
            });
        }
        (replay, outcomes)
    }

    #[tokio::test]
    async fn test_replay_settles_with_approval() {
        let data = "\
type,caller,at,target,amount,period,counterparty,label,enabled,approval
register,bob,100,,,,,video,,
fund,alice,,,6000,,,,,
subscribe,alice,,1,5000,30,bob,,,
settle,bob,130,1,,,,,,
approve,alice,,1,,,,,,
settle,bob,,1,,,,,,
";
        let (replay, outcomes) = replay(data).await;

        assert!(outcomes[0..3].iter().all(|o| o.is_ok()));
        assert!(matches!(
            outcomes[3],
            Err(BillingError::ApprovalRequired { .. })
        ));
        assert!(outcomes[4].is_ok());
        assert!(outcomes[5].is_ok());

        let sub = replay
            .engine()
            .get_subscription(SubscriptionId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.next_payment_due, 160);
        assert_eq!(sub.payment_count, 1);
        assert_eq!(
            replay.ledger().balance(&Principal::new("bob"), None).await,
            Balance::new(dec!(5000))
        );
    }

    #[tokio::test]
    async fn test_replay_rejects_clock_rewind() {
        let data = "\
type,caller,at,target,amount,period,counterparty,label,enabled,approval
register,bob,100,,,,,video,,
subscribe,alice,50,1,10,30,bob,,,
cancel,alice,,1,,,,,,
";
        let (replay, outcomes) = replay(data).await;

        assert!(matches!(outcomes[1], Err(BillingError::InvalidParameter(_))));
        assert!(matches!(outcomes[2], Err(BillingError::NotFound(_))));
        assert!(replay.engine().all_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_missing_fields_are_rejected() {
        let data = "\
type,caller,at,target,amount,period,counterparty,label,enabled,approval
register,bob,,,,,,,,
register,bob,,,,,,gym,,
subscribe,alice,,1,10,,bob,,,
subscribe,alice,,1,10,7,bob,,,
pause,alice,,1,,,,,,
";
        let (replay, outcomes) = replay(data).await;

        assert!(matches!(outcomes[0], Err(BillingError::InvalidParameter(_))));
        assert!(matches!(outcomes[2], Err(BillingError::InvalidParameter(_))));
        assert!(outcomes[4].is_ok());
        let subs = replay.engine().all_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Paused);
    }
}
