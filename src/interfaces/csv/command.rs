use crate::domain::Timestamp;
use crate::domain::ids::{PaymentId, Principal, ServiceId, SubscriptionId, TokenId};
use crate::domain::money::Amount;
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Fund,
    Register,
    DeactivateService,
    ActivateService,
    Subscribe,
    Autopay,
    RequestApproval,
    Approve,
    Settle,
    Pause,
    Resume,
    Cancel,
    Delete,
    UpdateAmount,
    UpdatePeriod,
    Refund,
}

/// One row of a replay file.
///
/// Columns are shared by every command type; each type reads only the
/// ones it needs. `target` is a service id for service commands, a payment
/// id for `refund`, and a subscription id otherwise. `label` carries the
/// service name for `register` and the token for `fund` and `subscribe`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub caller: String,
    /// Advances the replay clock before the command runs.
    pub at: Option<Timestamp>,
    pub target: Option<u64>,
    pub amount: Option<Decimal>,
    pub period: Option<u64>,
    pub counterparty: Option<String>,
    pub label: Option<String>,
    pub enabled: Option<bool>,
    pub approval: Option<bool>,
}

impl Command {
    pub fn caller(&self) -> Principal {
        Principal::new(self.caller.as_str())
    }

    pub fn service_id(&self) -> Result<ServiceId> {
        required(self.target, "target").map(ServiceId)
    }

    pub fn subscription_id(&self) -> Result<SubscriptionId> {
        required(self.target, "target").map(SubscriptionId)
    }

    pub fn payment_id(&self) -> Result<PaymentId> {
        required(self.target, "target").map(PaymentId)
    }

    pub fn amount(&self) -> Result<Decimal> {
        required(self.amount, "amount")
    }

    /// The amount as a strictly positive `Amount`, for wallet funding.
    pub fn positive_amount(&self) -> Result<Amount> {
        Amount::new(self.amount()?)
    }

    pub fn period(&self) -> Result<u64> {
        required(self.period, "period")
    }

    pub fn counterparty(&self) -> Result<Principal> {
        required(self.counterparty.as_deref(), "counterparty").map(Principal::new)
    }

    pub fn label(&self) -> Result<&str> {
        required(self.label.as_deref(), "label")
    }

    pub fn token(&self) -> Option<TokenId> {
        self.label
            .as_deref()
            .filter(|label| !label.is_empty())
            .map(TokenId::new)
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| BillingError::InvalidParameter(format!("missing field '{field}'")))
}
