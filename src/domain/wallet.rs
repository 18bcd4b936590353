use super::ids::{Principal, TokenId};
use super::money::{Amount, Balance};
use serde::{Deserialize, Serialize};

/// Funds one principal holds in one currency.
///
/// Wallets back the reference transfer primitive; the billing engine never
/// touches them directly.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wallet {
    /// The principal owning the funds.
    pub owner: Principal,
    /// The currency, `None` for the native one.
    pub token: Option<TokenId>,
    /// Funds available for outgoing transfers.
    pub available: Balance,
}

impl Wallet {
    pub fn new(owner: Principal, token: Option<TokenId>) -> Self {
        Self {
            owner,
            token,
            available: Balance::ZERO,
        }
    }

    /// Deposits funds into the available balance
    pub fn deposit(&mut self, amount: Amount) {
        self.available += amount.into();
    }

    /// Withdraws funds if sufficient, returning `false` otherwise
    pub fn withdraw(&mut self, amount: Amount) -> bool {
        let amount: Balance = amount.into();
        if self.available >= amount {
            self.available -= amount;
            true
        } else {
            false
        }
    }
}
