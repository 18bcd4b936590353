use crate::domain::ids::{Principal, TokenId};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{TransferError, ValueTransfer};
use crate::domain::wallet::Wallet;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type WalletKey = (Principal, Option<TokenId>);

/// An in-memory value-transfer primitive backed by per-principal wallets.
///
/// Debit and credit happen under one lock, so a transfer is all-or-nothing.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    wallets: Arc<Mutex<HashMap<WalletKey, Wallet>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `owner` from outside the system.
    pub async fn fund(&self, owner: &Principal, token: Option<&TokenId>, amount: Amount) {
        let mut wallets = self.wallets.lock().await;
        wallets
            .entry((owner.clone(), token.cloned()))
            .or_insert_with(|| Wallet::new(owner.clone(), token.cloned()))
            .deposit(amount);
    }

    pub async fn balance(&self, owner: &Principal, token: Option<&TokenId>) -> Balance {
        let wallets = self.wallets.lock().await;
        wallets
            .get(&(owner.clone(), token.cloned()))
            .map(|wallet| wallet.available)
            .unwrap_or(Balance::ZERO)
    }
}

#[async_trait]
impl ValueTransfer for InMemoryLedger {
    async fn transfer(
        &self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
        token: Option<&TokenId>,
    ) -> Result<(), TransferError> {
        if from == to {
            return Err(TransferError::Rejected(
                "sender and recipient are the same".to_string(),
            ));
        }

        let mut wallets = self.wallets.lock().await;
        let debited = wallets
            .get_mut(&(from.clone(), token.cloned()))
            .is_some_and(|wallet| wallet.withdraw(amount));
        if !debited {
            return Err(TransferError::InsufficientFunds);
        }

        wallets
            .entry((to.clone(), token.cloned()))
            .or_insert_with(|| Wallet::new(to.clone(), token.cloned()))
            .deposit(amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let ledger = InMemoryLedger::new();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        ledger.fund(&alice, None, Amount::new(dec!(50)).unwrap()).await;

        ledger
            .transfer(Amount::new(dec!(20)).unwrap(), &alice, &bob, None)
            .await
            .unwrap();

        assert_eq!(ledger.balance(&alice, None).await, Balance::new(dec!(30)));
        assert_eq!(ledger.balance(&bob, None).await, Balance::new(dec!(20)));
    }

    #[tokio::test]
    async fn test_transfer_is_per_token() {
        let ledger = InMemoryLedger::new();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        let usdc = TokenId::new("USDC");
        ledger.fund(&alice, None, Amount::new(dec!(50)).unwrap()).await;

        let result = ledger
            .transfer(Amount::new(dec!(20)).unwrap(), &alice, &bob, Some(&usdc))
            .await;

        assert_eq!(result, Err(TransferError::InsufficientFunds));
        assert_eq!(ledger.balance(&alice, None).await, Balance::new(dec!(50)));
        assert_eq!(ledger.balance(&bob, Some(&usdc)).await, Balance::ZERO);
    }
}
