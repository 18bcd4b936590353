use super::ids::Principal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A payer's spending-control preferences.
///
/// Users who never configured auto-pay have no stored row; callers resolve
/// that case with [`AutoPaySettings::default_for`], under which every
/// non-zero payment needs approval.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AutoPaySettings {
    pub user: Principal,
    pub enabled: bool,
    /// Largest amount settled without approval. Never negative.
    pub max_payment_threshold: Decimal,
    pub requires_approval_above_threshold: bool,
}

impl AutoPaySettings {
    pub fn default_for(user: Principal) -> Self {
        Self {
            user,
            enabled: false,
            max_payment_threshold: Decimal::ZERO,
            requires_approval_above_threshold: true,
        }
    }
}
