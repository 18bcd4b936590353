//! Auto-pay threshold policy.

use crate::domain::money::Amount;
use crate::domain::settings::AutoPaySettings;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    RequiresApproval,
}

/// Decides whether a payment of `amount` may settle without approval.
///
/// Absent settings fall back to [`AutoPaySettings::default_for`]: a zero
/// threshold with approval required, so every payment is gated.
pub fn evaluate(settings: Option<&AutoPaySettings>, amount: Amount) -> PolicyDecision {
    let (threshold, requires_approval) = settings
        .map(|s| (s.max_payment_threshold, s.requires_approval_above_threshold))
        .unwrap_or((Decimal::ZERO, true));

    if amount.value() <= threshold {
        PolicyDecision::Allowed
    } else if requires_approval {
        PolicyDecision::RequiresApproval
    } else {
        // Over the threshold, but the user turned the gate off.
        PolicyDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::Principal;
    use rust_decimal_macros::dec;

    fn settings(threshold: Decimal, requires_approval: bool) -> AutoPaySettings {
        AutoPaySettings {
            user: Principal::new("alice"),
            enabled: true,
            max_payment_threshold: threshold,
            requires_approval_above_threshold: requires_approval,
        }
    }

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_missing_settings_require_approval() {
        assert_eq!(
            evaluate(None, amount(dec!(0.01))),
            PolicyDecision::RequiresApproval
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let s = settings(dec!(1000), true);
        assert_eq!(evaluate(Some(&s), amount(dec!(1000))), PolicyDecision::Allowed);
        assert_eq!(
            evaluate(Some(&s), amount(dec!(1000.01))),
            PolicyDecision::RequiresApproval
        );
    }

    #[test]
    fn test_disabled_gate_allows_above_threshold() {
        let s = settings(dec!(10), false);
        assert_eq!(evaluate(Some(&s), amount(dec!(5000))), PolicyDecision::Allowed);
    }

    #[test]
    fn test_zero_threshold_gates_everything() {
        let s = settings(Decimal::ZERO, true);
        assert_eq!(
            evaluate(Some(&s), amount(dec!(5000))),
            PolicyDecision::RequiresApproval
        );
    }
}
