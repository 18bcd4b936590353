//! Due-date arithmetic. Pure; the engine supplies `now` from its clock.

use crate::domain::Timestamp;

/// The due date following a payment at `last`, or `None` on overflow.
pub fn next_due(last: Timestamp, period: u64) -> Option<Timestamp> {
    last.checked_add(period)
}

/// Inclusive, so a payment due exactly on the current tick is payable.
pub fn is_due(now: Timestamp, next_due: Timestamp) -> bool {
    now >= next_due
}

/// True when `next_due` falls no later than `window` ticks from `now`.
pub fn is_upcoming(now: Timestamp, next_due: Timestamp, window: u64) -> bool {
    next_due <= now.saturating_add(window)
}
