use crate::domain::subscription::Subscription;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 9] = [
    "subscription",
    "service",
    "subscriber",
    "recipient",
    "amount",
    "period",
    "next_due",
    "payments",
    "status",
];

#[derive(Serialize)]
struct SubscriptionRow {
    subscription: u64,
    service: u64,
    subscriber: String,
    recipient: String,
    amount: String,
    period: u64,
    next_due: u64,
    payments: u64,
    status: String,
}

impl From<Subscription> for SubscriptionRow {
    fn from(sub: Subscription) -> Self {
        Self {
            subscription: sub.id.0,
            service: sub.service_id.0,
            subscriber: sub.subscriber.to_string(),
            recipient: sub.recipient.to_string(),
            amount: sub.amount.to_string(),
            period: sub.period,
            next_due: sub.next_payment_due,
            payments: sub.payment_count,
            status: sub.status.to_string(),
        }
    }
}

/// Writes the final subscription table as CSV.
pub struct SubscriptionWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SubscriptionWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
        }
    }

    /// Writes the header and one row per subscription, in the order given,
    /// then flushes. The header is written even for an empty table.
    pub fn write_subscriptions(
        &mut self,
        subscriptions: impl IntoIterator<Item = Subscription>,
    ) -> Result<()> {
        self.writer.write_record(HEADER)?;
        for subscription in subscriptions {
            self.writer.serialize(SubscriptionRow::from(subscription))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
