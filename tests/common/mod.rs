#![allow(dead_code)]

use rand::Rng;
use std::fs::File;
use std::io::Error;
use std::path::Path;

pub const HEADER: [&str; 10] = [
    "type",
    "caller",
    "at",
    "target",
    "amount",
    "period",
    "counterparty",
    "label",
    "enabled",
    "approval",
];

/// Writes a replay file with the given rows under the standard header.
pub fn write_commands(path: &Path, rows: &[[&str; 10]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Generates a replay of `subscriptions` subscriptions, each settled by a
/// bot at randomly spaced ticks for `ticks` steps.
///
/// Every subscriber is funded well beyond what the run can spend and raises
/// their auto-pay threshold above every amount, so no settlement is blocked
/// by policy or funds; only timing decides which attempts succeed.
pub fn generate_settlement_replay(
    path: &Path,
    subscriptions: usize,
    ticks: usize,
    rng: &mut impl Rng,
) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(HEADER)?;
    wtr.write_record(["register", "merchant", "0", "", "", "", "", "catalog", "", ""])?;

    for i in 1..=subscriptions {
        let user = format!("user{i}");
        let period = rng.gen_range(1..=20u64).to_string();
        let amount = rng.gen_range(1..=100u64).to_string();
        wtr.write_record([
            "fund", user.as_str(), "", "", "1000000", "", "", "", "", "",
        ])?;
        wtr.write_record([
            "autopay", user.as_str(), "", "", "1000", "", "", "", "true", "true",
        ])?;
        wtr.write_record([
            "subscribe", user.as_str(), "", "1", amount.as_str(), period.as_str(), "merchant", "", "", "",
        ])?;
    }

    let mut now = 0u64;
    for _ in 0..ticks {
        now += rng.gen_range(0..=5);
        let at = now.to_string();
        let target = rng.gen_range(1..=subscriptions).to_string();
        wtr.write_record([
            "settle", "bot", at.as_str(), target.as_str(), "", "", "", "", "", "",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
