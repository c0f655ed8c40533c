use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use arca_core::{Money, TxId};

/// Amount exactly as the digest sees it: signed, two decimal places, no
/// thousands separators. `-50` cents must render `-0.50`, not `0.50`.
fn canonical_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Content digest over the immutable row fields. Two rows with the same
/// date, description, and amount always hash the same, which is what makes
/// re-imports detectable without any per-file bookkeeping.
pub fn base_hash(date: NaiveDate, description: &str, amount: Money) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(canonical_amount(amount.to_cents()).as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Smallest occurrence index not yet persisted for a base hash. Indices are
/// allocated against stored state, never an in-memory counter, so separate
/// import runs cannot hand out the same index.
pub fn next_free_index(taken: &BTreeSet<u32>) -> u32 {
    let mut index = 0;
    while taken.contains(&index) {
        index += 1;
    }
    index
}

pub fn derive_id(base_hash: &str, occurrence: u32) -> TxId {
    TxId::compose(base_hash, occurrence)
}
