use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::account::AccountId;
use super::money::Money;

/// Content-derived transaction identifier, `{base_hash}-{occurrence}`.
///
/// The base hash is a digest of the immutable row fields (date, description,
/// amount); the occurrence suffix keeps ids unique when the same content
/// legitimately appears more than once for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("transaction id is missing its occurrence suffix")]
    MissingSuffix,
    #[error("transaction id has a non-numeric occurrence suffix")]
    BadOccurrence,
}

impl TxId {
    pub fn compose(base_hash: &str, occurrence: u32) -> Self {
        TxId(format!("{base_hash}-{occurrence}"))
    }

    /// Digest part of the id. The digest itself never contains `-`, so the
    /// split at the last dash is unambiguous.
    pub fn base_hash(&self) -> &str {
        self.0.rsplit_once('-').map(|(h, _)| h).unwrap_or(&self.0)
    }

    pub fn occurrence(&self) -> u32 {
        self.0
            .rsplit_once('-')
            .and_then(|(_, i)| i.parse().ok())
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TxId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s.rsplit_once('-').ok_or(IdError::MissingSuffix)?;
        if hash.is_empty() {
            return Err(IdError::MissingSuffix);
        }
        index
            .parse::<u32>()
            .map_err(|_| IdError::BadOccurrence)?;
        Ok(TxId(s.to_string()))
    }
}

/// One statement row after a bank dialect parser has normalized it.
/// These three fields are exactly what the content digest covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
}

/// The labels a rule, a suggestion approval, or a human can put on a
/// transaction. Vendor is always present; category and project may stay
/// unset even on a labeled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    pub vendor: String,
    pub category: Option<String>,
    pub project: Option<String>,
}

impl Labels {
    pub fn vendor_only(vendor: &str) -> Self {
        Labels {
            vendor: vendor.to_string(),
            category: None,
            project: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    /// Set once labeling is final, either by a high-confidence rule or a
    /// human decision. Cleaned rows no longer show up in review queues.
    pub is_cleaned: bool,
    pub is_transfer: bool,
    pub source_file: Option<String>,
}

impl Transaction {
    pub fn from_row(
        id: TxId,
        account_id: AccountId,
        row: &NormalizedRow,
        source_file: Option<&str>,
    ) -> Self {
        Transaction {
            id,
            account_id,
            date: row.date,
            description: row.description.clone(),
            amount: row.amount,
            vendor: None,
            category: None,
            project: None,
            is_cleaned: false,
            is_transfer: false,
            source_file: source_file.map(str::to_string),
        }
    }

    pub fn apply_labels(&mut self, labels: &Labels, cleaned: bool) {
        self.vendor = Some(labels.vendor.clone());
        self.category = labels.category.clone();
        self.project = labels.project.clone();
        self.is_cleaned = cleaned;
    }

    pub fn is_labeled(&self) -> bool {
        self.vendor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(desc: &str, cents: i64) -> NormalizedRow {
        NormalizedRow {
            date: date(2024, 1, 5),
            description: desc.to_string(),
            amount: Money::from_cents(cents),
        }
    }

    #[test]
    fn tx_id_splits_on_last_dash() {
        let id = TxId::compose("abc123", 2);
        assert_eq!(id.base_hash(), "abc123");
        assert_eq!(id.occurrence(), 2);
        assert_eq!(id.as_str(), "abc123-2");
    }

    #[test]
    fn tx_id_parse_validates_suffix() {
        assert!("abc123-0".parse::<TxId>().is_ok());
        assert!(matches!(
            "abc123".parse::<TxId>(),
            Err(IdError::MissingSuffix)
        ));
        assert!(matches!(
            "abc123-x".parse::<TxId>(),
            Err(IdError::BadOccurrence)
        ));
        assert!(matches!("-7".parse::<TxId>(), Err(IdError::MissingSuffix)));
    }

    #[test]
    fn from_row_starts_unlabeled() {
        let tx = Transaction::from_row(
            TxId::compose("abc", 0),
            AccountId(1),
            &row("CHECKCARD STARBUCKS 4521", -575),
            Some("jan.csv"),
        );
        assert!(!tx.is_labeled());
        assert!(!tx.is_cleaned);
        assert_eq!(tx.source_file.as_deref(), Some("jan.csv"));
    }

    #[test]
    fn apply_labels_sets_all_fields() {
        let mut tx = Transaction::from_row(
            TxId::compose("abc", 0),
            AccountId(1),
            &row("CHECKCARD STARBUCKS 4521", -575),
            None,
        );
        let labels = Labels {
            vendor: "Starbucks".to_string(),
            category: Some("Meals".to_string()),
            project: None,
        };
        tx.apply_labels(&labels, true);
        assert_eq!(tx.vendor.as_deref(), Some("Starbucks"));
        assert_eq!(tx.category.as_deref(), Some("Meals"));
        assert!(tx.is_cleaned);
        assert!(tx.is_labeled());
    }
}
