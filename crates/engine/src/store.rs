use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use arca_core::{
    AccountId, Labels, SuggestionGroup, SuggestionStatus, Transaction, TxId, VendorRule,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint hit on a transaction id.
    #[error("transaction id already exists")]
    DuplicateId,
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Persistence contract the categorizer runs against. Backends must make
/// the rule-counter writes in `insert_transaction` and `update_labels`
/// atomic with the row writes; nothing upstream retries half-applied state.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_rules(&self, account: AccountId) -> Result<Vec<VendorRule>, StoreError>;

    async fn get_rule(&self, rule_id: i64) -> Result<Option<VendorRule>, StoreError>;

    /// Insert or replace, keyed on (account, vendor). Returns the rule id.
    async fn save_rule(&self, rule: &VendorRule) -> Result<i64, StoreError>;

    /// Occurrence indices already persisted for a content hash.
    async fn get_existing_occurrences(
        &self,
        account: AccountId,
        base_hash: &str,
    ) -> Result<BTreeSet<u32>, StoreError>;

    /// Insert one transaction. When `applied` is set, the rule (with its
    /// already-bumped counters) is saved in the same storage transaction.
    async fn insert_transaction(
        &self,
        tx: &Transaction,
        applied: Option<&VendorRule>,
    ) -> Result<(), StoreError>;

    async fn get_transaction(
        &self,
        account: AccountId,
        id: &TxId,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Every transaction that already carries a vendor label, cleaned or
    /// not. This is the ground truth rebuilds and suggestions learn from.
    async fn get_labeled_transactions(
        &self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Relabel a set of transactions. Rule counter updates ride in the same
    /// storage transaction when `rule` is set.
    async fn update_labels(
        &self,
        account: AccountId,
        ids: &[TxId],
        labels: &Labels,
        mark_cleaned: bool,
        rule: Option<&VendorRule>,
    ) -> Result<(), StoreError>;

    async fn save_suggestion(&self, group: &SuggestionGroup) -> Result<i64, StoreError>;

    async fn get_suggestion(&self, id: i64) -> Result<Option<SuggestionGroup>, StoreError>;

    async fn get_suggestions(
        &self,
        account: AccountId,
        status: SuggestionStatus,
    ) -> Result<Vec<SuggestionGroup>, StoreError>;

    async fn set_suggestion_status(
        &self,
        id: i64,
        status: SuggestionStatus,
    ) -> Result<(), StoreError>;
}

// ── In-memory store (always available, used for tests) ──────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    transactions: Vec<Transaction>,
    rules: Vec<VendorRule>,
    suggestions: Vec<SuggestionGroup>,
    next_rule_id: i64,
    next_suggestion_id: i64,
}

/// Mutex-backed store with the same atomicity guarantees as the SQLite
/// backend: every trait call takes the one lock, so combined writes are
/// all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("poisoned lock".to_string()))
    }

    /// Snapshot of everything stored for an account, for assertions.
    pub fn transactions_snapshot(&self, account: AccountId) -> Vec<Transaction> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .transactions
                    .iter()
                    .filter(|t| t.account_id == account)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn upsert_rule(inner: &mut MemoryInner, rule: &VendorRule) -> i64 {
    let slot = inner.rules.iter_mut().find(|r| match rule.id {
        Some(id) => r.id == Some(id),
        None => r.account_id == rule.account_id && r.vendor == rule.vendor,
    });
    match slot {
        Some(existing) => {
            let id = existing.id.unwrap_or_default();
            *existing = rule.clone();
            existing.id = Some(id);
            id
        }
        None => {
            inner.next_rule_id += 1;
            let id = inner.next_rule_id;
            let mut stored = rule.clone();
            stored.id = Some(id);
            inner.rules.push(stored);
            id
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_rules(&self, account: AccountId) -> Result<Vec<VendorRule>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .rules
            .iter()
            .filter(|r| r.account_id == account)
            .cloned()
            .collect())
    }

    async fn get_rule(&self, rule_id: i64) -> Result<Option<VendorRule>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.rules.iter().find(|r| r.id == Some(rule_id)).cloned())
    }

    async fn save_rule(&self, rule: &VendorRule) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;
        Ok(upsert_rule(&mut inner, rule))
    }

    async fn get_existing_occurrences(
        &self,
        account: AccountId,
        base_hash: &str,
    ) -> Result<BTreeSet<u32>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.account_id == account && t.id.base_hash() == base_hash)
            .map(|t| t.id.occurrence())
            .collect())
    }

    async fn insert_transaction(
        &self,
        tx: &Transaction,
        applied: Option<&VendorRule>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner
            .transactions
            .iter()
            .any(|t| t.account_id == tx.account_id && t.id == tx.id)
        {
            return Err(StoreError::DuplicateId);
        }
        inner.transactions.push(tx.clone());
        if let Some(rule) = applied {
            upsert_rule(&mut inner, rule);
        }
        Ok(())
    }

    async fn get_transaction(
        &self,
        account: AccountId,
        id: &TxId,
    ) -> Result<Option<Transaction>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .find(|t| t.account_id == account && &t.id == id)
            .cloned())
    }

    async fn get_labeled_transactions(
        &self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.account_id == account && t.is_labeled())
            .cloned()
            .collect())
    }

    async fn update_labels(
        &self,
        account: AccountId,
        ids: &[TxId],
        labels: &Labels,
        mark_cleaned: bool,
        rule: Option<&VendorRule>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for tx in inner
            .transactions
            .iter_mut()
            .filter(|t| t.account_id == account && ids.contains(&t.id))
        {
            tx.apply_labels(labels, mark_cleaned);
        }
        if let Some(rule) = rule {
            upsert_rule(&mut inner, rule);
        }
        Ok(())
    }

    async fn save_suggestion(&self, group: &SuggestionGroup) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;
        match group.id {
            Some(id) => {
                if let Some(slot) = inner.suggestions.iter_mut().find(|s| s.id == Some(id)) {
                    *slot = group.clone();
                }
                Ok(id)
            }
            None => {
                inner.next_suggestion_id += 1;
                let id = inner.next_suggestion_id;
                let mut stored = group.clone();
                stored.id = Some(id);
                inner.suggestions.push(stored);
                Ok(id)
            }
        }
    }

    async fn get_suggestion(&self, id: i64) -> Result<Option<SuggestionGroup>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.suggestions.iter().find(|s| s.id == Some(id)).cloned())
    }

    async fn get_suggestions(
        &self,
        account: AccountId,
        status: SuggestionStatus,
    ) -> Result<Vec<SuggestionGroup>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .suggestions
            .iter()
            .filter(|s| s.account_id == account && s.status == status)
            .cloned()
            .collect())
    }

    async fn set_suggestion_status(
        &self,
        id: i64,
        status: SuggestionStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some(slot) = inner.suggestions.iter_mut().find(|s| s.id == Some(id)) {
            slot.status = status;
        }
        Ok(())
    }
}
