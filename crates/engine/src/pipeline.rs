use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use arca_core::{
    AccountId, ImportSummary, Labels, NormalizedRow, RebuildSummary, RuleTarget, SuggestionGroup,
    SuggestionStatus, Transaction, TxId, VendorRule,
};

use crate::confidence::{ConfidenceScorer, RuleApplication};
use crate::config::EngineConfig;
use crate::dedup;
use crate::matcher;
use crate::pattern::PatternExtractor;
use crate::rebuild;
use crate::store::{LedgerStore, StoreError};
use crate::suggest;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("transaction not found: {0}")]
    TransactionNotFound(TxId),
    #[error("rule not found: {0}")]
    RuleNotFound(i64),
    #[error("suggestion not found: {0}")]
    SuggestionNotFound(i64),
    #[error("suggestion {0} is already resolved")]
    SuggestionResolved(i64),
}

/// One async mutex per account. Imports, rebuilds, and corrections for the
/// same account run serially; different accounts never wait on each other.
#[derive(Debug, Default)]
struct AccountLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    async fn handle(&self, account: AccountId) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(account.0).or_default().clone()
    }
}

/// The categorization engine: imports normalized statement rows, applies
/// vendor rules, tracks rule trust, and manages the suggestion queue.
/// Generic over the store so tests run against [`MemoryStore`] and the
/// application against SQLite.
///
/// [`MemoryStore`]: crate::store::MemoryStore
pub struct Categorizer<S> {
    store: S,
    config: EngineConfig,
    extractor: PatternExtractor,
    scorer: ConfidenceScorer,
    locks: AccountLocks,
}

impl<S: LedgerStore> Categorizer<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        let extractor = PatternExtractor::from_config(&config);
        let scorer = ConfidenceScorer::from_config(&config);
        Categorizer {
            store,
            config,
            extractor,
            scorer,
            locks: AccountLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Imports one batch of rows for an account.
    ///
    /// A row whose content hash is already persisted, or already seen
    /// earlier in the batch, is the same transaction re-exported and is
    /// skipped. New rows are labeled by the best matching rule when its
    /// confidence allows; everything unclaimed feeds the suggestion queue.
    pub async fn import(
        &self,
        account: AccountId,
        rows: &[NormalizedRow],
        source_file: Option<&str>,
    ) -> Result<ImportSummary, EngineError> {
        let lock = self.locks.handle(account).await;
        let _serial = lock.lock().await;

        let mut rules = self.store.get_rules(account).await?;
        let mut summary = ImportSummary::default();
        let mut seen_hashes: HashSet<String> = HashSet::new();
        let mut unmatched: Vec<(TxId, String)> = Vec::new();

        for row in rows {
            // 1. Content hash; identical rows collapse to one transaction.
            let hash = dedup::base_hash(row.date, &row.description, row.amount);
            if seen_hashes.contains(&hash) {
                summary.skipped_count += 1;
                continue;
            }

            // 2. Anything persisted under this hash means a re-import.
            let taken = self.store.get_existing_occurrences(account, &hash).await?;
            if !taken.is_empty() {
                seen_hashes.insert(hash);
                summary.skipped_count += 1;
                continue;
            }
            let id = dedup::derive_id(&hash, dedup::next_free_index(&taken));

            // 3. Let the rules have a shot at labeling the row.
            let mut tx = Transaction::from_row(id.clone(), account, row, source_file);
            let applied = matcher::find_match(&rules, &row.description, row.amount).and_then(
                |outcome| match self.scorer.classify(&rules[outcome.rule_index]) {
                    RuleApplication::AutoClean => Some((outcome, true)),
                    RuleApplication::NeedsReview => Some((outcome, false)),
                    RuleApplication::Withhold => None,
                },
            );

            // 4. Insert. A rule's counter bump rides in the same storage
            //    transaction as the row it labeled.
            let inserted = match applied {
                Some((outcome, cleaned)) => {
                    tx.apply_labels(&outcome.labels, cleaned);
                    let mut rule = rules[outcome.rule_index].clone();
                    self.scorer.record_assignment(&mut rule);
                    match self.store.insert_transaction(&tx, Some(&rule)).await {
                        Ok(()) => {
                            rules[outcome.rule_index] = rule;
                            summary.auto_categorized_count += 1;
                            true
                        }
                        Err(StoreError::DuplicateId) => false,
                        Err(e) => return Err(e.into()),
                    }
                }
                None => match self.store.insert_transaction(&tx, None).await {
                    Ok(()) => {
                        unmatched.push((id, row.description.clone()));
                        true
                    }
                    Err(StoreError::DuplicateId) => false,
                    Err(e) => return Err(e.into()),
                },
            };

            if inserted {
                summary.imported_count += 1;
            } else {
                // A concurrent import persisted the same content between our
                // occurrence query and the insert.
                debug!(account = %account, id = %tx.id, "insert lost to concurrent duplicate");
                summary.skipped_count += 1;
            }
            seen_hashes.insert(hash);
        }

        // 5. Group what no rule claimed into pending suggestions.
        if !unmatched.is_empty() {
            let labeled = self.store.get_labeled_transactions(account).await?;
            let open: HashSet<String> = self
                .store
                .get_suggestions(account, SuggestionStatus::Pending)
                .await?
                .into_iter()
                .map(|g| g.pattern)
                .collect();
            let groups = suggest::propose(
                account,
                &unmatched,
                &labeled,
                &open,
                &self.extractor,
                &self.config,
            );
            for group in &groups {
                self.store.save_suggestion(group).await?;
            }
            summary.suggestions_created = groups.len() as u32;
        }

        info!(
            account = %account,
            imported = summary.imported_count,
            skipped = summary.skipped_count,
            auto_categorized = summary.auto_categorized_count,
            suggestions = summary.suggestions_created,
            "import finished"
        );
        Ok(summary)
    }

    /// Regenerates the account's rules from its labeled history.
    pub async fn rebuild(&self, account: AccountId) -> Result<RebuildSummary, EngineError> {
        let lock = self.locks.handle(account).await;
        let _serial = lock.lock().await;

        let labeled = self.store.get_labeled_transactions(account).await?;
        let existing = self.store.get_rules(account).await?;
        let outcome = rebuild::rebuild_rules(account, &labeled, &existing, &self.extractor);
        for rule in &outcome.rules {
            self.store.save_rule(rule).await?;
        }
        Ok(outcome.summary)
    }

    /// Relabels one transaction by hand. Moving it away from a vendor whose
    /// rule labeled it counts as a correction against that rule; the rule
    /// update and the relabel land atomically.
    pub async fn correct(
        &self,
        account: AccountId,
        id: &TxId,
        labels: Labels,
    ) -> Result<(), EngineError> {
        let lock = self.locks.handle(account).await;
        let _serial = lock.lock().await;

        let tx = self
            .store
            .get_transaction(account, id)
            .await?
            .ok_or_else(|| EngineError::TransactionNotFound(id.clone()))?;

        let corrected_rule = match tx.vendor {
            Some(ref old_vendor) if *old_vendor != labels.vendor => self
                .store
                .get_rules(account)
                .await?
                .into_iter()
                .find(|r| &r.vendor == old_vendor)
                .map(|mut rule| {
                    self.scorer.record_correction(&mut rule);
                    rule
                }),
            _ => None,
        };

        self.store
            .update_labels(
                account,
                std::slice::from_ref(id),
                &labels,
                true,
                corrected_rule.as_ref(),
            )
            .await?;
        Ok(())
    }

    /// Human override that wipes a rule's corrections and re-enables it.
    pub async fn reset_rule(&self, rule_id: i64) -> Result<VendorRule, EngineError> {
        let mut rule = self
            .store
            .get_rule(rule_id)
            .await?
            .ok_or(EngineError::RuleNotFound(rule_id))?;
        self.scorer.reset(&mut rule);
        self.store.save_rule(&rule).await?;
        Ok(rule)
    }

    /// Accepts a suggestion group: labels every member, and creates or
    /// extends the vendor's rule with the group's pattern. `overrides`
    /// replaces the proposed labels wholesale when given.
    pub async fn approve_suggestion(
        &self,
        suggestion_id: i64,
        overrides: Option<Labels>,
    ) -> Result<(), EngineError> {
        let group = self
            .store
            .get_suggestion(suggestion_id)
            .await?
            .ok_or(EngineError::SuggestionNotFound(suggestion_id))?;
        if group.is_terminal() {
            return Err(EngineError::SuggestionResolved(suggestion_id));
        }

        let lock = self.locks.handle(group.account_id).await;
        let _serial = lock.lock().await;

        let labels = overrides.unwrap_or_else(|| group.suggested.clone());
        let mut rule = self
            .store
            .get_rules(group.account_id)
            .await?
            .into_iter()
            .find(|r| r.vendor == labels.vendor)
            .unwrap_or_else(|| {
                VendorRule::new(
                    group.account_id,
                    &labels.vendor,
                    RuleTarget::Default {
                        category: labels.category.clone(),
                        project: labels.project.clone(),
                    },
                )
            });
        rule.add_pattern(&group.pattern);
        self.scorer
            .record_assignments(&mut rule, group.member_count() as u32);

        self.store
            .update_labels(
                group.account_id,
                &group.member_ids,
                &labels,
                true,
                Some(&rule),
            )
            .await?;
        self.store
            .set_suggestion_status(suggestion_id, SuggestionStatus::Approved)
            .await?;
        info!(
            suggestion = suggestion_id,
            members = group.member_count(),
            vendor = %labels.vendor,
            "suggestion approved"
        );
        Ok(())
    }

    /// Closes a suggestion without touching its member transactions.
    pub async fn dismiss_suggestion(&self, suggestion_id: i64) -> Result<(), EngineError> {
        let group = self
            .store
            .get_suggestion(suggestion_id)
            .await?
            .ok_or(EngineError::SuggestionNotFound(suggestion_id))?;
        if group.is_terminal() {
            return Err(EngineError::SuggestionResolved(suggestion_id));
        }
        self.store
            .set_suggestion_status(suggestion_id, SuggestionStatus::Dismissed)
            .await?;
        Ok(())
    }

    pub async fn pending_suggestions(
        &self,
        account: AccountId,
    ) -> Result<Vec<SuggestionGroup>, EngineError> {
        Ok(self
            .store
            .get_suggestions(account, SuggestionStatus::Pending)
            .await?)
    }

    pub async fn rules(&self, account: AccountId) -> Result<Vec<VendorRule>, EngineError> {
        Ok(self.store.get_rules(account).await?)
    }
}
