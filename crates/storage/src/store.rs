use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Sqlite;
use std::collections::BTreeSet;

use arca_core::{
    AccountId, Labels, Money, RuleTarget, SuggestionGroup, SuggestionStatus, Transaction, TxId,
    VendorRule,
};
use arca_engine::{LedgerStore, StoreError};

use crate::db::DbPool;

/// SQLite-backed [`LedgerStore`]. Combined writes (a row plus the rule that
/// labeled it) run inside one SQL transaction, so a failed insert never
/// leaves a rule counter bumped.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        SqliteStore { pool }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateId,
        _ => StoreError::Backend(err.to_string()),
    }
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {detail}"))
}

// Row tuples in SELECT column order. `query_as` decodes them positionally.
type TxRow = (
    String,         // id
    i64,            // account_id
    String,         // date
    String,         // description
    i64,            // amount_cents
    Option<String>, // vendor
    Option<String>, // category
    Option<String>, // project
    i64,            // is_cleaned
    i64,            // is_transfer
    Option<String>, // source_file
);

const TX_COLUMNS: &str = "id, account_id, date, description, amount_cents, \
     vendor, category, project, is_cleaned, is_transfer, source_file";

fn decode_transaction(row: TxRow) -> Result<Transaction, StoreError> {
    let id: TxId = row.0.parse().map_err(|e| corrupt("transaction id", e))?;
    let date = NaiveDate::parse_from_str(&row.2, "%Y-%m-%d")
        .map_err(|e| corrupt("transaction date", e))?;
    Ok(Transaction {
        id,
        account_id: AccountId(row.1),
        date,
        description: row.3,
        amount: Money::from_cents(row.4),
        vendor: row.5,
        category: row.6,
        project: row.7,
        is_cleaned: row.8 != 0,
        is_transfer: row.9 != 0,
        source_file: row.10,
    })
}

type RuleRow = (i64, i64, String, String, String, i64, i64, i64, f64);

const RULE_COLUMNS: &str = "id, account_id, vendor, patterns, target, enabled, \
     assigned_count, corrected_count, confidence";

fn decode_rule(row: RuleRow) -> Result<VendorRule, StoreError> {
    let patterns: BTreeSet<String> =
        serde_json::from_str(&row.3).map_err(|e| corrupt("rule patterns", e))?;
    let target = RuleTarget::from_json(&row.4).map_err(|e| corrupt("rule target", e))?;
    Ok(VendorRule {
        id: Some(row.0),
        account_id: AccountId(row.1),
        vendor: row.2,
        patterns,
        target,
        enabled: row.5 != 0,
        assigned_count: row.6 as u32,
        corrected_count: row.7 as u32,
        confidence: row.8,
    })
}

type SuggestionRow = (
    i64,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

const SUGGESTION_COLUMNS: &str = "id, account_id, pattern, member_ids, sample_descriptions, \
     suggested_vendor, suggested_category, suggested_project, status";

fn decode_suggestion(row: SuggestionRow) -> Result<SuggestionGroup, StoreError> {
    let member_ids: Vec<TxId> =
        serde_json::from_str(&row.3).map_err(|e| corrupt("suggestion member ids", e))?;
    let sample_descriptions: Vec<String> =
        serde_json::from_str(&row.4).map_err(|e| corrupt("suggestion samples", e))?;
    let status = row.8.parse().map_err(StoreError::Corrupt)?;
    Ok(SuggestionGroup {
        id: Some(row.0),
        account_id: AccountId(row.1),
        pattern: row.2,
        member_ids,
        sample_descriptions,
        suggested: Labels {
            vendor: row.5,
            category: row.6,
            project: row.7,
        },
        status,
    })
}

/// Insert-or-update keyed on (account_id, vendor), usable both on the pool
/// and inside an open SQL transaction.
async fn upsert_rule<'e, E>(executor: E, rule: &VendorRule) -> Result<i64, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let patterns =
        serde_json::to_string(&rule.patterns).map_err(|e| StoreError::Backend(e.to_string()))?;
    let target = rule
        .target
        .to_json()
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    match rule.id {
        Some(id) => {
            sqlx::query(
                "UPDATE vendor_rules SET vendor = ?, patterns = ?, target = ?, enabled = ?, \
                 assigned_count = ?, corrected_count = ?, confidence = ? WHERE id = ?",
            )
            .bind(&rule.vendor)
            .bind(&patterns)
            .bind(&target)
            .bind(rule.enabled)
            .bind(rule.assigned_count as i64)
            .bind(rule.corrected_count as i64)
            .bind(rule.confidence)
            .bind(id)
            .execute(executor)
            .await
            .map_err(map_sqlx)?;
            Ok(id)
        }
        None => {
            let row = sqlx::query_as::<_, (i64,)>(
                "INSERT INTO vendor_rules (account_id, vendor, patterns, target, enabled, \
                 assigned_count, corrected_count, confidence) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (account_id, vendor) DO UPDATE SET patterns = excluded.patterns, \
                 target = excluded.target, enabled = excluded.enabled, \
                 assigned_count = excluded.assigned_count, \
                 corrected_count = excluded.corrected_count, \
                 confidence = excluded.confidence RETURNING id",
            )
            .bind(rule.account_id.0)
            .bind(&rule.vendor)
            .bind(&patterns)
            .bind(&target)
            .bind(rule.enabled)
            .bind(rule.assigned_count as i64)
            .bind(rule.corrected_count as i64)
            .bind(rule.confidence)
            .fetch_one(executor)
            .await
            .map_err(map_sqlx)?;
            Ok(row.0)
        }
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn get_rules(&self, account: AccountId) -> Result<Vec<VendorRule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM vendor_rules WHERE account_id = ? ORDER BY vendor"
        ))
        .bind(account.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(decode_rule).collect()
    }

    async fn get_rule(&self, rule_id: i64) -> Result<Option<VendorRule>, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM vendor_rules WHERE id = ?"
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(decode_rule).transpose()
    }

    async fn save_rule(&self, rule: &VendorRule) -> Result<i64, StoreError> {
        upsert_rule(&self.pool, rule).await
    }

    async fn get_existing_occurrences(
        &self,
        account: AccountId,
        base_hash: &str,
    ) -> Result<BTreeSet<u32>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM transactions WHERE account_id = ? AND base_hash = ?",
        )
        .bind(account.0)
        .bind(base_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(|(id,)| {
                id.parse::<TxId>()
                    .map(|id| id.occurrence())
                    .map_err(|e| corrupt("transaction id", e))
            })
            .collect()
    }

    async fn insert_transaction(
        &self,
        tx: &Transaction,
        applied: Option<&VendorRule>,
    ) -> Result<(), StoreError> {
        let mut dbtx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            "INSERT INTO transactions (account_id, id, base_hash, date, description, \
             amount_cents, vendor, category, project, is_cleaned, is_transfer, source_file) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.account_id.0)
        .bind(tx.id.as_str())
        .bind(tx.id.base_hash())
        .bind(tx.date.to_string())
        .bind(&tx.description)
        .bind(tx.amount.to_cents())
        .bind(&tx.vendor)
        .bind(&tx.category)
        .bind(&tx.project)
        .bind(tx.is_cleaned)
        .bind(tx.is_transfer)
        .bind(&tx.source_file)
        .execute(&mut *dbtx)
        .await
        .map_err(map_sqlx)?;

        if let Some(rule) = applied {
            upsert_rule(&mut *dbtx, rule).await?;
        }

        dbtx.commit().await.map_err(map_sqlx)
    }

    async fn get_transaction(
        &self,
        account: AccountId,
        id: &TxId,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, TxRow>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE account_id = ? AND id = ?"
        ))
        .bind(account.0)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(decode_transaction).transpose()
    }

    async fn get_labeled_transactions(
        &self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, TxRow>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions \
             WHERE account_id = ? AND vendor IS NOT NULL ORDER BY date, id"
        ))
        .bind(account.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(decode_transaction).collect()
    }

    async fn update_labels(
        &self,
        account: AccountId,
        ids: &[TxId],
        labels: &Labels,
        mark_cleaned: bool,
        rule: Option<&VendorRule>,
    ) -> Result<(), StoreError> {
        let mut dbtx = self.pool.begin().await.map_err(map_sqlx)?;

        for id in ids {
            sqlx::query(
                "UPDATE transactions SET vendor = ?, category = ?, project = ?, is_cleaned = ? \
                 WHERE account_id = ? AND id = ?",
            )
            .bind(&labels.vendor)
            .bind(&labels.category)
            .bind(&labels.project)
            .bind(mark_cleaned)
            .bind(account.0)
            .bind(id.as_str())
            .execute(&mut *dbtx)
            .await
            .map_err(map_sqlx)?;
        }

        if let Some(rule) = rule {
            upsert_rule(&mut *dbtx, rule).await?;
        }

        dbtx.commit().await.map_err(map_sqlx)
    }

    async fn save_suggestion(&self, group: &SuggestionGroup) -> Result<i64, StoreError> {
        let member_ids = serde_json::to_string(&group.member_ids)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let samples = serde_json::to_string(&group.sample_descriptions)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match group.id {
            Some(id) => {
                sqlx::query(
                    "UPDATE suggestions SET pattern = ?, member_ids = ?, \
                     sample_descriptions = ?, suggested_vendor = ?, suggested_category = ?, \
                     suggested_project = ?, status = ? WHERE id = ?",
                )
                .bind(&group.pattern)
                .bind(&member_ids)
                .bind(&samples)
                .bind(&group.suggested.vendor)
                .bind(&group.suggested.category)
                .bind(&group.suggested.project)
                .bind(group.status.to_string())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
                Ok(id)
            }
            None => {
                let row = sqlx::query_as::<_, (i64,)>(
                    "INSERT INTO suggestions (account_id, pattern, member_ids, \
                     sample_descriptions, suggested_vendor, suggested_category, \
                     suggested_project, status) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                )
                .bind(group.account_id.0)
                .bind(&group.pattern)
                .bind(&member_ids)
                .bind(&samples)
                .bind(&group.suggested.vendor)
                .bind(&group.suggested.category)
                .bind(&group.suggested.project)
                .bind(group.status.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
                Ok(row.0)
            }
        }
    }

    async fn get_suggestion(&self, id: i64) -> Result<Option<SuggestionGroup>, StoreError> {
        let row = sqlx::query_as::<_, SuggestionRow>(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(decode_suggestion).transpose()
    }

    async fn get_suggestions(
        &self,
        account: AccountId,
        status: SuggestionStatus,
    ) -> Result<Vec<SuggestionGroup>, StoreError> {
        let rows = sqlx::query_as::<_, SuggestionRow>(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions \
             WHERE account_id = ? AND status = ? ORDER BY id"
        ))
        .bind(account.0)
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(decode_suggestion).collect()
    }

    async fn set_suggestion_status(
        &self,
        id: i64,
        status: SuggestionStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE suggestions SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use arca_core::{NormalizedRow, Target};
    use arca_engine::{Categorizer, EngineConfig};
    use tempfile::TempDir;

    const ACCOUNT: AccountId = AccountId(1);

    async fn open() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let pool = create_db(&dir.path().join("ledger.db")).await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    fn row(day: u32, desc: &str, cents: i64) -> NormalizedRow {
        NormalizedRow {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            description: desc.to_string(),
            amount: Money::from_cents(cents),
        }
    }

    fn tx(account: AccountId, hash: &str, occurrence: u32) -> Transaction {
        Transaction::from_row(
            TxId::compose(hash, occurrence),
            account,
            &row(5, "CHECKCARD STARBUCKS 4521", -575),
            Some("jan.csv"),
        )
    }

    #[tokio::test]
    async fn duplicate_id_maps_to_duplicate_error() {
        let (_dir, store) = open().await;
        store
            .insert_transaction(&tx(ACCOUNT, "aaa", 0), None)
            .await
            .unwrap();

        let err = store
            .insert_transaction(&tx(ACCOUNT, "aaa", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId));

        // The key is (account, id); another account may reuse the id.
        store
            .insert_transaction(&tx(AccountId(2), "aaa", 0), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn occurrences_come_back_per_account_and_hash() {
        let (_dir, store) = open().await;
        for occurrence in [0, 1] {
            store
                .insert_transaction(&tx(ACCOUNT, "aaa", occurrence), None)
                .await
                .unwrap();
        }
        store
            .insert_transaction(&tx(ACCOUNT, "bbb", 0), None)
            .await
            .unwrap();

        let occ = store
            .get_existing_occurrences(ACCOUNT, "aaa")
            .await
            .unwrap();
        assert_eq!(occ, BTreeSet::from([0, 1]));
        assert!(store
            .get_existing_occurrences(AccountId(2), "aaa")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn transaction_survives_a_round_trip() {
        let (_dir, store) = open().await;
        let mut stored = tx(ACCOUNT, "abc", 2);
        stored.apply_labels(
            &Labels {
                vendor: "Starbucks".to_string(),
                category: Some("Meals".to_string()),
                project: None,
            },
            true,
        );
        store.insert_transaction(&stored, None).await.unwrap();

        let loaded = store
            .get_transaction(ACCOUNT, &stored.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, stored);
        assert!(store
            .get_transaction(ACCOUNT, &TxId::compose("missing", 0))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn save_rule_upserts_by_vendor() {
        let (_dir, store) = open().await;
        let rule = VendorRule::new(
            ACCOUNT,
            "Oak St",
            RuleTarget::BySign {
                income: Target::new(Some("Rent Income"), Some("12 Oak St")),
                expense: Target::new(Some("Repairs"), Some("12 Oak St")),
            },
        )
        .with_pattern("OAKST");
        let id = store.save_rule(&rule).await.unwrap();

        // A second save without the id still lands on the same row.
        let mut updated = rule.clone();
        updated.assigned_count = 7;
        let id_again = store.save_rule(&updated).await.unwrap();
        assert_eq!(id, id_again);

        let rules = store.get_rules(ACCOUNT).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].assigned_count, 7);
        assert_eq!(rules[0].target, rule.target);
        assert!(rules[0].patterns.contains("OAKST"));
        assert_eq!(store.get_rule(id).await.unwrap().unwrap().vendor, "Oak St");
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_the_rule_bump() {
        let (_dir, store) = open().await;
        let mut rule =
            VendorRule::new(ACCOUNT, "Starbucks", RuleTarget::default()).with_pattern("STARBUCKS");
        rule.assigned_count = 1;
        let rule_id = store.save_rule(&rule).await.unwrap();
        rule.id = Some(rule_id);

        rule.assigned_count = 2;
        store
            .insert_transaction(&tx(ACCOUNT, "aaa", 0), Some(&rule))
            .await
            .unwrap();

        // The duplicate insert fails, and the counter write it carried must
        // fail with it.
        rule.assigned_count = 3;
        let err = store
            .insert_transaction(&tx(ACCOUNT, "aaa", 0), Some(&rule))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId));

        let stored = store.get_rule(rule_id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_count, 2);
    }

    #[tokio::test]
    async fn update_labels_relabels_and_saves_the_rule_together() {
        let (_dir, store) = open().await;
        let ids = [TxId::compose("aaa", 0), TxId::compose("bbb", 0)];
        for id in &ids {
            store
                .insert_transaction(&tx(ACCOUNT, id.base_hash(), 0), None)
                .await
                .unwrap();
        }

        let mut rule =
            VendorRule::new(ACCOUNT, "Starbucks", RuleTarget::default()).with_pattern("STARBUCKS");
        rule.assigned_count = 2;
        let labels = Labels {
            vendor: "Starbucks".to_string(),
            category: Some("Meals".to_string()),
            project: None,
        };
        store
            .update_labels(ACCOUNT, &ids, &labels, true, Some(&rule))
            .await
            .unwrap();

        let labeled = store.get_labeled_transactions(ACCOUNT).await.unwrap();
        assert_eq!(labeled.len(), 2);
        assert!(labeled
            .iter()
            .all(|t| t.vendor.as_deref() == Some("Starbucks") && t.is_cleaned));

        let rules = store.get_rules(ACCOUNT).await.unwrap();
        assert_eq!(rules[0].assigned_count, 2);
    }

    #[tokio::test]
    async fn suggestion_status_flow_round_trips() {
        let (_dir, store) = open().await;
        let group = SuggestionGroup {
            id: None,
            account_id: ACCOUNT,
            pattern: "STARBUCKS".to_string(),
            member_ids: vec![TxId::compose("aaa", 0), TxId::compose("bbb", 0)],
            sample_descriptions: vec!["CHECKCARD STARBUCKS 4521".to_string()],
            suggested: Labels::vendor_only("Starbucks"),
            status: SuggestionStatus::Pending,
        };
        let id = store.save_suggestion(&group).await.unwrap();

        let pending = store
            .get_suggestions(ACCOUNT, SuggestionStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].member_ids, group.member_ids);
        assert_eq!(pending[0].suggested, group.suggested);

        store
            .set_suggestion_status(id, SuggestionStatus::Approved)
            .await
            .unwrap();
        assert!(store
            .get_suggestions(ACCOUNT, SuggestionStatus::Pending)
            .await
            .unwrap()
            .is_empty());
        let loaded = store.get_suggestion(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SuggestionStatus::Approved);
        assert!(loaded.is_terminal());
    }

    #[tokio::test]
    async fn corrupt_stored_rule_reports_corrupt() {
        let (_dir, store) = open().await;
        sqlx::query(
            "INSERT INTO vendor_rules (account_id, vendor, patterns, target) \
             VALUES (1, 'Broken', '[]', 'not json')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.get_rules(ACCOUNT).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    // The full pipeline on the real backend: import, suggest, approve,
    // then watch the learned rule label the next batch.
    #[tokio::test]
    async fn categorizer_runs_against_sqlite() {
        let dir = TempDir::new().unwrap();
        let pool = create_db(&dir.path().join("ledger.db")).await.unwrap();
        let engine = Categorizer::new(SqliteStore::new(pool), EngineConfig::default());

        let rows = vec![
            row(5, "CHECKCARD STARBUCKS 4521", -575),
            row(6, "CHECKCARD STARBUCKS 9983", -625),
        ];
        let summary = engine.import(ACCOUNT, &rows, Some("jan.csv")).await.unwrap();
        assert_eq!(summary.imported_count, 2);
        assert_eq!(summary.suggestions_created, 1);

        let again = engine.import(ACCOUNT, &rows, Some("jan.csv")).await.unwrap();
        assert_eq!(again.imported_count, 0);
        assert_eq!(again.skipped_count, 2);

        let pending = engine.pending_suggestions(ACCOUNT).await.unwrap();
        assert_eq!(pending[0].pattern, "STARBUCKS");
        engine
            .approve_suggestion(
                pending[0].id.unwrap(),
                Some(Labels {
                    vendor: "Starbucks".to_string(),
                    category: Some("Meals".to_string()),
                    project: None,
                }),
            )
            .await
            .unwrap();

        let summary = engine
            .import(ACCOUNT, &[row(7, "CHECKCARD STARBUCKS 0007", -500)], None)
            .await
            .unwrap();
        assert_eq!(summary.auto_categorized_count, 1);

        let rules = engine.rules(ACCOUNT).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].assigned_count, 3);

        let labeled = engine
            .store()
            .get_labeled_transactions(ACCOUNT)
            .await
            .unwrap();
        assert_eq!(labeled.len(), 3);
        assert!(labeled
            .iter()
            .all(|t| t.category.as_deref() == Some("Meals")));
    }
}
