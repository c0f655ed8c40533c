use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

/// Opens (creating if needed) the ledger database and brings its schema up
/// to date. A single connection keeps SQLite's writer locking out of play.
pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    // Transaction ids are content-derived, so the primary key is the pair
    // (account_id, id): the same statement row imported into two accounts
    // is two transactions.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            account_id INTEGER NOT NULL,
            id TEXT NOT NULL,
            base_hash TEXT NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            vendor TEXT,
            category TEXT,
            project TEXT,
            is_cleaned INTEGER NOT NULL DEFAULT 0,
            is_transfer INTEGER NOT NULL DEFAULT 0,
            source_file TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (account_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Every import probes by content hash before inserting.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_base_hash ON transactions(account_id, base_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vendor_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            vendor TEXT NOT NULL,
            patterns TEXT NOT NULL,
            target TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            assigned_count INTEGER NOT NULL DEFAULT 0,
            corrected_count INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 1.0,
            UNIQUE (account_id, vendor)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suggestions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            pattern TEXT NOT NULL,
            member_ids TEXT NOT NULL,
            sample_descriptions TEXT NOT NULL,
            suggested_vendor TEXT NOT NULL,
            suggested_category TEXT,
            suggested_project TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_db_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");

        let pool = create_db(&path).await.unwrap();
        drop(pool);
        assert!(path.exists());

        // Reopening an existing database must not disturb it.
        create_db(&path).await.unwrap();
    }
}
