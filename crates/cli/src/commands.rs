//! Command implementations.
//!
//! Output is count summaries and identifiers. Statement rows that fail to
//! parse are reported by row number and field only; descriptions and
//! amounts never reach the log output.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use arca_core::{AccountId, Labels, TxId};
use arca_engine::{Categorizer, EngineConfig};
use arca_import::CsvProfile;
use arca_storage::SqliteStore;

pub type Engine = Categorizer<SqliteStore>;

/// Default database location, e.g. `~/.local/share/arca/ledger.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "arca", "Arca")
        .context("could not determine a data directory for this platform")?;
    Ok(project_dirs.data_dir().join("ledger.db"))
}

pub async fn open_engine(db_path: &Path) -> Result<Engine> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }
    let pool = arca_storage::create_db(db_path)
        .await
        .with_context(|| format!("could not open database at {}", db_path.display()))?;
    Ok(Categorizer::new(
        SqliteStore::new(pool),
        EngineConfig::default(),
    ))
}

pub async fn cmd_init(db_path: &Path) -> Result<()> {
    open_engine(db_path).await?;
    println!("Database ready at {}", db_path.display());
    Ok(())
}

pub async fn cmd_import(
    engine: &Engine,
    file: &Path,
    account: i64,
    profile_name: &str,
) -> Result<()> {
    let profile = CsvProfile::for_name(profile_name).ok_or_else(|| {
        anyhow!("unknown CSV profile: {profile_name} (valid: wells-fargo, generic)")
    })?;
    let data = std::fs::File::open(file)
        .with_context(|| format!("could not open {}", file.display()))?;
    let parsed = arca_import::read_rows(data, &profile)
        .with_context(|| format!("could not parse {}", file.display()))?;

    for warning in &parsed.warnings {
        warn!(%warning, "statement row excluded");
    }

    let source = file.file_name().and_then(|n| n.to_str());
    let summary = engine.import(AccountId(account), &parsed.rows, source).await?;

    println!(
        "Imported {} transactions ({} duplicates skipped)",
        summary.imported_count, summary.skipped_count
    );
    println!("  {} auto-categorized", summary.auto_categorized_count);
    println!("  {} new suggestions", summary.suggestions_created);
    if !parsed.warnings.is_empty() {
        println!("  {} rows excluded, see the log for positions", parsed.warnings.len());
    }
    Ok(())
}

pub async fn cmd_rebuild(engine: &Engine, account: i64) -> Result<()> {
    let summary = engine.rebuild(AccountId(account)).await?;
    println!(
        "Rebuilt {} vendor rules ({} contested patterns resolved)",
        summary.updated_count, summary.ambiguous_patterns_resolved
    );
    Ok(())
}

pub async fn cmd_correct(
    engine: &Engine,
    account: i64,
    tx_id: &str,
    vendor: &str,
    category: Option<&str>,
    project: Option<&str>,
) -> Result<()> {
    let id: TxId = tx_id.parse().context("invalid transaction id")?;
    let labels = Labels {
        vendor: vendor.to_string(),
        category: category.map(str::to_string),
        project: project.map(str::to_string),
    };
    engine.correct(AccountId(account), &id, labels).await?;
    println!("Relabeled {tx_id} as {vendor}");
    Ok(())
}

pub async fn cmd_suggestions_list(engine: &Engine, account: i64) -> Result<()> {
    let pending = engine.pending_suggestions(AccountId(account)).await?;
    if pending.is_empty() {
        println!("No pending suggestions");
        return Ok(());
    }

    println!("{} pending suggestions:", pending.len());
    for group in &pending {
        let category = group
            .suggested
            .category
            .as_deref()
            .map(|c| format!(" / {c}"))
            .unwrap_or_default();
        println!(
            "  [{}] {} ({} transactions) -> {}{}",
            group.id.unwrap_or_default(),
            group.pattern,
            group.member_count(),
            group.suggested.vendor,
            category,
        );
        for sample in &group.sample_descriptions {
            println!("      {sample}");
        }
    }
    Ok(())
}

pub async fn cmd_suggestions_approve(
    engine: &Engine,
    suggestion_id: i64,
    vendor: Option<&str>,
    category: Option<&str>,
    project: Option<&str>,
) -> Result<()> {
    let overrides = vendor.map(|v| Labels {
        vendor: v.to_string(),
        category: category.map(str::to_string),
        project: project.map(str::to_string),
    });
    engine.approve_suggestion(suggestion_id, overrides).await?;
    println!("Approved suggestion {suggestion_id}");
    Ok(())
}

pub async fn cmd_suggestions_dismiss(engine: &Engine, suggestion_id: i64) -> Result<()> {
    engine.dismiss_suggestion(suggestion_id).await?;
    println!("Dismissed suggestion {suggestion_id}");
    Ok(())
}

pub async fn cmd_rules_list(engine: &Engine, account: i64) -> Result<()> {
    let rules = engine.rules(AccountId(account)).await?;
    if rules.is_empty() {
        println!("No rules for account {account}");
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:>10} {:>8} {:>9}  {}",
        "id", "vendor", "confidence", "assigned", "corrected", "state"
    );
    for rule in &rules {
        println!(
            "{:<6} {:<24} {:>10.2} {:>8} {:>9}  {}",
            rule.id.unwrap_or_default(),
            rule.vendor,
            rule.confidence,
            rule.assigned_count,
            rule.corrected_count,
            if rule.enabled { "enabled" } else { "disabled" },
        );
    }
    Ok(())
}

pub async fn cmd_rules_reset(engine: &Engine, rule_id: i64) -> Result<()> {
    let rule = engine.reset_rule(rule_id).await?;
    println!(
        "Rule {} ({}) re-enabled with corrections cleared",
        rule_id, rule.vendor
    );
    Ok(())
}
