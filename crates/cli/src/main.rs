//! Arca CLI - deterministic bank transaction categorizer
//!
//! Usage:
//!   arca init                          Create the database
//!   arca import jan.csv --account 1    Import a statement CSV
//!   arca suggestions list --account 1  Review the suggestion queue
//!   arca rebuild --account 1           Relearn rules from labeled history

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db_path = match cli.db {
        Some(path) => path,
        None => commands::default_db_path()?,
    };

    match cli.command {
        Commands::Init => commands::cmd_init(&db_path).await,
        Commands::Import {
            file,
            account,
            profile,
        } => {
            let engine = commands::open_engine(&db_path).await?;
            commands::cmd_import(&engine, &file, account, &profile).await
        }
        Commands::Rebuild { account } => {
            let engine = commands::open_engine(&db_path).await?;
            commands::cmd_rebuild(&engine, account).await
        }
        Commands::Correct {
            tx_id,
            account,
            vendor,
            category,
            project,
        } => {
            let engine = commands::open_engine(&db_path).await?;
            commands::cmd_correct(
                &engine,
                account,
                &tx_id,
                &vendor,
                category.as_deref(),
                project.as_deref(),
            )
            .await
        }
        Commands::Suggestions { action } => {
            let engine = commands::open_engine(&db_path).await?;
            match action {
                SuggestionsAction::List { account } => {
                    commands::cmd_suggestions_list(&engine, account).await
                }
                SuggestionsAction::Approve {
                    suggestion_id,
                    vendor,
                    category,
                    project,
                } => {
                    commands::cmd_suggestions_approve(
                        &engine,
                        suggestion_id,
                        vendor.as_deref(),
                        category.as_deref(),
                        project.as_deref(),
                    )
                    .await
                }
                SuggestionsAction::Dismiss { suggestion_id } => {
                    commands::cmd_suggestions_dismiss(&engine, suggestion_id).await
                }
            }
        }
        Commands::Rules { action } => {
            let engine = commands::open_engine(&db_path).await?;
            match action {
                RulesAction::List { account } => commands::cmd_rules_list(&engine, account).await,
                RulesAction::Reset { rule_id } => {
                    commands::cmd_rules_reset(&engine, rule_id).await
                }
            }
        }
    }
}
