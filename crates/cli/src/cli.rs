//! CLI argument definitions using clap
//!
//! This module contains the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Arca - learn who your transactions belong to
#[derive(Parser)]
#[command(name = "arca")]
#[command(about = "Deterministic bank transaction categorizer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import a bank statement CSV
    Import {
        /// CSV file to import
        file: PathBuf,

        /// Account the statement belongs to
        #[arg(short, long)]
        account: i64,

        /// Bank CSV layout: wells-fargo, generic
        #[arg(short, long, default_value = "wells-fargo")]
        profile: String,
    },

    /// Relearn vendor rules from the labeled history
    Rebuild {
        /// Account to rebuild
        #[arg(short, long)]
        account: i64,
    },

    /// Relabel one transaction by hand
    Correct {
        /// Transaction id
        tx_id: String,

        /// Account the transaction belongs to
        #[arg(short, long)]
        account: i64,

        /// Vendor to assign
        #[arg(long)]
        vendor: String,

        /// Category to assign
        #[arg(long)]
        category: Option<String>,

        /// Project to assign
        #[arg(long)]
        project: Option<String>,
    },

    /// Review the suggestion queue
    Suggestions {
        #[command(subcommand)]
        action: SuggestionsAction,
    },

    /// Inspect and manage vendor rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand)]
pub enum SuggestionsAction {
    /// List pending suggestions
    List {
        /// Account to list
        #[arg(short, long)]
        account: i64,
    },

    /// Approve a suggestion, labeling every member transaction
    Approve {
        /// Suggestion id
        suggestion_id: i64,

        /// Replace the proposed vendor
        #[arg(long)]
        vendor: Option<String>,

        /// Replace the proposed category (requires --vendor)
        #[arg(long, requires = "vendor")]
        category: Option<String>,

        /// Replace the proposed project (requires --vendor)
        #[arg(long, requires = "vendor")]
        project: Option<String>,
    },

    /// Close a suggestion without labeling anything
    Dismiss {
        /// Suggestion id
        suggestion_id: i64,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List an account's vendor rules
    List {
        /// Account to list
        #[arg(short, long)]
        account: i64,
    },

    /// Clear a rule's corrections and re-enable it
    Reset {
        /// Rule id
        rule_id: i64,
    },
}
