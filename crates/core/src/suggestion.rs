use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::account::AccountId;
use super::transaction::{Labels, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Dismissed,
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Dismissed => "dismissed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SuggestionStatus::Pending),
            "approved" => Ok(SuggestionStatus::Approved),
            "dismissed" => Ok(SuggestionStatus::Dismissed),
            other => Err(format!("unknown suggestion status: {other}")),
        }
    }
}

/// A batch of unlabeled transactions that share an extracted pattern,
/// queued for a human to approve or dismiss. Approval turns the group into
/// a vendor rule and labels every member in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionGroup {
    pub id: Option<i64>,
    pub account_id: AccountId,
    /// Uppercase pattern the members were grouped under.
    pub pattern: String,
    pub member_ids: Vec<TxId>,
    /// A few example descriptions so the reviewer can see what the pattern
    /// actually covers without opening each transaction.
    pub sample_descriptions: Vec<String>,
    pub suggested: Labels,
    pub status: SuggestionStatus,
}

impl SuggestionGroup {
    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }

    /// Approved and dismissed groups are final; they are kept for history
    /// but can never transition again.
    pub fn is_terminal(&self) -> bool {
        self.status != SuggestionStatus::Pending
    }
}
