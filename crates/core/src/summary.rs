use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-batch import result. Counts only; the caller already has the rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported_count: u32,
    pub skipped_count: u32,
    pub auto_categorized_count: u32,
    pub suggestions_created: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    /// Vendor rules written back (created or refreshed).
    pub updated_count: u32,
    /// Patterns that were claimed by more than one vendor and had to be
    /// awarded to a single winner.
    pub ambiguous_patterns_resolved: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowField {
    Date,
    Amount,
    Description,
}

impl fmt::Display for RowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowField::Date => "date",
            RowField::Amount => "amount",
            RowField::Description => "description",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The column exists but its value would not parse.
    Invalid,
    /// The row has no value in that column at all.
    Missing,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::Invalid => "invalid",
            WarningKind::Missing => "missing",
        };
        write!(f, "{s}")
    }
}

/// One excluded statement row. Deliberately carries no field content:
/// descriptions and amounts stay out of logs and error output, so the row
/// is identified by position only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWarning {
    pub row_number: usize,
    pub field: RowField,
    pub kind: WarningKind,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {} {}", self.row_number, self.kind, self.field)
    }
}
