pub mod account;
pub mod money;
pub mod rule;
pub mod suggestion;
pub mod summary;
pub mod transaction;

pub use account::AccountId;
pub use money::Money;
pub use rule::{RuleTarget, Target, VendorRule};
pub use suggestion::{SuggestionGroup, SuggestionStatus};
pub use summary::{ImportSummary, RebuildSummary, RowField, RowWarning, WarningKind};
pub use transaction::{IdError, Labels, NormalizedRow, Transaction, TxId};
