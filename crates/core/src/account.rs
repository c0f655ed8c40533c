use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a ledger account. Accounts themselves are managed
/// elsewhere; everything here only needs the id to scope its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
