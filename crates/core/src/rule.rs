use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::account::AccountId;

/// Category and project applied together. Either half may be unset; a rule
/// can name a vendor without deciding a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub category: Option<String>,
    pub project: Option<String>,
}

impl Target {
    pub fn new(category: Option<&str>, project: Option<&str>) -> Self {
        Target {
            category: category.map(str::to_string),
            project: project.map(str::to_string),
        }
    }
}

/// What a rule assigns when it fires. `BySign` exists for vendors whose
/// inflows and outflows mean different things, e.g. a tenant paying rent
/// versus the landlord paying for repairs at the same property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleTarget {
    Default {
        category: Option<String>,
        project: Option<String>,
    },
    BySign {
        income: Target,
        expense: Target,
    },
}

impl RuleTarget {
    pub fn resolve(&self, is_income: bool) -> Target {
        match self {
            RuleTarget::Default { category, project } => Target {
                category: category.clone(),
                project: project.clone(),
            },
            RuleTarget::BySign { income, expense } => {
                if is_income {
                    income.clone()
                } else {
                    expense.clone()
                }
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl Default for RuleTarget {
    fn default() -> Self {
        RuleTarget::Default {
            category: None,
            project: None,
        }
    }
}

/// A learned (or hand-written) labeling rule for one vendor within one
/// account. Patterns are uppercase substrings matched against transaction
/// descriptions; the counters feed the rule's confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRule {
    pub id: Option<i64>,
    pub account_id: AccountId,
    pub vendor: String,
    pub patterns: BTreeSet<String>,
    pub target: RuleTarget,
    pub enabled: bool,
    pub assigned_count: u32,
    pub corrected_count: u32,
    pub confidence: f64,
}

impl VendorRule {
    pub fn new(account_id: AccountId, vendor: &str, target: RuleTarget) -> Self {
        VendorRule {
            id: None,
            account_id,
            vendor: vendor.to_string(),
            patterns: BTreeSet::new(),
            target,
            enabled: true,
            assigned_count: 0,
            corrected_count: 0,
            confidence: 1.0,
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.add_pattern(pattern);
        self
    }

    /// Patterns are stored uppercase so matching is a plain substring test.
    pub fn add_pattern(&mut self, pattern: &str) {
        self.patterns.insert(pattern.to_uppercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_resolves_same_for_both_signs() {
        let target = RuleTarget::Default {
            category: Some("Meals".to_string()),
            project: None,
        };
        assert_eq!(target.resolve(true), target.resolve(false));
        assert_eq!(target.resolve(false).category.as_deref(), Some("Meals"));
    }

    #[test]
    fn by_sign_target_branches_on_direction() {
        let target = RuleTarget::BySign {
            income: Target::new(Some("Rent Income"), Some("12 Oak St")),
            expense: Target::new(Some("Repairs"), Some("12 Oak St")),
        };
        assert_eq!(target.resolve(true).category.as_deref(), Some("Rent Income"));
        assert_eq!(target.resolve(false).category.as_deref(), Some("Repairs"));
    }

    #[test]
    fn target_json_round_trip() {
        let target = RuleTarget::BySign {
            income: Target::new(Some("Rent Income"), None),
            expense: Target::new(Some("Repairs"), None),
        };
        let raw = target.to_json().unwrap();
        assert_eq!(RuleTarget::from_json(&raw).unwrap(), target);
        // Tag must be stable: persisted rows depend on it.
        assert!(raw.contains("\"kind\":\"by_sign\""));
    }

    #[test]
    fn patterns_are_stored_uppercase() {
        let rule = VendorRule::new(AccountId(1), "Starbucks", RuleTarget::default())
            .with_pattern("starbucks");
        assert!(rule.patterns.contains("STARBUCKS"));
    }

    #[test]
    fn new_rule_starts_trusted() {
        let rule = VendorRule::new(AccountId(1), "Starbucks", RuleTarget::default());
        assert!(rule.enabled);
        assert_eq!(rule.assigned_count, 0);
        assert_eq!(rule.corrected_count, 0);
        assert_eq!(rule.confidence, 1.0);
    }
}
