use tracing::warn;

use arca_core::{Labels, Money, VendorRule};

/// A rule that claimed a description, plus the labels it resolves to for
/// that particular amount.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub rule_index: usize,
    pub labels: Labels,
}

/// Finds the enabled rule whose patterns claim a description.
///
/// Matching is a case-insensitive substring test against the whole raw
/// description. When several rules claim the same description the one with
/// the larger assigned count wins, ties broken by vendor name, and the
/// conflict is logged; rebuilds are expected to make this rare.
pub fn find_match(rules: &[VendorRule], description: &str, amount: Money) -> Option<MatchOutcome> {
    let haystack = description.to_uppercase();

    let mut candidates: Vec<usize> = rules
        .iter()
        .enumerate()
        .filter(|(_, r)| r.enabled && r.patterns.iter().any(|p| haystack.contains(p.as_str())))
        .map(|(i, _)| i)
        .collect();

    if candidates.is_empty() {
        return None;
    }

    if candidates.len() > 1 {
        candidates.sort_by(|&a, &b| {
            rules[b]
                .assigned_count
                .cmp(&rules[a].assigned_count)
                .then_with(|| rules[a].vendor.cmp(&rules[b].vendor))
        });
        let names: Vec<&str> = candidates.iter().map(|&i| rules[i].vendor.as_str()).collect();
        warn!(
            rules = ?names,
            winner = %rules[candidates[0]].vendor,
            "multiple rules matched one description"
        );
    }

    let rule_index = candidates[0];
    Some(MatchOutcome {
        rule_index,
        labels: resolve_labels(&rules[rule_index], amount),
    })
}

pub fn resolve_labels(rule: &VendorRule, amount: Money) -> Labels {
    let target = rule.target.resolve(amount.is_income());
    Labels {
        vendor: rule.vendor.clone(),
        category: target.category,
        project: target.project,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_core::{AccountId, RuleTarget, Target};

    fn rule(vendor: &str, pattern: &str, assigned: u32) -> VendorRule {
        let mut r = VendorRule::new(
            AccountId(1),
            vendor,
            RuleTarget::Default {
                category: Some("Meals".to_string()),
                project: None,
            },
        )
        .with_pattern(pattern);
        r.assigned_count = assigned;
        r
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let rules = vec![rule("Starbucks", "STARBUCKS", 5)];
        let m = find_match(&rules, "checkcard starbucks 4521", Money::from_cents(-575));
        assert_eq!(m.unwrap().labels.vendor, "Starbucks");
    }

    #[test]
    fn no_pattern_no_match() {
        let rules = vec![rule("Starbucks", "STARBUCKS", 5)];
        assert!(find_match(&rules, "SHELL OIL 57444", Money::from_cents(-4000)).is_none());
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut r = rule("Starbucks", "STARBUCKS", 5);
        r.enabled = false;
        assert!(find_match(
            &[r],
            "CHECKCARD STARBUCKS 4521",
            Money::from_cents(-575)
        )
        .is_none());
    }

    #[test]
    fn by_sign_rule_labels_depend_on_direction() {
        let mut r = VendorRule::new(
            AccountId(1),
            "12 Oak St Tenant",
            RuleTarget::BySign {
                income: Target::new(Some("Rent Income"), Some("12 Oak St")),
                expense: Target::new(Some("Repairs"), Some("12 Oak St")),
            },
        )
        .with_pattern("OAKST PROPERTY");
        r.assigned_count = 4;
        let rules = vec![r];

        let rent = find_match(&rules, "ACH OAKST PROPERTY 0092", Money::from_cents(120_000))
            .unwrap()
            .labels;
        assert_eq!(rent.category.as_deref(), Some("Rent Income"));
        assert_eq!(rent.project.as_deref(), Some("12 Oak St"));

        let repair = find_match(&rules, "ACH OAKST PROPERTY 0092", Money::from_cents(-30_000))
            .unwrap()
            .labels;
        assert_eq!(repair.category.as_deref(), Some("Repairs"));
        assert_eq!(repair.project.as_deref(), Some("12 Oak St"));
    }

    #[test]
    fn conflict_goes_to_the_more_assigned_rule() {
        let rules = vec![rule("Shell", "SHELL", 2), rule("Shell Oil", "SHELL OIL", 9)];
        let m = find_match(&rules, "CHECKCARD SHELL OIL 57444", Money::from_cents(-4000));
        assert_eq!(m.unwrap().labels.vendor, "Shell Oil");
    }

    #[test]
    fn conflict_tie_breaks_on_vendor_name() {
        let rules = vec![rule("Bravo", "COFFEE", 3), rule("Alpha", "COFFEE", 3)];
        let m = find_match(&rules, "POS COFFEE HOUSE", Money::from_cents(-500));
        assert_eq!(m.unwrap().labels.vendor, "Alpha");
    }
}
