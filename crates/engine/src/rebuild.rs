use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use arca_core::{AccountId, RebuildSummary, RuleTarget, Transaction, VendorRule};

use crate::confidence::ConfidenceScorer;
use crate::pattern::PatternExtractor;

#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub rules: Vec<VendorRule>,
    pub summary: RebuildSummary,
}

/// Regenerates every vendor rule for an account from its labeled history.
///
/// Each labeled transaction votes its canonical pattern toward its vendor.
/// A pattern claimed by several vendors is awarded to exactly one, so no
/// pattern can sit in two rules afterward. Existing rules keep their
/// target, enabled flag, and correction history; patterns and assigned
/// counts are replaced by what the history actually supports.
pub fn rebuild_rules(
    account: AccountId,
    labeled: &[Transaction],
    existing: &[VendorRule],
    extractor: &PatternExtractor,
) -> RebuildOutcome {
    let mut vendor_totals: BTreeMap<String, u32> = BTreeMap::new();
    let mut claims: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
    let mut target_votes: HashMap<String, BTreeMap<(Option<String>, Option<String>), u32>> =
        HashMap::new();

    for tx in labeled {
        let Some(vendor) = tx.vendor.as_deref() else {
            continue;
        };
        *vendor_totals.entry(vendor.to_string()).or_default() += 1;
        *target_votes
            .entry(vendor.to_string())
            .or_default()
            .entry((tx.category.clone(), tx.project.clone()))
            .or_default() += 1;
        if let Some(pattern) = extractor.canonical(&tx.description) {
            *claims
                .entry(pattern)
                .or_default()
                .entry(vendor.to_string())
                .or_default() += 1;
        }
    }

    // Award each pattern to a single vendor: strongest claim on the pattern
    // first, then overall transaction count, then vendor name.
    let mut awarded: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut ambiguous_patterns_resolved = 0;
    for (pattern, claimants) in &claims {
        let winner = claimants
            .iter()
            .max_by(|(va, ca), (vb, cb)| {
                ca.cmp(cb)
                    .then_with(|| vendor_totals[va.as_str()].cmp(&vendor_totals[vb.as_str()]))
                    .then_with(|| vb.cmp(va))
            })
            .map(|(v, _)| v.clone())
            .unwrap_or_default();
        if claimants.len() > 1 {
            ambiguous_patterns_resolved += 1;
            debug!(
                pattern = %pattern,
                claimants = claimants.len(),
                winner = %winner,
                "pattern claimed by multiple vendors"
            );
        }
        awarded.entry(winner).or_default().insert(pattern.clone());
    }

    // Rewrite: one rule per vendor seen in history, plus existing rules for
    // vendors whose evidence has disappeared (their patterns are cleared).
    let by_vendor: HashMap<&str, &VendorRule> =
        existing.iter().map(|r| (r.vendor.as_str(), r)).collect();
    let mut rules = Vec::new();

    for (vendor, total) in &vendor_totals {
        let patterns = awarded.remove(vendor.as_str()).unwrap_or_default();
        let mut rule = match by_vendor.get(vendor.as_str()) {
            Some(old) => (*old).clone(),
            None => VendorRule::new(account, vendor, majority_target(&target_votes, vendor)),
        };
        rule.patterns = patterns;
        rule.assigned_count = *total;
        rule.confidence = ConfidenceScorer::confidence(rule.assigned_count, rule.corrected_count);
        rules.push(rule);
    }

    for old in existing {
        if vendor_totals.contains_key(&old.vendor) {
            continue;
        }
        let mut rule = old.clone();
        rule.patterns.clear();
        rule.assigned_count = 0;
        rule.confidence = ConfidenceScorer::confidence(0, rule.corrected_count);
        rules.push(rule);
    }

    let summary = RebuildSummary {
        updated_count: rules.len() as u32,
        ambiguous_patterns_resolved,
    };
    info!(
        account = %account,
        rules = summary.updated_count,
        ambiguous = summary.ambiguous_patterns_resolved,
        "rebuilt vendor rules from labeled history"
    );
    RebuildOutcome { rules, summary }
}

fn majority_target(
    votes: &HashMap<String, BTreeMap<(Option<String>, Option<String>), u32>>,
    vendor: &str,
) -> RuleTarget {
    let winner = votes.get(vendor).and_then(|pairs| {
        pairs
            .iter()
            .max_by(|(pa, ca), (pb, cb)| ca.cmp(cb).then_with(|| pb.cmp(pa)))
            .map(|(pair, _)| pair.clone())
    });
    let (category, project) = winner.unwrap_or((None, None));
    RuleTarget::Default { category, project }
}
