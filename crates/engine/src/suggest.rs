use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use arca_core::{AccountId, Labels, SuggestionGroup, SuggestionStatus, Transaction, TxId};

use crate::config::EngineConfig;
use crate::pattern::PatternExtractor;

/// Groups the unmatched rows of one import batch by canonical pattern and
/// turns every group that clears the frequency threshold into a pending
/// suggestion. Patterns already covered by an open suggestion are skipped
/// rather than duplicated.
pub fn propose(
    account: AccountId,
    unmatched: &[(TxId, String)],
    labeled: &[Transaction],
    open_patterns: &HashSet<String>,
    extractor: &PatternExtractor,
    cfg: &EngineConfig,
) -> Vec<SuggestionGroup> {
    let mut groups: BTreeMap<String, Vec<(&TxId, &str)>> = BTreeMap::new();
    for (id, description) in unmatched {
        if let Some(pattern) = extractor.canonical(description) {
            groups
                .entry(pattern)
                .or_default()
                .push((id, description.as_str()));
        }
    }

    let mut proposals = Vec::new();
    for (pattern, members) in groups {
        if members.len() < cfg.suggestion_min_count {
            continue;
        }
        if open_patterns.contains(&pattern) {
            debug!(pattern = %pattern, "pending suggestion already covers pattern");
            continue;
        }
        let suggested = propose_labels(&pattern, labeled, extractor);
        proposals.push(SuggestionGroup {
            id: None,
            account_id: account,
            member_ids: members.iter().map(|(id, _)| (*id).clone()).collect(),
            sample_descriptions: members
                .iter()
                .take(cfg.suggestion_sample_cap)
                .map(|(_, d)| d.to_string())
                .collect(),
            suggested,
            pattern,
            status: SuggestionStatus::Pending,
        });
    }
    proposals
}

/// Most common (vendor, category, project) among labeled transactions whose
/// descriptions reduce to the same pattern. With no history to lean on, the
/// pattern itself becomes the proposed vendor name.
fn propose_labels(pattern: &str, labeled: &[Transaction], extractor: &PatternExtractor) -> Labels {
    let mut votes: BTreeMap<(String, Option<String>, Option<String>), u32> = BTreeMap::new();
    for tx in labeled {
        let Some(vendor) = tx.vendor.clone() else {
            continue;
        };
        if extractor.canonical(&tx.description).as_deref() == Some(pattern) {
            *votes
                .entry((vendor, tx.category.clone(), tx.project.clone()))
                .or_default() += 1;
        }
    }

    let winner = votes
        .iter()
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.cmp(ka)))
        .map(|(key, _)| key.clone());

    match winner {
        Some((vendor, category, project)) => Labels {
            vendor,
            category,
            project,
        },
        None => Labels::vendor_only(&title_case(pattern)),
    }
}

fn title_case(pattern: &str) -> String {
    pattern
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => format!("{first}{}", chars.as_str().to_lowercase()),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
