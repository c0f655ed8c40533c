use tracing::warn;

use arca_core::VendorRule;

use crate::config::EngineConfig;

/// How a matched rule may be applied to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleApplication {
    /// Apply labels and mark the transaction cleaned.
    AutoClean,
    /// Apply labels but leave the transaction in the review queue.
    NeedsReview,
    /// Do not apply at all.
    Withhold,
}

/// Keeps rule trust in sync with its counters.
///
/// Confidence is `1 - corrected / max(assigned, 1)`, clamped to [0, 1].
/// Threshold tests run on the raw counters with integer arithmetic, so the
/// boundaries are exact: a rule must sit strictly above the minimum to keep
/// acting, and a correction that lands it at or below the minimum disables
/// it until a human resets it.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    auto_assign_hundredths: u64,
    min_confidence_hundredths: u64,
}

impl ConfidenceScorer {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        ConfidenceScorer {
            auto_assign_hundredths: (cfg.auto_assign_threshold * 100.0).round() as u64,
            min_confidence_hundredths: (cfg.min_confidence * 100.0).round() as u64,
        }
    }

    pub fn confidence(assigned: u32, corrected: u32) -> f64 {
        let denom = assigned.max(1) as f64;
        (1.0 - corrected as f64 / denom).clamp(0.0, 1.0)
    }

    pub fn classify(&self, rule: &VendorRule) -> RuleApplication {
        if !rule.enabled {
            return RuleApplication::Withhold;
        }
        if at_least(rule, self.auto_assign_hundredths) {
            RuleApplication::AutoClean
        } else if above(rule, self.min_confidence_hundredths) {
            RuleApplication::NeedsReview
        } else {
            RuleApplication::Withhold
        }
    }

    pub fn record_assignment(&self, rule: &mut VendorRule) {
        self.record_assignments(rule, 1);
    }

    /// Bulk form for suggestion approvals, which assign a whole group at
    /// once.
    pub fn record_assignments(&self, rule: &mut VendorRule, count: u32) {
        rule.assigned_count += count;
        rule.confidence = Self::confidence(rule.assigned_count, rule.corrected_count);
    }

    /// A human moved one of this rule's transactions to another vendor.
    /// Counters only ever go up; the correction stays on the books even if
    /// the rule is later reset.
    pub fn record_correction(&self, rule: &mut VendorRule) {
        rule.corrected_count += 1;
        rule.confidence = Self::confidence(rule.assigned_count, rule.corrected_count);
        if rule.enabled && !above(rule, self.min_confidence_hundredths) {
            rule.enabled = false;
            warn!(
                rule_id = rule.id,
                vendor = %rule.vendor,
                assigned = rule.assigned_count,
                corrected = rule.corrected_count,
                "rule disabled after correction"
            );
        }
    }

    /// Explicit human override: clears the corrections, restores full
    /// confidence, re-enables. The assigned count is history and stays.
    pub fn reset(&self, rule: &mut VendorRule) {
        rule.corrected_count = 0;
        rule.confidence = 1.0;
        rule.enabled = true;
    }
}

fn at_least(rule: &VendorRule, threshold_hundredths: u64) -> bool {
    let assigned = rule.assigned_count.max(1) as u64;
    let kept = assigned.saturating_sub(rule.corrected_count as u64);
    100 * kept >= threshold_hundredths * assigned
}

fn above(rule: &VendorRule, threshold_hundredths: u64) -> bool {
    let assigned = rule.assigned_count.max(1) as u64;
    let kept = assigned.saturating_sub(rule.corrected_count as u64);
    100 * kept > threshold_hundredths * assigned
}
