use serde::{Deserialize, Serialize};

/// Rules with confidence at or above this are applied and the transaction
/// is marked cleaned without review.
pub const AUTO_ASSIGN_THRESHOLD: f64 = 0.85;

/// Rules must stay strictly above this to remain enabled. Between here and
/// the auto-assign threshold a rule still applies, but its transactions are
/// left in the review queue.
pub const MIN_CONFIDENCE: f64 = 0.70;

const DESCRIPTION_PREFIX_LEN: usize = 30;
const MIN_TOKEN_LEN: usize = 3;
const MAX_PATTERN_TOKENS: usize = 2;
const SUGGESTION_MIN_COUNT: usize = 2;
const SUGGESTION_SAMPLE_CAP: usize = 3;

/// Processor and transaction-type words that describe the payment channel
/// rather than the counterparty. Compared uppercase.
const NOISE_WORDS: &[&str] = &[
    "ACH",
    "ATM",
    "AUTOPAY",
    "BILL",
    "CARD",
    "CHECK",
    "CHECKCARD",
    "CREDIT",
    "DEBIT",
    "DEPOSIT",
    "DISCOVER",
    "INTL",
    "MASTERCARD",
    "ONLINE",
    "PAYMENT",
    "PAYPAL",
    "POS",
    "PURCHASE",
    "RECURRING",
    "TRANSFER",
    "VISA",
    "WEB",
    "WITHDRAWAL",
];

const STATE_ABBREVIATIONS: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

/// Tunables for pattern extraction, confidence thresholds, and suggestion
/// grouping. Every field has a default, so a config file only needs the
/// values it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub auto_assign_threshold: f64,
    pub min_confidence: f64,
    pub description_prefix_len: usize,
    pub min_token_len: usize,
    pub max_pattern_tokens: usize,
    pub suggestion_min_count: usize,
    pub suggestion_sample_cap: usize,
    pub noise_words: Vec<String>,
    pub state_abbreviations: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            auto_assign_threshold: AUTO_ASSIGN_THRESHOLD,
            min_confidence: MIN_CONFIDENCE,
            description_prefix_len: DESCRIPTION_PREFIX_LEN,
            min_token_len: MIN_TOKEN_LEN,
            max_pattern_tokens: MAX_PATTERN_TOKENS,
            suggestion_min_count: SUGGESTION_MIN_COUNT,
            suggestion_sample_cap: SUGGESTION_SAMPLE_CAP,
            noise_words: NOISE_WORDS.iter().map(|s| s.to_string()).collect(),
            state_abbreviations: STATE_ABBREVIATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}
