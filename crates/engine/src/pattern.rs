use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::config::EngineConfig;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_token, r"[A-Z0-9]+");

/// Pulls candidate vendor patterns out of raw statement descriptions.
///
/// Only the leading prefix of the description is considered; bank exports
/// pad the tail with reference numbers and location junk. Tokens that are
/// processor noise, state abbreviations, too short, or purely numeric
/// (card fragments, store numbers) never make it into a pattern.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    prefix_len: usize,
    min_token_len: usize,
    max_tokens: usize,
    noise: HashSet<String>,
}

impl PatternExtractor {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        let noise = cfg
            .noise_words
            .iter()
            .chain(cfg.state_abbreviations.iter())
            .map(|w| w.to_uppercase())
            .collect();
        PatternExtractor {
            prefix_len: cfg.description_prefix_len,
            min_token_len: cfg.min_token_len,
            max_tokens: cfg.max_pattern_tokens,
            noise,
        }
    }

    /// Candidate patterns, most specific first: the joined multi-token
    /// pattern (when two tokens survive), then the single leading token.
    pub fn extract(&self, description: &str) -> Vec<String> {
        let prefix: String = description.chars().take(self.prefix_len).collect();
        let prefix = prefix.to_uppercase();

        let survivors: Vec<&str> = re_token()
            .find_iter(&prefix)
            .map(|m| m.as_str())
            .filter(|t| self.keeps(t))
            .take(self.max_tokens)
            .collect();

        match survivors.as_slice() {
            [] => Vec::new(),
            [only] => vec![only.to_string()],
            many => vec![many.join(" "), many[0].to_string()],
        }
    }

    /// The pattern a description is grouped and attributed under.
    pub fn canonical(&self, description: &str) -> Option<String> {
        self.extract(description).into_iter().next()
    }

    fn keeps(&self, token: &str) -> bool {
        token.len() >= self.min_token_len
            && !token.chars().all(|c| c.is_ascii_digit())
            && !self.noise.contains(token)
    }
}
