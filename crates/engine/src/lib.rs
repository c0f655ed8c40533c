pub mod confidence;
pub mod config;
pub mod dedup;
pub mod matcher;
pub mod pattern;
pub mod pipeline;
pub mod rebuild;
pub mod store;
pub mod suggest;

pub use confidence::{ConfidenceScorer, RuleApplication};
pub use config::EngineConfig;
pub use pattern::PatternExtractor;
pub use pipeline::{Categorizer, EngineError};
pub use rebuild::RebuildOutcome;
pub use store::{LedgerStore, MemoryStore, StoreError};
