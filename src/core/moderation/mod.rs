// Core moderation module - signal extraction, score fusion, rate tracking,
// the escalation ledger and the engine that wires them together.
// Ports for persistence and enforcement live here too; infra/ and discord/
// implement them.

pub mod default_rules;
pub mod enforcement;
pub mod escalation_ledger;
pub mod language;
pub mod lexicon;
pub mod moderation_config;
pub mod moderation_models;
pub mod moderation_service;
pub mod patterns;
pub mod persistence;
pub mod rate_tracker;
pub mod score_fusion;
pub mod sentiment;
pub mod signal_extractors;

pub use enforcement::*;
pub use escalation_ledger::*;
pub use moderation_config::*;
pub use moderation_models::*;
pub use moderation_service::*;
pub use persistence::*;
