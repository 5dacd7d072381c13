// Discord layer - commands and event handlers.

#[path = "moderation/mod.rs"]
pub mod moderation;

use crate::core::moderation::ModerationEngine;
use crate::infra::moderation::SqliteModerationStore;
use std::path::PathBuf;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub moderation: Arc<ModerationEngine>,
    /// Evidence read-back for `/moderation history`.
    pub store: Arc<SqliteModerationStore>,
    /// Where `/moderation reload` reads the config from.
    pub config_path: PathBuf,
}
