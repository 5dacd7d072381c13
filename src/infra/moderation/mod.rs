// Moderation infrastructure: SQLite persistence and the JSON config file.

pub mod config_file;
pub mod sqlite_moderation_store;

pub use config_file::{load_config, update_scope_overrides, watch_config_file};
pub use sqlite_moderation_store::SqliteModerationStore;
